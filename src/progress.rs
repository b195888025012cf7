use crate::access::Scope;
use crate::completion::{completion_rate, possible_count};
use crate::error::{AppError, AppResult};
use crate::model::{Assignment, TargetKind};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionScope {
    School,
    /// All active schools of a sector.
    Sector,
    /// All active schools of a region.
    Region,
    /// A sector's own `sectors`-assigned categories.
    SectorOwn,
}

impl CompletionScope {
    fn assignment(self) -> Assignment {
        match self {
            CompletionScope::SectorOwn => Assignment::Sectors,
            _ => Assignment::All,
        }
    }

    fn target_kind(self) -> TargetKind {
        self.assignment().target_kind()
    }

    fn targets_sql(self) -> &'static str {
        match self {
            CompletionScope::School => "SELECT id FROM schools WHERE id = ?",
            CompletionScope::Sector => {
                "SELECT id FROM schools WHERE sector_id = ? AND status = 'active'"
            }
            CompletionScope::Region => {
                "SELECT id FROM schools WHERE region_id = ? AND status = 'active'"
            }
            CompletionScope::SectorOwn => "SELECT id FROM sectors WHERE id = ?",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStats {
    pub scope: CompletionScope,
    pub id: String,
    pub category_id: Option<String>,
    pub target_count: u64,
    pub required_columns: u64,
    pub approved: u64,
    pub possible: u64,
    pub completion_rate: u32,
}

pub fn required_column_count(
    conn: &Connection,
    assignment: Assignment,
    category_id: Option<&str>,
) -> AppResult<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM columns col
         JOIN categories c ON c.id = col.category_id
         WHERE c.status = 'active' AND col.status = 'active' AND col.is_required = 1
           AND c.assignment = ? AND (? IS NULL OR c.id = ?)",
        rusqlite::params![assignment, category_id, category_id],
        |r| r.get(0),
    )?;
    Ok(n.max(0) as u64)
}

fn ensure_exists(conn: &Connection, scope: CompletionScope, id: &str) -> AppResult<()> {
    let (sql, what) = match scope {
        CompletionScope::School => ("SELECT 1 FROM schools WHERE id = ?", "school"),
        CompletionScope::Sector | CompletionScope::SectorOwn => {
            ("SELECT 1 FROM sectors WHERE id = ?", "sector")
        }
        CompletionScope::Region => ("SELECT 1 FROM regions WHERE id = ?", "region"),
    };
    let found: Option<i64> = conn.query_row(sql, [id], |r| r.get(0)).optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(what.into())),
    }
}

/// approved / (targets × required columns in active categories).
pub fn compute(
    conn: &Connection,
    scope: CompletionScope,
    id: &str,
    category_id: Option<&str>,
) -> AppResult<CompletionStats> {
    ensure_exists(conn, scope, id)?;

    let targets_sql = scope.targets_sql();
    let target_count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM ({targets_sql})"),
        [id],
        |r| r.get(0),
    )?;
    let required_columns = required_column_count(conn, scope.assignment(), category_id)?;

    let approved: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*)
             FROM data_entries d
             JOIN columns col ON col.id = d.column_id
             JOIN categories c ON c.id = d.category_id
             WHERE d.status = 'approved'
               AND col.status = 'active' AND col.is_required = 1
               AND c.status = 'active' AND c.assignment = ?
               AND (? IS NULL OR c.id = ?)
               AND d.target_kind = ?
               AND d.target_id IN ({targets_sql})"
        ),
        rusqlite::params![
            scope.assignment(),
            category_id,
            category_id,
            scope.target_kind(),
            id
        ],
        |r| r.get(0),
    )?;

    let target_count = target_count.max(0) as u64;
    let approved = approved.max(0) as u64;
    let possible = possible_count(target_count, required_columns);
    Ok(CompletionStats {
        scope,
        id: id.to_string(),
        category_id: category_id.map(String::from),
        target_count,
        required_columns,
        approved,
        possible,
        completion_rate: completion_rate(approved, possible),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolCompletion {
    pub region_name: String,
    pub sector_name: String,
    pub school_id: String,
    pub school_name: String,
    pub status: String,
    pub approved: u64,
    pub possible: u64,
    pub completion_rate: u32,
}

/// One row per school visible in `scope`, optionally narrowed to a region.
pub fn school_breakdown(
    conn: &Connection,
    scope: &Scope,
    region_id: Option<&str>,
) -> AppResult<Vec<SchoolCompletion>> {
    let required = required_column_count(conn, Assignment::All, None)?;

    let mut approved_stmt = conn.prepare(
        "SELECT d.target_id, COUNT(*)
         FROM data_entries d
         JOIN columns col ON col.id = d.column_id
         JOIN categories c ON c.id = d.category_id
         WHERE d.status = 'approved' AND d.target_kind = 'school'
           AND col.status = 'active' AND col.is_required = 1
           AND c.status = 'active' AND c.assignment = 'all'
         GROUP BY d.target_id",
    )?;
    let approved: HashMap<String, i64> = approved_stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;

    let (predicate, param) = scope.school_predicate("s");
    let sql = format!(
        "SELECT r.name, se.name, s.id, s.name, s.status
         FROM schools s
         JOIN sectors se ON se.id = s.sector_id
         JOIN regions r ON r.id = s.region_id
         WHERE {predicate} AND (? IS NULL OR s.region_id = ?)
         ORDER BY r.name, se.name, s.name"
    );
    let mut binds: Vec<Option<String>> = Vec::new();
    if let Some(p) = param {
        binds.push(Some(p));
    }
    binds.push(region_id.map(String::from));
    binds.push(region_id.map(String::from));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|(region_name, sector_name, school_id, school_name, status)| {
            let done = approved.get(&school_id).copied().unwrap_or(0).max(0) as u64;
            let possible = possible_count(1, required);
            SchoolCompletion {
                region_name,
                sector_name,
                school_id,
                school_name,
                status,
                approved: done,
                possible,
                completion_rate: completion_rate(done, possible),
            }
        })
        .collect())
}
