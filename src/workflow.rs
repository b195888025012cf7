//! Data entry and approval workflow.
//!
//! Entries move draft → pending → approved/rejected. An approved or rejected
//! entry goes back to draft when its value is edited and is then resubmitted.
//! A rejected entry can also be resubmitted unchanged.
//! Every mutation bumps `version`; callers that pass an expected version get
//! `version_conflict` instead of silently overwriting a concurrent change.

use crate::access;
use crate::auth::Session;
use crate::db::{new_id, now_rfc3339};
use crate::error::{AppError, AppResult};
use crate::model::{
    parse_column_options, Assignment, CategoryStatus, ColumnOption, ColumnStatus, ColumnType,
    EntryStatus, Target, TargetKind,
};
use crate::notify::{self, NewNotification, NotificationKind};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
    pub status: CategoryStatus,
    pub assignment: Assignment,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub column_type: ColumnType,
    pub is_required: bool,
    pub options: Vec<ColumnOption>,
    pub status: ColumnStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEntry {
    pub id: String,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub category_id: String,
    pub column_id: String,
    pub value: String,
    pub status: EntryStatus,
    pub version: i64,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryValue {
    pub column_id: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSummary {
    pub saved: usize,
    pub unchanged: usize,
    /// Approved or rejected entries that went back to draft.
    pub reopened: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub success: bool,
    pub updated: usize,
    pub skipped: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingGroup {
    pub target_kind: TargetKind,
    pub target_id: String,
    pub target_name: Option<String>,
    pub category_id: String,
    pub category_name: String,
    pub entry_count: i64,
    pub submitted_at: String,
}

const ENTRY_COLUMNS: &str = "id, target_kind, target_id, category_id, column_id, value, status,
    version, created_by, created_at, updated_at, approved_by, approved_at, rejected_by,
    rejected_at, rejection_reason";

fn entry_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<DataEntry> {
    Ok(DataEntry {
        id: r.get(0)?,
        target_kind: r.get(1)?,
        target_id: r.get(2)?,
        category_id: r.get(3)?,
        column_id: r.get(4)?,
        value: r.get(5)?,
        status: r.get(6)?,
        version: r.get(7)?,
        created_by: r.get(8)?,
        created_at: r.get(9)?,
        updated_at: r.get(10)?,
        approved_by: r.get(11)?,
        approved_at: r.get(12)?,
        rejected_by: r.get(13)?,
        rejected_at: r.get(14)?,
        rejection_reason: r.get(15)?,
    })
}

pub fn load_category(conn: &Connection, category_id: &str) -> AppResult<CategoryInfo> {
    conn.query_row(
        "SELECT id, name, status, assignment FROM categories WHERE id = ?",
        [category_id],
        |r| {
            Ok(CategoryInfo {
                id: r.get(0)?,
                name: r.get(1)?,
                status: r.get(2)?,
                assignment: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound("category".into()))
}

/// All columns of a category, archived ones included, in display order.
pub fn load_columns(conn: &Connection, category_id: &str) -> AppResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT id, category_id, name, type, is_required, options, status
         FROM columns
         WHERE category_id = ?
         ORDER BY order_index, name",
    )?;
    let rows = stmt.query_map([category_id], |r| {
        let options: Option<String> = r.get(5)?;
        Ok(ColumnInfo {
            id: r.get(0)?,
            category_id: r.get(1)?,
            name: r.get(2)?,
            column_type: r.get(3)?,
            is_required: r.get::<_, i64>(4)? != 0,
            options: parse_column_options(options.as_deref()),
            status: r.get(6)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn load_entry(conn: &Connection, entry_id: &str) -> AppResult<DataEntry> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM data_entries WHERE id = ?");
    conn.query_row(&sql, [entry_id], entry_from_row)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("entry {entry_id}")))
}

pub fn list_entries(
    conn: &Connection,
    target: &Target,
    category_id: Option<&str>,
) -> AppResult<Vec<DataEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM data_entries
         WHERE target_kind = ? AND target_id = ? AND (? IS NULL OR category_id = ?)
         ORDER BY category_id, column_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params![target.kind, target.id, category_id, category_id],
        entry_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Checks a raw value against its column type and returns the stored form.
pub fn validate_value(column: &ColumnInfo, raw: &str) -> Result<String, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(String::new());
    }

    match column.column_type {
        ColumnType::Text | ColumnType::Textarea | ColumnType::File => Ok(value.to_string()),
        ColumnType::Number => match value.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(value.to_string()),
            _ => Err(format!("{value:?} is not a number")),
        },
        ColumnType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|d| d.format("%Y-%m-%d").to_string())
            .map_err(|_| format!("{value:?} is not a YYYY-MM-DD date")),
        ColumnType::Select | ColumnType::Radio => match_option(&column.options, value),
        ColumnType::Multiselect | ColumnType::Checkbox => {
            if column.options.is_empty() && column.column_type == ColumnType::Checkbox {
                return match value.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok("true".to_string()),
                    "false" | "0" | "no" => Ok("false".to_string()),
                    _ => Err(format!("{value:?} is not a checkbox value")),
                };
            }
            let mut picked = Vec::new();
            for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                picked.push(match_option(&column.options, part)?);
            }
            Ok(picked.join(","))
        }
        ColumnType::Email => match value.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && domain.contains('.') && !domain.ends_with('.') =>
            {
                Ok(value.to_string())
            }
            _ => Err(format!("{value:?} is not an email address")),
        },
        ColumnType::Phone => {
            let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
            let allowed = value
                .chars()
                .all(|c| c.is_ascii_digit() || " +-()".contains(c));
            if allowed && digits >= 7 {
                Ok(value.to_string())
            } else {
                Err(format!("{value:?} is not a phone number"))
            }
        }
        ColumnType::Url => {
            let rest = value
                .strip_prefix("https://")
                .or_else(|| value.strip_prefix("http://"));
            match rest {
                Some(host) if !host.is_empty() => Ok(value.to_string()),
                _ => Err(format!("{value:?} is not an http(s) URL")),
            }
        }
    }
}

/// Accepts an option by value or by label; free text when there are no options.
fn match_option(options: &[ColumnOption], value: &str) -> Result<String, String> {
    if options.is_empty() {
        return Ok(value.to_string());
    }
    options
        .iter()
        .find(|o| o.value == value)
        .or_else(|| options.iter().find(|o| o.label.eq_ignore_ascii_case(value)))
        .map(|o| o.value.clone())
        .ok_or_else(|| format!("{value:?} is not one of the column options"))
}

fn open_category_for(conn: &Connection, target: &Target, category_id: &str) -> AppResult<CategoryInfo> {
    let category = load_category(conn, category_id)?;
    if category.status != CategoryStatus::Active {
        return Err(AppError::validation(format!(
            "category {:?} is {} and does not accept data",
            category.name, category.status
        )));
    }
    if category.assignment.target_kind() != target.kind {
        return Err(AppError::bad_params(format!(
            "category {:?} is filled per {}, not per {}",
            category.name,
            category.assignment.target_kind(),
            target.kind
        )));
    }
    Ok(category)
}

/// Upserts draft values for one target and category in a single transaction.
pub fn save_entries(
    conn: &Connection,
    session: &Session,
    target: &Target,
    category_id: &str,
    values: &[EntryValue],
) -> AppResult<SaveSummary> {
    let category = open_category_for(conn, target, category_id)?;
    access::require_editor(conn, session, target)?;

    let columns: HashMap<String, ColumnInfo> = load_columns(conn, category_id)?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

    let mut seen = BTreeSet::new();
    let mut failures = Vec::new();
    let mut cleaned: Vec<(&EntryValue, String)> = Vec::with_capacity(values.len());
    for v in values {
        if !seen.insert(v.column_id.as_str()) {
            return Err(AppError::bad_params(format!(
                "column {} appears more than once",
                v.column_id
            )));
        }
        let Some(column) = columns.get(&v.column_id) else {
            return Err(AppError::NotFound(format!(
                "column {} in category {:?}",
                v.column_id, category.name
            )));
        };
        if column.status != ColumnStatus::Active {
            return Err(AppError::validation(format!(
                "column {:?} is {}",
                column.name, column.status
            )));
        }
        match validate_value(column, &v.value) {
            Ok(clean) => cleaned.push((v, clean)),
            Err(message) => failures.push(json!({
                "columnId": column.id,
                "column": column.name,
                "message": message,
            })),
        }
    }
    if !failures.is_empty() {
        return Err(AppError::Validation {
            message: format!("{} value(s) failed validation", failures.len()),
            details: Some(json!({ "errors": failures })),
        });
    }

    let tx = conn.unchecked_transaction()?;
    let mut summary = SaveSummary::default();
    let now = now_rfc3339();

    for (v, value) in cleaned {
        let existing = tx
            .query_row(
                "SELECT id, value, status, version FROM data_entries
                 WHERE target_kind = ? AND target_id = ? AND category_id = ? AND column_id = ?",
                rusqlite::params![target.kind, target.id, category_id, v.column_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, EntryStatus>(2)?,
                        r.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((entry_id, old_value, status, version)) = existing else {
            if value.is_empty() {
                summary.unchanged += 1;
                continue;
            }
            if let Some(expected) = v.expected_version {
                return Err(AppError::VersionConflict {
                    entry_id: v.column_id.clone(),
                    expected,
                    actual: 0,
                });
            }
            tx.execute(
                "INSERT INTO data_entries(
                    id, target_kind, target_id, category_id, column_id, value, status,
                    version, created_by, created_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, 'draft', 1, ?, ?, ?)",
                rusqlite::params![
                    new_id(),
                    target.kind,
                    target.id,
                    category_id,
                    v.column_id,
                    value,
                    session.user_id,
                    now,
                    now
                ],
            )?;
            summary.saved += 1;
            continue;
        };

        if let Some(expected) = v.expected_version {
            if expected != version {
                return Err(AppError::VersionConflict {
                    entry_id,
                    expected,
                    actual: version,
                });
            }
        }
        if old_value == value {
            summary.unchanged += 1;
            continue;
        }
        if !status.is_editable() {
            return Err(AppError::InvalidTransition {
                from: status.to_string(),
                to: EntryStatus::Draft.to_string(),
            });
        }

        tx.execute(
            "UPDATE data_entries SET
                value = ?, status = 'draft', version = version + 1, updated_at = ?,
                approved_by = NULL, approved_at = NULL,
                rejected_by = NULL, rejected_at = NULL, rejection_reason = NULL
             WHERE id = ?",
            rusqlite::params![value, now, entry_id],
        )?;
        summary.saved += 1;
        if status != EntryStatus::Draft {
            summary.reopened += 1;
        }
    }

    tx.commit()?;
    log::debug!(
        "saved {} value(s) for {} {} / category {}",
        summary.saved,
        target.kind,
        target.id,
        category_id
    );
    Ok(summary)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub submitted: usize,
    pub message: String,
}

/// Moves every draft entry of the target/category to pending once all
/// required columns carry a value. Rejected entries are resubmitted as they
/// stand; they pass through draft, so the rejection fields are cleared.
pub fn submit_entries(
    conn: &Connection,
    session: &Session,
    target: &Target,
    category_id: &str,
) -> AppResult<SubmitOutcome> {
    let category = open_category_for(conn, target, category_id)?;
    access::require_editor(conn, session, target)?;

    let filled: BTreeSet<String> = list_entries(conn, target, Some(category_id))?
        .into_iter()
        .filter(|e| !e.value.trim().is_empty())
        .map(|e| e.column_id)
        .collect();
    let missing: Vec<String> = load_columns(conn, category_id)?
        .into_iter()
        .filter(|c| c.status == ColumnStatus::Active && c.is_required && !filled.contains(&c.id))
        .map(|c| c.name)
        .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation {
            message: format!("{} required column(s) are empty", missing.len()),
            details: Some(json!({ "missingColumns": missing })),
        });
    }

    let submitted = conn.execute(
        "UPDATE data_entries SET
            status = 'pending', version = version + 1, updated_at = ?,
            rejected_by = NULL, rejected_at = NULL, rejection_reason = NULL
         WHERE target_kind = ? AND target_id = ? AND category_id = ?
           AND status IN ('draft', 'rejected')",
        rusqlite::params![now_rfc3339(), target.kind, target.id, category_id],
    )?;

    let message = if submitted == 0 {
        format!("nothing to submit for {:?}", category.name)
    } else {
        log::info!(
            "{} submitted {} entr(ies) of {:?} for {} {}",
            session.email,
            submitted,
            category.name,
            target.kind,
            target.id
        );
        format!("{:?} submitted for review", category.name)
    };
    Ok(SubmitOutcome { submitted, message })
}

/// Rejections must say why; checked before touching the database.
pub fn validate_reason(reason: Option<&str>) -> AppResult<String> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(AppError::validation("a rejection reason is required")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Review {
    Approve,
    Reject,
}

impl Review {
    fn target_status(self) -> EntryStatus {
        match self {
            Review::Approve => EntryStatus::Approved,
            Review::Reject => EntryStatus::Rejected,
        }
    }
}

fn apply_review(
    conn: &Connection,
    session: &Session,
    entry: &DataEntry,
    review: Review,
    reason: Option<&str>,
    now: &str,
) -> AppResult<()> {
    let changed = match review {
        Review::Approve => conn.execute(
            "UPDATE data_entries SET
                status = 'approved', approved_by = ?, approved_at = ?,
                rejected_by = NULL, rejected_at = NULL, rejection_reason = NULL,
                version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
            rusqlite::params![session.user_id, now, now, entry.id, entry.version],
        )?,
        Review::Reject => conn.execute(
            "UPDATE data_entries SET
                status = 'rejected', rejected_by = ?, rejected_at = ?, rejection_reason = ?,
                approved_by = NULL, approved_at = NULL,
                version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
            rusqlite::params![session.user_id, now, reason, now, entry.id, entry.version],
        )?,
    };
    if changed == 0 {
        let actual = load_entry(conn, &entry.id)?.version;
        return Err(AppError::VersionConflict {
            entry_id: entry.id.clone(),
            expected: entry.version,
            actual,
        });
    }
    Ok(())
}

/// Sorts entries into those to update and those already in the wanted state.
/// Anything else is an illegal edge and fails the whole call.
fn partition_for_review(entries: Vec<DataEntry>, review: Review) -> AppResult<(Vec<DataEntry>, usize)> {
    let wanted = review.target_status();
    let mut todo = Vec::new();
    let mut skipped = 0;
    for e in entries {
        if e.status == wanted {
            skipped += 1;
        } else if e.status.can_transition_to(wanted) {
            todo.push(e);
        } else {
            return Err(AppError::InvalidTransition {
                from: e.status.to_string(),
                to: wanted.to_string(),
            });
        }
    }
    Ok((todo, skipped))
}

fn notify_submitters(
    conn: &Connection,
    entries: &[DataEntry],
    review: Review,
    category_label: &str,
    related_category: Option<&str>,
    reason: Option<&str>,
) -> rusqlite::Result<()> {
    let mut per_submitter: BTreeMap<&str, usize> = BTreeMap::new();
    for e in entries {
        *per_submitter.entry(e.created_by.as_str()).or_default() += 1;
    }
    for (user_id, count) in per_submitter {
        let (kind, title, message, priority) = match review {
            Review::Approve => (
                NotificationKind::Approval,
                format!("{category_label} approved"),
                format!("{count} submitted value(s) for {category_label} were approved."),
                "normal",
            ),
            Review::Reject => (
                NotificationKind::Rejection,
                format!("{category_label} rejected"),
                format!(
                    "{count} submitted value(s) for {category_label} were rejected: {}",
                    reason.unwrap_or_default()
                ),
                "high",
            ),
        };
        notify::insert(
            conn,
            NewNotification {
                user_id,
                kind,
                title,
                message,
                related: related_category.map(|id| (id, "category")),
                priority,
            },
        )?;
    }
    Ok(())
}

fn review_target(
    conn: &Connection,
    session: &Session,
    target: &Target,
    category_id: &str,
    category_name: Option<&str>,
    review: Review,
    reason: Option<&str>,
) -> AppResult<ReviewOutcome> {
    access::require_approver(conn, session, target)?;
    let category = load_category(conn, category_id)?;
    let label = category_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(category.name.as_str())
        .to_string();

    let candidates: Vec<DataEntry> = list_entries(conn, target, Some(category_id))?
        .into_iter()
        .filter(|e| e.status == EntryStatus::Pending || e.status == review.target_status())
        .collect();
    let (todo, skipped) = partition_for_review(candidates, review)?;

    if todo.is_empty() {
        return Ok(ReviewOutcome {
            success: true,
            updated: 0,
            skipped,
            message: format!("no pending entries for {label}"),
        });
    }

    let tx = conn.unchecked_transaction()?;
    let now = now_rfc3339();
    for e in &todo {
        apply_review(&tx, session, e, review, reason, &now)?;
    }
    notify_submitters(&tx, &todo, review, &label, Some(category_id), reason)?;
    notify::audit(
        &tx,
        Some(&session.user_id),
        match review {
            Review::Approve => "approve_entries",
            Review::Reject => "reject_entries",
        },
        "category",
        category_id,
        Some(&json!({ "status": EntryStatus::Pending })),
        Some(&json!({
            "status": review.target_status(),
            "targetKind": target.kind,
            "targetId": target.id,
            "count": todo.len(),
            "reason": reason,
        })),
    )?;
    tx.commit()?;

    log::info!(
        "{} {} {} entr(ies) of {:?} for {} {}",
        session.email,
        review.target_status(),
        todo.len(),
        label,
        target.kind,
        target.id
    );
    Ok(ReviewOutcome {
        success: true,
        updated: todo.len(),
        skipped,
        message: match review {
            Review::Approve => format!("{label} approved"),
            Review::Reject => format!("{label} rejected"),
        },
    })
}

/// Approves every pending entry of one target and category.
pub fn approve_target(
    conn: &Connection,
    session: &Session,
    target: &Target,
    category_id: &str,
    category_name: Option<&str>,
) -> AppResult<ReviewOutcome> {
    review_target(conn, session, target, category_id, category_name, Review::Approve, None)
}

pub fn reject_target(
    conn: &Connection,
    session: &Session,
    target: &Target,
    category_id: &str,
    category_name: Option<&str>,
    reason: Option<&str>,
) -> AppResult<ReviewOutcome> {
    let reason = validate_reason(reason)?;
    review_target(
        conn,
        session,
        target,
        category_id,
        category_name,
        Review::Reject,
        Some(&reason),
    )
}

fn review_bulk(
    conn: &Connection,
    session: &Session,
    entry_ids: &[String],
    expected_versions: &HashMap<String, i64>,
    max_batch: usize,
    review: Review,
    reason: Option<&str>,
) -> AppResult<ReviewOutcome> {
    let ids: BTreeSet<&str> = entry_ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if ids.is_empty() {
        return Ok(ReviewOutcome {
            success: true,
            updated: 0,
            skipped: 0,
            message: "nothing to do".to_string(),
        });
    }
    if ids.len() > max_batch {
        return Err(AppError::bad_params(format!(
            "bulk payload exceeds max entries: {} > {}",
            ids.len(),
            max_batch
        )));
    }

    let mut entries = Vec::with_capacity(ids.len());
    let mut checked_targets: HashSet<Target> = HashSet::new();
    for id in &ids {
        let entry = load_entry(conn, id)?;
        if let Some(&expected) = expected_versions.get(*id) {
            if expected != entry.version {
                return Err(AppError::VersionConflict {
                    entry_id: entry.id,
                    expected,
                    actual: entry.version,
                });
            }
        }
        let target = Target {
            kind: entry.target_kind,
            id: entry.target_id.clone(),
        };
        if !checked_targets.contains(&target) {
            access::require_approver(conn, session, &target)?;
            checked_targets.insert(target);
        }
        entries.push(entry);
    }

    let (todo, skipped) = partition_for_review(entries, review)?;
    if todo.is_empty() {
        return Ok(ReviewOutcome {
            success: true,
            updated: 0,
            skipped,
            message: "entries already reviewed".to_string(),
        });
    }

    let categories: BTreeSet<&str> = todo.iter().map(|e| e.category_id.as_str()).collect();
    let single_category = if categories.len() == 1 {
        categories.iter().next().copied()
    } else {
        None
    };
    let label = match single_category {
        Some(id) => load_category(conn, id)?.name,
        None => format!("{} categories", categories.len()),
    };

    let tx = conn.unchecked_transaction()?;
    let now = now_rfc3339();
    for e in &todo {
        apply_review(&tx, session, e, review, reason, &now)?;
    }
    notify_submitters(&tx, &todo, review, &label, single_category, reason)?;
    notify::audit(
        &tx,
        Some(&session.user_id),
        match review {
            Review::Approve => "bulk_approve_entries",
            Review::Reject => "bulk_reject_entries",
        },
        "data_entries",
        single_category.unwrap_or("*"),
        None,
        Some(&json!({
            "status": review.target_status(),
            "entryIds": todo.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            "reason": reason,
        })),
    )?;
    tx.commit()?;

    log::info!(
        "{} bulk {} {} entr(ies), {} already done",
        session.email,
        review.target_status(),
        todo.len(),
        skipped
    );
    Ok(ReviewOutcome {
        success: true,
        updated: todo.len(),
        skipped,
        message: format!("{} entr(ies) {}", todo.len(), review.target_status()),
    })
}

/// All-or-nothing: any missing id, scope failure, illegal edge or version
/// mismatch fails the batch before anything is written.
pub fn bulk_approve(
    conn: &Connection,
    session: &Session,
    entry_ids: &[String],
    expected_versions: &HashMap<String, i64>,
    max_batch: usize,
) -> AppResult<ReviewOutcome> {
    review_bulk(conn, session, entry_ids, expected_versions, max_batch, Review::Approve, None)
}

pub fn bulk_reject(
    conn: &Connection,
    session: &Session,
    entry_ids: &[String],
    reason: Option<&str>,
    expected_versions: &HashMap<String, i64>,
    max_batch: usize,
) -> AppResult<ReviewOutcome> {
    let reason = validate_reason(reason)?;
    review_bulk(
        conn,
        session,
        entry_ids,
        expected_versions,
        max_batch,
        Review::Reject,
        Some(&reason),
    )
}

/// Pending (target, category) groups the session may review.
pub fn pending_groups(conn: &Connection, session: &Session) -> AppResult<Vec<PendingGroup>> {
    let mut stmt = conn.prepare(
        "SELECT d.target_kind, d.target_id,
                CASE d.target_kind
                    WHEN 'school' THEN (SELECT name FROM schools WHERE id = d.target_id)
                    ELSE (SELECT name FROM sectors WHERE id = d.target_id)
                END,
                d.category_id, c.name, COUNT(*), MIN(d.updated_at)
         FROM data_entries d
         JOIN categories c ON c.id = d.category_id
         WHERE d.status = 'pending'
         GROUP BY d.target_kind, d.target_id, d.category_id
         ORDER BY MIN(d.updated_at)",
    )?;
    let groups = stmt
        .query_map([], |r| {
            Ok(PendingGroup {
                target_kind: r.get(0)?,
                target_id: r.get(1)?,
                target_name: r.get(2)?,
                category_id: r.get(3)?,
                category_name: r.get(4)?,
                entry_count: r.get(5)?,
                submitted_at: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut visible = Vec::new();
    for g in groups {
        let target = Target {
            kind: g.target_kind,
            id: g.target_id.clone(),
        };
        match access::require_approver(conn, session, &target) {
            Ok(()) => visible.push(g),
            Err(AppError::PermissionDenied(_)) | Err(AppError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(visible)
}
