use crate::access::{self, Scope};
use crate::auth::Session;
use crate::db::{new_id, now_rfc3339};
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, non_empty, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::model::{EntityStatus, Role};
use crate::notify;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegionRow {
    id: String,
    name: String,
    status: EntityStatus,
    sector_count: i64,
    school_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SectorRow {
    id: String,
    region_id: String,
    name: String,
    status: EntityStatus,
    school_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchoolRow {
    id: String,
    region_id: String,
    sector_id: String,
    name: String,
    principal_name: Option<String>,
    status: EntityStatus,
}

fn require_sector_manager(session: &Session, region_id: &str) -> AppResult<()> {
    let allowed = matches!(session.role, Role::SuperAdmin | Role::RegionAdmin)
        && access::covers_region(session, region_id);
    if allowed {
        Ok(())
    } else {
        Err(AppError::denied("sectors are managed by super or region admins"))
    }
}

fn require_school_manager(conn: &Connection, session: &Session, sector_id: &str) -> AppResult<()> {
    if session.role != Role::SchoolAdmin && access::covers_sector(conn, session, sector_id)? {
        Ok(())
    } else {
        Err(AppError::denied("schools are managed by super, region or sector admins"))
    }
}

fn name_taken(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> AppResult<bool> {
    let hit: Option<i64> = conn.query_row(sql, args, |r| r.get(0)).optional()?;
    Ok(hit.is_some())
}

fn list_regions(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (conn, session) = db_and_session(state)?;
    let (predicate, param) = match Scope::of(session) {
        Scope::All => ("1 = 1".to_string(), None),
        Scope::Region(id) => ("r.id = ?".to_string(), Some(id)),
        Scope::Sector(id) => (
            "r.id IN (SELECT region_id FROM sectors WHERE id = ?)".to_string(),
            Some(id),
        ),
        Scope::School(id) => (
            "r.id IN (SELECT region_id FROM schools WHERE id = ?)".to_string(),
            Some(id),
        ),
    };
    let sql = format!(
        "SELECT r.id, r.name, r.status,
                (SELECT COUNT(*) FROM sectors s WHERE s.region_id = r.id),
                (SELECT COUNT(*) FROM schools sc WHERE sc.region_id = r.id)
         FROM regions r
         WHERE {predicate}
         ORDER BY r.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let regions = stmt
        .query_map(rusqlite::params_from_iter(param.iter()), |r| {
            Ok(RegionRow {
                id: r.get(0)?,
                name: r.get(1)?,
                status: r.get(2)?,
                sector_count: r.get(3)?,
                school_count: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "regions": to_value(&regions)? }))
}

#[derive(Deserialize)]
struct CreateRegionParams {
    name: String,
}

fn create_region(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CreateRegionParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_superadmin(session)?;
    let name = non_empty(&p.name, "name")?;
    if name_taken(conn, "SELECT 1 FROM regions WHERE name = ?", &[&name])? {
        return Err(AppError::validation(format!("region {name:?} already exists")));
    }

    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO regions(id, name, status, created_at, updated_at) VALUES(?, ?, 'active', ?, ?)",
        rusqlite::params![id, name, now, now],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "create_region",
        "region",
        &id,
        None,
        Some(&json!({ "name": name })),
    )?;
    log::info!("region created: {name}");
    Ok(json!({ "regionId": id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRegionParams {
    region_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<EntityStatus>,
}

fn update_region(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: UpdateRegionParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_superadmin(session)?;
    let (old_name, old_status): (String, EntityStatus) = conn
        .query_row(
            "SELECT name, status FROM regions WHERE id = ?",
            [&p.region_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("region".into()))?;

    let name = match &p.name {
        Some(n) => non_empty(n, "name")?,
        None => old_name.clone(),
    };
    if name != old_name
        && name_taken(conn, "SELECT 1 FROM regions WHERE name = ?", &[&name])?
    {
        return Err(AppError::validation(format!("region {name:?} already exists")));
    }
    let status = p.status.unwrap_or(old_status);
    conn.execute(
        "UPDATE regions SET name = ?, status = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![name, status, now_rfc3339(), p.region_id],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "update_region",
        "region",
        &p.region_id,
        Some(&json!({ "name": old_name, "status": old_status })),
        Some(&json!({ "name": name, "status": status })),
    )?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionIdParams {
    region_id: String,
}

fn archive_region(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: RegionIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    access::require_superadmin(session)?;
    let changed = conn.execute(
        "UPDATE regions SET status = 'inactive', updated_at = ? WHERE id = ?",
        rusqlite::params![now_rfc3339(), p.region_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("region".into()));
    }
    notify::audit(conn, Some(&session.user_id), "archive_region", "region", &p.region_id, None, None)?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSectorsParams {
    #[serde(default)]
    region_id: Option<String>,
}

fn list_sectors(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ListSectorsParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let (predicate, scope_param) = Scope::of(session).sector_predicate("s");
    let mut args: Vec<String> = scope_param.into_iter().collect();
    let mut filter = String::new();
    if let Some(region_id) = p.region_id {
        filter.push_str(" AND s.region_id = ?");
        args.push(region_id);
    }
    let sql = format!(
        "SELECT s.id, s.region_id, s.name, s.status,
                (SELECT COUNT(*) FROM schools sc WHERE sc.sector_id = s.id)
         FROM sectors s
         WHERE {predicate}{filter}
         ORDER BY s.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let sectors = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(SectorRow {
                id: r.get(0)?,
                region_id: r.get(1)?,
                name: r.get(2)?,
                status: r.get(3)?,
                school_count: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "sectors": to_value(&sectors)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSectorParams {
    region_id: String,
    name: String,
}

fn create_sector(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CreateSectorParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let region: Option<i64> = conn
        .query_row("SELECT 1 FROM regions WHERE id = ?", [&p.region_id], |r| r.get(0))
        .optional()?;
    if region.is_none() {
        return Err(AppError::NotFound("region".into()));
    }
    require_sector_manager(session, &p.region_id)?;
    let name = non_empty(&p.name, "name")?;
    if name_taken(
        conn,
        "SELECT 1 FROM sectors WHERE region_id = ? AND name = ?",
        &[&p.region_id, &name],
    )? {
        return Err(AppError::validation(format!("sector {name:?} already exists in this region")));
    }

    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO sectors(id, region_id, name, status, created_at, updated_at)
         VALUES(?, ?, ?, 'active', ?, ?)",
        rusqlite::params![id, p.region_id, name, now, now],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "create_sector",
        "sector",
        &id,
        None,
        Some(&json!({ "name": name, "regionId": p.region_id })),
    )?;
    log::info!("sector created: {name}");
    Ok(json!({ "sectorId": id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSectorParams {
    sector_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<EntityStatus>,
}

fn update_sector(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: UpdateSectorParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let (region_id, old_name, old_status): (String, String, EntityStatus) = conn
        .query_row(
            "SELECT region_id, name, status FROM sectors WHERE id = ?",
            [&p.sector_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("sector".into()))?;
    require_sector_manager(session, &region_id)?;

    let name = match &p.name {
        Some(n) => non_empty(n, "name")?,
        None => old_name.clone(),
    };
    if name != old_name
        && name_taken(
            conn,
            "SELECT 1 FROM sectors WHERE region_id = ? AND name = ?",
            &[&region_id, &name],
        )?
    {
        return Err(AppError::validation(format!("sector {name:?} already exists in this region")));
    }
    let status = p.status.unwrap_or(old_status);
    conn.execute(
        "UPDATE sectors SET name = ?, status = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![name, status, now_rfc3339(), p.sector_id],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "update_sector",
        "sector",
        &p.sector_id,
        Some(&json!({ "name": old_name, "status": old_status })),
        Some(&json!({ "name": name, "status": status })),
    )?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SectorIdParams {
    sector_id: String,
}

fn archive_sector(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: SectorIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let region_id = access::sector_region(conn, &p.sector_id)?;
    require_sector_manager(session, &region_id)?;
    conn.execute(
        "UPDATE sectors SET status = 'inactive', updated_at = ? WHERE id = ?",
        rusqlite::params![now_rfc3339(), p.sector_id],
    )?;
    notify::audit(conn, Some(&session.user_id), "archive_sector", "sector", &p.sector_id, None, None)?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSchoolsParams {
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    sector_id: Option<String>,
}

fn list_schools(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ListSchoolsParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let (predicate, scope_param) = Scope::of(session).school_predicate("sc");
    let mut args: Vec<String> = scope_param.into_iter().collect();
    let mut filter = String::new();
    if let Some(region_id) = p.region_id {
        filter.push_str(" AND sc.region_id = ?");
        args.push(region_id);
    }
    if let Some(sector_id) = p.sector_id {
        filter.push_str(" AND sc.sector_id = ?");
        args.push(sector_id);
    }
    let sql = format!(
        "SELECT sc.id, sc.region_id, sc.sector_id, sc.name, sc.principal_name, sc.status
         FROM schools sc
         WHERE {predicate}{filter}
         ORDER BY sc.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let schools = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(SchoolRow {
                id: r.get(0)?,
                region_id: r.get(1)?,
                sector_id: r.get(2)?,
                name: r.get(3)?,
                principal_name: r.get(4)?,
                status: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "schools": to_value(&schools)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSchoolParams {
    sector_id: String,
    name: String,
    #[serde(default)]
    principal_name: Option<String>,
}

fn create_school(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CreateSchoolParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let region_id = access::sector_region(conn, &p.sector_id)?;
    require_school_manager(conn, session, &p.sector_id)?;
    let name = non_empty(&p.name, "name")?;
    let principal = p
        .principal_name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO schools(id, sector_id, region_id, name, principal_name, status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, 'active', ?, ?)",
        rusqlite::params![id, p.sector_id, region_id, name, principal, now, now],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "create_school",
        "school",
        &id,
        None,
        Some(&json!({ "name": name, "sectorId": p.sector_id })),
    )?;
    log::info!("school created: {name}");
    Ok(json!({ "schoolId": id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSchoolParams {
    school_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    principal_name: Option<String>,
    #[serde(default)]
    status: Option<EntityStatus>,
}

fn update_school(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: UpdateSchoolParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let (sector_id, old_name, old_principal, old_status): (
        String,
        String,
        Option<String>,
        EntityStatus,
    ) = conn
        .query_row(
            "SELECT sector_id, name, principal_name, status FROM schools WHERE id = ?",
            [&p.school_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("school".into()))?;
    require_school_manager(conn, session, &sector_id)?;

    let name = match &p.name {
        Some(n) => non_empty(n, "name")?,
        None => old_name.clone(),
    };
    let principal = match p.principal_name {
        Some(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        None => old_principal.clone(),
    };
    let status = p.status.unwrap_or(old_status);
    conn.execute(
        "UPDATE schools SET name = ?, principal_name = ?, status = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![name, principal, status, now_rfc3339(), p.school_id],
    )?;
    notify::audit(
        conn,
        Some(&session.user_id),
        "update_school",
        "school",
        &p.school_id,
        Some(&json!({ "name": old_name, "principalName": old_principal, "status": old_status })),
        Some(&json!({ "name": name, "principalName": principal, "status": status })),
    )?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchoolIdParams {
    school_id: String,
}

fn archive_school(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: SchoolIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let (sector_id, _) = access::school_parents(conn, &p.school_id)?;
    require_school_manager(conn, session, &sector_id)?;
    conn.execute(
        "UPDATE schools SET status = 'inactive', updated_at = ? WHERE id = ?",
        rusqlite::params![now_rfc3339(), p.school_id],
    )?;
    notify::audit(conn, Some(&session.user_id), "archive_school", "school", &p.school_id, None, None)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "regions.list" => list_regions(state, req),
        "regions.create" => create_region(state, req),
        "regions.update" => update_region(state, req),
        "regions.archive" => archive_region(state, req),
        "sectors.list" => list_sectors(state, req),
        "sectors.create" => create_sector(state, req),
        "sectors.update" => update_sector(state, req),
        "sectors.archive" => archive_sector(state, req),
        "schools.list" => list_schools(state, req),
        "schools.create" => create_school(state, req),
        "schools.update" => update_school(state, req),
        "schools.archive" => archive_school(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
