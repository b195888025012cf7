use crate::access::{self, Scope};
use crate::auth::{self, RoleAssignment, Session};
use crate::db::{new_id, now_rfc3339};
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db, db_and_session, non_empty, params, to_value};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::notify;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Fills in the parent ids of the entity a role is bound to.
fn resolve_assignment(
    conn: &Connection,
    role: Role,
    entity_id: Option<&str>,
) -> AppResult<RoleAssignment> {
    let entity = entity_id.map(str::trim).filter(|s| !s.is_empty());
    let need = |what: &str| {
        entity
            .map(String::from)
            .ok_or_else(|| AppError::bad_params(format!("{role} needs entityId of a {what}")))
    };
    match role {
        Role::SuperAdmin => Ok(RoleAssignment {
            role,
            region_id: None,
            sector_id: None,
            school_id: None,
        }),
        Role::RegionAdmin => {
            let region_id = need("region")?;
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM regions WHERE id = ?", [&region_id], |r| r.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(AppError::NotFound("region".into()));
            }
            Ok(RoleAssignment {
                role,
                region_id: Some(region_id),
                sector_id: None,
                school_id: None,
            })
        }
        Role::SectorAdmin => {
            let sector_id = need("sector")?;
            let region_id = access::sector_region(conn, &sector_id)?;
            Ok(RoleAssignment {
                role,
                region_id: Some(region_id),
                sector_id: Some(sector_id),
                school_id: None,
            })
        }
        Role::SchoolAdmin => {
            let school_id = need("school")?;
            let (sector_id, region_id) = access::school_parents(conn, &school_id)?;
            Ok(RoleAssignment {
                role,
                region_id: Some(region_id),
                sector_id: Some(sector_id),
                school_id: Some(school_id),
            })
        }
    }
}

fn can_grant(actor: &Session, a: &RoleAssignment) -> bool {
    match actor.role {
        Role::SuperAdmin => true,
        Role::RegionAdmin => {
            matches!(a.role, Role::SectorAdmin | Role::SchoolAdmin)
                && actor.region_id.is_some()
                && a.region_id == actor.region_id
        }
        Role::SectorAdmin => {
            a.role == Role::SchoolAdmin
                && actor.sector_id.is_some()
                && a.sector_id == actor.sector_id
        }
        Role::SchoolAdmin => false,
    }
}

fn require_grant(actor: &Session, a: &RoleAssignment) -> AppResult<()> {
    if can_grant(actor, a) {
        Ok(())
    } else {
        Err(AppError::denied(format!(
            "{} cannot manage {} accounts here",
            actor.role, a.role
        )))
    }
}

/// The actor may manage `user_id` when it could grant that user's role.
fn require_manages_user(conn: &Connection, actor: &Session, user_id: &str) -> AppResult<RoleAssignment> {
    ensure_user(conn, user_id)?;
    let current = auth::role_of(conn, user_id)?.ok_or_else(|| AppError::NotFound("user role".into()))?;
    require_grant(actor, &current)?;
    Ok(current)
}

fn ensure_user(conn: &Connection, user_id: &str) -> AppResult<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?;
    exists.map(|_| ()).ok_or_else(|| AppError::NotFound("user".into()))
}

fn write_role(conn: &Connection, user_id: &str, a: &RoleAssignment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_roles(user_id, role, region_id, sector_id, school_id)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
           role = excluded.role,
           region_id = excluded.region_id,
           sector_id = excluded.sector_id,
           school_id = excluded.school_id",
        rusqlite::params![user_id, a.role, a.region_id, a.sector_id, a.school_id],
    )?;
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserParams {
    email: String,
    full_name: String,
    password: String,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    entity_id: Option<String>,
}

fn handle_create(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: CreateUserParams = params(req)?;
    let conn = db(state)?;

    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    let bootstrap = user_count == 0;

    let email = auth::normalize_email(&p.email)?;
    let full_name = non_empty(&p.full_name, "fullName")?;
    auth::check_password_policy(&p.password)?;

    let assignment = if bootstrap {
        resolve_assignment(conn, Role::SuperAdmin, None)?
    } else {
        let actor = state.session.as_ref().ok_or(AppError::NotAuthenticated)?;
        let role = p.role.ok_or_else(|| AppError::bad_params("missing role"))?;
        let a = resolve_assignment(conn, role, p.entity_id.as_deref())?;
        require_grant(actor, &a)?;
        a
    };

    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(AppError::validation(format!("{email} is already registered")));
    }

    let user_id = new_id();
    let salt = auth::new_salt();
    let now = now_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO users(id, email, full_name, password_salt, password_hash, status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, 'active', ?, ?)",
        rusqlite::params![
            user_id,
            email,
            full_name,
            salt,
            auth::hash_password(&salt, &p.password),
            now,
            now
        ],
    )?;
    write_role(&tx, &user_id, &assignment)?;
    let actor_id = state.session.as_ref().map(|s| s.user_id.as_str());
    notify::audit(
        &tx,
        actor_id,
        "create_user",
        "user",
        &user_id,
        None,
        Some(&json!({ "email": email, "role": assignment.role })),
    )?;
    tx.commit()?;

    log::info!("created {} user {}", assignment.role, email);
    Ok(json!({
        "userId": user_id,
        "email": email,
        "role": assignment.role,
        "bootstrap": bootstrap
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRow {
    id: String,
    email: String,
    full_name: String,
    status: String,
    role: Option<Role>,
    region_id: Option<String>,
    sector_id: Option<String>,
    school_id: Option<String>,
}

fn handle_list(state: &mut AppState, _req: &Request) -> AppResult<serde_json::Value> {
    let (conn, session) = db_and_session(state)?;
    let (predicate, param) = match Scope::of(session) {
        Scope::All => ("1 = 1", None),
        Scope::Region(id) => ("ur.region_id = ?", Some(id)),
        Scope::Sector(id) => ("ur.sector_id = ?", Some(id)),
        Scope::School(_) => ("u.id = ?", Some(session.user_id.clone())),
    };
    let sql = format!(
        "SELECT u.id, u.email, u.full_name, u.status, ur.role, ur.region_id, ur.sector_id, ur.school_id
         FROM users u
         LEFT JOIN user_roles ur ON ur.user_id = u.id
         WHERE {predicate}
         ORDER BY u.full_name, u.email"
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(rusqlite::params_from_iter(param.iter()), |r| {
            Ok(UserRow {
                id: r.get(0)?,
                email: r.get(1)?,
                full_name: r.get(2)?,
                status: r.get(3)?,
                role: r.get(4)?,
                region_id: r.get(5)?,
                sector_id: r.get(6)?,
                school_id: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "users": to_value(&users)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserIdParams {
    user_id: String,
}

fn handle_role(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: UserIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let assignment = if p.user_id == session.user_id {
        auth::role_of(conn, &p.user_id)?.ok_or_else(|| AppError::NotFound("user role".into()))?
    } else {
        require_manages_user(conn, session, &p.user_id)?
    };
    Ok(json!({ "userId": p.user_id, "role": to_value(&assignment)? }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: UserIdParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    if p.user_id == session.user_id {
        return Err(AppError::validation("you cannot delete your own account"));
    }
    let current = require_manages_user(conn, session, &p.user_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM user_roles WHERE user_id = ?", [&p.user_id])?;
    tx.execute("DELETE FROM notifications WHERE user_id = ?", [&p.user_id])?;
    tx.execute("DELETE FROM users WHERE id = ?", [&p.user_id])?;
    notify::audit(
        &tx,
        Some(&session.user_id),
        "delete_user",
        "user",
        &p.user_id,
        Some(&json!({ "role": current.role })),
        None,
    )?;
    tx.commit()?;

    log::info!("{} deleted user {}", session.email, p.user_id);
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordParams {
    user_id: String,
    new_password: String,
}

fn handle_reset_password(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ResetPasswordParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    auth::check_password_policy(&p.new_password)?;
    if p.user_id != session.user_id {
        require_manages_user(conn, session, &p.user_id)?;
    }

    let salt = auth::new_salt();
    conn.execute(
        "UPDATE users SET password_salt = ?, password_hash = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![
            salt,
            auth::hash_password(&salt, &p.new_password),
            now_rfc3339(),
            p.user_id
        ],
    )?;
    notify::audit(conn, Some(&session.user_id), "reset_password", "user", &p.user_id, None, None)?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignAdminParams {
    user_id: String,
    role: Role,
    #[serde(default)]
    entity_id: Option<String>,
}

/// Re-binds an existing account to an admin role for a region, sector or school.
fn handle_assign_admin(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: AssignAdminParams = params(req)?;
    let (conn, session) = db_and_session(state)?;
    let previous = require_manages_user(conn, session, &p.user_id)?;
    let next = resolve_assignment(conn, p.role, p.entity_id.as_deref())?;
    require_grant(session, &next)?;

    let tx = conn.unchecked_transaction()?;
    write_role(&tx, &p.user_id, &next)?;
    notify::audit(
        &tx,
        Some(&session.user_id),
        "assign_role",
        "user",
        &p.user_id,
        Some(&to_value(&previous)?),
        Some(&to_value(&next)?),
    )?;
    tx.commit()?;

    log::info!("{} assigned {} to user {}", session.email, next.role, p.user_id);
    Ok(json!({ "userId": p.user_id, "role": to_value(&next)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => handle_create(state, req),
        "users.list" => handle_list(state, req),
        "users.role" => handle_role(state, req),
        "users.delete" => handle_delete(state, req),
        "users.resetPassword" => handle_reset_password(state, req),
        "users.assignAdmin" => handle_assign_admin(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
