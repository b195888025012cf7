use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::model::{Role, Target, TargetKind};
use rusqlite::{Connection, OptionalExtension};

/// The slice of the hierarchy a session may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Region(String),
    Sector(String),
    School(String),
}

impl Scope {
    pub fn of(session: &Session) -> Scope {
        let scoped = match session.role {
            Role::SuperAdmin => Some(Scope::All),
            Role::RegionAdmin => session.region_id.clone().map(Scope::Region),
            Role::SectorAdmin => session.sector_id.clone().map(Scope::Sector),
            Role::SchoolAdmin => session.school_id.clone().map(Scope::School),
        };
        // A scoped role without its id sees nothing.
        scoped.unwrap_or_else(|| Scope::School(String::new()))
    }

    /// SQL predicate over a table with `id`, `sector_id` and `region_id`
    /// columns (schools) and the parameter it binds, if any.
    pub fn school_predicate(&self, alias: &str) -> (String, Option<String>) {
        match self {
            Scope::All => ("1 = 1".to_string(), None),
            Scope::Region(id) => (format!("{alias}.region_id = ?"), Some(id.clone())),
            Scope::Sector(id) => (format!("{alias}.sector_id = ?"), Some(id.clone())),
            Scope::School(id) => (format!("{alias}.id = ?"), Some(id.clone())),
        }
    }

    /// Same for the sectors table. School admins see their own school's sector.
    pub fn sector_predicate(&self, alias: &str) -> (String, Option<String>) {
        match self {
            Scope::All => ("1 = 1".to_string(), None),
            Scope::Region(id) => (format!("{alias}.region_id = ?"), Some(id.clone())),
            Scope::Sector(id) => (format!("{alias}.id = ?"), Some(id.clone())),
            Scope::School(id) => (
                format!("{alias}.id IN (SELECT sector_id FROM schools WHERE id = ?)"),
                Some(id.clone()),
            ),
        }
    }
}

pub fn school_parents(conn: &Connection, school_id: &str) -> AppResult<(String, String)> {
    conn.query_row(
        "SELECT sector_id, region_id FROM schools WHERE id = ?",
        [school_id],
        |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound("school".into()))
}

pub fn sector_region(conn: &Connection, sector_id: &str) -> AppResult<String> {
    conn.query_row(
        "SELECT region_id FROM sectors WHERE id = ?",
        [sector_id],
        |r| r.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound("sector".into()))
}

pub fn covers_region(session: &Session, region_id: &str) -> bool {
    match Scope::of(session) {
        Scope::All => true,
        Scope::Region(id) => id == region_id,
        _ => false,
    }
}

pub fn covers_sector(conn: &Connection, session: &Session, sector_id: &str) -> AppResult<bool> {
    let region_id = sector_region(conn, sector_id)?;
    Ok(match Scope::of(session) {
        Scope::All => true,
        Scope::Region(id) => id == region_id,
        Scope::Sector(id) => id == sector_id,
        Scope::School(_) => false,
    })
}

pub fn covers_school(conn: &Connection, session: &Session, school_id: &str) -> AppResult<bool> {
    let (sector_id, region_id) = school_parents(conn, school_id)?;
    Ok(match Scope::of(session) {
        Scope::All => true,
        Scope::Region(id) => id == region_id,
        Scope::Sector(id) => id == sector_id,
        Scope::School(id) => id == school_id,
    })
}

pub fn covers_target(conn: &Connection, session: &Session, target: &Target) -> AppResult<bool> {
    match target.kind {
        TargetKind::School => covers_school(conn, session, &target.id),
        TargetKind::Sector => covers_sector(conn, session, &target.id),
    }
}

/// Saving and submitting data needs scope over the target.
pub fn require_editor(conn: &Connection, session: &Session, target: &Target) -> AppResult<()> {
    if covers_target(conn, session, target)? {
        Ok(())
    } else {
        Err(AppError::denied(format!(
            "{} cannot edit data for this {}",
            session.role, target.kind
        )))
    }
}

/// Approving needs an approver role with scope over the target. Sector
/// admins never review their own sector's data.
pub fn require_approver(conn: &Connection, session: &Session, target: &Target) -> AppResult<()> {
    if !session.role.can_approve() {
        return Err(AppError::denied(format!(
            "{} cannot approve or reject data",
            session.role
        )));
    }
    if target.kind == TargetKind::Sector && session.role == Role::SectorAdmin {
        return Err(AppError::denied(
            "sector data is reviewed by region or super admins",
        ));
    }
    if !covers_target(conn, session, target)? {
        return Err(AppError::denied(format!(
            "{} is outside the approver's scope",
            target.kind
        )));
    }
    Ok(())
}

pub fn require_category_manager(session: &Session) -> AppResult<()> {
    if session.role.manages_categories() {
        Ok(())
    } else {
        Err(AppError::denied(
            "only super and region admins manage categories",
        ))
    }
}

pub fn require_superadmin(session: &Session) -> AppResult<()> {
    if session.role == Role::SuperAdmin {
        Ok(())
    } else {
        Err(AppError::denied("superadmin only"))
    }
}
