use crate::error::{AppError, AppResult};
use crate::model::Role;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LEN: usize = 8;

/// The logged-in user and the scope their role grants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub region_id: Option<String>,
    pub sector_id: Option<String>,
    pub school_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub role: Role,
    pub region_id: Option<String>,
    pub sector_id: Option<String>,
    pub school_id: Option<String>,
}

pub fn new_salt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn check_password_policy(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::validation("email is not valid")),
    }
}

pub fn role_of(conn: &Connection, user_id: &str) -> AppResult<Option<RoleAssignment>> {
    let row = conn
        .query_row(
            "SELECT role, region_id, sector_id, school_id FROM user_roles WHERE user_id = ?",
            [user_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((role, region_id, sector_id, school_id)) = row else {
        return Ok(None);
    };
    let role = role
        .parse::<Role>()
        .map_err(|e| AppError::Other(anyhow::anyhow!("corrupt user_roles row: {e}")))?;
    Ok(Some(RoleAssignment {
        role,
        region_id,
        sector_id,
        school_id,
    }))
}

/// Verifies credentials and builds a session. Unknown email and wrong
/// password produce the same error.
pub fn login(conn: &Connection, email: &str, password: &str) -> AppResult<Session> {
    let email = email.trim().to_ascii_lowercase();
    let user = conn
        .query_row(
            "SELECT id, full_name, password_salt, password_hash, status FROM users WHERE email = ?",
            [&email],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((user_id, full_name, salt, hash, status)) = user else {
        return Err(AppError::denied("invalid email or password"));
    };
    if hash_password(&salt, password) != hash {
        return Err(AppError::denied("invalid email or password"));
    }
    if status != "active" {
        return Err(AppError::denied("account is inactive"));
    }
    let Some(assignment) = role_of(conn, &user_id)? else {
        return Err(AppError::denied("user has no role"));
    };

    Ok(Session {
        user_id,
        email,
        full_name,
        role: assignment.role,
        region_id: assignment.region_id,
        sector_id: assignment.sector_id,
        school_id: assignment.school_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_salt() {
        let a = hash_password("salt-a", "secret123");
        let b = hash_password("salt-b", "secret123");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, hash_password("salt-a", "secret123"));
    }

    #[test]
    fn password_policy() {
        assert!(check_password_policy("short").is_err());
        assert!(check_password_policy("long enough").is_ok());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(
            normalize_email("  Admin@School.AZ ").expect("valid"),
            "admin@school.az"
        );
        assert!(normalize_email("nobody").is_err());
        assert!(normalize_email("@x.az").is_err());
    }
}
