use crate::db::{new_id, now_rfc3339};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Approval,
    Rejection,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Approval => "approval",
            NotificationKind::Rejection => "rejection",
        }
    }
}

pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related: Option<(&'a str, &'a str)>,
    pub priority: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub related_entity_id: Option<String>,
    pub related_entity_type: Option<String>,
    pub is_read: bool,
    pub priority: String,
    pub created_at: String,
}

pub fn insert(conn: &Connection, n: NewNotification<'_>) -> rusqlite::Result<String> {
    let id = new_id();
    let (related_id, related_type) = match n.related {
        Some((id, kind)) => (Some(id), Some(kind)),
        None => (None, None),
    };
    conn.execute(
        "INSERT INTO notifications(
            id, user_id, type, title, message, related_entity_id, related_entity_type,
            is_read, priority, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        rusqlite::params![
            id,
            n.user_id,
            n.kind.as_str(),
            n.title,
            n.message,
            related_id,
            related_type,
            n.priority,
            now_rfc3339()
        ],
    )?;
    Ok(id)
}

pub fn list(
    conn: &Connection,
    user_id: &str,
    unread_only: bool,
    limit: i64,
) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, type, title, message, related_entity_id, related_entity_type,
                is_read, priority, created_at
         FROM notifications
         WHERE user_id = ? AND (? = 0 OR is_read = 0)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt.query_map(rusqlite::params![user_id, unread_only, limit], |r| {
        Ok(Notification {
            id: r.get(0)?,
            kind: r.get(1)?,
            title: r.get(2)?,
            message: r.get(3)?,
            related_entity_id: r.get(4)?,
            related_entity_type: r.get(5)?,
            is_read: r.get::<_, i64>(6)? != 0,
            priority: r.get(7)?,
            created_at: r.get(8)?,
        })
    })?;
    rows.collect()
}

pub fn unread_count(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        [user_id],
        |r| r.get(0),
    )
}

/// Marks the given notifications read; ids owned by other users are ignored.
pub fn mark_read(conn: &Connection, user_id: &str, ids: &[String]) -> rusqlite::Result<usize> {
    let mut changed = 0;
    for id in ids {
        changed += conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ? AND is_read = 0",
            (id, user_id),
        )?;
    }
    Ok(changed)
}

pub fn mark_all_read(conn: &Connection, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
        [user_id],
    )
}

pub fn audit(
    conn: &Connection,
    user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    old_value: Option<&serde_json::Value>,
    new_value: Option<&serde_json::Value>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO audit_logs(id, user_id, action, entity_type, entity_id, old_value, new_value, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            new_id(),
            user_id,
            action,
            entity_type,
            entity_id,
            old_value.map(|v| v.to_string()),
            new_value.map(|v| v.to_string()),
            now_rfc3339()
        ],
    )?;
    Ok(())
}
