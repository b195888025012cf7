use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineBucket {
    Upcoming,
    Critical,
    Overdue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadlineAlert {
    pub category_id: String,
    pub category_name: String,
    pub deadline: String,
    pub bucket: DeadlineBucket,
    /// Whole days until the deadline; negative once overdue.
    pub days_left: i64,
}

pub fn classify(deadline: DateTime<Utc>, now: DateTime<Utc>, critical_days: i64) -> DeadlineBucket {
    if deadline < now {
        DeadlineBucket::Overdue
    } else if deadline - now <= Duration::days(critical_days) {
        DeadlineBucket::Critical
    } else {
        DeadlineBucket::Upcoming
    }
}

/// RFC 3339 timestamps or bare `YYYY-MM-DD` dates, which run to the end of
/// that day (UTC).
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(23, 59, 59)?.and_utc())
}

/// Active categories with a deadline, soonest first.
pub fn scan(
    conn: &Connection,
    now: DateTime<Utc>,
    critical_days: i64,
) -> rusqlite::Result<Vec<DeadlineAlert>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, deadline FROM categories
         WHERE status = 'active' AND deadline IS NOT NULL AND deadline <> ''",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut alerts: Vec<(DateTime<Utc>, DeadlineAlert)> = Vec::new();
    for (category_id, category_name, raw) in rows {
        let Some(deadline) = parse_deadline(&raw) else {
            log::warn!("category {category_id} has unparseable deadline {raw:?}");
            continue;
        };
        alerts.push((
            deadline,
            DeadlineAlert {
                category_id,
                category_name,
                deadline: raw,
                bucket: classify(deadline, now, critical_days),
                days_left: (deadline - now).num_days(),
            },
        ));
    }
    alerts.sort_by_key(|(d, _)| *d);
    Ok(alerts.into_iter().map(|(_, a)| a).collect())
}

/// Background poller that logs critical and overdue categories. Each
/// (category, bucket) pair is reported once per monitor.
pub struct DeadlineMonitor {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
    latest: Arc<Mutex<Vec<DeadlineAlert>>>,
}

impl DeadlineMonitor {
    pub fn start(db_path: PathBuf, interval: std::time::Duration, critical_days: i64) -> Self {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let latest = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&latest);

        let handle = std::thread::spawn(move || {
            let mut reported: HashSet<(String, DeadlineBucket)> = HashSet::new();
            loop {
                match Connection::open(&db_path)
                    .and_then(|conn| scan(&conn, Utc::now(), critical_days))
                {
                    Ok(alerts) => {
                        for a in &alerts {
                            if a.bucket == DeadlineBucket::Upcoming {
                                continue;
                            }
                            if reported.insert((a.category_id.clone(), a.bucket)) {
                                log::warn!(
                                    "deadline {:?}: {:?} due {} ({} day(s) left)",
                                    a.bucket,
                                    a.category_name,
                                    a.deadline,
                                    a.days_left
                                );
                            }
                        }
                        if let Ok(mut slot) = shared.lock() {
                            *slot = alerts;
                        }
                    }
                    Err(e) => log::error!("deadline scan failed: {e}"),
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            log::debug!("deadline monitor stopped");
        });

        Self {
            stop,
            handle: Some(handle),
            latest,
        }
    }

    pub fn latest(&self) -> Vec<DeadlineAlert> {
        self.latest.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Drop for DeadlineMonitor {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().expect("valid time")
    }

    #[test]
    fn buckets() {
        let now = at(2024, 5, 10, 12);
        assert_eq!(classify(at(2024, 5, 9, 12), now, 3), DeadlineBucket::Overdue);
        assert_eq!(classify(at(2024, 5, 10, 13), now, 3), DeadlineBucket::Critical);
        assert_eq!(classify(at(2024, 5, 13, 12), now, 3), DeadlineBucket::Critical);
        assert_eq!(classify(at(2024, 5, 13, 13), now, 3), DeadlineBucket::Upcoming);
    }

    #[test]
    fn date_only_deadline_runs_to_end_of_day() {
        let d = parse_deadline("2024-05-10").expect("date");
        assert_eq!(d, Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).single().expect("t"));
        assert!(parse_deadline("2024-05-10T08:00:00+04:00").is_some());
        assert!(parse_deadline("soon").is_none());
    }
}
