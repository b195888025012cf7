use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DEADLINE_POLL_SECS: u64 = 3600;
const DEFAULT_CRITICAL_DAYS: i64 = 3;
const DEFAULT_BULK_MAX: usize = 5000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Start-up settings, read from the environment (and an optional `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace opened before the first request, if set.
    pub workspace: Option<PathBuf>,
    pub deadline_poll: Duration,
    /// Deadlines this many days away or closer are critical.
    pub critical_days: i64,
    /// Largest accepted bulk approve/reject payload.
    pub bulk_max: usize,
    pub busy_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            deadline_poll: Duration::from_secs(DEFAULT_DEADLINE_POLL_SECS),
            critical_days: DEFAULT_CRITICAL_DAYS,
            bulk_max: DEFAULT_BULK_MAX,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace = lookup("INFOLINE_WORKSPACE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            workspace,
            deadline_poll: Duration::from_secs(
                numeric(&lookup, "INFOLINE_DEADLINE_POLL_SECS", DEFAULT_DEADLINE_POLL_SECS).max(1),
            ),
            critical_days: numeric(&lookup, "INFOLINE_CRITICAL_DAYS", DEFAULT_CRITICAL_DAYS),
            bulk_max: numeric(&lookup, "INFOLINE_BULK_MAX", DEFAULT_BULK_MAX),
            busy_timeout: Duration::from_millis(numeric(
                &lookup,
                "INFOLINE_BUSY_TIMEOUT_MS",
                DEFAULT_BUSY_TIMEOUT_MS,
            )),
        }
    }
}

fn numeric<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            log::warn!("ignoring malformed {key}={raw:?}, using {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_map(&[]);
        assert!(cfg.workspace.is_none());
        assert_eq!(cfg.deadline_poll, Duration::from_secs(3600));
        assert_eq!(cfg.critical_days, 3);
        assert_eq!(cfg.bulk_max, 5000);
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let cfg = from_map(&[
            ("INFOLINE_WORKSPACE", "/tmp/ws"),
            ("INFOLINE_CRITICAL_DAYS", "5"),
            ("INFOLINE_BULK_MAX", "lots"),
            ("INFOLINE_DEADLINE_POLL_SECS", "0"),
        ]);
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.critical_days, 5);
        assert_eq!(cfg.bulk_max, 5000);
        assert_eq!(cfg.deadline_poll, Duration::from_secs(1));
    }
}
