mod test_support;

use chrono::{Duration, Utc};
use serde_json::json;
use test_support::{spawn_sidecar, spawn_sidecar_with, temp_dir, PASSWORD};

fn setup(sc: &mut test_support::Sidecar, prefix: &str) {
    let workspace = temp_dir(prefix);
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sc.ok(
        "users.create",
        json!({ "email": "root@infoline.az", "fullName": "Root", "password": PASSWORD }),
    );
    sc.login("root@infoline.az");

    let in_days = |d: i64| (Utc::now() + Duration::days(d)).to_rfc3339();
    for (name, deadline) in [
        ("Gələn ay", in_days(30)),
        ("Dünən", in_days(-1)),
        ("Tezliklə", in_days(2)),
    ] {
        sc.ok("categories.create", json!({ "name": name, "deadline": deadline }));
    }
    sc.ok(
        "categories.create",
        json!({ "name": "Qaralama", "status": "draft", "deadline": in_days(1) }),
    );
    sc.ok("categories.create", json!({ "name": "Müddətsiz" }));
}

fn buckets(alerts: &serde_json::Value) -> Vec<(String, String)> {
    alerts
        .as_array()
        .expect("alerts")
        .iter()
        .map(|a| {
            (
                a.get("categoryName").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                a.get("bucket").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            )
        })
        .collect()
}

#[test]
fn check_buckets_active_categories_soonest_first() {
    let mut sc = spawn_sidecar();
    setup(&mut sc, "infoline-deadlines-check");

    let checked = sc.ok("deadlines.check", json!({}));
    assert_eq!(checked.get("criticalDays").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(
        buckets(checked.get("alerts").expect("alerts")),
        vec![
            ("Dünən".to_string(), "overdue".to_string()),
            ("Tezliklə".to_string(), "critical".to_string()),
            ("Gələn ay".to_string(), "upcoming".to_string()),
        ]
    );

    assert_eq!(
        sc.err_code("categories.create", json!({ "name": "X", "deadline": "next week" })),
        "validation_failed"
    );
}

#[test]
fn critical_window_comes_from_config() {
    let mut sc = spawn_sidecar_with(&[("INFOLINE_CRITICAL_DAYS", "1")]);
    setup(&mut sc, "infoline-deadlines-window");
    let checked = sc.ok("deadlines.check", json!({}));
    let b = buckets(checked.get("alerts").expect("alerts"));
    assert!(b.contains(&("Tezliklə".to_string(), "upcoming".to_string())));
}

#[test]
fn background_monitor_publishes_its_latest_scan() {
    let mut sc = spawn_sidecar_with(&[("INFOLINE_DEADLINE_POLL_SECS", "1")]);
    setup(&mut sc, "infoline-deadlines-monitor");

    let mut seen = Vec::new();
    for _ in 0..20 {
        std::thread::sleep(std::time::Duration::from_millis(250));
        let alerts = sc.ok("deadlines.alerts", json!({}));
        seen = buckets(alerts.get("alerts").expect("alerts"));
        if seen.len() == 3 {
            break;
        }
    }
    assert_eq!(seen.len(), 3, "monitor never reported: {:?}", seen);
    assert_eq!(seen[0].1, "overdue");
}
