mod test_support;

use serde_json::json;
use test_support::{
    build_world, entries, fill_and_submit, school_target, spawn_sidecar, spawn_sidecar_with,
    status_of, u64_at, REGION_ADMIN, SCHOOL_ADMIN_A, SCHOOL_ADMIN_B,
};

fn entry_ids(rows: &[serde_json::Value]) -> Vec<String> {
    rows.iter()
        .filter_map(|e| e.get("id").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

#[test]
fn empty_bulk_is_a_successful_no_op() {
    let mut sc = spawn_sidecar();
    let _w = build_world(&mut sc, "infoline-bulk-empty");
    let outcome = sc.ok("approval.bulkApprove", json!({ "entryIds": [] }));
    assert_eq!(outcome.get("success").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(u64_at(&outcome, "/updated"), 0);
}

#[test]
fn bulk_approve_collapses_duplicates_across_schools() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-bulk-approve");

    sc.login(SCHOOL_ADMIN_A);
    fill_and_submit(&mut sc, &w, &w.school_a);
    let mut ids = entry_ids(&entries(&mut sc, &w, &w.school_a));
    sc.login(SCHOOL_ADMIN_B);
    fill_and_submit(&mut sc, &w, &w.school_b);
    ids.extend(entry_ids(&entries(&mut sc, &w, &w.school_b)));
    ids.push(ids[0].clone());

    sc.login(REGION_ADMIN);
    let outcome = sc.ok("approval.bulkApprove", json!({ "entryIds": ids }));
    assert_eq!(u64_at(&outcome, "/updated"), 4);

    let rows = entries(&mut sc, &w, &w.school_b);
    assert_eq!(status_of(&rows, &w.col_founded), "approved");
}

#[test]
fn bulk_batch_is_all_or_nothing() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-bulk-atomic");

    sc.login(SCHOOL_ADMIN_A);
    fill_and_submit(&mut sc, &w, &w.school_a);
    let mut ids = entry_ids(&entries(&mut sc, &w, &w.school_a));
    // a draft entry on school B makes the batch illegal
    sc.login(SCHOOL_ADMIN_B);
    sc.ok(
        "entries.save",
        json!({
            "target": school_target(&w.school_b),
            "categoryId": w.category,
            "values": [{ "columnId": w.col_notes, "value": "hələ hazır deyil" }]
        }),
    );
    ids.extend(entry_ids(&entries(&mut sc, &w, &w.school_b)));

    sc.login(REGION_ADMIN);
    assert_eq!(
        sc.err_code(
            "approval.bulkReject",
            json!({ "entryIds": ids, "reason": "yoxlanılmalıdır" }),
        ),
        "invalid_transition"
    );
    assert_eq!(
        sc.err_code("approval.bulkReject", json!({ "entryIds": ids })),
        "validation_failed"
    );
    assert_eq!(
        sc.err_code("approval.bulkApprove", json!({ "entryIds": ["no-such-entry"] })),
        "not_found"
    );

    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_teachers), "pending");
    assert_eq!(status_of(&rows, &w.col_founded), "pending");
}

#[test]
fn bulk_version_mismatch_fails_the_batch() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-bulk-version");

    sc.login(SCHOOL_ADMIN_A);
    fill_and_submit(&mut sc, &w, &w.school_a);
    let rows = entries(&mut sc, &w, &w.school_a);
    let ids = entry_ids(&rows);
    let stale: serde_json::Map<String, serde_json::Value> = rows
        .iter()
        .map(|e| {
            let id = e.get("id").and_then(|v| v.as_str()).expect("id").to_string();
            let version = e.get("version").and_then(|v| v.as_i64()).expect("version");
            (id, json!(version - 1))
        })
        .collect();

    sc.login(REGION_ADMIN);
    assert_eq!(
        sc.err_code(
            "approval.bulkApprove",
            json!({ "entryIds": ids, "expectedVersions": stale }),
        ),
        "version_conflict"
    );
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_teachers), "pending");
}

#[test]
fn oversized_bulk_payload_is_refused() {
    let mut sc = spawn_sidecar_with(&[("INFOLINE_BULK_MAX", "2")]);
    let _w = build_world(&mut sc, "infoline-bulk-max");
    assert_eq!(
        sc.err_code("approval.bulkApprove", json!({ "entryIds": ["a", "b", "c"] })),
        "bad_params"
    );
}

#[test]
fn bulk_respects_approver_scope() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-bulk-scope");

    sc.login(SCHOOL_ADMIN_A);
    fill_and_submit(&mut sc, &w, &w.school_a);
    let ids = entry_ids(&entries(&mut sc, &w, &w.school_a));
    assert_eq!(
        sc.err_code("approval.bulkApprove", json!({ "entryIds": ids })),
        "permission_denied"
    );
}
