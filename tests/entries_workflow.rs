mod test_support;

use serde_json::json;
use test_support::{
    build_world, entries, fill_and_submit, school_target, spawn_sidecar, status_of, str_at,
    u64_at, SCHOOL_ADMIN_A, SECTOR_ADMIN,
};

#[test]
fn values_are_validated_against_column_types() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-entries-validate");
    sc.login(SCHOOL_ADMIN_A);

    let resp = sc.request(
        "entries.save",
        json!({
            "target": school_target(&w.school_a),
            "categoryId": w.category,
            "values": [
                { "columnId": w.col_teachers, "value": "many" },
                { "columnId": w.col_founded, "value": "01.09.1998" }
            ]
        }),
    );
    assert_eq!(resp.pointer("/error/code").and_then(|v| v.as_str()), Some("validation_failed"));
    let errors = resp
        .pointer("/error/details/errors")
        .and_then(|v| v.as_array())
        .expect("per-column errors");
    assert_eq!(errors.len(), 2);
    assert!(entries(&mut sc, &w, &w.school_a).is_empty());

    assert_eq!(
        sc.err_code(
            "entries.save",
            json!({
                "target": school_target(&w.school_a),
                "categoryId": w.category,
                "values": [
                    { "columnId": w.col_notes, "value": "a" },
                    { "columnId": w.col_notes, "value": "b" }
                ]
            }),
        ),
        "bad_params"
    );
}

#[test]
fn submit_requires_every_required_column() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-entries-submit");
    sc.login(SCHOOL_ADMIN_A);

    sc.ok(
        "entries.save",
        json!({
            "target": school_target(&w.school_a),
            "categoryId": w.category,
            "values": [{ "columnId": w.col_teachers, "value": "12" }]
        }),
    );
    let resp = sc.request(
        "entries.submit",
        json!({ "target": school_target(&w.school_a), "categoryId": w.category }),
    );
    assert_eq!(resp.pointer("/error/code").and_then(|v| v.as_str()), Some("validation_failed"));
    let missing = resp
        .pointer("/error/details/missingColumns")
        .and_then(|v| v.as_array())
        .expect("missing columns");
    assert_eq!(missing, &vec![json!("Təsis tarixi")]);
    assert_eq!(status_of(&entries(&mut sc, &w, &w.school_a), &w.col_teachers), "draft");
}

#[test]
fn full_cycle_with_rejection_and_resubmission() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-entries-cycle");

    sc.login(SCHOOL_ADMIN_A);
    fill_and_submit(&mut sc, &w, &w.school_a);
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_teachers), "pending");

    // pending values are frozen
    assert_eq!(
        sc.err_code(
            "entries.save",
            json!({
                "target": school_target(&w.school_a),
                "categoryId": w.category,
                "values": [{ "columnId": w.col_teachers, "value": "43" }]
            }),
        ),
        "invalid_transition"
    );

    sc.login(SECTOR_ADMIN);
    assert_eq!(
        sc.err_code(
            "approval.reject",
            json!({ "schoolId": w.school_a, "categoryId": w.category, "reason": "   " }),
        ),
        "validation_failed"
    );
    let rejected = sc.ok(
        "approval.reject",
        json!({ "schoolId": w.school_a, "categoryId": w.category, "reason": "Say səhvdir" }),
    );
    assert_eq!(u64_at(&rejected, "/updated"), 2);

    sc.login(SCHOOL_ADMIN_A);
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_teachers), "rejected");
    let reason = rows
        .iter()
        .find(|e| str_at(e, "/columnId") == w.col_teachers)
        .map(|e| str_at(e, "/rejectionReason").to_string());
    assert_eq!(reason.as_deref(), Some("Say səhvdir"));

    let notes = sc.ok("notifications.list", json!({ "unreadOnly": true }));
    let notes = notes.get("notifications").and_then(|v| v.as_array()).expect("list");
    assert_eq!(notes.len(), 1);
    assert_eq!(str_at(&notes[0], "/type"), "rejection");
    let note_id = str_at(&notes[0], "/id").to_string();
    sc.ok("notifications.markRead", json!({ "ids": [note_id] }));
    assert_eq!(u64_at(&sc.ok("notifications.unreadCount", json!({})), "/count"), 0);

    // editing a rejected value reopens it as a draft
    let saved = sc.ok(
        "entries.save",
        json!({
            "target": school_target(&w.school_a),
            "categoryId": w.category,
            "values": [{ "columnId": w.col_teachers, "value": "40" }]
        }),
    );
    assert_eq!(u64_at(&saved, "/reopened"), 1);
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_teachers), "draft");
    assert_eq!(status_of(&rows, &w.col_founded), "rejected");

    // the untouched rejected value goes back for review as it stands
    let resubmitted = sc.ok(
        "entries.submit",
        json!({ "target": school_target(&w.school_a), "categoryId": w.category }),
    );
    assert_eq!(u64_at(&resubmitted, "/submitted"), 2);
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_founded), "pending");
    assert!(rows
        .iter()
        .all(|e| e.get("rejectionReason").map(|v| v.is_null()).unwrap_or(true)));

    sc.login(SECTOR_ADMIN);
    let approved = sc.ok(
        "approval.approve",
        json!({ "schoolId": w.school_a, "categoryId": w.category, "categoryName": "Müəllim heyəti" }),
    );
    assert_eq!(approved.get("success").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(str_at(&approved, "/message"), "Müəllim heyəti approved");

    // a second approval is a no-op and does not notify again
    let again = sc.ok(
        "approval.approve",
        json!({ "schoolId": w.school_a, "categoryId": w.category }),
    );
    assert_eq!(u64_at(&again, "/updated"), 0);
    assert_eq!(u64_at(&again, "/skipped"), 2);

    sc.login(SCHOOL_ADMIN_A);
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_teachers), "approved");
    assert!(rows.iter().all(|e| e.get("approvedBy").map(|v| v.is_string()).unwrap_or(false)));
    let approvals = sc.ok("notifications.list", json!({ "unreadOnly": true }));
    let approvals = approvals
        .get("notifications")
        .and_then(|v| v.as_array())
        .expect("list");
    assert_eq!(approvals.len(), 1);
    assert_eq!(str_at(&approvals[0], "/type"), "approval");
}

#[test]
fn stale_expected_version_is_a_conflict() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-entries-version");
    sc.login(SCHOOL_ADMIN_A);

    sc.ok(
        "entries.save",
        json!({
            "target": school_target(&w.school_a),
            "categoryId": w.category,
            "values": [{ "columnId": w.col_notes, "value": "first" }]
        }),
    );
    let rows = entries(&mut sc, &w, &w.school_a);
    let version = rows[0].get("version").and_then(|v| v.as_i64()).expect("version");

    sc.ok(
        "entries.save",
        json!({
            "target": school_target(&w.school_a),
            "categoryId": w.category,
            "values": [{ "columnId": w.col_notes, "value": "second", "expectedVersion": version }]
        }),
    );
    let resp = sc.request(
        "entries.save",
        json!({
            "target": school_target(&w.school_a),
            "categoryId": w.category,
            "values": [{ "columnId": w.col_notes, "value": "third", "expectedVersion": version }]
        }),
    );
    assert_eq!(resp.pointer("/error/code").and_then(|v| v.as_str()), Some("version_conflict"));
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(str_at(&rows[0], "/value"), "second");
}

#[test]
fn archived_categories_refuse_data() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-entries-archived");
    sc.ok("categories.archive", json!({ "categoryId": w.category }));

    sc.login(SCHOOL_ADMIN_A);
    assert_eq!(
        sc.err_code(
            "entries.save",
            json!({
                "target": school_target(&w.school_a),
                "categoryId": w.category,
                "values": [{ "columnId": w.col_notes, "value": "x" }]
            }),
        ),
        "validation_failed"
    );
    let listed = sc.ok("categories.list", json!({}));
    assert_eq!(
        listed.get("categories").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn rejected_values_can_be_resubmitted_unchanged() {
    let mut sc = spawn_sidecar();
    let w = build_world(&mut sc, "infoline-entries-resubmit");
    sc.login(SCHOOL_ADMIN_A);
    fill_and_submit(&mut sc, &w, &w.school_a);

    sc.login(SECTOR_ADMIN);
    sc.ok(
        "approval.reject",
        json!({ "schoolId": w.school_a, "categoryId": w.category, "reason": "Yoxlayın" }),
    );

    // one value is corrected, the other is confirmed as it was
    sc.login(SCHOOL_ADMIN_A);
    let saved = sc.ok(
        "entries.save",
        json!({
            "target": school_target(&w.school_a),
            "categoryId": w.category,
            "values": [
                { "columnId": w.col_teachers, "value": "42" },
                { "columnId": w.col_founded, "value": "1999-09-01" }
            ]
        }),
    );
    assert_eq!(u64_at(&saved, "/unchanged"), 1);
    let submitted = sc.ok(
        "entries.submit",
        json!({ "target": school_target(&w.school_a), "categoryId": w.category }),
    );
    assert_eq!(u64_at(&submitted, "/submitted"), 2);
    let rows = entries(&mut sc, &w, &w.school_a);
    assert_eq!(status_of(&rows, &w.col_teachers), "pending");
    assert_eq!(status_of(&rows, &w.col_founded), "pending");

    sc.login(SECTOR_ADMIN);
    let approved = sc.ok(
        "approval.approve",
        json!({ "schoolId": w.school_a, "categoryId": w.category }),
    );
    assert_eq!(u64_at(&approved, "/updated"), 2);
    let school = sc.ok("completion.get", json!({ "scope": "school", "id": w.school_a }));
    assert_eq!(u64_at(&school, "/approved"), 2);
    assert_eq!(u64_at(&school, "/completionRate"), 100);
}
