mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, str_at, temp_dir, PASSWORD};

#[test]
fn first_user_becomes_superadmin_without_a_session() {
    let mut sc = spawn_sidecar();
    let workspace = temp_dir("infoline-bootstrap");
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let created = sc.ok(
        "users.create",
        json!({
            "email": " Root@Infoline.AZ ",
            "fullName": "Root",
            "password": PASSWORD,
            "role": "schooladmin"
        }),
    );
    assert_eq!(str_at(&created, "/role"), "superadmin");
    assert_eq!(created.get("bootstrap").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(str_at(&created, "/email"), "root@infoline.az");

    // once a user exists, creating more needs a session
    assert_eq!(
        sc.err_code(
            "users.create",
            json!({ "email": "x@infoline.az", "fullName": "X", "password": PASSWORD, "role": "superadmin" }),
        ),
        "not_authenticated"
    );

    assert_eq!(
        sc.err_code(
            "session.login",
            json!({ "email": "root@infoline.az", "password": "wrong-password" }),
        ),
        "permission_denied"
    );
    assert_eq!(
        sc.err_code(
            "session.login",
            json!({ "email": "nobody@infoline.az", "password": PASSWORD }),
        ),
        "permission_denied"
    );

    let login = sc.ok(
        "session.login",
        json!({ "email": "ROOT@infoline.az", "password": PASSWORD }),
    );
    assert_eq!(str_at(&login, "/session/role"), "superadmin");
    let current = sc.ok("session.current", json!({}));
    assert_eq!(str_at(&current, "/session/email"), "root@infoline.az");
}

#[test]
fn password_policy_and_duplicate_emails() {
    let mut sc = spawn_sidecar();
    let workspace = temp_dir("infoline-user-policy");
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    assert_eq!(
        sc.err_code(
            "users.create",
            json!({ "email": "a@infoline.az", "fullName": "A", "password": "short" }),
        ),
        "validation_failed"
    );
    sc.ok(
        "users.create",
        json!({ "email": "a@infoline.az", "fullName": "A", "password": PASSWORD }),
    );
    sc.ok("session.login", json!({ "email": "a@infoline.az", "password": PASSWORD }));
    assert_eq!(
        sc.err_code(
            "users.create",
            json!({ "email": "A@infoline.az", "fullName": "A2", "password": PASSWORD, "role": "superadmin" }),
        ),
        "validation_failed"
    );
}

#[test]
fn switching_workspace_drops_the_session() {
    let mut sc = spawn_sidecar();
    let first = temp_dir("infoline-ws-one");
    sc.ok("workspace.select", json!({ "path": first.to_string_lossy() }));
    sc.ok(
        "users.create",
        json!({ "email": "a@infoline.az", "fullName": "A", "password": PASSWORD }),
    );
    sc.ok("session.login", json!({ "email": "a@infoline.az", "password": PASSWORD }));

    let second = temp_dir("infoline-ws-two");
    sc.ok("workspace.select", json!({ "path": second.to_string_lossy() }));
    let current = sc.ok("session.current", json!({}));
    assert!(current.get("session").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn workspace_from_environment_is_opened_at_start() {
    let workspace = temp_dir("infoline-env-ws");
    let path = workspace.to_string_lossy().to_string();
    let mut sc = test_support::spawn_sidecar_with(&[("INFOLINE_WORKSPACE", path.as_str())]);
    let health = sc.ok("health", json!({}));
    assert_eq!(str_at(&health, "/workspacePath"), path);
}
