#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const PASSWORD: &str = "password123";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

pub fn spawn_sidecar() -> Sidecar {
    spawn_sidecar_with(&[])
}

pub fn spawn_sidecar_with(env: &[(&str, &str)]) -> Sidecar {
    let exe = env!("CARGO_BIN_EXE_infolined");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("INFOLINE_WORKSPACE")
        .env("INFOLINE_LOG", "off");
    for (k, v) in env {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn infolined");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    Sidecar {
        child,
        stdin,
        reader: BufReader::new(stdout),
        next_id: 0,
    }
}

impl Sidecar {
    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Asserts the call failed and returns its error code.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    pub fn login(&mut self, email: &str) -> serde_json::Value {
        self.ok("session.login", json!({ "email": email, "password": PASSWORD }))
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn str_at<'a>(v: &'a serde_json::Value, pointer: &str) -> &'a str {
    v.pointer(pointer)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing string at {} in {}", pointer, v))
}

pub fn u64_at(v: &serde_json::Value, pointer: &str) -> u64 {
    v.pointer(pointer)
        .and_then(|x| x.as_u64())
        .unwrap_or_else(|| panic!("missing number at {} in {}", pointer, v))
}

/// Two regions, two sectors, three schools, one admin per level and a
/// school-level category with two required columns and one optional.
pub struct World {
    pub workspace: PathBuf,
    pub region1: String,
    pub region2: String,
    pub sector1: String,
    pub sector2: String,
    pub school_a: String,
    pub school_b: String,
    pub school_c: String,
    pub category: String,
    pub col_teachers: String,
    pub col_founded: String,
    pub col_notes: String,
}

pub const SUPER: &str = "super@infoline.az";
pub const REGION_ADMIN: &str = "region1@infoline.az";
pub const SECTOR_ADMIN: &str = "sector1@infoline.az";
pub const SCHOOL_ADMIN_A: &str = "school.a@infoline.az";
pub const SCHOOL_ADMIN_B: &str = "school.b@infoline.az";

pub fn build_world(sc: &mut Sidecar, prefix: &str) -> World {
    let workspace = temp_dir(prefix);
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sc.ok(
        "users.create",
        json!({ "email": SUPER, "fullName": "Super Admin", "password": PASSWORD }),
    );
    sc.login(SUPER);

    let region1 = sc.ok("regions.create", json!({ "name": "Bakı" }));
    let region1 = str_at(&region1, "/regionId").to_string();
    let region2 = sc.ok("regions.create", json!({ "name": "Gəncə" }));
    let region2 = str_at(&region2, "/regionId").to_string();
    let sector1 = sc.ok("sectors.create", json!({ "regionId": region1, "name": "Yasamal" }));
    let sector1 = str_at(&sector1, "/sectorId").to_string();
    let sector2 = sc.ok("sectors.create", json!({ "regionId": region2, "name": "Kəpəz" }));
    let sector2 = str_at(&sector2, "/sectorId").to_string();

    let mut school = |sector: &str, name: &str| {
        let r = sc.ok("schools.create", json!({ "sectorId": sector, "name": name }));
        str_at(&r, "/schoolId").to_string()
    };
    let school_a = school(&sector1, "Məktəb 1");
    let school_b = school(&sector1, "Məktəb 2");
    let school_c = school(&sector2, "Məktəb 3");

    let users = [
        (REGION_ADMIN, "regionadmin", region1.clone()),
        (SECTOR_ADMIN, "sectoradmin", sector1.clone()),
        (SCHOOL_ADMIN_A, "schooladmin", school_a.clone()),
        (SCHOOL_ADMIN_B, "schooladmin", school_b.clone()),
    ];
    for (email, role, entity) in users {
        sc.ok(
            "users.create",
            json!({
                "email": email,
                "fullName": email,
                "password": PASSWORD,
                "role": role,
                "entityId": entity
            }),
        );
    }

    let category = sc.ok(
        "categories.create",
        json!({ "name": "Müəllimlər", "assignment": "all" }),
    );
    let category = str_at(&category, "/categoryId").to_string();
    let mut column = |name: &str, ty: &str, required: bool| {
        let r = sc.ok(
            "columns.create",
            json!({ "categoryId": category, "name": name, "type": ty, "isRequired": required }),
        );
        str_at(&r, "/columnId").to_string()
    };
    let col_teachers = column("Müəllim sayı", "number", true);
    let col_founded = column("Təsis tarixi", "date", true);
    let col_notes = column("Qeyd", "text", false);

    World {
        workspace,
        region1,
        region2,
        sector1,
        sector2,
        school_a,
        school_b,
        school_c,
        category,
        col_teachers,
        col_founded,
        col_notes,
    }
}

pub fn school_target(id: &str) -> serde_json::Value {
    json!({ "kind": "school", "id": id })
}

/// Saves both required values for a school and submits them.
pub fn fill_and_submit(sc: &mut Sidecar, w: &World, school_id: &str) {
    sc.ok(
        "entries.save",
        json!({
            "target": school_target(school_id),
            "categoryId": w.category,
            "values": [
                { "columnId": w.col_teachers, "value": "42" },
                { "columnId": w.col_founded, "value": "1998-09-01" }
            ]
        }),
    );
    sc.ok(
        "entries.submit",
        json!({ "target": school_target(school_id), "categoryId": w.category }),
    );
}

pub fn entries(sc: &mut Sidecar, w: &World, school_id: &str) -> Vec<serde_json::Value> {
    let r = sc.ok(
        "entries.list",
        json!({ "target": school_target(school_id), "categoryId": w.category }),
    );
    r.get("entries")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("entries array")
}

pub fn status_of(entries: &[serde_json::Value], column_id: &str) -> String {
    entries
        .iter()
        .find(|e| e.get("columnId").and_then(|v| v.as_str()) == Some(column_id))
        .and_then(|e| e.get("status"))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("no entry for column {}", column_id))
        .to_string()
}
