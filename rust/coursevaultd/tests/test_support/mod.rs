#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

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

pub struct Workspace {
    pub dir: PathBuf,
    pub settings_path: PathBuf,
    pub config_root: PathBuf,
    pub assignment_root: PathBuf,
    pub default_root: PathBuf,
}

impl Workspace {
    pub fn semesters_path(&self) -> PathBuf {
        self.config_root.join("semesters.json")
    }

    pub fn courses_path(&self) -> PathBuf {
        self.config_root.join("courses.json")
    }

    pub fn assignments_path(&self) -> PathBuf {
        self.config_root.join("assignments.json")
    }

    pub fn cleanup(self) {
        let _ = std::fs::remove_dir_all(self.dir);
    }
}

/// Writes `settings.json` and three empty data documents.
pub fn create_workspace(prefix: &str) -> Workspace {
    let dir = temp_dir(prefix);
    let config_root = dir.join("config");
    let assignment_root = dir.join("assignments");
    let default_root = dir.join("default-assignments");
    std::fs::create_dir_all(&config_root).expect("create config root");
    std::fs::create_dir_all(&assignment_root).expect("create assignment root");

    for name in ["semesters.json", "courses.json", "assignments.json"] {
        std::fs::write(config_root.join(name), "[]").expect("write empty document");
    }
    let settings = json!({
        "configRootFolder": config_root.to_string_lossy(),
        "assignmentRootFolder": assignment_root.to_string_lossy(),
        "defaultAssignmentRootFolder": default_root.to_string_lossy(),
        "semestersDataFile": "semesters.json",
        "coursesDataFile": "courses.json",
        "assignmentsDataFile": "assignments.json",
    });
    let settings_path = config_root.join("settings.json");
    std::fs::write(
        &settings_path,
        serde_json::to_string_pretty(&settings).expect("serialize settings"),
    )
    .expect("write settings");

    Workspace {
        dir,
        settings_path,
        config_root,
        assignment_root,
        default_root,
    }
}

pub fn write_source_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let incoming = dir.join("incoming");
    std::fs::create_dir_all(&incoming).expect("create incoming dir");
    let p = incoming.join(name);
    std::fs::write(&p, bytes).expect("write source file");
    p
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path).expect("read json document");
    serde_json::from_str(&text).expect("parse json document")
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_coursevaultd");
    let mut child = Command::new(exe)
        .env_remove("COURSEVAULT_SETTINGS")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn coursevaultd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

/// Asserts failure and returns the `error` object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_default()
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    ws: &Workspace,
) {
    let _ = request_ok(
        stdin,
        reader,
        "select",
        "workspace.select",
        json!({ "settingsPath": ws.settings_path.to_string_lossy() }),
    );
}

pub fn finish(mut child: Child, stdin: ChildStdin) {
    drop(stdin);
    let _ = child.wait();
}
