//! CLI acceptance tests
//!
//! These run the compiled `scolaris` binary against a database seeded
//! in an isolated XDG environment and assert on the JSON envelopes it
//! prints.

use chrono::{NaiveDate, Utc};
use scolaris_core::db::{new_record_id, Database};
use scolaris_core::types::{AttendanceRecord, Course, Gender, Member, Role};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        // Pin the academic year so fixture dates always fall inside
        // the audit window.
        let config_dir = xdg_config.join("scolaris");
        fs::create_dir_all(&config_dir).expect("failed to create config dir");
        fs::write(
            config_dir.join("config.toml"),
            "[stats]\nacademic_year_start = \"2024-09-01\"\n",
        )
        .expect("failed to write config");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("scolaris/data.db")
    }

    /// Seed the database the binary will open: one teacher, one
    /// student present 3 of 4 sessions.
    fn seed_roster(&self) {
        let db = Database::open(&self.db_path()).expect("failed to open db");
        db.migrate().expect("failed to migrate db");

        db.upsert_member(&Member {
            id: "t1".to_string(),
            role: Role::Teacher,
            firstname: "Nadia".to_string(),
            lastname: "Benali".to_string(),
            gender: Some(Gender::Female),
            birth_date: None,
            is_active: true,
            created_at: Utc::now(),
        })
        .expect("failed to insert teacher");

        db.upsert_member(&Member {
            id: "s1".to_string(),
            role: Role::Student,
            firstname: "Yusuf".to_string(),
            lastname: "Benali".to_string(),
            gender: Some(Gender::Male),
            birth_date: NaiveDate::from_ymd_opt(2014, 2, 10),
            is_active: true,
            created_at: Utc::now(),
        })
        .expect("failed to insert student");

        db.insert_course(&Course {
            id: "c1".to_string(),
            teacher_id: "t1".to_string(),
            subject: "Arabic".to_string(),
            created_at: Utc::now(),
        })
        .expect("failed to insert course");
        db.enroll_student("c1", "s1").expect("failed to enroll");

        for i in 0..4 {
            db.insert_attendance(&AttendanceRecord {
                id: new_record_id(),
                student_id: "s1".to_string(),
                course_id: "c1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 9, 7).unwrap()
                    + chrono::Duration::days(i * 7),
                present: i < 3,
                comment: None,
            })
            .expect("failed to insert attendance");
        }
    }
}

fn run_scolaris(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("scolaris"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute scolaris: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "scolaris {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not valid JSON: {e}\n{stdout}"))
}

#[test]
fn student_stats_envelope_over_seeded_db() {
    let env = CliTestEnv::new();
    env.seed_roster();

    let args = ["student", "s1"];
    let output = run_scolaris(&env, &args);
    assert_success(&args, &output);

    let envelope = stdout_json(&output);
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["attendance_rate"], 75.0);
    assert_eq!(envelope["data"]["absence_count"], 1);
}

#[test]
fn unknown_entity_reports_failure_in_envelope() {
    let env = CliTestEnv::new();
    env.seed_roster();

    let args = ["student", "ghost"];
    let output = run_scolaris(&env, &args);
    // The envelope carries the failure; the process itself succeeds
    assert_success(&args, &output);

    let envelope = stdout_json(&output);
    assert_eq!(envelope["success"], false);
    assert!(envelope["error"]
        .as_str()
        .expect("error message missing")
        .contains("unknown entity"));
}

#[test]
fn global_stats_on_empty_database() {
    let env = CliTestEnv::new();

    let args = ["global"];
    let output = run_scolaris(&env, &args);
    assert_success(&args, &output);

    let envelope = stdout_json(&output);
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["data"]["student_count"], 0);
    assert_eq!(envelope["data"]["presence_rate"], 0.0);
}

#[test]
fn recalculate_reports_processed_aggregates() {
    let env = CliTestEnv::new();
    env.seed_roster();

    let args = ["recalculate"];
    let output = run_scolaris(&env, &args);
    assert_success(&args, &output);

    let envelope = stdout_json(&output);
    assert_eq!(envelope["success"], true);
    // s1, t1, global
    assert_eq!(envelope["data"]["processed"], 3);
    assert_eq!(
        envelope["data"]["failed"]
            .as_array()
            .expect("failed list")
            .len(),
        0
    );
}

#[test]
fn duplicate_audit_finds_double_entry() {
    let env = CliTestEnv::new();
    env.seed_roster();

    // Second record for a session that already exists
    let db = Database::open(&env.db_path()).expect("failed to open db");
    db.insert_attendance(&AttendanceRecord {
        id: new_record_id(),
        student_id: "s1".to_string(),
        course_id: "c1".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 9, 7).unwrap(),
        present: true,
        comment: None,
    })
    .expect("failed to insert duplicate");
    drop(db);

    let args = ["duplicates", "attendance"];
    let output = run_scolaris(&env, &args);
    assert_success(&args, &output);

    let groups = stdout_json(&output);
    let groups = groups.as_array().expect("expected a JSON array");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["count"], 2);
    assert_eq!(groups[0]["key"]["student_id"], "s1");
}
