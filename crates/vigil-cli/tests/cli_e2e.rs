//! Subprocess tests for the `vigil` binary.
//!
//! Each test writes a hermetic config into a tempdir (ledger database plus
//! two principals) and drives the binary through `std::process::Command`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use vigil_core::identity::secret_digest_hex;

const ADMIN_SECRET: &str = "admin-secret";
const VIEWER_SECRET: &str = "viewer-secret";

fn vigil_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_vigil"))
}

fn setup() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = tmp.path().join("vigil.toml");
    let body = format!(
        r#"[ledger]
database = "{db}"

[log]
level = "warn"

[[principals]]
username = "alice"
role = "admin"
tenant_id = "t1"
secret_sha256 = "{admin}"

[[principals]]
username = "victor"
role = "viewer"
tenant_id = "t1"
secret_sha256 = "{viewer}"
"#,
        db = tmp.path().join("ledger.db").display(),
        admin = secret_digest_hex(ADMIN_SECRET),
        viewer = secret_digest_hex(VIEWER_SECRET),
    );
    std::fs::write(&config, body).expect("write config");
    (tmp, config)
}

fn run_as(config: &Path, user: &str, secret: &str, args: &[&str]) -> Output {
    Command::new(vigil_bin())
        .arg("--config")
        .arg(config)
        .args(["--user", user, "--secret", secret])
        .args(args)
        .env_remove("VIGIL_USER")
        .env_remove("VIGIL_SECRET")
        .output()
        .expect("spawn vigil")
}

fn admin(config: &Path, args: &[&str]) -> Value {
    let output = run_as(config, "alice", ADMIN_SECRET, args);
    assert!(
        output.status.success(),
        "vigil {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let value: Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(value["ok"], true);
    value
}

#[test]
fn test_event_to_evidence_to_bundle() {
    let (tmp, config) = setup();

    let opened = admin(
        &config,
        &[
            "incident",
            "open",
            "--threat-type",
            "gps_spoof",
            "--severity",
            "high",
            "--title",
            "GPS spoof near depot",
            "--drone",
            "UA-7",
            "--operator",
            "op-kim",
        ],
    );
    let incident_id = opened["incident"]["incident_id"]
        .as_str()
        .expect("incident id")
        .to_string();
    assert!(incident_id.starts_with("INC-"));

    let recorded = admin(
        &config,
        &[
            "record",
            "--event-type",
            "incident_closed",
            "--incident",
            &incident_id,
            "--drone",
            "UA-7",
            "--system",
        ],
    );
    assert_eq!(recorded["event"]["actor"], "op-kim");

    let evidence = admin(&config, &["evidence", "--framework", "faa_107"]);
    let rows = evidence["evidence"].as_array().expect("evidence array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["control_id"], "107.21");
    assert_eq!(rows[0]["review_status"], "pending");
    let evidence_id = rows[0]["id"].as_i64().expect("evidence id").to_string();

    let reviewed = admin(
        &config,
        &["review", &evidence_id, "--decision", "accepted", "--note", "ok"],
    );
    assert_eq!(reviewed["evidence"]["review_status"], "accepted");
    assert_eq!(reviewed["evidence"]["reviewed_by"], "alice");

    let summary = admin(&config, &["summary", "--framework", "faa_107"]);
    assert_eq!(summary["summary"]["scope"], "org");
    assert_eq!(summary["summary"]["controls"]["107.21"]["accepted"], 1);
    assert_eq!(summary["summary"]["controls"]["107.21"]["total"], 1);

    let bundle_path = tmp.path().join("bundle.json");
    let exported = admin(
        &config,
        &[
            "export",
            &incident_id,
            "--output",
            bundle_path.to_str().expect("utf-8 path"),
        ],
    );
    let hash = exported["export"]["bundle_hash"]
        .as_str()
        .expect("bundle hash")
        .to_string();
    assert_eq!(hash.len(), 64);

    let verified = admin(
        &config,
        &["verify", bundle_path.to_str().expect("utf-8 path")],
    );
    assert_eq!(verified["verified"]["bundle_hash"], hash.as_str());
}

#[test]
fn test_tampered_bundle_fails_verification() {
    let (tmp, config) = setup();
    let opened = admin(
        &config,
        &[
            "incident",
            "open",
            "--threat-type",
            "rf_jamming",
            "--severity",
            "low",
            "--title",
            "Jamming",
        ],
    );
    let incident_id = opened["incident"]["incident_id"]
        .as_str()
        .expect("incident id")
        .to_string();
    let bundle_path = tmp.path().join("bundle.json");
    admin(
        &config,
        &[
            "export",
            &incident_id,
            "--output",
            bundle_path.to_str().expect("utf-8 path"),
        ],
    );

    let mut bundle: Value =
        serde_json::from_str(&std::fs::read_to_string(&bundle_path).expect("read bundle"))
            .expect("bundle JSON");
    bundle["bundle"]["incident"]["severity"] = Value::String("critical".to_string());
    std::fs::write(&bundle_path, bundle.to_string()).expect("rewrite bundle");

    let output = run_as(
        &config,
        "alice",
        ADMIN_SECRET,
        &["verify", bundle_path.to_str().expect("utf-8 path")],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[invalid_argument]"), "stderr: {stderr}");
}

#[test]
fn test_viewer_cannot_review() {
    let (_tmp, config) = setup();
    let attached = admin(
        &config,
        &[
            "attach",
            "--framework",
            "faa_107",
            "--control",
            "107.49",
            "--evidence-type",
            "manual_attestation",
            "--attestation",
            "Pre-flight checklist signed",
            "--drone",
            "UA-3",
        ],
    );
    assert_eq!(attached["evidence"]["reference_id"], "UA-3");
    let evidence_id = attached["evidence"]["id"]
        .as_i64()
        .expect("evidence id")
        .to_string();

    let output = run_as(
        &config,
        "victor",
        VIEWER_SECRET,
        &["review", &evidence_id, "--decision", "rejected"],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[forbidden]"), "stderr: {stderr}");

    let listed = admin(&config, &["evidence", "--drone", "UA-3"]);
    assert_eq!(listed["evidence"][0]["review_status"], "pending");
}

#[test]
fn test_events_are_attributed_to_the_caller() {
    let (_tmp, config) = setup();
    admin(
        &config,
        &["assign-operator", "--drone", "UA-5", "--operator", "olga"],
    );

    let output = run_as(
        &config,
        "victor",
        VIEWER_SECRET,
        &["record", "--event-type", "telemetry_gap", "--drone", "UA-5"],
    );
    assert!(output.status.success());
    let recorded: Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(recorded["event"]["actor"], "victor");

    for forged in [
        &["record", "--event-type", "telemetry_gap", "--actor", "alice"][..],
        &["record", "--event-type", "telemetry_gap", "--drone", "UA-5", "--system"][..],
    ] {
        let output = run_as(&config, "victor", VIEWER_SECRET, forged);
        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("error[forbidden]"), "stderr: {stderr}");
    }

    let system = admin(
        &config,
        &["record", "--event-type", "telemetry_gap", "--drone", "UA-5", "--system"],
    );
    assert_eq!(system["event"]["actor"], "olga");
}

#[test]
fn test_wrong_secret_is_rejected() {
    let (_tmp, config) = setup();
    let output = run_as(&config, "alice", "not-the-secret", &["stats"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_invalid_limit_is_rejected() {
    let (_tmp, config) = setup();
    let output = run_as(
        &config,
        "alice",
        ADMIN_SECRET,
        &["evidence", "--limit", "many"],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[invalid_argument]"), "stderr: {stderr}");
}
