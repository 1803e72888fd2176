//! Integration tests for patchcord-cli.
//!
//! Every test runs the binary with its own config file in a temp directory,
//! so the user's configuration never leaks in.

use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

struct Cli {
    dir: TempDir,
}

impl Cli {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn with_config(toml: &str) -> Self {
        let cli = Self::new();
        std::fs::write(cli.config_path(), toml).unwrap();
        cli
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("engine.toml")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_patchcord"))
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to run patchcord")
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "patchcord {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }

    fn failure(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(!output.status.success(), "patchcord {args:?} should fail");
        String::from_utf8_lossy(&output.stderr).into_owned()
    }
}

fn position(list: &[Value], label: &str) -> usize {
    list.iter()
        .position(|v| v == label)
        .unwrap_or_else(|| panic!("{label} missing from {list:?}"))
}

// ---------------------------------------------------------------------------
// patchcord templates
// ---------------------------------------------------------------------------

#[test]
fn templates_lists_library() {
    let output = Cli::new().run(&["templates"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available Templates"));
    for id in ["osc", "vca", "filter", "delay", "mixer", "out", "sub", "knob"] {
        assert!(stdout.contains(id), "listing should contain '{id}'");
    }
}

#[test]
fn templates_detail_and_unknown() {
    let cli = Cli::new();
    let details = cli.json(&["templates", "filter", "--json"]);
    assert_eq!(details.as_array().unwrap().len(), 1);
    assert_eq!(details[0]["params"][0]["name"], "cutoff");

    let stderr = cli.failure(&["templates", "theremin"]);
    assert!(stderr.contains("Unknown template"), "got: {stderr}");
}

// ---------------------------------------------------------------------------
// patchcord patch
// ---------------------------------------------------------------------------

#[test]
fn patch_orders_split_topology() {
    let report = Cli::new().json(&[
        "patch",
        "--json",
        "osc:freq=220 | split(vca:gain=0.3; delay) | mixer | out",
    ]);

    let order = report["order"].as_array().unwrap();
    assert_eq!(order.len(), 5);
    let osc = position(order, "osc#0");
    let vca = position(order, "vca#1");
    let delay = position(order, "delay#2");
    let mixer = position(order, "mixer#3");
    let out = position(order, "out#4");
    assert!(osc < vca && osc < delay);
    assert!(vca < mixer && delay < mixer);
    assert!(mixer < out);

    assert_eq!(report["server_order"].as_array().unwrap().len(), 5);
    assert_eq!(report["edges"].as_array().unwrap().len(), 5);
    assert!(
        report["modules"]
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["instance"].is_i64())
    );
}

#[test]
fn patch_container_reports_group() {
    let report = Cli::new().json(&["patch", "--json", "osc | sub | out"]);
    let sub = &report["modules"][1];
    assert_eq!(sub["kind"], "container");
    assert!(sub["group"].is_i64());
    // Group token precedes the container's node on the server.
    assert_eq!(report["server_order"].as_array().unwrap().len(), 4);
}

#[test]
fn patch_dry_run_does_not_need_the_server() {
    let plan = Cli::new().json(&["patch", "--dry-run", "--json", "osc | split(vca; -) | out"]);
    assert_eq!(plan["modules"].as_array().unwrap().len(), 3);
    assert_eq!(plan["modules"][0]["params"], serde_json::json!({}));
    assert_eq!(plan["edges"].as_array().unwrap().len(), 3);
}

#[test]
fn patch_errors_are_reported() {
    let cli = Cli::new();
    assert!(cli.failure(&["patch", "osc | theremin"]).contains("unknown template"));
    assert!(cli.failure(&["patch", "knob | vca"]).contains("no audio outlet"));
    assert!(cli.failure(&["patch", "vca | osc"]).contains("no audio inlet"));
    assert!(cli.failure(&["patch", "osc:freq=loud"]).contains("not a number"));
    assert!(cli.failure(&["patch", "osc | vca:level=1"]).contains("not a port"));
    assert!(cli.failure(&["patch", "split(vca; delay"]).contains("unclosed split"));
}

#[test]
fn refused_definition_from_config() {
    let cli = Cli::with_config("[loopback]\nrefused = [\"patchcord.vca\"]\n");
    let stderr = cli.failure(&["patch", "osc | vca"]);
    assert!(stderr.contains("patchcord.vca"), "got: {stderr}");
}

// ---------------------------------------------------------------------------
// patchcord simulate
// ---------------------------------------------------------------------------

#[test]
fn simulate_batched_reorders_once() {
    let report = Cli::new().json(&["simulate", "--chain", "6", "--fanout", "3", "--suspend", "--json"]);
    assert_eq!(report["modules"], 1 + 3 + 1 + 6 + 1);
    assert_eq!(report["connections"], 3 + 3 + 7);
    assert_eq!(report["order_updates"], 1);
    assert_eq!(report["order_valid"], true);
    assert_eq!(report["order_len"], report["modules"]);
}

#[test]
fn simulate_incremental_reorders_per_edge() {
    let report = Cli::new().json(&["simulate", "--chain", "4", "--fanout", "2", "--json"]);
    assert_eq!(report["order_updates"], report["connections"]);
    assert_eq!(report["order_valid"], true);
}

#[test]
fn simulate_respects_fanout_cap() {
    let stderr = Cli::new().failure(&["simulate", "--fanout", "21"]);
    assert!(stderr.contains("already feeds 20 inlets"), "got: {stderr}");

    let cli = Cli::with_config("max_fanout = 2\n");
    let stderr = cli.failure(&["simulate", "--fanout", "3"]);
    assert!(stderr.contains("already feeds 2 inlets"), "got: {stderr}");
}

// ---------------------------------------------------------------------------
// patchcord config
// ---------------------------------------------------------------------------

#[test]
fn config_write_default_then_show() {
    let cli = Cli::new();
    let output = cli.run(&["config", "--write-default"]);
    assert!(output.status.success());
    assert!(cli.config_path().exists());

    let stderr = cli.failure(&["config", "--write-default"]);
    assert!(stderr.contains("already exists"));
    assert!(cli.run(&["config", "--write-default", "--force"]).status.success());

    let shown = String::from_utf8(cli.run(&["config"]).stdout).unwrap();
    assert!(shown.contains("max_fanout = 20"));
    assert!(shown.contains("drain_budget = 256"));
}

#[test]
fn broken_config_blocks_engine_commands_but_not_config() {
    let cli = Cli::with_config("max_fanout = 0\n");
    assert!(cli.failure(&["simulate"]).contains("max_fanout"));

    let output = cli.run(&["config", "--path"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("engine.toml"));
}
