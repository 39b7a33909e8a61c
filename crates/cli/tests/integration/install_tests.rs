//! Install command integration tests.

use predicates::prelude::*;
use serde_json::{Value, json};

use super::common::{RECORDING_CONFIGURE, TestEnv};

#[test]
fn install_builds_dependencies_first() {
  let env = TestEnv::new();
  env.simple("alpha", &[]);
  env.simple("beta", &["alpha"]);
  env.simple("gamma", &["beta"]);

  env
    .keg_cmd()
    .args(["install", "gamma"])
    .assert()
    .success()
    .stdout(predicate::str::contains("alpha 1.0 installed"))
    .stdout(predicate::str::contains("gamma 1.0 installed"))
    .stdout(predicate::str::contains("3 built, 0 failed"));

  assert!(env.keg("gamma").join("bin/gamma").is_file());
  let entries = env.list_json();
  let names: Vec<&str> = entries.iter().filter_map(|e| e["name"].as_str()).collect();
  assert_eq!(names, ["alpha", "beta", "gamma"]);
  let requested: Vec<bool> = entries
    .iter()
    .map(|e| e["installed_on_request"].as_bool().unwrap_or(false))
    .collect();
  assert_eq!(requested, [false, false, true]);
}

#[test]
fn reinstall_is_a_no_op() {
  let env = TestEnv::new();
  env.simple("alpha", &[]);

  env.keg_cmd().args(["install", "alpha"]).assert().success();
  env
    .keg_cmd()
    .args(["install", "alpha"])
    .assert()
    .success()
    .stdout(predicate::str::contains("alpha 1.0 already installed"))
    .stdout(predicate::str::contains("0 built"));
}

#[test]
fn failed_dependency_exits_1_and_skips_dependents() {
  let env = TestEnv::new();
  env.failing("libxml2", &[]);
  env.simple("php", &["libxml2"]);

  env
    .keg_cmd()
    .args(["install", "php"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("libxml2 1.0 failed"))
    .stderr(predicate::str::contains("php 1.0 skipped: dependency libxml2 failed"));

  assert!(env.list_json().is_empty());
  assert!(!env.keg("php").exists());
}

#[test]
fn options_are_passed_to_configure() {
  let env = TestEnv::new();
  env.formula(
    "php",
    RECORDING_CONFIGURE,
    json!({
      "options": [
        {"flag": "--with-fpm", "description": "Enable the fpm SAPI",
         "arguments": [{"kind": "enable", "feature": "fpm"}]}
      ]
    }),
  );

  env.keg_cmd().args(["install", "php", "--with-fpm"]).assert().success();

  let args = env.configure_args("php");
  assert!(args.contains(&"--enable-fpm".to_string()), "{args:?}");
  let entries = env.list_json();
  assert_eq!(entries[0]["options"], json!(["--with-fpm"]));
}

#[test]
fn install_json_reports_every_target() {
  let env = TestEnv::new();
  env.simple("alpha", &[]);
  env.simple("beta", &["alpha"]);

  let output = env.keg_cmd().args(["install", "beta", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let report: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["success"], true);
  assert_eq!(report["batches"], json!([["alpha"], ["beta"]]));
  assert_eq!(report["results"]["alpha"]["status"], "succeeded");
  assert_eq!(report["results"]["beta"]["status"], "succeeded");
}

#[test]
fn caveats_are_printed_after_install() {
  let env = TestEnv::new();
  env.formula(
    "php",
    RECORDING_CONFIGURE,
    json!({"caveats": "Edit {etc}/php.ini to configure PHP."}),
  );

  let etc = env.root_path().join("etc");
  env
    .keg_cmd()
    .args(["install", "php"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Caveats for php"))
    .stdout(predicate::str::contains(format!("{}/php.ini", etc.display())));
}

#[test]
fn gated_caveats_follow_the_selected_options() {
  let env = TestEnv::new();
  env.formula(
    "php",
    RECORDING_CONFIGURE,
    json!({
      "options": [{"flag": "--with-fpm", "description": "Enable the fpm SAPI"}],
      "caveats": [
        {"text": "Edit {etc}/php.ini to configure PHP."},
        {"text": "Start php-fpm with {prefix}/sbin/php-fpm", "when": {"with": ["--with-fpm"]}}
      ]
    }),
  );

  let output = env.keg_cmd().args(["install", "php", "-o", "json"]).output().unwrap();
  assert!(output.status.success());
  let report: Value = serde_json::from_slice(&output.stdout).unwrap();
  let caveats = report["caveats"]["php"].as_str().unwrap();
  assert!(caveats.contains("php.ini"));
  assert!(!caveats.contains("php-fpm"), "{caveats}");

  env.keg_cmd().args(["uninstall", "php"]).assert().success();
  env
    .keg_cmd()
    .args(["install", "php", "--with-fpm"])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("{}/sbin/php-fpm", env.keg("php").display())));
}

#[test]
fn global_flags_after_the_formula_are_not_options() {
  let env = TestEnv::new();
  env.formula(
    "php",
    RECORDING_CONFIGURE,
    json!({"options": [{"flag": "--with-fpm", "description": "Enable the fpm SAPI"}]}),
  );

  let output = env
    .keg_cmd()
    .args(["install", "php", "--with-fpm", "-v", "-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  let report: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["success"], true);
  assert_eq!(env.list_json()[0]["options"], json!(["--with-fpm"]));
}
