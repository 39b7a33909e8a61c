//! Uninstall command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn uninstall_removes_keg_and_entry() {
  let env = TestEnv::new();
  env.simple("alpha", &[]);
  env.keg_cmd().args(["install", "alpha"]).assert().success();
  assert!(env.keg("alpha").join("bin/alpha").is_file());

  env
    .keg_cmd()
    .args(["uninstall", "alpha"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Uninstalled alpha 1.0"));

  assert!(!env.keg("alpha").exists());
  assert!(env.list_json().is_empty());
}

#[test]
fn uninstall_refuses_while_dependents_remain() {
  let env = TestEnv::new();
  env.simple("libxml2", &[]);
  env.simple("php", &["libxml2"]);
  env.keg_cmd().args(["install", "php"]).assert().success();

  env
    .keg_cmd()
    .args(["uninstall", "libxml2"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("required by php"));
  assert!(env.keg("libxml2").exists());

  env.keg_cmd().args(["uninstall", "libxml2", "--force"]).assert().success();
  assert!(!env.keg("libxml2").exists());
}

#[test]
fn uninstall_then_install_rebuilds() {
  let env = TestEnv::new();
  env.simple("alpha", &[]);
  env.keg_cmd().args(["install", "alpha"]).assert().success();
  env.keg_cmd().args(["uninstall", "alpha"]).assert().success();

  env
    .keg_cmd()
    .args(["install", "alpha"])
    .assert()
    .success()
    .stdout(predicate::str::contains("alpha 1.0 installed"));
}
