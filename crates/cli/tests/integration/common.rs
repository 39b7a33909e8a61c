//! Shared test helpers for CLI integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use flate2::Compression;
use flate2::write::GzEncoder;
use keg_lib::util::hash::{HashAlgorithm, hash_file};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Configure script that writes its arguments where `install.sh` picks them up.
pub const RECORDING_CONFIGURE: &str = "#!/bin/sh\nprintf '%s\\n' \"$@\" > configure.args\n";

pub const FAILING_CONFIGURE: &str = "#!/bin/sh\necho 'configure: error: missing libxml2' >&2\nexit 1\n";

/// Isolated test environment.
///
/// Each test gets its own formula, data, cache and install root directories.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    for dir in ["formula", "sources"] {
      std::fs::create_dir_all(temp.path().join(dir)).unwrap();
    }
    Self { temp }
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn root_path(&self) -> PathBuf {
    self.dir("root")
  }

  pub fn data_path(&self) -> PathBuf {
    self.dir("data")
  }

  /// Installed keg directory of `name` at version 1.0.
  pub fn keg(&self, name: &str) -> PathBuf {
    self.root_path().join("Cellar").join(name).join("1.0")
  }

  /// Command with every keg directory pointed into the sandbox.
  pub fn keg_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("keg");
    cmd.env("KEG_FORMULA_DIR", self.dir("formula"));
    cmd.env("KEG_DATA_DIR", self.data_path());
    cmd.env("KEG_CACHE_DIR", self.dir("cache"));
    cmd.env("KEG_ROOT", self.root_path());
    cmd.env_remove("KEG_SYSCONFDIR");
    cmd.env_remove("KEG_LOCALSTATEDIR");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Tarball for `name` whose `install.sh` puts `bin/<name>` under `$PREFIX`.
  fn tarball(&self, name: &str, configure: &str) -> (String, String) {
    let path = self.dir("sources").join(format!("{name}-1.0.tar.gz"));
    let file = std::fs::File::create(&path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let install = format!(
      "#!/bin/sh\nset -e\nmkdir -p \"$PREFIX/bin\" \"$PREFIX/share/{name}\"\n\
       printf '#!/bin/sh\\necho {name}\\n' > \"$PREFIX/bin/{name}\"\n\
       if [ -f configure.args ]; then cp configure.args \"$PREFIX/share/{name}/configure.args\"; fi\n"
    );
    for (entry, contents) in [("configure", configure), ("install.sh", install.as_str())] {
      let mut header = tar::Header::new_gnu();
      header.set_size(contents.len() as u64);
      header.set_mode(0o755);
      header.set_cksum();
      builder
        .append_data(&mut header, format!("{name}-1.0/{entry}"), contents.as_bytes())
        .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();

    let sha = hash_file(&path, HashAlgorithm::Sha256).unwrap();
    (format!("file://{}", path.display()), sha)
  }

  /// Write `formula/<name>.json`, merging `extra` into a minimal descriptor.
  pub fn formula(&self, name: &str, configure: &str, extra: Value) {
    let (url, sha) = self.tarball(name, configure);
    let mut descriptor = json!({
      "name": name,
      "version": "1.0",
      "source": {"url": url, "checksum": {"algorithm": "sha256", "hex": sha}},
      "arguments": [{"kind": "set", "key": "prefix", "value": {"path": "prefix"}}],
      "steps": [
        {"step": "configure"},
        {"step": "run", "program": "sh", "args": ["install.sh"]}
      ]
    });
    if let (Value::Object(base), Value::Object(extra)) = (&mut descriptor, extra) {
      base.extend(extra);
    }
    let path = self.dir("formula").join(format!("{name}.json"));
    std::fs::write(path, serde_json::to_string_pretty(&descriptor).unwrap()).unwrap();
  }

  pub fn simple(&self, name: &str, deps: &[&str]) {
    let deps: Vec<Value> = deps.iter().map(|d| json!({"name": d})).collect();
    self.formula(name, RECORDING_CONFIGURE, json!({"dependencies": deps}));
  }

  pub fn failing(&self, name: &str, deps: &[&str]) {
    let deps: Vec<Value> = deps.iter().map(|d| json!({"name": d})).collect();
    self.formula(name, FAILING_CONFIGURE, json!({"dependencies": deps}));
  }

  /// `keg list -o json`, parsed.
  pub fn list_json(&self) -> Vec<Value> {
    let output = self.keg_cmd().args(["list", "-o", "json"]).output().unwrap();
    assert!(output.status.success(), "list failed: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice::<Value>(&output.stdout)
      .unwrap()
      .as_array()
      .cloned()
      .unwrap()
  }

  pub fn configure_args(&self, name: &str) -> Vec<String> {
    let path = self.keg(name).join(format!("share/{name}/configure.args"));
    std::fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
  }
}
