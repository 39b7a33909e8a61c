//! Shared fixtures: formula directories backed by local tarballs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use keg_lib::execute::ExecuteConfig;
use keg_lib::formula::FormulaRegistry;
use keg_lib::install::Engine;
use keg_lib::platform::Layout;
use keg_lib::resolve::{FixedProbe, ResolveRequest};
use keg_lib::util::hash::{HashAlgorithm, hash_file};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Configure script recording its arguments for `install.sh` to ship.
pub const RECORDING_CONFIGURE: &str = "#!/bin/sh\nprintf '%s\\n' \"$@\" > configure.args\n";

pub const FAILING_CONFIGURE: &str = "#!/bin/sh\necho 'configure: error: no acceptable C compiler found' >&2\nexit 1\n";

/// Temporary keg installation with its own formula, data and cache directories.
pub struct Sandbox {
  pub temp: TempDir,
}

impl Sandbox {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("formula")).unwrap();
    std::fs::create_dir_all(temp.path().join("sources")).unwrap();
    Self { temp }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn formula_dir(&self) -> PathBuf {
    self.path().join("formula")
  }

  pub fn data_dir(&self) -> PathBuf {
    self.path().join("data")
  }

  pub fn layout(&self) -> Layout {
    Layout::new(self.path().join("root"))
  }

  /// Write a tarball for `name` and return `(url, sha256)`.
  pub fn tarball(&self, name: &str, version: &str, configure: &str) -> (String, String) {
    let path = self.path().join("sources").join(format!("{name}-{version}.tar.gz"));
    let file = std::fs::File::create(&path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let top = format!("{name}-{version}");
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
        .append_data(&mut header, format!("{top}/{entry}"), contents.as_bytes())
        .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();

    let sha = hash_file(&path, HashAlgorithm::Sha256).unwrap();
    (format!("file://{}", path.display()), sha)
  }

  /// Write `<formula_dir>/<name>.json`, merging `extra` into a minimal descriptor.
  pub fn formula(&self, name: &str, configure: &str, extra: Value) {
    let (url, sha) = self.tarball(name, "1.0", configure);
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
    let path = self.formula_dir().join(format!("{name}.json"));
    std::fs::write(path, serde_json::to_string_pretty(&descriptor).unwrap()).unwrap();
  }

  /// Formula that builds with no extra settings beyond its dependencies.
  pub fn simple(&self, name: &str, deps: &[&str]) {
    let deps: Vec<Value> = deps.iter().map(|d| json!({"name": d})).collect();
    self.formula(name, RECORDING_CONFIGURE, json!({"dependencies": deps}));
  }

  pub fn failing(&self, name: &str, deps: &[&str]) {
    let deps: Vec<Value> = deps.iter().map(|d| json!({"name": d})).collect();
    self.formula(name, FAILING_CONFIGURE, json!({"dependencies": deps}));
  }

  /// Engine over the formula directory, with a probe reporting `capabilities`.
  pub fn engine(&self, capabilities: &[&str]) -> Engine {
    let registry = FormulaRegistry::load_dir(&self.formula_dir()).unwrap();
    let config = ExecuteConfig {
      parallelism: 4,
      layout: self.layout(),
      logs_dir: self.data_dir().join("logs"),
      cache_dir: self.path().join("cache"),
      shell_path: "/usr/bin:/bin".to_string(),
      kill_grace: Duration::from_secs(2),
      make_jobs: 1,
    };
    Engine::new(registry, FixedProbe::new(capabilities.iter().copied()), config, self.data_dir())
  }

  /// Arguments the recording configure script saw for an installed keg.
  pub fn configure_args(&self, name: &str) -> Vec<String> {
    let path = self.layout().keg(name, "1.0").join(format!("share/{name}/configure.args"));
    std::fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
  }
}

pub fn request(name: &str, options: &[&str]) -> Vec<(String, ResolveRequest)> {
  vec![(name.to_string(), ResolveRequest::new(options.iter().copied()))]
}
