//! Test fixtures for keg-lib.
//!
//! Descriptors mirror the shapes of real formulas (php with its apache/fpm
//! options and mysql variants) and local tarballs with `/bin/sh` configure
//! scripts stand in for upstream sources.

use std::path::{Path, PathBuf};

use crate::formula::{
  ArgValue, BuildArgument, BuildStep, CaveatSpec, Checksum, Condition, DependencyEdge, EnvSpec, FormulaDescriptor,
  OptionSpec, PathRef, RequirementKind, SourceSpec, StepSpec,
};
use crate::util::hash::{HashAlgorithm, hash_file};

fn placeholder_source(name: &str) -> SourceSpec {
  SourceSpec {
    url: format!("https://example.com/{name}-1.0.tar.gz"),
    checksum: Checksum::sha256(&"0".repeat(64)),
  }
}

fn dep_prefix(formula: &str) -> Option<ArgValue> {
  Some(ArgValue::Path(PathRef::Dependency {
    formula: formula.to_string(),
    sub: String::new(),
  }))
}

/// Minimal descriptor with required dependencies on `deps`.
pub fn descriptor(name: &str, deps: &[&str]) -> FormulaDescriptor {
  let mut desc = FormulaDescriptor::new(name, "1.0", placeholder_source(name));
  desc.dependencies = deps.iter().map(|d| DependencyEdge::required(d)).collect();
  desc
}

/// A php formula with the option surface of the 5.3 series.
pub fn php_descriptor() -> FormulaDescriptor {
  let mut php = FormulaDescriptor::new("php", "5.3.8", placeholder_source("php"));

  php.dependencies = vec![
    DependencyEdge::required("gettext"),
    DependencyEdge::required("libxml2"),
    DependencyEdge::new("readline", RequirementKind::Recommended),
  ];

  php.arguments = vec![
    BuildArgument::disable("debug"),
    BuildArgument::set("prefix", PathRef::Prefix { sub: String::new() }),
    BuildArgument::set(
      "sysconfdir",
      PathRef::SysconfDir {
        sub: "php".to_string(),
      },
    ),
    BuildArgument::with(
      "apxs2",
      Some(ArgValue::Path(PathRef::Absolute {
        value: PathBuf::from("/usr/sbin/apxs"),
      })),
    ),
    BuildArgument::with("readline", dep_prefix("readline")),
  ];

  let mut mysql = OptionSpec::new("--with-mysql", "Include MySQL support");
  mysql.group = Some("mysql".to_string());
  mysql.dependencies.push(DependencyEdge {
    capability: Some("mysql_config".to_string()),
    ..DependencyEdge::new("mysql", RequirementKind::Recommended)
  });
  mysql.arguments = vec![
    BuildArgument::with("mysql-sock", Some("/tmp/mysql.sock".into())),
    BuildArgument::with("mysqli", Some("mysqlnd".into())),
  ];

  let mut mariadb = OptionSpec::new("--with-mariadb", "Include MariaDB support");
  mariadb.group = Some("mysql".to_string());
  mariadb.dependencies.push(DependencyEdge {
    capability: Some("mysql_config".to_string()),
    ..DependencyEdge::new("mariadb", RequirementKind::Recommended)
  });
  mariadb.arguments = vec![BuildArgument::with("mysqli", Some("mysqlnd".into()))];

  let mut pgsql = OptionSpec::new("--with-pgsql", "Include PostgreSQL support");
  pgsql.dependencies.push(DependencyEdge::required("postgresql"));
  pgsql.arguments = vec![BuildArgument::with("pgsql", dep_prefix("postgresql"))];

  let mut fpm = OptionSpec::new("--with-fpm", "Enable building of the fpm SAPI executable");
  fpm.implies.push("--without-apache".to_string());
  fpm.dependencies.push(DependencyEdge::required("libevent"));
  fpm.arguments = vec![BuildArgument::enable("fpm")];

  let mut no_apache = OptionSpec::new("--without-apache", "Build without shared Apache 2.0 Handler module");
  no_apache.removes_arguments.push("--with-apxs2".to_string());

  let mut intl = OptionSpec::new("--with-intl", "Include internationalization support");
  intl.dependencies.push(DependencyEdge::required("icu4c"));
  intl.arguments = vec![BuildArgument::enable("intl"), BuildArgument::with("icu-dir", dep_prefix("icu4c"))];

  let mut no_readline = OptionSpec::new("--without-readline", "Build without readline support");
  no_readline.removes_arguments.push("--with-readline".to_string());

  php.options = vec![mysql, mariadb, pgsql, fpm, no_apache, intl, no_readline];

  php.steps = vec![
    BuildStep::configure().into(),
    StepSpec {
      step: BuildStep::Inreplace {
        file: PathBuf::from("Makefile"),
        from: "/usr/libexec/apache2".to_string(),
        to: ArgValue::Path(PathRef::Prefix {
          sub: "libexec/apache2".to_string(),
        }),
      },
      when: Condition {
        with: Vec::new(),
        without: vec!["--without-apache".to_string()],
      },
    },
    BuildStep::make(&[]).into(),
    BuildStep::make(&["install"]).into(),
    BuildStep::Install {
      from: PathBuf::from("php.ini-production"),
      to: PathRef::SysconfDir {
        sub: "php/php.ini".to_string(),
      },
      overwrite: false,
    }
    .into(),
  ];

  php.environment = vec![EnvSpec::new("CFLAGS", "-O3")];
  php.caveats = vec![
    CaveatSpec::from("The php.ini file can be found in {etc}/php/php.ini"),
    CaveatSpec {
      text: "You can start php-fpm automatically on login with:\n    \
             cp {prefix}/org.php-fpm.plist ~/Library/LaunchAgents"
        .to_string(),
      when: Condition {
        with: vec!["--with-fpm".to_string()],
        without: Vec::new(),
      },
    },
  ];
  php
}

/// Configure script that only echoes its arguments.
pub fn configure_script() -> String {
  "#!/bin/sh\necho \"configure $@\"\n".to_string()
}

/// Write `<dir>/<name>-1.0.tar.gz` holding `<name>-1.0/{configure, install.sh, <name>.sh, extra files}`.
///
/// `install.sh` copies `<name>.sh` to `$PREFIX/bin/<name>`; `make` is never needed.
pub fn write_tarball(dir: &Path, name: &str, configure: &str, extra: &[(&str, &str)]) -> PathBuf {
  use flate2::Compression;
  use flate2::write::GzEncoder;

  let path = dir.join(format!("{name}-1.0.tar.gz"));
  let file = std::fs::File::create(&path).unwrap();
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

  let top = format!("{name}-1.0");
  let script = format!("#!/bin/sh\necho {name}\n");
  let install = format!("#!/bin/sh\nset -e\nmkdir -p \"$PREFIX/bin\"\ncp {name}.sh \"$PREFIX/bin/{name}\"\n");
  let mut entries: Vec<(String, &str, u32)> = vec![
    (format!("{top}/configure"), configure, 0o755),
    (format!("{top}/install.sh"), install.as_str(), 0o755),
    (format!("{top}/{name}.sh"), script.as_str(), 0o755),
  ];
  entries.extend(extra.iter().map(|(p, c)| (format!("{top}/{p}"), *c, 0o644)));

  for (entry_path, contents, mode) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(mode);
    header.set_cksum();
    builder.append_data(&mut header, entry_path, contents.as_bytes()).unwrap();
  }

  builder.into_inner().unwrap().finish().unwrap();
  path
}

/// Descriptor building a fresh local tarball for `name`.
pub fn local_descriptor(dir: &Path, name: &str, deps: &[&str]) -> FormulaDescriptor {
  let tarball = write_tarball(dir, name, &configure_script(), &[]);
  local_descriptor_for(&tarball, name, deps)
}

/// Descriptor pointing at an existing tarball, built by `configure` then `sh install.sh`.
pub fn local_descriptor_for(tarball: &Path, name: &str, deps: &[&str]) -> FormulaDescriptor {
  let hex = hash_file(tarball, HashAlgorithm::Sha256).unwrap();
  let mut desc = descriptor(name, deps);
  desc.source = SourceSpec {
    url: format!("file://{}", tarball.display()),
    checksum: Checksum::sha256(&hex),
  };
  desc.steps = vec![
    BuildStep::configure().into(),
    BuildStep::Run {
      program: "sh".to_string(),
      args: vec![ArgValue::from("install.sh")],
    }
    .into(),
  ];
  desc
}
