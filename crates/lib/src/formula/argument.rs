//! Typed build arguments.
//!
//! Formulas never carry pre-rendered `./configure` strings. Arguments are kept
//! as `BuildArgument` values until the executor renders them against a
//! concrete `Layout`, which keeps them comparable in tests and free of shell
//! interpolation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::Layout;

/// Errors raised while rendering arguments for a subprocess.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
  /// A `PathRef::Dependency` names a formula that is not a dependency of the target.
  #[error("argument references the prefix of '{0}', which is not a dependency")]
  UnknownDependency(String),
}

/// A path resolved against the install layout at render time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum PathRef {
  /// The target's own keg prefix.
  Prefix {
    #[serde(default)]
    sub: String,
  },
  /// The keg prefix of a dependency.
  Dependency {
    formula: String,
    #[serde(default)]
    sub: String,
  },
  /// The system configuration directory.
  SysconfDir {
    #[serde(default)]
    sub: String,
  },
  /// The system state directory.
  LocalstateDir {
    #[serde(default)]
    sub: String,
  },
  /// A fixed system path such as `/usr`.
  Absolute { value: PathBuf },
}

/// Value of a `--flag=value` argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
  Literal(String),
  Path(PathRef),
}

impl From<&str> for ArgValue {
  fn from(value: &str) -> Self {
    ArgValue::Literal(value.to_string())
  }
}

impl From<PathRef> for ArgValue {
  fn from(value: PathRef) -> Self {
    ArgValue::Path(value)
  }
}

/// One argument of a configure-style command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildArgument {
  /// `--enable-<feature>[=value]`
  Enable {
    feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<ArgValue>,
  },
  /// `--disable-<feature>`
  Disable { feature: String },
  /// `--with-<package>[=value]`
  With {
    package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<ArgValue>,
  },
  /// `--without-<package>`
  Without { package: String },
  /// `--<key>=value`
  Set { key: String, value: ArgValue },
  /// `--<name>`
  Switch { name: String },
}

impl BuildArgument {
  pub fn enable(feature: &str) -> Self {
    BuildArgument::Enable {
      feature: feature.to_string(),
      value: None,
    }
  }

  pub fn disable(feature: &str) -> Self {
    BuildArgument::Disable {
      feature: feature.to_string(),
    }
  }

  pub fn with(package: &str, value: Option<ArgValue>) -> Self {
    BuildArgument::With {
      package: package.to_string(),
      value,
    }
  }

  pub fn set(key: &str, value: impl Into<ArgValue>) -> Self {
    BuildArgument::Set {
      key: key.to_string(),
      value: value.into(),
    }
  }

  /// The flag without its value, e.g. `--with-apxs2`. Used to match removals.
  pub fn flag_name(&self) -> String {
    match self {
      BuildArgument::Enable { feature, .. } => format!("--enable-{feature}"),
      BuildArgument::Disable { feature } => format!("--disable-{feature}"),
      BuildArgument::With { package, .. } => format!("--with-{package}"),
      BuildArgument::Without { package } => format!("--without-{package}"),
      BuildArgument::Set { key, .. } => format!("--{key}"),
      BuildArgument::Switch { name } => format!("--{name}"),
    }
  }

  /// Value carried by this argument, if any.
  pub fn value(&self) -> Option<&ArgValue> {
    match self {
      BuildArgument::Enable { value, .. } | BuildArgument::With { value, .. } => value.as_ref(),
      BuildArgument::Set { value, .. } => Some(value),
      BuildArgument::Disable { .. } | BuildArgument::Without { .. } | BuildArgument::Switch { .. } => None,
    }
  }

  /// Render to a single subprocess argument.
  pub fn render(&self, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
    let flag = self.flag_name();
    match self.value() {
      Some(value) => Ok(format!("{flag}={}", ctx.render_value(value)?)),
      None => Ok(flag),
    }
  }
}

impl fmt::Display for BuildArgument {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.value() {
      Some(ArgValue::Literal(v)) => write!(f, "{}={}", self.flag_name(), v),
      Some(ArgValue::Path(p)) => write!(f, "{}={}", self.flag_name(), p),
      None => write!(f, "{}", self.flag_name()),
    }
  }
}

impl fmt::Display for PathRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (base, sub) = match self {
      PathRef::Prefix { sub } => ("{prefix}".to_string(), sub),
      PathRef::Dependency { formula, sub } => (format!("{{{formula}.prefix}}"), sub),
      PathRef::SysconfDir { sub } => ("{etc}".to_string(), sub),
      PathRef::LocalstateDir { sub } => ("{var}".to_string(), sub),
      PathRef::Absolute { value } => return write!(f, "{}", value.display()),
    };
    if sub.is_empty() {
      write!(f, "{base}")
    } else {
      write!(f, "{base}/{sub}")
    }
  }
}

/// Everything needed to turn `PathRef`s into concrete paths for one target.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
  pub layout: &'a Layout,
  /// The target's keg prefix.
  pub prefix: PathBuf,
  /// Keg prefixes of the target's dependencies.
  pub dependencies: &'a BTreeMap<String, PathBuf>,
}

impl RenderContext<'_> {
  pub fn resolve_path(&self, path: &PathRef) -> Result<PathBuf, RenderError> {
    Ok(match path {
      PathRef::Prefix { sub } => Layout::join(&self.prefix, sub),
      PathRef::Dependency { formula, sub } => {
        let dep = self
          .dependencies
          .get(formula)
          .ok_or_else(|| RenderError::UnknownDependency(formula.clone()))?;
        Layout::join(dep, sub)
      }
      PathRef::SysconfDir { sub } => Layout::join(&self.layout.sysconf_dir, sub),
      PathRef::LocalstateDir { sub } => Layout::join(&self.layout.localstate_dir, sub),
      PathRef::Absolute { value } => value.clone(),
    })
  }

  pub fn render_value(&self, value: &ArgValue) -> Result<String, RenderError> {
    match value {
      ArgValue::Literal(s) => Ok(s.clone()),
      ArgValue::Path(p) => Ok(path_to_arg(&self.resolve_path(p)?)),
    }
  }

  pub fn render_all(&self, args: &[BuildArgument]) -> Result<Vec<String>, RenderError> {
    args.iter().map(|a| a.render(self)).collect()
  }
}

fn path_to_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}
