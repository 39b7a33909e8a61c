//! Formula descriptor types.
//!
//! A `FormulaDescriptor` is pure data: metadata, options, dependency edges,
//! arguments and build steps. It carries no executable logic and is never
//! mutated after loading.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use super::argument::{ArgValue, BuildArgument, PathRef};
use crate::util::hash::HashAlgorithm;

/// Expected digest of a source artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
  pub algorithm: HashAlgorithm,
  /// Lowercase hex digest.
  #[serde(deserialize_with = "lowercase")]
  pub hex: String,
}

impl Checksum {
  pub fn new(algorithm: HashAlgorithm, hex: &str) -> Self {
    Self {
      algorithm,
      hex: hex.to_ascii_lowercase(),
    }
  }

  pub fn sha256(hex: &str) -> Self {
    Self::new(HashAlgorithm::Sha256, hex)
  }

  pub fn sha1(hex: &str) -> Self {
    Self::new(HashAlgorithm::Sha1, hex)
  }

  pub fn md5(hex: &str) -> Self {
    Self::new(HashAlgorithm::Md5, hex)
  }

  /// Whether `actual` is this digest, ignoring hex case.
  pub fn matches(&self, actual: &str) -> bool {
    self.hex.eq_ignore_ascii_case(actual)
  }
}

fn lowercase<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  String::deserialize(deserializer).map(|s| s.to_ascii_lowercase())
}

impl fmt::Display for Checksum {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.algorithm, self.hex)
  }
}

/// Where the source archive comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
  /// `http(s)://`, `file://` or a plain filesystem path.
  pub url: String,
  pub checksum: Checksum,
}

/// Body of a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchSource {
  /// Unified diff embedded in the descriptor.
  Data(String),
  /// Diff file, relative to the formula directory until the registry resolves it.
  File(PathBuf),
}

/// A patch applied to the unpacked source before configuring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSpec {
  #[serde(flatten)]
  pub source: PatchSource,
  /// Leading path components to strip (`patch -p<strip>`).
  #[serde(default = "default_strip")]
  pub strip: u32,
}

fn default_strip() -> u32 {
  1
}

/// How strongly a formula needs a dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
  /// Always built.
  #[default]
  Required,
  /// Built unless a compatible system capability is detected or `--without-<name>` is set.
  Recommended,
  /// Built only when `--with-<name>` is set.
  Optional,
}

impl fmt::Display for RequirementKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RequirementKind::Required => write!(f, "required"),
      RequirementKind::Recommended => write!(f, "recommended"),
      RequirementKind::Optional => write!(f, "optional"),
    }
  }
}

/// Edge from a formula to another formula it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
  /// Target formula name.
  pub name: String,
  #[serde(default)]
  pub kind: RequirementKind,
  /// Options requested on the dependency itself.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  /// Capability looked up by the system probe for `recommended` edges.
  /// Defaults to the dependency name.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub capability: Option<String>,
}

impl DependencyEdge {
  pub fn new(name: &str, kind: RequirementKind) -> Self {
    Self {
      name: name.to_string(),
      kind,
      options: Vec::new(),
      capability: None,
    }
  }

  pub fn required(name: &str) -> Self {
    Self::new(name, RequirementKind::Required)
  }

  pub fn capability(&self) -> &str {
    self.capability.as_deref().unwrap_or(&self.name)
  }
}

/// A build flag a formula accepts, and what selecting it changes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OptionSpec {
  /// Flag as typed on the command line, e.g. `--with-mysql`.
  pub flag: String,
  #[serde(default)]
  pub description: String,
  /// Options sharing a group are mutually exclusive.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub group: Option<String>,
  /// Other flags switched on by this one.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub implies: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<DependencyEdge>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub removes_dependencies: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub arguments: Vec<BuildArgument>,
  /// Flag names (`--with-apxs2`) of base arguments this option drops.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub removes_arguments: Vec<String>,
}

impl OptionSpec {
  pub fn new(flag: &str, description: &str) -> Self {
    Self {
      flag: flag.to_string(),
      description: description.to_string(),
      ..Default::default()
    }
  }
}

/// Gate on the selected option set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Condition {
  /// All of these must be selected.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub with: Vec<String>,
  /// None of these may be selected.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub without: Vec<String>,
}

impl Condition {
  pub fn is_always(&self) -> bool {
    self.with.is_empty() && self.without.is_empty()
  }

  pub fn holds(&self, selected: impl Fn(&str) -> bool) -> bool {
    self.with.iter().all(|f| selected(f)) && !self.without.iter().any(|f| selected(f))
  }

  /// Every flag this condition mentions.
  pub fn flags(&self) -> impl Iterator<Item = &String> {
    self.with.iter().chain(self.without.iter())
  }
}

/// One step of the configure → build → install sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BuildStep {
  /// Run the configure script with the target's resolved arguments.
  Configure {
    #[serde(default = "default_configure_script")]
    script: String,
  },
  /// Run `make` with the given targets (none means the default target).
  Make {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    targets: Vec<String>,
  },
  /// Run an arbitrary program from the source directory.
  Run {
    program: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    args: Vec<ArgValue>,
  },
  /// Replace literal text in a source file.
  Inreplace { file: PathBuf, from: String, to: ArgValue },
  /// Copy a file from the source tree into the layout.
  Install {
    from: PathBuf,
    to: PathRef,
    /// Replace an existing destination (configuration files default to keeping it).
    #[serde(default)]
    overwrite: bool,
  },
}

fn default_configure_script() -> String {
  "./configure".to_string()
}

impl BuildStep {
  pub fn configure() -> Self {
    BuildStep::Configure {
      script: default_configure_script(),
    }
  }

  pub fn make(targets: &[&str]) -> Self {
    BuildStep::Make {
      targets: targets.iter().map(|t| t.to_string()).collect(),
    }
  }

  /// Short label used in logs and errors.
  pub fn label(&self) -> String {
    match self {
      BuildStep::Configure { script } => script.clone(),
      BuildStep::Make { targets } if targets.is_empty() => "make".to_string(),
      BuildStep::Make { targets } => format!("make {}", targets.join(" ")),
      BuildStep::Run { program, .. } => program.clone(),
      BuildStep::Inreplace { file, .. } => format!("inreplace {}", file.display()),
      BuildStep::Install { from, .. } => format!("install {}", from.display()),
    }
  }
}

/// A build step with the option gate it runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
  #[serde(flatten)]
  pub step: BuildStep,
  #[serde(default, skip_serializing_if = "Condition::is_always")]
  pub when: Condition,
}

impl From<BuildStep> for StepSpec {
  fn from(step: BuildStep) -> Self {
    Self {
      step,
      when: Condition::default(),
    }
  }
}

/// A build environment variable and the option gate it applies under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSpec {
  pub name: String,
  pub value: ArgValue,
  #[serde(default, skip_serializing_if = "Condition::is_always")]
  pub when: Condition,
}

impl EnvSpec {
  pub fn new(name: &str, value: impl Into<ArgValue>) -> Self {
    Self {
      name: name.to_string(),
      value: value.into(),
      when: Condition::default(),
    }
  }
}

/// One section of post-install notes.
///
/// `{prefix}`, `{etc}`, `{var}` and `{root}` are filled in from the install
/// layout when the caveats are shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaveatSpec {
  pub text: String,
  #[serde(default, skip_serializing_if = "Condition::is_always")]
  pub when: Condition,
}

impl From<&str> for CaveatSpec {
  fn from(text: &str) -> Self {
    Self {
      text: text.to_string(),
      when: Condition::default(),
    }
  }
}

/// Caveats are either one unconditional string or a list of gated sections.
fn caveat_sections<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<CaveatSpec>, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Caveats {
    Text(String),
    Sections(Vec<CaveatSpec>),
  }

  Ok(match Caveats::deserialize(deserializer)? {
    Caveats::Text(text) => vec![CaveatSpec::from(text.as_str())],
    Caveats::Sections(sections) => sections,
  })
}

fn default_steps() -> Vec<StepSpec> {
  vec![
    BuildStep::configure().into(),
    BuildStep::make(&[]).into(),
    BuildStep::make(&["install"]).into(),
  ]
}

/// Static description of a buildable package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaDescriptor {
  pub name: String,
  pub version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub homepage: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub source: SourceSpec,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub patches: Vec<PatchSpec>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<OptionSpec>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<DependencyEdge>,
  /// Configure arguments passed regardless of options.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub arguments: Vec<BuildArgument>,
  #[serde(default = "default_steps")]
  pub steps: Vec<StepSpec>,
  /// Variables added to the build environment of every step.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub environment: Vec<EnvSpec>,
  /// Post-install notes shown to the user.
  #[serde(default, deserialize_with = "caveat_sections", skip_serializing_if = "Vec::is_empty")]
  pub caveats: Vec<CaveatSpec>,
}

impl FormulaDescriptor {
  /// Descriptor with the default configure/make/make install steps and nothing else.
  pub fn new(name: &str, version: &str, source: SourceSpec) -> Self {
    Self {
      name: name.to_string(),
      version: version.to_string(),
      homepage: None,
      description: None,
      source,
      patches: Vec::new(),
      options: Vec::new(),
      dependencies: Vec::new(),
      arguments: Vec::new(),
      steps: default_steps(),
      environment: Vec::new(),
      caveats: Vec::new(),
    }
  }

  /// Declared options followed by the implicit `--with-<dep>` / `--without-<dep>`
  /// options of optional and recommended dependencies, in declaration order.
  pub fn all_options(&self) -> Vec<OptionSpec> {
    let mut options = self.options.clone();
    for edge in &self.dependencies {
      let implicit = match edge.kind {
        RequirementKind::Required => continue,
        RequirementKind::Optional => OptionSpec::new(
          &format!("--with-{}", edge.name),
          &format!("Build with {} support", edge.name),
        ),
        RequirementKind::Recommended => OptionSpec::new(
          &format!("--without-{}", edge.name),
          &format!("Build without {} support", edge.name),
        ),
      };
      if !options.iter().any(|o| o.flag == implicit.flag) {
        options.push(implicit);
      }
    }
    options
  }

  pub fn has_option(&self, flag: &str) -> bool {
    self.all_options().iter().any(|o| o.flag == flag)
  }
}
