//! # Configuration Schema and Parsing
//!
//! This module defines the data structures that represent the
//! `.patchstack.yaml` configuration file, as well as the logic for parsing
//! and validating it. The configuration describes one fork: where the
//! upstream lives, where the managed working tree goes, and where each
//! layer's patches are kept.
//!
//! ## Example
//!
//! ```yaml
//! fork: Example
//! upstream:
//!   url: https://github.com/example/upstream.git
//!   ref: main
//! work_dir: work/source
//! patches:
//!   base: patches/base
//!   file: patches/file
//!   feature: patches/feature
//! rejects: rejects
//! strategy: fuzzy
//! filter_patches: true
//! min_fuzz: 0.5
//! ```
//!
//! Parsing is split into [`from_file`] and [`parse`] so tests can work on
//! strings; validation problems produce [`Error::ConfigParse`] with a hint
//! where one helps.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::textpatch::DEFAULT_MIN_FUZZ;

/// The upstream a fork is based on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    /// Repository URL, or a local path to a checked-out tree.
    pub url: String,
    /// The git reference (branch, tag, or commit hash) to base on.
    pub r#ref: String,
}

/// Strategy for applying the file layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileStrategy {
    /// In-process fuzzy text patcher.
    #[default]
    Fuzzy,
    /// Native `git apply --3way` per patch file.
    Git,
}

/// Parsed `.patchstack.yaml` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Fork identifier embedded in marker commit messages.
    pub fork: String,

    pub upstream: Upstream,

    /// The managed working tree, exclusively owned by one apply/rebuild run
    /// at a time.
    pub work_dir: PathBuf,

    /// Per-layer patch directories. A missing entry means an empty layer,
    /// which still produces its boundary tag on apply.
    #[serde(default)]
    pub patches: BTreeMap<Layer, PathBuf>,

    /// Where failed patches are set aside for manual resolution.
    #[serde(default)]
    pub rejects: Option<PathBuf>,

    /// File layer apply strategy.
    #[serde(default)]
    pub strategy: FileStrategy,

    /// With the git strategy, route partially-failed patch files into the
    /// rejects directory instead of aborting. Useful when updating to a new
    /// upstream version.
    #[serde(default)]
    pub move_failed_to_rejects: bool,

    /// Whether the rebuilder discards regenerated patches with no semantic
    /// change.
    #[serde(default = "default_true")]
    pub filter_patches: bool,

    /// Minimum fuzzy-match score in [0, 1] for the text patcher.
    #[serde(default = "default_min_fuzz")]
    pub min_fuzz: f32,

    /// Additional remote fetched before applying, so 3-way apply has the
    /// necessary blob objects.
    #[serde(default)]
    pub additional_remote: Option<String>,

    /// Name the additional remote is registered under.
    #[serde(default = "default_remote_name")]
    pub remote_name: String,
}

fn default_true() -> bool {
    true
}

fn default_min_fuzz() -> f32 {
    DEFAULT_MIN_FUZZ
}

fn default_remote_name() -> String {
    "old".to_string()
}

impl Config {
    /// Patch directory for a layer, if configured.
    pub fn patch_dir(&self, layer: Layer) -> Option<&Path> {
        self.patches.get(&layer).map(PathBuf::as_path)
    }
}

/// Parse a configuration from a YAML string and validate it.
pub fn parse(content: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(content).map_err(|e| Error::ConfigParse {
        message: e.to_string(),
        hint: Some("see `.patchstack.yaml` in the project docs for the expected layout".to_string()),
    })?;
    validate(&config)?;
    Ok(config)
}

/// Load and parse a configuration file.
pub fn from_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigParse {
        message: format!("cannot read {}: {}", path.display(), e),
        hint: Some("pass --config or create .patchstack.yaml in the current directory".to_string()),
    })?;
    parse(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.fork.trim().is_empty() {
        return Err(Error::ConfigParse {
            message: "fork identifier is empty".to_string(),
            hint: Some("set `fork:` to the name embedded in marker commits".to_string()),
        });
    }
    if !(0.0..=1.0).contains(&config.min_fuzz) {
        return Err(Error::ConfigParse {
            message: format!("min_fuzz {} is out of range", config.min_fuzz),
            hint: Some("min_fuzz must be a fraction between 0 and 1".to_string()),
        });
    }
    if config.move_failed_to_rejects && config.rejects.is_none() {
        return Err(Error::ConfigParse {
            message: "move_failed_to_rejects is set but no rejects directory is configured"
                .to_string(),
            hint: Some("add `rejects: <dir>` next to the patch directories".to_string()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
fork: Example
upstream:
  url: https://github.com/example/upstream.git
  ref: main
work_dir: work/source
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.fork, "Example");
        assert_eq!(config.upstream.r#ref, "main");
        assert_eq!(config.work_dir, PathBuf::from("work/source"));
        // defaults
        assert!(config.filter_patches);
        assert_eq!(config.strategy, FileStrategy::Fuzzy);
        assert_eq!(config.min_fuzz, DEFAULT_MIN_FUZZ);
        assert_eq!(config.remote_name, "old");
        assert!(config.patch_dir(Layer::Base).is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
fork: Example
upstream:
  url: ../upstream
  ref: v1.21
work_dir: work/source
patches:
  base: patches/base
  file: patches/file
  feature: patches/feature
rejects: rejects
strategy: git
move_failed_to_rejects: true
filter_patches: false
min_fuzz: 0.72
additional_remote: https://github.com/example/old.git
remote_name: ancient
"#;
        let config = parse(yaml).unwrap();
        assert_eq!(config.strategy, FileStrategy::Git);
        assert!(config.move_failed_to_rejects);
        assert!(!config.filter_patches);
        assert_eq!(config.min_fuzz, 0.72);
        assert_eq!(config.remote_name, "ancient");
        assert_eq!(
            config.patch_dir(Layer::Feature),
            Some(Path::new("patches/feature"))
        );
    }

    #[test]
    fn test_parse_rejects_empty_fork() {
        let yaml = MINIMAL.replace("Example", "  ");
        let err = parse(&yaml).unwrap_err();
        assert!(format!("{}", err).contains("fork identifier is empty"));
    }

    #[test]
    fn test_parse_rejects_min_fuzz_out_of_range() {
        let yaml = format!("{}min_fuzz: 1.5\n", MINIMAL);
        let err = parse(&yaml).unwrap_err();
        assert!(format!("{}", err).contains("out of range"));
    }

    #[test]
    fn test_parse_rejects_reject_routing_without_dir() {
        let yaml = format!("{}move_failed_to_rejects: true\n", MINIMAL);
        let err = parse(&yaml).unwrap_err();
        assert!(format!("{}", err).contains("rejects directory"));
    }

    #[test]
    fn test_parse_rejects_unknown_strategy() {
        let yaml = format!("{}strategy: quantum\n", MINIMAL);
        let err = parse(&yaml).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_from_file_missing_path_has_hint() {
        let err = from_file(Path::new("/nonexistent/.patchstack.yaml")).unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("cannot read"));
        assert!(display.contains("hint:"));
    }
}
