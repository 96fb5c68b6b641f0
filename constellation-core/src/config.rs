//! Constellation configuration and on-disk layout.
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   constellation.yaml            (optional; every field has a default)
//!   <star>-model/scripts/*        (candidate sources)
//!   <hub>/
//!     scripts/                    (deployment target)
//!     signals/scripts_status.json (status record)
//!     seeds/                      (harvested seed registries)
//!     .constellation/
//!       manifest.json             (deploy manifest)
//!       backups/<id>/             (timestamped snapshots)
//! ```
//!
//! # API pattern
//!
//! Loading takes the root explicitly (`load_at(root, …)`); tests pass a
//! `TempDir` and never depend on the process working directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Default file name looked up at the constellation root.
pub const CONFIG_FILE_NAME: &str = "constellation.yaml";

// ---------------------------------------------------------------------------
// 1. Config document
// ---------------------------------------------------------------------------

/// Parsed `constellation.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory name of the hub repository under the root.
    pub hub: String,
    /// Suffix that marks a directory as a star (e.g. `launch-model`).
    pub module_suffix: String,
    /// Designated sub-directory holding a star's scripts.
    pub scripts_dir: String,
    /// File names in the target that are never sourced, removed or overwritten.
    pub core_utilities: Vec<String>,
    /// Extensions (without the dot) that receive the execute bit on deploy.
    pub executable_extensions: Vec<String>,
    /// Hub-relative directory for the manifest and backups.
    pub state_dir: PathBuf,
    /// Hub-relative location of the status record.
    pub status_path: PathBuf,
    /// Default retention window for `restore clean`.
    pub retention_days: u32,
    /// Stars above this size are flagged by `monitor-size`.
    pub size_warn_bytes: u64,
    pub seeds: SeedsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub: "hub".to_string(),
            module_suffix: "-model".to_string(),
            scripts_dir: "scripts".to_string(),
            core_utilities: ["README.md", "aggregate.sh", "restore.sh", "validate.sh"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            executable_extensions: ["sh", "bash", "py"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            state_dir: PathBuf::from(".constellation"),
            status_path: PathBuf::from("signals").join("scripts_status.json"),
            retention_days: 30,
            size_warn_bytes: 50 * 1024 * 1024,
            seeds: SeedsConfig::default(),
        }
    }
}

/// Seed registry harvesting settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedsConfig {
    /// Star-relative directory holding seed files.
    pub dir: String,
    /// Seed file names to harvest from every star.
    pub files: Vec<String>,
    /// Hub-relative output directory.
    pub output_dir: PathBuf,
}

impl Default for SeedsConfig {
    fn default() -> Self {
        Self {
            dir: "seeds".to_string(),
            files: vec!["glossary.yml".to_string(), "tags.yml".to_string()],
            output_dir: PathBuf::from("seeds"),
        }
    }
}

impl Config {
    /// `true` for names on the core-utility allow-list.
    pub fn is_exempt(&self, name: &str) -> bool {
        self.core_utilities.iter().any(|u| u == name)
    }

    /// `true` when the file name's extension marks it as an executable script.
    pub fn is_executable_name(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.executable_extensions
                    .iter()
                    .any(|x| x.eq_ignore_ascii_case(ext))
            })
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the configuration for the constellation at `root`.
///
/// With `explicit = Some(path)` the file must exist. Otherwise
/// `<root>/constellation.yaml` is used when present and defaults apply when
/// it is absent. Returns `ConfigError::Parse` (with path + line context) if
/// the YAML is malformed.
pub fn load_at(root: &Path, explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if !root.is_dir() {
        return Err(ConfigError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            path.to_path_buf()
        }
        None => {
            let path = root.join(CONFIG_FILE_NAME);
            if !path.exists() {
                tracing::debug!(root = %root.display(), "no config file; using defaults");
                return Ok(Config::default());
            }
            path
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

// ---------------------------------------------------------------------------
// 3. Layout
// ---------------------------------------------------------------------------

/// Absolute paths derived from a root and its [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub hub_dir: PathBuf,
    /// The hub's scripts directory: the deployment target.
    pub target_dir: PathBuf,
    pub state_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub status_path: PathBuf,
    pub seeds_output_dir: PathBuf,
}

impl Layout {
    /// Resolve paths for `config` under `root`.
    ///
    /// The root and the hub directory must exist; the target and state
    /// directories are created lazily by the operations that write them.
    pub fn resolve(root: &Path, config: &Config) -> Result<Self, ConfigError> {
        if !root.is_dir() {
            return Err(ConfigError::RootNotFound {
                path: root.to_path_buf(),
            });
        }
        let hub_dir = root.join(&config.hub);
        if !hub_dir.is_dir() {
            return Err(ConfigError::HubNotFound { path: hub_dir });
        }
        let state_dir = hub_dir.join(&config.state_dir);
        Ok(Self {
            root: root.to_path_buf(),
            target_dir: hub_dir.join(&config.scripts_dir),
            backups_dir: state_dir.join("backups"),
            manifest_path: state_dir.join("manifest.json"),
            status_path: hub_dir.join(&config.status_path),
            seeds_output_dir: hub_dir.join(&config.seeds.output_dir),
            state_dir,
            hub_dir,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
