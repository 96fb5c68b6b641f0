//! Error types for constellation-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving configuration and discovering sources.
///
/// Every variant is fatal: it is reported before any file is mutated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The constellation root directory does not exist.
    #[error("constellation root not found at {path}; pass --root <dir>")]
    RootNotFound { path: PathBuf },

    /// The hub directory named in the config does not exist under the root.
    #[error("hub directory not found at {path}; set `hub:` in constellation.yaml")]
    HubNotFound { path: PathBuf },

    /// An explicitly requested config file does not exist.
    #[error("config file not found at {path}")]
    ConfigNotFound { path: PathBuf },
}

/// Convenience constructor for [`ConfigError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
