//! Constellation core library — domain types, configuration, discovery, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs
//! - [`error`] — [`ConfigError`]
//! - [`config`] — `constellation.yaml` loading and [`Layout`] resolution
//! - [`discovery`] — candidate source directories

pub mod config;
pub mod discovery;
pub mod error;
pub mod types;

pub use config::{Config, Layout, SeedsConfig};
pub use discovery::{discover, discover_with_config, CandidatePredicate, ModuleConvention};
pub use error::ConfigError;
pub use types::{Candidate, Fingerprint, OriginId, SourceEntry, NATIVE_ORIGIN};
