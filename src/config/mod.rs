//! Configuration types and loading for cfgpatch

mod error;
mod fixset;
mod loader;

pub use error::ConfigError;
pub use fixset::FixSetConfig;
pub use loader::{Defaults, Paths, PatcherConfig, expand};

#[cfg(test)]
pub use fixset::{GuardConfig, RuleConfig};
