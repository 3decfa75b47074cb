//! Rule engine for cfgpatch
//!
//! This module handles:
//! - Rules: matcher, replacement and an explicit `applies_when` guard
//! - Applying rules to text as a pure function of that text
//! - Loading target files and replacing them atomically
//! - Backups before writes, and restoring from them
//! - Running a rule list file by file into a [`PatchRun`]
//!
//! # Example
//!
//! ```ignore
//! use cfgpatch::patch::{ConfigPatcher, Rule};
//!
//! let rule = Rule::replace(
//!     "podfile-platform",
//!     "ios/Podfile",
//!     r"platform :ios, '[^']*'",
//!     "platform :ios, '15.0'",
//! )?;
//!
//! let run = ConfigPatcher::new(".").with_backups(true).run(&[rule]);
//! std::process::exit(run.exit_code());
//! ```

mod atomic;
mod backup;
mod error;
mod rule;
mod runner;

pub use backup::BackupStore;
pub use rule::{Guard, Replacement, Rule, RuleStatus};
pub use runner::{ConfigPatcher, FileReport, FileStatus, PatchResult, PatchRun};

#[cfg(test)]
pub use error::PatchError;
#[cfg(test)]
pub use rule::apply_rule;
