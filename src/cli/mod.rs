//! CLI module for cfgpatch
//!
//! This module provides:
//! - Command implementations (fix-sets, list, restore)
//! - Output handlers (console, JSON, quiet)
//! - Ctrl-C handling for the follow-up command
//!
//! # Example
//!
//! ```ignore
//! use cfgpatch::cli::{commands, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! let exit_code = commands::run_fixset("cpp14", &config, &opts, &*handler).await?;
//! ```

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{RunOptions, list, restore, run_fixset};
pub use output::{OutputMode, create_handler};
