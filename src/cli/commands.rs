//! CLI command implementations

use super::output::{OutputEvent, OutputHandler};
use super::signals::{CancellationToken, setup_signal_handlers};
use crate::config::PatcherConfig;
use crate::fixsets::Catalogue;
use crate::patch::{BackupStore, ConfigPatcher, PatchRun};
use crate::process::run_followup;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every fix-set invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_dir: PathBuf,
    pub dry_run: bool,
    pub backup: bool,
    /// Command to run after a successful, non-dry run
    pub then: Option<String>,
}

/// Resolve a fix-set, apply it and report. Returns the process exit code.
///
/// Unknown fix-sets and invalid rules are errors; file problems are not,
/// they show up in the run and in the exit code.
pub async fn run_fixset(
    name: &str,
    config: &PatcherConfig,
    opts: &RunOptions,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let catalogue = Catalogue::new(config);
    let rules = catalogue.resolve(name)?;

    handler.emit(OutputEvent::RunStart {
        fixset: name.to_string(),
        rules: rules.len(),
        dry_run: opts.dry_run,
    });

    let patcher = ConfigPatcher::new(&opts.project_dir)
        .with_backups(opts.backup)
        .dry_run(opts.dry_run);
    let run = patcher.run(&rules);
    report_run(&run, handler);

    let mut exit_code = run.exit_code();
    if let Some(ref command) = opts.then {
        if opts.dry_run {
            handler.emit(OutputEvent::Info {
                message: format!("dry run: not running '{}'", command),
            });
        } else if run.has_failures() {
            handler.emit(OutputEvent::Warn {
                message: format!("patching failed, not running '{}'", command),
            });
        } else {
            let timeout = Duration::from_secs(config.defaults.followup_timeout);
            exit_code = exit_code.max(followup(command, &opts.project_dir, timeout, handler).await);
        }
    }

    Ok(exit_code)
}

fn report_run(run: &PatchRun, handler: &dyn OutputHandler) {
    for result in &run.results {
        handler.emit(OutputEvent::RuleResult {
            result: result.clone(),
        });
    }
    for report in &run.files {
        handler.emit(OutputEvent::FileResult {
            report: report.clone(),
        });
    }
    handler.summary(run);
}

/// Run the follow-up command and return its exit code.
///
/// Spawn failures, timeouts and interruptions count as 1.
pub async fn followup(
    command: &str,
    working_dir: &Path,
    timeout: Duration,
    handler: &dyn OutputHandler,
) -> i32 {
    handler.emit(OutputEvent::FollowupStart {
        command: command.to_string(),
    });

    let token = CancellationToken::new();
    let signals = tokio::spawn(setup_signal_handlers(token.clone()));
    let timeout = (!timeout.is_zero()).then_some(timeout);
    let outcome = run_followup(command, working_dir, timeout, token).await;
    signals.abort();

    match outcome {
        Ok(result) => {
            handler.emit(OutputEvent::FollowupComplete {
                command: command.to_string(),
                success: result.success,
                exit_code: result.exit_code,
                duration_ms: result.duration.as_millis() as u64,
                output: (!result.success).then(|| result.combined_output()),
            });
            if result.success {
                0
            } else {
                result.exit_code.filter(|c| *c != 0).unwrap_or(1)
            }
        }
        Err(e) => {
            handler.emit(OutputEvent::Warn {
                message: e.to_string(),
            });
            1
        }
    }
}

/// List built-in and configured fix-sets
pub fn list(config: &PatcherConfig, handler: &dyn OutputHandler) -> i32 {
    let catalogue = Catalogue::new(config);
    handler.listing(&catalogue.describe());
    0
}

/// Put the newest backup of `file` back in place
pub fn restore(project_dir: &Path, file: &Path, handler: &dyn OutputHandler) -> i32 {
    let store = BackupStore::new(project_dir);
    let path = if file.is_absolute() {
        file.to_path_buf()
    } else {
        project_dir.join(file)
    };

    match store.restore(&path) {
        Ok(restored) => {
            if !restored.backup_removed {
                handler.emit(OutputEvent::Warn {
                    message: format!(
                        "backup {} was restored but could not be removed",
                        restored.backup_path.display()
                    ),
                });
            }
            handler.emit(OutputEvent::Restored {
                path: restored.path,
                backup: restored.backup_path,
            });
            0
        }
        Err(e) => {
            handler.emit(OutputEvent::Warn {
                message: e.to_string(),
            });
            1
        }
    }
}
