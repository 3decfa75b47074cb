//! Output handlers for CLI commands
//!
//! Progress goes to stderr, the final summary to stdout. Console mode
//! prints every rule outcome with its before/after excerpt followed by a
//! per-file table. JSON mode prints one object per event plus the full run.

use crate::fixsets::FixSetInfo;
use crate::patch::{FileReport, FileStatus, PatchResult, PatchRun, RuleStatus};
use serde::Serialize;
use std::path::PathBuf;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Events emitted while a fix-set runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    RunStart {
        fixset: String,
        rules: usize,
        dry_run: bool,
    },
    RuleResult {
        #[serde(flatten)]
        result: PatchResult,
    },
    FileResult {
        #[serde(flatten)]
        report: FileReport,
    },
    FollowupStart {
        command: String,
    },
    FollowupComplete {
        command: String,
        success: bool,
        exit_code: Option<i32>,
        duration_ms: u64,
        output: Option<String>,
    },
    Restored {
        path: PathBuf,
        backup: PathBuf,
    },
    Info {
        message: String,
    },
    Warn {
        message: String,
    },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    fn emit(&self, event: OutputEvent);

    /// Final summary of a run: rule outcomes and per-file status
    fn summary(&self, run: &PatchRun);

    /// Fix-set catalogue for `list`
    fn listing(&self, fixsets: &[FixSetInfo]);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn format_duration(ms: u64) -> String {
        if ms < 1000 {
            format!("{}ms", ms)
        } else {
            format!("{:.1}s", ms as f64 / 1000.0)
        }
    }
}

fn status_mark(status: RuleStatus) -> &'static str {
    match status {
        RuleStatus::Changed => "✓",
        RuleStatus::Satisfied => "=",
        RuleStatus::Skipped => "-",
        RuleStatus::NotMatched => "!",
        RuleStatus::Failed | RuleStatus::Aborted => "✗",
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::RunStart {
                fixset,
                rules,
                dry_run,
            } => {
                let mode = if dry_run { " (dry run)" } else { "" };
                eprintln!("Applying '{}' ({} rules){}", fixset, rules, mode);
            }
            // Outcomes are part of the summary; progress only under --debug
            OutputEvent::RuleResult { result } => {
                if self.debug {
                    eprintln!("  {} {}", result.rule_name, result.status);
                }
            }
            OutputEvent::FileResult { report } => {
                if let Some(ref err) = report.error {
                    eprintln!("✗ {}: {}", report.path.display(), err);
                }
            }
            OutputEvent::FollowupStart { command } => {
                eprintln!("Running '{}'...", command);
            }
            OutputEvent::FollowupComplete {
                command,
                success,
                exit_code,
                duration_ms,
                output,
            } => {
                if success {
                    eprintln!("✓ '{}' ({})", command, Self::format_duration(duration_ms));
                } else {
                    let code = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
                    eprintln!(
                        "✗ '{}' exited with {} ({})",
                        command,
                        code,
                        Self::format_duration(duration_ms)
                    );
                }
                if let Some(out) = output {
                    eprintln!("{}", out.trim_end());
                }
            }
            OutputEvent::Restored { path, backup } => {
                eprintln!("✓ restored {} from {}", path.display(), backup.display());
            }
            OutputEvent::Info { message } => eprintln!("{}", message),
            OutputEvent::Warn { message } => eprintln!("warning: {}", message),
        }
    }

    fn summary(&self, run: &PatchRun) {
        print!("{}", render_summary(run));
    }

    fn listing(&self, fixsets: &[FixSetInfo]) {
        print!("{}", render_listing(fixsets));
    }
}

/// One line per rule outcome, then a table with one row per file
pub fn render_summary(run: &PatchRun) -> String {
    let mut out = String::new();
    if run.files.is_empty() {
        out.push_str("(no files targeted)\n");
        return out;
    }

    for result in &run.results {
        out.push_str(&render_rule(result));
    }
    if !run.results.is_empty() {
        out.push('\n');
    }

    let width = run
        .files
        .iter()
        .map(|f| f.path.display().to_string().chars().count())
        .max()
        .unwrap_or(0)
        .max("FILE".len());

    out.push_str(&format!("{:<width$}  {:<17}  {:>5}  BACKUP\n", "FILE", "STATUS", "RULES"));
    for file in &run.files {
        let backup = file
            .backup
            .as_ref()
            .map(|b| b.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = match (file.status, run.dry_run && file.changed) {
            (FileStatus::Patched, true) => "would-patch".to_string(),
            (status, _) => status.to_string(),
        };
        out.push_str(&format!(
            "{:<width$}  {:<17}  {:>5}  {}\n",
            file.path.display().to_string(),
            status,
            file.rules,
            backup
        ));
    }

    let warnings = run.warnings().count();
    out.push_str(&format!(
        "\n{} patched, {} already satisfied, {} failed, {} warning{}\n",
        run.count(FileStatus::Patched),
        run.count(FileStatus::AlreadySatisfied),
        run.count(FileStatus::Failed),
        warnings,
        if warnings == 1 { "" } else { "s" }
    ));
    if run.dry_run {
        out.push_str("dry run: nothing was written\n");
    }
    out
}

fn render_rule(result: &PatchResult) -> String {
    let mut line = format!(
        "{} {} [{}] {}",
        status_mark(result.status),
        result.rule_name,
        result.file_path.display(),
        result.status
    );
    if result.changed {
        if let (Some(before), Some(after)) = (&result.before_snippet, &result.after_snippet) {
            line.push_str(&format!(": {} → {}", before, after));
        }
    }
    if let Some(ref msg) = result.message {
        line.push_str(&format!(" ({})", msg));
    }
    line.push('\n');
    line
}

/// Fix-set catalogue with the rules of each
pub fn render_listing(fixsets: &[FixSetInfo]) -> String {
    let width = fixsets
        .iter()
        .map(|f| f.name.len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for fixset in fixsets {
        let origin = if fixset.builtin { "" } else { " (config)" };
        out.push_str(&format!(
            "{:<width$}  {}{}\n",
            fixset.name, fixset.description, origin
        ));
        for rule in &fixset.rules {
            out.push_str(&format!(
                "{:<width$}    {} [{}]",
                "",
                rule.name,
                rule.file.display()
            ));
            if let Some(ref desc) = rule.description {
                out.push_str(&format!(": {}", desc));
            }
            out.push('\n');
        }
    }
    out
}

/// JSON output handler, one compact object per line
pub struct JsonHandler;

impl JsonHandler {
    fn print_json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::error!(error = %e, "cannot serialize output"),
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        self.print_json(&event);
    }

    fn summary(&self, run: &PatchRun) {
        #[derive(Serialize)]
        struct FinalResult<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            success: bool,
            exit_code: i32,
            #[serde(flatten)]
            run: &'a PatchRun,
        }

        self.print_json(&FinalResult {
            kind: "summary",
            success: !run.has_failures(),
            exit_code: run.exit_code(),
            run,
        });
    }

    fn listing(&self, fixsets: &[FixSetInfo]) {
        self.print_json(&fixsets);
    }
}

/// Quiet handler: the exit code is the only report
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}
    fn summary(&self, _run: &PatchRun) {}
    fn listing(&self, fixsets: &[FixSetInfo]) {
        // Listing is the point of the command, so names still print
        for fixset in fixsets {
            println!("{}", fixset.name);
        }
    }
}

pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
