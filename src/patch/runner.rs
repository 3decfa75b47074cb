//! Running an ordered rule list against the files it targets

use super::atomic::{load, write_atomic};
use super::backup::BackupStore;
use super::error::PatchError;
use super::rule::{Applied, Rule, RuleStatus, apply_rule};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// One rule application, as reported to the user
#[derive(Debug, Clone, Serialize)]
pub struct PatchResult {
    pub rule_name: String,
    pub file_path: PathBuf,
    pub changed: bool,
    pub status: RuleStatus,
    pub matches: usize,
    pub before_snippet: Option<String>,
    pub after_snippet: Option<String>,
    /// Warning or error text
    pub message: Option<String>,
}

impl PatchResult {
    fn without_run(rule: &Rule, status: RuleStatus, message: Option<String>) -> Self {
        Self {
            rule_name: rule.name().to_string(),
            file_path: rule.file().to_path_buf(),
            changed: false,
            status,
            matches: 0,
            before_snippet: None,
            after_snippet: None,
            message,
        }
    }
}

/// Final state of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    Patched,
    AlreadySatisfied,
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Patched => "patched",
            FileStatus::AlreadySatisfied => "already-satisfied",
            FileStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-file line of the summary
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    /// Whether the content differs from what was on disk (also set on dry runs)
    pub changed: bool,
    pub rules: usize,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub backup: Option<PathBuf>,
}

/// Everything one invocation did
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchRun {
    pub results: Vec<PatchResult>,
    pub files: Vec<FileReport>,
    pub dry_run: bool,
}

impl PatchRun {
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(|f| f.status == FileStatus::Failed)
    }

    pub fn has_changes(&self) -> bool {
        self.files.iter().any(|f| f.changed)
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &PatchResult> {
        self.results
            .iter()
            .filter(|r| r.status == RuleStatus::NotMatched)
    }

    /// 0 on full success, 1 if any file failed. A dry run that found
    /// pending changes also returns 1.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() || (self.dry_run && self.has_changes()) {
            1
        } else {
            0
        }
    }
}

/// Applies rules to files under a project root
#[derive(Debug, Clone)]
pub struct ConfigPatcher {
    root: PathBuf,
    backups: Option<BackupStore>,
    dry_run: bool,
}

impl ConfigPatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backups: None,
            dry_run: false,
        }
    }

    /// Copy every file into a backup store before rewriting it
    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backups = enabled.then(|| BackupStore::new(&self.root));
        self
    }

    /// Evaluate everything but never write
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Resolve a rule path against the project root
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        }
    }

    /// Apply `rules` in declared order. Each distinct file is loaded once
    /// and written at most once.
    pub fn run(&self, rules: &[Rule]) -> PatchRun {
        let mut run = PatchRun {
            dry_run: self.dry_run,
            ..Default::default()
        };

        for (file, file_rules) in group_by_file(rules) {
            let report = self.run_file(file, &file_rules, &mut run.results);
            run.files.push(report);
        }

        tracing::info!(
            files = run.files.len(),
            patched = run.count(FileStatus::Patched),
            failed = run.count(FileStatus::Failed),
            dry_run = self.dry_run,
            "patch run finished"
        );
        run
    }

    fn run_file(&self, file: &Path, rules: &[&Rule], results: &mut Vec<PatchResult>) -> FileReport {
        let full_path = self.resolve(file);
        let mut report = FileReport {
            path: file.to_path_buf(),
            status: FileStatus::AlreadySatisfied,
            changed: false,
            rules: rules.len(),
            error_kind: None,
            error: None,
            backup: None,
        };

        let original = match load(&full_path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %full_path.display(), error = %e, "cannot load file");
                for rule in rules {
                    results.push(PatchResult::without_run(
                        rule,
                        RuleStatus::Aborted,
                        Some(e.to_string()),
                    ));
                }
                fail(&mut report, &e);
                return report;
            }
        };

        let mut text = original.clone();
        for (idx, rule) in rules.iter().enumerate() {
            match apply_converged(&text, rule) {
                Ok(applied) => {
                    results.push(PatchResult {
                        rule_name: rule.name().to_string(),
                        file_path: file.to_path_buf(),
                        changed: applied.changed,
                        status: applied.status,
                        matches: applied.matches,
                        before_snippet: applied.before_snippet,
                        after_snippet: applied.after_snippet,
                        message: applied.warning.map(|w| w.to_string()),
                    });
                    text = applied.text;
                }
                Err(e) => {
                    tracing::warn!(rule = rule.name(), error = %e, "rule failed");
                    results.push(PatchResult::without_run(
                        rule,
                        RuleStatus::Failed,
                        Some(e.to_string()),
                    ));
                    for rest in &rules[idx + 1..] {
                        results.push(PatchResult::without_run(
                            rest,
                            RuleStatus::Aborted,
                            Some(format!("earlier rule '{}' failed", rule.name())),
                        ));
                    }
                    fail(&mut report, &e);
                    return report;
                }
            }
        }

        if text == original {
            return report;
        }
        report.changed = true;

        if self.dry_run {
            report.status = FileStatus::Patched;
            return report;
        }

        if let Some(ref store) = self.backups {
            match store.backup(&full_path) {
                Ok(backup) => report.backup = Some(backup),
                Err(e) => {
                    fail(&mut report, &e);
                    return report;
                }
            }
        }

        match write_atomic(&full_path, &text) {
            Ok(()) => {
                tracing::info!(path = %full_path.display(), "file patched");
                report.status = FileStatus::Patched;
            }
            Err(e) => {
                tracing::warn!(path = %full_path.display(), error = %e, "write failed");
                fail(&mut report, &e);
            }
        }
        report
    }
}

/// Apply `rule`, then apply it again to its own output. A rule whose second
/// pass still changes the text never converges and is rejected.
fn apply_converged(text: &str, rule: &Rule) -> Result<Applied, PatchError> {
    let applied = apply_rule(text, rule)?;
    if applied.changed && apply_rule(&applied.text, rule)?.changed {
        return Err(PatchError::NotIdempotent {
            rule: rule.name().to_string(),
        });
    }
    Ok(applied)
}

fn fail(report: &mut FileReport, err: &PatchError) {
    report.status = FileStatus::Failed;
    report.error_kind = Some(err.kind().to_string());
    report.error = Some(err.to_string());
}

/// Group rules by target file, keeping first-appearance order of files and
/// declaration order within each file
fn group_by_file(rules: &[Rule]) -> Vec<(&Path, Vec<&Rule>)> {
    let mut groups: Vec<(&Path, Vec<&Rule>)> = Vec::new();
    for rule in rules {
        match groups.iter_mut().find(|(file, _)| *file == rule.file()) {
            Some((_, members)) => members.push(rule),
            None => groups.push((rule.file(), vec![rule])),
        }
    }
    groups
}
