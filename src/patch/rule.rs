//! Rules: a matcher, a replacement and an explicit guard
//!
//! A rule never looks at anything but the text it is given, so applying it
//! is a pure function of the current file content. Guards (`applies_when`)
//! are kept apart from the substitution so they can be tested on their own.

use super::error::PatchError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest before/after excerpt kept in a result
const SNIPPET_MAX_CHARS: usize = 96;

/// Replacement computed from a single match
pub type ReplaceFn = Arc<dyn Fn(&Captures<'_>) -> String + Send + Sync>;

/// Predicate over the current file content deciding whether a rule runs
#[derive(Debug, Clone)]
pub enum Guard {
    Always,
    /// Text contains the literal
    Contains(String),
    /// Text does not contain the literal
    Lacks(String),
    /// Regex matches somewhere in the text
    Matches(Regex),
    /// Regex matches nowhere in the text
    LacksMatch(Regex),
    /// Every inner guard holds
    All(Vec<Guard>),
}

impl Guard {
    /// Evaluate the guard against `text`
    pub fn holds(&self, text: &str) -> bool {
        match self {
            Guard::Always => true,
            Guard::Contains(needle) => text.contains(needle.as_str()),
            Guard::Lacks(needle) => !text.contains(needle.as_str()),
            Guard::Matches(re) => re.is_match(text),
            Guard::LacksMatch(re) => !re.is_match(text),
            Guard::All(guards) => guards.iter().all(|g| g.holds(text)),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Always => write!(f, "always"),
            Guard::Contains(s) => write!(f, "contains {:?}", s),
            Guard::Lacks(s) => write!(f, "lacks {:?}", s),
            Guard::Matches(re) => write!(f, "matches /{}/", re.as_str()),
            Guard::LacksMatch(re) => write!(f, "lacks match /{}/", re.as_str()),
            Guard::All(guards) => {
                let parts: Vec<String> = guards.iter().map(|g| g.to_string()).collect();
                write!(f, "{}", parts.join(" and "))
            }
        }
    }
}

/// How matched text is rewritten
#[derive(Clone)]
pub enum Replacement {
    /// Regex expansion template (`$1`, `${name}`), applied to every match
    Template(String),
    /// Computed per match
    With(ReplaceFn),
    /// Inserted right after the single match of the matcher
    InsertAfter(String),
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Replacement::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Replacement::With(_) => f.write_str("With(<fn>)"),
            Replacement::InsertAfter(t) => f.debug_tuple("InsertAfter").field(t).finish(),
        }
    }
}

/// A named transformation targeting one file
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    file: PathBuf,
    matcher: Regex,
    replacement: Replacement,
    applies_when: Guard,
    description: Option<String>,
}

impl Rule {
    /// Replace every match of `pattern` using a regex expansion template
    pub fn replace(
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        pattern: &str,
        template: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self::new(
            name,
            file,
            Regex::new(pattern)?,
            Replacement::Template(template.into()),
        ))
    }

    /// Replace every match of `pattern` with the output of `f`
    pub fn replace_with<F>(
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        pattern: &str,
        f: F,
    ) -> Result<Self, regex::Error>
    where
        F: Fn(&Captures<'_>) -> String + Send + Sync + 'static,
    {
        Ok(Self::new(
            name,
            file,
            Regex::new(pattern)?,
            Replacement::With(Arc::new(f)),
        ))
    }

    /// Insert `text` after the one place `anchor` matches.
    ///
    /// Insertion is only idempotent behind a guard, so one is required here.
    pub fn insert_after(
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        anchor: &str,
        text: impl Into<String>,
        guard: Guard,
    ) -> Result<Self, regex::Error> {
        Ok(Self::new(
            name,
            file,
            Regex::new(anchor)?,
            Replacement::InsertAfter(text.into()),
        )
        .when(guard))
    }

    pub fn new(
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        matcher: Regex,
        replacement: Replacement,
    ) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            matcher,
            replacement,
            applies_when: Guard::Always,
            description: None,
        }
    }

    /// Set the guard
    pub fn when(mut self, guard: Guard) -> Self {
        self.applies_when = guard;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn applies_when(&self) -> &Guard {
        &self.applies_when
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Outcome of one rule against one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    /// Content was rewritten
    Changed,
    /// Matched, but the content already had the target value
    Satisfied,
    /// Guard did not hold
    Skipped,
    /// Guard held but the matcher found nothing
    NotMatched,
    /// Rule raised an error
    Failed,
    /// Not run because an earlier rule on the same file failed
    Aborted,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleStatus::Changed => "changed",
            RuleStatus::Satisfied => "satisfied",
            RuleStatus::Skipped => "skipped",
            RuleStatus::NotMatched => "not matched",
            RuleStatus::Failed => "failed",
            RuleStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Text produced by [`apply_rule`] plus what happened
#[derive(Debug)]
pub struct Applied {
    pub text: String,
    pub changed: bool,
    pub status: RuleStatus,
    pub matches: usize,
    pub before_snippet: Option<String>,
    pub after_snippet: Option<String>,
    pub warning: Option<PatchError>,
}

impl Applied {
    fn untouched(text: &str, status: RuleStatus, matches: usize) -> Self {
        Self {
            text: text.to_string(),
            changed: false,
            status,
            matches,
            before_snippet: None,
            after_snippet: None,
            warning: None,
        }
    }
}

/// Apply a single rule to `text`.
///
/// Returns an error only for anchor problems on insertion rules; an
/// unmatched pattern is a warning carried in [`Applied::warning`].
pub fn apply_rule(text: &str, rule: &Rule) -> Result<Applied, PatchError> {
    if !rule.applies_when.holds(text) {
        tracing::debug!(rule = %rule.name, guard = %rule.applies_when, "guard not satisfied");
        return Ok(Applied::untouched(text, RuleStatus::Skipped, 0));
    }

    match &rule.replacement {
        Replacement::Template(template) => Ok(finish(
            text,
            rule,
            substitute(text, &rule.matcher, |caps| {
                let mut out = String::new();
                caps.expand(template, &mut out);
                out
            }),
        )),
        Replacement::With(f) => Ok(finish(
            text,
            rule,
            substitute(text, &rule.matcher, |caps| f(caps)),
        )),
        Replacement::InsertAfter(insert) => insert_after_anchor(text, rule, insert),
    }
}

struct Substitution {
    text: String,
    matches: usize,
    first_change: Option<(String, String)>,
    first_match: Option<String>,
}

fn substitute<F>(text: &str, re: &Regex, mut replace: F) -> Substitution
where
    F: FnMut(&Captures<'_>) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut matches = 0;
    let mut first_change = None;
    let mut first_match = None;

    for caps in re.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        matches += 1;
        let replacement = replace(&caps);
        if first_match.is_none() {
            first_match = Some(m.as_str().to_string());
        }
        if first_change.is_none() && replacement != m.as_str() {
            first_change = Some((m.as_str().to_string(), replacement.clone()));
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(&replacement);
        last = m.end();
    }
    out.push_str(&text[last..]);

    Substitution {
        text: out,
        matches,
        first_change,
        first_match,
    }
}

fn finish(original: &str, rule: &Rule, sub: Substitution) -> Applied {
    if sub.matches == 0 {
        tracing::warn!(rule = %rule.name, pattern = %rule.matcher.as_str(), "pattern not matched");
        let mut applied = Applied::untouched(original, RuleStatus::NotMatched, 0);
        applied.warning = Some(PatchError::PatternNotMatched {
            rule: rule.name.clone(),
            pattern: rule.matcher.as_str().to_string(),
        });
        return applied;
    }

    let changed = sub.text != original;
    let (before, after) = match sub.first_change {
        Some((before, after)) => (before, after),
        None => {
            let current = sub.first_match.unwrap_or_default();
            (current.clone(), current)
        }
    };

    tracing::debug!(rule = %rule.name, matches = sub.matches, changed, "rule applied");

    Applied {
        text: sub.text,
        changed,
        status: if changed {
            RuleStatus::Changed
        } else {
            RuleStatus::Satisfied
        },
        matches: sub.matches,
        before_snippet: Some(snippet(&before)),
        after_snippet: Some(snippet(&after)),
        warning: None,
    }
}

fn insert_after_anchor(text: &str, rule: &Rule, insert: &str) -> Result<Applied, PatchError> {
    let found: Vec<_> = rule.matcher.find_iter(text).collect();
    let anchor = match found.as_slice() {
        [] => {
            return Err(PatchError::AnchorNotFound {
                rule: rule.name.clone(),
                anchor: rule.matcher.as_str().to_string(),
            });
        }
        [single] => *single,
        many => {
            return Err(PatchError::AnchorAmbiguous {
                rule: rule.name.clone(),
                anchor: rule.matcher.as_str().to_string(),
                count: many.len(),
            });
        }
    };

    let mut out = String::with_capacity(text.len() + insert.len());
    out.push_str(&text[..anchor.end()]);
    out.push_str(insert);
    out.push_str(&text[anchor.end()..]);

    let changed = out != text;
    tracing::debug!(rule = %rule.name, changed, "inserted after anchor");

    Ok(Applied {
        text: out,
        changed,
        status: if changed {
            RuleStatus::Changed
        } else {
            RuleStatus::Satisfied
        },
        matches: 1,
        before_snippet: Some(snippet(anchor.as_str())),
        after_snippet: Some(snippet(&format!("{}{}", anchor.as_str(), insert))),
        warning: None,
    })
}

/// Single-line, length-capped excerpt for reports
pub fn snippet(s: &str) -> String {
    let flat = s.trim().replace('\n', "\\n").replace('\t', " ");
    if flat.chars().count() <= SNIPPET_MAX_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_MAX_CHARS - 3).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform_rule() -> Rule {
        Rule::replace(
            "podfile-platform",
            "ios/Podfile",
            r"platform :ios, '[^']*'",
            "platform :ios, '15.0'",
        )
        .unwrap()
    }

    #[test]
    fn test_platform_rule_changes_then_converges() {
        let text = "platform :ios, '13.0'\ntarget 'Runner' do\nend\n";
        let first = apply_rule(text, &platform_rule()).unwrap();
        assert!(first.changed);
        assert_eq!(first.status, RuleStatus::Changed);
        assert!(first.text.contains("platform :ios, '15.0'"));
        assert_eq!(first.before_snippet.as_deref(), Some("platform :ios, '13.0'"));
        assert_eq!(first.after_snippet.as_deref(), Some("platform :ios, '15.0'"));

        let second = apply_rule(&first.text, &platform_rule()).unwrap();
        assert!(!second.changed);
        assert_eq!(second.status, RuleStatus::Satisfied);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn test_same_value_in_three_places_is_fully_satisfied() {
        let text = "\
\t\tIPHONEOS_DEPLOYMENT_TARGET = 15.0;
\t\tSDKROOT = iphoneos;
\t\tIPHONEOS_DEPLOYMENT_TARGET = 15.0;
\t\tIPHONEOS_DEPLOYMENT_TARGET = 15.0;
";
        let rule = Rule::replace(
            "pbxproj-deployment-target",
            "project.pbxproj",
            r"IPHONEOS_DEPLOYMENT_TARGET = [^;]+;",
            "IPHONEOS_DEPLOYMENT_TARGET = 15.0;",
        )
        .unwrap();

        let applied = apply_rule(text, &rule).unwrap();
        assert!(!applied.changed);
        assert_eq!(applied.status, RuleStatus::Satisfied);
        assert_eq!(applied.matches, 3);
        assert_eq!(applied.text, text);
    }

    #[test]
    fn test_capture_template_expansion() {
        let rule = Rule::replace(
            "cxx",
            "ios/Podfile",
            r"(config\.build_settings\['CLANG_CXX_LANGUAGE_STANDARD'\] = )'[^']*'",
            "${1}'c++14'",
        )
        .unwrap();
        let text = "      config.build_settings['CLANG_CXX_LANGUAGE_STANDARD'] = 'gnu++0x'\n";
        let applied = apply_rule(text, &rule).unwrap();
        assert_eq!(
            applied.text,
            "      config.build_settings['CLANG_CXX_LANGUAGE_STANDARD'] = 'c++14'\n"
        );
    }

    #[test]
    fn test_unmatched_pattern_is_a_warning() {
        let applied = apply_rule("target 'Runner' do\nend\n", &platform_rule()).unwrap();
        assert_eq!(applied.status, RuleStatus::NotMatched);
        assert!(!applied.changed);
        assert!(matches!(
            applied.warning,
            Some(PatchError::PatternNotMatched { .. })
        ));
    }

    #[test]
    fn test_guard_false_skips_without_touching() {
        let rule = platform_rule().when(Guard::Contains("use_frameworks!".into()));
        let text = "platform :ios, '13.0'\n";
        let applied = apply_rule(text, &rule).unwrap();
        assert_eq!(applied.status, RuleStatus::Skipped);
        assert_eq!(applied.text, text);
    }

    #[test]
    fn test_guards_evaluate_independently() {
        let text = "SDKROOT = iphoneos;\nXSDKROOT = other;\n";
        assert!(Guard::Always.holds(text));
        assert!(Guard::Contains("SDKROOT".into()).holds(text));
        assert!(!Guard::Lacks("iphoneos".into()).holds(text));
        assert!(Guard::Matches(Regex::new(r"(?m)^XSDKROOT").unwrap()).holds(text));
        assert!(Guard::LacksMatch(Regex::new(r"(?m)^VALIDATE_PRODUCT").unwrap()).holds(text));
        assert!(
            !Guard::All(vec![
                Guard::Contains("SDKROOT".into()),
                Guard::Lacks("XSDKROOT".into()),
            ])
            .holds(text)
        );
    }

    #[test]
    fn test_insert_after_single_anchor() {
        let rule = Rule::insert_after(
            "cxx-insert",
            "ios/Podfile",
            r"config\.build_settings\['SWIFT_VERSION'\] = '5\.0'",
            "\n      config.build_settings['CLANG_CXX_LIBRARY'] = 'libc++'",
            Guard::Lacks("CLANG_CXX_LIBRARY".into()),
        )
        .unwrap();
        let text = "      config.build_settings['SWIFT_VERSION'] = '5.0'\n    end\n";

        let first = apply_rule(text, &rule).unwrap();
        assert!(first.changed);
        assert_eq!(
            first.text,
            "      config.build_settings['SWIFT_VERSION'] = '5.0'\n      config.build_settings['CLANG_CXX_LIBRARY'] = 'libc++'\n    end\n"
        );

        let second = apply_rule(&first.text, &rule).unwrap();
        assert_eq!(second.status, RuleStatus::Skipped);
        assert_eq!(second.text, first.text);
    }

    #[test]
    fn test_insert_after_missing_anchor_is_an_error() {
        let rule = Rule::insert_after(
            "cxx-insert",
            "ios/Podfile",
            r"SWIFT_VERSION",
            "\nX",
            Guard::Lacks("X".into()),
        )
        .unwrap();
        let err = apply_rule("nothing here\n", &rule).unwrap_err();
        assert!(matches!(err, PatchError::AnchorNotFound { .. }));
    }

    #[test]
    fn test_insert_after_duplicate_anchor_is_an_error() {
        let rule = Rule::insert_after(
            "cxx-insert",
            "ios/Podfile",
            r"SWIFT_VERSION",
            "\nX",
            Guard::Lacks("X".into()),
        )
        .unwrap();
        let err = apply_rule("SWIFT_VERSION\nSWIFT_VERSION\n", &rule).unwrap_err();
        assert!(matches!(err, PatchError::AnchorAmbiguous { count: 2, .. }));
    }

    #[test]
    fn test_replace_with_function() {
        let rule = Rule::replace_with("upper", "f", r"key = (\w+);", |caps| {
            format!("key = {};", caps[1].to_uppercase())
        })
        .unwrap();
        let applied = apply_rule("key = abc;\nkey = DEF;\n", &rule).unwrap();
        assert_eq!(applied.text, "key = ABC;\nkey = DEF;\n");
        assert_eq!(applied.matches, 2);
        assert_eq!(applied.before_snippet.as_deref(), Some("key = abc;"));
    }

    #[test]
    fn test_snippet_flattens_and_truncates() {
        assert_eq!(snippet("a\n\tb"), "a\\n b");
        let long = "x".repeat(200);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_MAX_CHARS);
        assert!(s.ends_with("..."));
    }
}
