//! User-defined fix-sets

use super::error::ConfigError;
use crate::patch::{Guard, Replacement, Rule};
use crate::template::{TemplateContext, TemplateEngine};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// A named, ordered list of rules
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FixSetConfig {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// One rule as written in TOML. Every string field is a template.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// Rule name (unique within the fix-set)
    pub name: String,

    /// Target file
    pub file: String,

    /// Regex matcher; for `insert_after` rules, the anchor
    pub pattern: String,

    /// Replacement template (`$1`, `${name}` expand captures)
    pub replace: Option<String>,

    /// Text inserted after the single anchor match
    pub insert_after: Option<String>,

    /// Guard
    pub when: Option<GuardConfig>,

    #[serde(default)]
    pub description: String,
}

/// Guard clauses; all present clauses must hold
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    pub contains: Option<String>,
    pub lacks: Option<String>,
    pub matches: Option<String>,
    pub lacks_match: Option<String>,
}

impl GuardConfig {
    fn is_empty(&self) -> bool {
        self.contains.is_none()
            && self.lacks.is_none()
            && self.matches.is_none()
            && self.lacks_match.is_none()
    }
}

impl FixSetConfig {
    /// Validate structure before any template is rendered
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        if self.rules.is_empty() {
            errors.push("fix-set has no rules".to_string());
        }

        for rule in &self.rules {
            if rule.name.is_empty() {
                errors.push("rule with empty name".to_string());
            } else if !seen.insert(rule.name.as_str()) {
                errors.push(format!("duplicate rule name '{}'", rule.name));
            }

            if rule.file.trim().is_empty() {
                errors.push(format!("rule '{}': file is empty", rule.name));
            }

            match (&rule.replace, &rule.insert_after) {
                (Some(_), Some(_)) => errors.push(format!(
                    "rule '{}': set either 'replace' or 'insert_after', not both",
                    rule.name
                )),
                (None, None) => errors.push(format!(
                    "rule '{}': needs 'replace' or 'insert_after'",
                    rule.name
                )),
                (None, Some(_)) => {
                    if rule.when.as_ref().map(|w| w.is_empty()).unwrap_or(true) {
                        errors.push(format!(
                            "rule '{}': insert_after needs a 'when' guard to stay idempotent",
                            rule.name
                        ));
                    }
                }
                (Some(_), None) => {}
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Render templates and compile matchers into rules
    pub fn compile(
        &self,
        name: &str,
        engine: &TemplateEngine,
        ctx: &TemplateContext,
    ) -> Result<Vec<Rule>, ConfigError> {
        self.validate().map_err(|errors| ConfigError::InvalidFixSet {
            name: name.to_string(),
            errors,
        })?;

        self.rules
            .iter()
            .map(|rule| rule.compile(engine, ctx))
            .collect()
    }
}

impl RuleConfig {
    fn compile(&self, engine: &TemplateEngine, ctx: &TemplateContext) -> Result<Rule, ConfigError> {
        let render = |template: &str| {
            engine
                .render(template, ctx)
                .map_err(|source| ConfigError::Template {
                    rule: self.name.clone(),
                    source,
                })
        };
        let regex = |pattern: &str| {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                rule: self.name.clone(),
                source,
            })
        };

        let file = PathBuf::from(render(&self.file)?);
        let matcher = regex(&render(&self.pattern)?)?;

        let replacement = match (&self.replace, &self.insert_after) {
            (Some(template), None) => Replacement::Template(render(template)?),
            (None, Some(text)) => Replacement::InsertAfter(render(text)?),
            // validate() rules out the other combinations
            _ => {
                return Err(ConfigError::InvalidRule {
                    rule: self.name.clone(),
                    message: "needs exactly one of 'replace' or 'insert_after'".to_string(),
                });
            }
        };

        let mut guards = Vec::new();
        if let Some(ref when) = self.when {
            if let Some(ref s) = when.contains {
                guards.push(Guard::Contains(render(s)?));
            }
            if let Some(ref s) = when.lacks {
                guards.push(Guard::Lacks(render(s)?));
            }
            if let Some(ref s) = when.matches {
                guards.push(Guard::Matches(regex(&render(s)?)?));
            }
            if let Some(ref s) = when.lacks_match {
                guards.push(Guard::LacksMatch(regex(&render(s)?)?));
            }
        }
        let guard = match guards.len() {
            0 => Guard::Always,
            1 => guards.remove(0),
            _ => Guard::All(guards),
        };

        let mut rule = Rule::new(&self.name, file, matcher, replacement).when(guard);
        if !self.description.is_empty() {
            rule = rule.describe(&self.description);
        }
        Ok(rule)
    }
}
