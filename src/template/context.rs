//! Template context for variable resolution

use crate::config::{Defaults, Paths, PatcherConfig};
use minijinja::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// Values user rules can reference: `defaults.*`, `paths.*`, `vars.*`
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateContext {
    pub defaults: Defaults,
    pub paths: Paths,
    pub vars: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a loaded config, with `~` expanded in paths
    pub fn from_config(config: &PatcherConfig) -> Self {
        Self {
            defaults: config.defaults.clone(),
            paths: config.paths.expanded(),
            vars: config.vars.clone(),
        }
    }

    /// Convert to a minijinja Value for template rendering
    pub fn to_value(&self) -> Value {
        Value::from_serialize(self)
    }

    /// Dotted names of every variable, for error suggestions
    pub fn known_variables(&self) -> Vec<String> {
        let mut known: Vec<String> = [
            "defaults.ios_version",
            "defaults.c_standard",
            "defaults.cxx_standard",
            "defaults.xcode_version",
            "defaults.bundle_id",
            "defaults.backup",
            "defaults.followup_timeout",
            "paths.podfile",
            "paths.pbxproj",
            "paths.ci",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        known.extend(self.vars.keys().map(|k| format!("vars.{}", k)));
        known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_variables_include_vars() {
        let mut ctx = TemplateContext::new();
        ctx.vars.insert("team".into(), "ABC".into());
        let known = ctx.known_variables();
        assert!(known.contains(&"vars.team".to_string()));
        assert!(known.contains(&"defaults.ios_version".to_string()));
    }

    #[test]
    fn test_from_config_copies_values() {
        let mut config = PatcherConfig::default();
        config.defaults.ios_version = "16.0".into();
        config.vars.insert("flavor".into(), "prod".into());

        let ctx = TemplateContext::from_config(&config);
        assert_eq!(ctx.defaults.ios_version, "16.0");
        assert_eq!(ctx.vars["flavor"], "prod");
    }
}
