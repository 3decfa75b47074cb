//! Built-in fix-sets and name resolution
//!
//! A fix-set is a named, ordered list of rules. The built-in ones repair
//! the iOS build settings of a Flutter project; user-defined ones come
//! from `[fixsets.*]` tables in the config.

mod builtin;

use crate::config::{ConfigError, PatcherConfig};
use crate::patch::Rule;
use crate::template::{TemplateContext, TemplateEngine, suggest_correction};
use std::fmt;
use std::path::PathBuf;

/// Quote a value the way project.pbxproj does.
///
/// Identifiers made of alphanumerics, `_`, `.` and `/` stay bare; anything
/// else is wrapped in double quotes with `"` and `\` escaped.
pub fn pbx_quote(value: &str) -> String {
    let bare = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/'));
    if bare {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Concrete values the built-in rules write
#[derive(Debug, Clone)]
pub struct FixParams {
    pub podfile: PathBuf,
    pub pbxproj: PathBuf,
    pub ci: PathBuf,
    pub ios_version: String,
    pub c_standard: String,
    pub cxx_standard: String,
    pub xcode_version: String,
    pub bundle_id: Option<String>,
}

impl FixParams {
    pub fn from_config(config: &PatcherConfig) -> Self {
        let paths = config.paths.expanded();
        Self {
            podfile: paths.podfile,
            pbxproj: paths.pbxproj,
            ci: paths.ci,
            ios_version: config.defaults.ios_version.clone(),
            c_standard: config.defaults.c_standard.clone(),
            cxx_standard: config.defaults.cxx_standard.clone(),
            xcode_version: config.defaults.xcode_version.clone(),
            bundle_id: config.defaults.bundle_id.clone(),
        }
    }
}

impl Default for FixParams {
    fn default() -> Self {
        Self::from_config(&PatcherConfig::default())
    }
}

/// The fix-sets shipped with cfgpatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFix {
    DeploymentTarget,
    Cpp14,
    C11,
    BundleId,
    TargetDevice,
    XcodeVersion,
    All,
}

impl BuiltinFix {
    pub const ALL: [BuiltinFix; 7] = [
        BuiltinFix::DeploymentTarget,
        BuiltinFix::Cpp14,
        BuiltinFix::C11,
        BuiltinFix::BundleId,
        BuiltinFix::TargetDevice,
        BuiltinFix::XcodeVersion,
        BuiltinFix::All,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFix::DeploymentTarget => "deployment-target",
            BuiltinFix::Cpp14 => "cpp14",
            BuiltinFix::C11 => "c11",
            BuiltinFix::BundleId => "bundle-id",
            BuiltinFix::TargetDevice => "target-device",
            BuiltinFix::XcodeVersion => "xcode-version",
            BuiltinFix::All => "all",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuiltinFix::DeploymentTarget => "raise the iOS deployment target everywhere",
            BuiltinFix::Cpp14 => "build pods and the app with the configured C++ standard",
            BuiltinFix::C11 => "set the C language standard",
            BuiltinFix::BundleId => "set the app and test-target bundle identifiers",
            BuiltinFix::TargetDevice => "make every build configuration target real devices",
            BuiltinFix::XcodeVersion => "pin the Xcode version used by CI",
            BuiltinFix::All => "every fix above, in a fixed order",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Build this fix-set's rules
    pub fn rules(&self, p: &FixParams) -> Result<Vec<Rule>, ConfigError> {
        let built = match self {
            BuiltinFix::DeploymentTarget => builtin::deployment_target(p),
            BuiltinFix::Cpp14 => builtin::cpp14(p),
            BuiltinFix::C11 => builtin::c11(p),
            BuiltinFix::BundleId => {
                let id = p.bundle_id.as_deref().ok_or_else(|| ConfigError::MissingValue {
                    message: "bundle-id needs --id or defaults.bundle_id".to_string(),
                })?;
                builtin::bundle_id(p, id)
            }
            BuiltinFix::TargetDevice => builtin::target_device(p),
            BuiltinFix::XcodeVersion => builtin::xcode_version(p),
            BuiltinFix::All => return all(p),
        };
        built.map_err(|source| ConfigError::InvalidPattern {
            rule: self.name().to_string(),
            source,
        })
    }
}

impl fmt::Display for BuiltinFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The combined fix: bundle-id only joins when an identifier is configured
fn all(p: &FixParams) -> Result<Vec<Rule>, ConfigError> {
    let mut fixes = vec![
        BuiltinFix::DeploymentTarget,
        BuiltinFix::C11,
        BuiltinFix::Cpp14,
        BuiltinFix::TargetDevice,
    ];
    if p.bundle_id.is_some() {
        fixes.push(BuiltinFix::BundleId);
    }
    fixes.push(BuiltinFix::XcodeVersion);

    let mut rules = Vec::new();
    for fix in fixes {
        rules.extend(fix.rules(p)?);
    }
    Ok(rules)
}

/// One row of `cfgpatch list`
#[derive(Debug, Clone, serde::Serialize)]
pub struct FixSetInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub rules: Vec<RuleInfo>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleInfo {
    pub name: String,
    pub file: PathBuf,
    pub description: Option<String>,
}

impl RuleInfo {
    fn from_rule(rule: &Rule) -> Self {
        Self {
            name: rule.name().to_string(),
            file: rule.file().to_path_buf(),
            description: rule.description().map(str::to_string),
        }
    }
}

/// Resolves fix-set names to rules, built-ins first, then the config
pub struct Catalogue<'a> {
    config: &'a PatcherConfig,
    params: FixParams,
    engine: TemplateEngine,
}

impl<'a> Catalogue<'a> {
    pub fn new(config: &'a PatcherConfig) -> Self {
        Self {
            config,
            params: FixParams::from_config(config),
            engine: TemplateEngine::new(),
        }
    }

    /// Rules for a named fix-set
    pub fn resolve(&self, name: &str) -> Result<Vec<Rule>, ConfigError> {
        if let Some(fix) = BuiltinFix::from_name(name) {
            return fix.rules(&self.params);
        }
        if let Some(fixset) = self.config.get_fixset(name) {
            let ctx = TemplateContext::from_config(self.config);
            return fixset.compile(name, &self.engine, &ctx);
        }

        let known = self.names();
        let candidates: Vec<&str> = known.iter().map(String::as_str).collect();
        Err(ConfigError::UnknownFixSet {
            name: name.to_string(),
            suggestion: suggest_correction(name, &candidates),
        })
    }

    /// Every fix-set name, built-ins first
    pub fn names(&self) -> Vec<String> {
        BuiltinFix::ALL
            .iter()
            .map(|f| f.name().to_string())
            .chain(self.config.fixsets.keys().cloned())
            .collect()
    }

    /// Describe every fix-set.
    ///
    /// A fix-set whose rules cannot be built (bundle-id without an id, a
    /// broken user rule) is still listed, with no rules.
    pub fn describe(&self) -> Vec<FixSetInfo> {
        let mut out = Vec::new();
        for fix in BuiltinFix::ALL {
            out.push(FixSetInfo {
                name: fix.name().to_string(),
                description: fix.description().to_string(),
                builtin: true,
                rules: self.rule_infos(fix.name()),
            });
        }
        for (name, fixset) in &self.config.fixsets {
            // A user fix-set cannot shadow a built-in
            if BuiltinFix::from_name(name).is_some() {
                continue;
            }
            out.push(FixSetInfo {
                name: name.clone(),
                description: fixset.description.clone(),
                builtin: false,
                rules: self.rule_infos(name),
            });
        }
        out
    }

    fn rule_infos(&self, name: &str) -> Vec<RuleInfo> {
        match self.resolve(name) {
            Ok(rules) => rules.iter().map(RuleInfo::from_rule).collect(),
            Err(e) => {
                tracing::debug!(fixset = name, error = %e, "cannot build rules for listing");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FixSetConfig, GuardConfig, RuleConfig};
    use crate::patch::{ConfigPatcher, FileStatus};
    use tempfile::TempDir;

    #[test]
    fn test_pbx_quote() {
        assert_eq!(pbx_quote("gnu11"), "gnu11");
        assert_eq!(pbx_quote("15.0"), "15.0");
        assert_eq!(pbx_quote("$(SRCROOT)/Runner"), "\"$(SRCROOT)/Runner\"");
        assert_eq!(pbx_quote("c++14"), "\"c++14\"");
        assert_eq!(pbx_quote("1,2"), "\"1,2\"");
        assert_eq!(pbx_quote(""), "\"\"");
        assert_eq!(pbx_quote("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_names_round_trip() {
        for fix in BuiltinFix::ALL {
            assert_eq!(BuiltinFix::from_name(fix.name()), Some(fix));
        }
        assert_eq!(BuiltinFix::from_name("cpp17"), None);
    }

    #[test]
    fn test_bundle_id_requires_value() {
        let err = BuiltinFix::BundleId.rules(&FixParams::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue { .. }));
    }

    #[test]
    fn test_all_skips_bundle_id_without_value() {
        let rules = BuiltinFix::All.rules(&FixParams::default()).unwrap();
        assert!(!rules.iter().any(|r| r.name() == "pbxproj-bundle-id"));
        assert_eq!(rules.last().map(|r| r.name()), Some("ci-xcode-version"));

        let with_id = FixParams {
            bundle_id: Some("com.studybuddy.app".into()),
            ..FixParams::default()
        };
        let rules = BuiltinFix::All.rules(&with_id).unwrap();
        assert!(rules.iter().any(|r| r.name() == "pbxproj-bundle-id"));
    }

    #[test]
    fn test_unknown_name_suggests() {
        let config = PatcherConfig::default();
        let catalogue = Catalogue::new(&config);
        match catalogue.resolve("cpp41") {
            Err(ConfigError::UnknownFixSet { suggestion, .. }) => {
                assert_eq!(suggestion.as_deref(), Some("cpp14"));
            }
            other => panic!("expected unknown fix-set, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_resolves_user_fixset() {
        let mut config = PatcherConfig::default();
        config.vars.insert("team".into(), "ABCDE12345".into());
        config.fixsets.insert(
            "team-id".into(),
            FixSetConfig {
                description: "Pin the team".into(),
                rules: vec![RuleConfig {
                    name: "pbxproj-team".into(),
                    file: "{{ paths.pbxproj }}".into(),
                    pattern: "DEVELOPMENT_TEAM = [^;]+;".into(),
                    replace: Some("DEVELOPMENT_TEAM = {{ vars.team }};".into()),
                    ..Default::default()
                }],
            },
        );

        let catalogue = Catalogue::new(&config);
        let rules = catalogue.resolve("team-id").unwrap();
        assert_eq!(rules[0].name(), "pbxproj-team");

        let listed = catalogue.describe();
        let team = listed.iter().find(|f| f.name == "team-id").unwrap();
        assert!(!team.builtin);
        assert_eq!(team.rules.len(), 1);
        // bundle-id is listed even though it cannot build without an id
        let bundle = listed.iter().find(|f| f.name == "bundle-id").unwrap();
        assert!(bundle.rules.is_empty());
    }

    #[test]
    fn test_user_insert_with_mismatched_guard_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ios")).unwrap();
        let original = "post_install do |installer|\n  config.build_settings['SWIFT_VERSION'] = '5.0'\nend\n";
        std::fs::write(dir.path().join("ios/Podfile"), original).unwrap();

        let mut config = PatcherConfig::default();
        config.fixsets.insert(
            "bitcode".into(),
            FixSetConfig {
                description: "Disable bitcode".into(),
                rules: vec![RuleConfig {
                    name: "podfile-bitcode".into(),
                    file: "{{ paths.podfile }}".into(),
                    pattern: r"config\.build_settings\['SWIFT_VERSION'\] = '5\.0'".into(),
                    insert_after: Some("\n  config.build_settings['ENABLE_BITCODE'] = 'NO'".into()),
                    when: Some(GuardConfig {
                        lacks: Some("BITCODE_ENABLED".into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
            },
        );

        let rules = Catalogue::new(&config).resolve("bitcode").unwrap();
        let patcher = ConfigPatcher::new(dir.path());
        let first = patcher.run(&rules);
        let second = patcher.run(&rules);

        for run in [&first, &second] {
            assert_eq!(run.files[0].status, FileStatus::Failed);
            assert_eq!(run.files[0].error_kind.as_deref(), Some("NotIdempotent"));
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("ios/Podfile")).unwrap(),
            original
        );
    }

    #[test]
    fn test_all_on_project_converges() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("ios/Runner.xcodeproj")).unwrap();
        std::fs::write(
            root.join("ios/Podfile"),
            "# platform :ios, '12.0'\npost_install do |installer|\n  installer.pods_project.targets.each do |target|\n    target.build_configurations.each do |config|\n      config.build_settings['IPHONEOS_DEPLOYMENT_TARGET'] = '12.0'\n      config.build_settings['SWIFT_VERSION'] = '5.0'\n    end\n  end\nend\n",
        )
        .unwrap();
        std::fs::write(
            root.join("ios/Runner.xcodeproj/project.pbxproj"),
            "\t\t\tbuildSettings = {\n\t\t\t\tIPHONEOS_DEPLOYMENT_TARGET = 12.0;\n\t\t\t\tPRODUCT_BUNDLE_IDENTIFIER = com.example.app;\n\t\t\t};\n",
        )
        .unwrap();
        std::fs::write(root.join("codemagic.yaml"), "environment:\n  xcode: latest\n").unwrap();

        let mut config = PatcherConfig::default();
        config.defaults.bundle_id = Some("com.studybuddy.app".into());
        let rules = Catalogue::new(&config).resolve("all").unwrap();
        let patcher = ConfigPatcher::new(root);

        let first = patcher.run(&rules);
        assert!(!first.has_failures());
        assert!(first.files.iter().all(|f| f.status == FileStatus::Patched));

        let second = patcher.run(&rules);
        assert!(!second.has_changes());
        assert!(
            second
                .files
                .iter()
                .all(|f| f.status == FileStatus::AlreadySatisfied)
        );

        let pbxproj =
            std::fs::read_to_string(root.join("ios/Runner.xcodeproj/project.pbxproj")).unwrap();
        assert!(pbxproj.contains("IPHONEOS_DEPLOYMENT_TARGET = 15.0;"));
        assert!(pbxproj.contains("PRODUCT_BUNDLE_IDENTIFIER = com.studybuddy.app;"));
        assert!(pbxproj.contains("CLANG_CXX_LIBRARY = \"libc++\";"));
    }
}
