//! Configuration loading with multi-layer merge

use super::FixSetConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Project-relative location of the project config
pub const PROJECT_CONFIG: &str = ".cfgpatch/config.toml";

/// Effective cfgpatch configuration, after every layer is merged
#[derive(Debug, Clone, Default, Serialize)]
pub struct PatcherConfig {
    /// Values the built-in fix-sets write
    pub defaults: Defaults,

    /// Target file locations
    pub paths: Paths,

    /// Free-form template variables for user rules
    pub vars: BTreeMap<String, String>,

    /// User-defined fix-sets
    pub fixsets: BTreeMap<String, FixSetConfig>,
}

/// Global default settings
#[derive(Debug, Clone, Serialize)]
pub struct Defaults {
    /// Minimum iOS deployment target
    pub ios_version: String,

    /// GCC_C_LANGUAGE_STANDARD value
    pub c_standard: String,

    /// CLANG_CXX_LANGUAGE_STANDARD value
    pub cxx_standard: String,

    /// Xcode version pinned in the CI descriptor
    pub xcode_version: String,

    /// PRODUCT_BUNDLE_IDENTIFIER for the app target
    pub bundle_id: Option<String>,

    /// Back up files before rewriting them
    pub backup: bool,

    /// Follow-up command timeout in seconds; 0 disables it
    pub followup_timeout: u64,
}

fn default_ios_version() -> String {
    "15.0".to_string()
}

fn default_c_standard() -> String {
    "gnu11".to_string()
}

fn default_cxx_standard() -> String {
    "c++14".to_string()
}

fn default_xcode_version() -> String {
    "14.3".to_string()
}

fn default_followup_timeout() -> u64 {
    600
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            ios_version: default_ios_version(),
            c_standard: default_c_standard(),
            cxx_standard: default_cxx_standard(),
            xcode_version: default_xcode_version(),
            bundle_id: None,
            backup: false,
            followup_timeout: default_followup_timeout(),
        }
    }
}

/// Target file locations, relative to the project dir unless absolute
#[derive(Debug, Clone, Serialize)]
pub struct Paths {
    pub podfile: PathBuf,

    pub pbxproj: PathBuf,

    /// CI descriptor
    pub ci: PathBuf,
}

fn default_podfile() -> PathBuf {
    PathBuf::from("ios/Podfile")
}

fn default_pbxproj() -> PathBuf {
    PathBuf::from("ios/Runner.xcodeproj/project.pbxproj")
}

fn default_ci() -> PathBuf {
    PathBuf::from("codemagic.yaml")
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            podfile: default_podfile(),
            pbxproj: default_pbxproj(),
            ci: default_ci(),
        }
    }
}

impl Paths {
    /// Copy with `~` expanded in every path
    pub fn expanded(&self) -> Self {
        Self {
            podfile: expand(&self.podfile),
            pbxproj: expand(&self.pbxproj),
            ci: expand(&self.ci),
        }
    }
}

/// One config file as written. Every setting is optional: a layer
/// overrides exactly the settings it names, even when the value equals
/// the built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub defaults: DefaultsLayer,

    #[serde(default)]
    pub paths: PathsLayer,

    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    #[serde(default)]
    pub fixsets: BTreeMap<String, FixSetConfig>,
}

/// `[defaults]` table of one layer
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsLayer {
    pub ios_version: Option<String>,
    pub c_standard: Option<String>,
    pub cxx_standard: Option<String>,
    pub xcode_version: Option<String>,
    pub bundle_id: Option<String>,
    pub backup: Option<bool>,
    pub followup_timeout: Option<u64>,
}

/// `[paths]` table of one layer
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsLayer {
    pub podfile: Option<PathBuf>,
    pub pbxproj: Option<PathBuf>,
    pub ci: Option<PathBuf>,
}

/// Expand a leading `~` in a path
pub fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

fn overlay<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl PatcherConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/cfgpatch/config.toml
    /// 3. .cfgpatch/config.toml (project)
    /// 4. An explicit `--config` file
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir.join(PROJECT_CONFIG);
        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        if let Some(path) = explicit {
            let path = expand(path);
            let explicit_config =
                Self::load_file(&path).with_context(|| format!("loading {}", path.display()))?;
            config.merge(explicit_config);
        }

        tracing::debug!(
            fixsets = config.fixsets.len(),
            vars = config.vars.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load one configuration layer from a specific file
    pub fn load_file(path: &Path) -> Result<ConfigLayer> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let layer: ConfigLayer =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(layer)
    }

    /// Get the user config path (~/.config/cfgpatch/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cfgpatch/config.toml"))
    }

    /// Overlay a layer: every setting it names wins
    pub fn merge(&mut self, layer: ConfigLayer) {
        let d = layer.defaults;
        overlay(&mut self.defaults.ios_version, d.ios_version);
        overlay(&mut self.defaults.c_standard, d.c_standard);
        overlay(&mut self.defaults.cxx_standard, d.cxx_standard);
        overlay(&mut self.defaults.xcode_version, d.xcode_version);
        overlay(&mut self.defaults.backup, d.backup);
        overlay(&mut self.defaults.followup_timeout, d.followup_timeout);
        if d.bundle_id.is_some() {
            self.defaults.bundle_id = d.bundle_id;
        }

        let p = layer.paths;
        overlay(&mut self.paths.podfile, p.podfile);
        overlay(&mut self.paths.pbxproj, p.pbxproj);
        overlay(&mut self.paths.ci, p.ci);

        // Maps: the layer wins for the same key
        self.vars.extend(layer.vars);
        self.fixsets.extend(layer.fixsets);
    }

    pub fn get_fixset(&self, name: &str) -> Option<&FixSetConfig> {
        self.fixsets.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_empty_config() {
        let config = PatcherConfig::default();
        assert_eq!(config.defaults.ios_version, "15.0");
        assert_eq!(config.paths.podfile, PathBuf::from("ios/Podfile"));
        assert!(config.fixsets.is_empty());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
            [defaults]
            ios_version = "16.0"
            bundle_id = "com.studybuddy.app"

            [paths]
            ci = "ci/codemagic.yaml"

            [vars]
            team = "ABCDE12345"

            [fixsets.team-id]
            description = "Pin the development team"

            [[fixsets.team-id.rules]]
            name = "pbxproj-team"
            file = "{{{{ paths.pbxproj }}}}"
            pattern = 'DEVELOPMENT_TEAM = [^;]+;'
            replace = "DEVELOPMENT_TEAM = {{{{ vars.team }}}};"
        "#
        )
        .unwrap();

        let mut config = PatcherConfig::default();
        config.merge(PatcherConfig::load_file(&config_path).unwrap());
        assert_eq!(config.defaults.ios_version, "16.0");
        assert_eq!(config.defaults.bundle_id.as_deref(), Some("com.studybuddy.app"));
        assert_eq!(config.paths.ci, PathBuf::from("ci/codemagic.yaml"));
        assert_eq!(config.paths.podfile, PathBuf::from("ios/Podfile"));
        assert_eq!(config.vars["team"], "ABCDE12345");
        assert_eq!(config.fixsets["team-id"].rules.len(), 1);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[defaults]\nios_versoin = \"16.0\"\n").unwrap();

        assert!(PatcherConfig::load_file(&config_path).is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = PatcherConfig::default();
        base.defaults.ios_version = "14.0".into();
        base.vars.insert("team".into(), "OLD".into());

        let mut layer = ConfigLayer::default();
        layer.defaults.xcode_version = Some("15.4".into());
        layer.defaults.backup = Some(true);
        layer.vars.insert("team".into(), "NEW".into());
        layer.vars.insert("flavor".into(), "prod".into());

        base.merge(layer);

        // Untouched keys keep the base value
        assert_eq!(base.defaults.ios_version, "14.0");
        assert_eq!(base.defaults.xcode_version, "15.4");
        assert!(base.defaults.backup);
        assert_eq!(base.vars["team"], "NEW");
        assert_eq!(base.vars["flavor"], "prod");
    }

    #[test]
    fn test_later_layer_can_restore_default_values() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(
            &user,
            "[defaults]\nios_version = \"16.0\"\nbackup = true\nfollowup_timeout = 30\n\n[paths]\npodfile = \"app/Podfile\"\n",
        )
        .unwrap();
        std::fs::write(
            &project,
            "[defaults]\nios_version = \"15.0\"\nbackup = false\nfollowup_timeout = 600\n\n[paths]\npodfile = \"ios/Podfile\"\n",
        )
        .unwrap();

        let mut config = PatcherConfig::default();
        config.merge(PatcherConfig::load_file(&user).unwrap());
        assert_eq!(config.defaults.ios_version, "16.0");
        assert!(config.defaults.backup);

        config.merge(PatcherConfig::load_file(&project).unwrap());
        assert_eq!(config.defaults.ios_version, "15.0");
        assert!(!config.defaults.backup);
        assert_eq!(config.defaults.followup_timeout, 600);
        assert_eq!(config.paths.podfile, PathBuf::from("ios/Podfile"));
    }

    #[test]
    fn test_explicit_config_overrides_project_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".cfgpatch")).unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG),
            "[defaults]\nios_version = \"16.0\"\nbackup = true\n",
        )
        .unwrap();
        let explicit = dir.path().join("ci.toml");
        std::fs::write(&explicit, "[defaults]\nios_version = \"15.0\"\nbackup = false\n").unwrap();

        let config = PatcherConfig::load(dir.path(), Some(&explicit)).unwrap();
        assert_eq!(config.defaults.ios_version, "15.0");
        assert!(!config.defaults.backup);
    }

    #[test]
    fn test_load_project_config_from_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".cfgpatch")).unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG),
            "[defaults]\nxcode_version = \"15.2\"\n",
        )
        .unwrap();

        let config = PatcherConfig::load(dir.path(), None).unwrap();
        assert_eq!(config.defaults.xcode_version, "15.2");
    }

    #[test]
    fn test_expand_leaves_relative_paths_alone() {
        assert_eq!(expand(Path::new("ios/Podfile")), PathBuf::from("ios/Podfile"));
    }
}
