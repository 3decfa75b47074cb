mod cli;
mod config;
mod fixsets;
mod logging;
mod patch;
mod process;
mod template;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cli::{OutputMode, RunOptions};
use config::PatcherConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cfgpatch", version)]
#[command(about = "Apply idempotent fix-sets to iOS build configuration files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to current)
    #[arg(long, short = 'C', global = true)]
    dir: Option<PathBuf>,

    /// Extra config file, applied over the user and project configs
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    targets: Targets,

    /// Back up each file under .cfgpatch/backups before rewriting it
    #[arg(long, global = true)]
    backup: bool,

    /// Report what would change without writing
    #[arg(long, global = true)]
    dry_run: bool,

    /// Shell command to run in the project dir after a successful run
    #[arg(long, global = true, value_name = "CMD")]
    then: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputMode::Console, global = true)]
    format: OutputMode,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Also log to a file under the config dir
    #[arg(long, global = true)]
    log: bool,

    /// Also log to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

/// Target file overrides
#[derive(Args)]
struct Targets {
    /// Podfile path
    #[arg(long, global = true)]
    podfile: Option<PathBuf>,

    /// project.pbxproj path
    #[arg(long, global = true)]
    pbxproj: Option<PathBuf>,

    /// CI descriptor path
    #[arg(long, global = true)]
    ci: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Raise the iOS deployment target in the Podfile and Xcode project
    DeploymentTarget {
        /// Minimum iOS version
        #[arg(long)]
        version: Option<String>,
    },

    /// Set the C++ standard for pods and the app
    Cpp14 {
        /// CLANG_CXX_LANGUAGE_STANDARD value
        #[arg(long)]
        standard: Option<String>,
    },

    /// Set the C language standard
    C11 {
        /// GCC_C_LANGUAGE_STANDARD value
        #[arg(long)]
        standard: Option<String>,
    },

    /// Set the app and test-target bundle identifiers
    BundleId {
        /// New bundle identifier
        #[arg(long)]
        id: Option<String>,
    },

    /// Add missing device build settings to every configuration
    TargetDevice,

    /// Pin the Xcode version in the CI descriptor
    XcodeVersion {
        /// Xcode version
        #[arg(long)]
        version: Option<String>,
    },

    /// Apply every built-in fix
    All {
        #[arg(long)]
        ios_version: Option<String>,

        #[arg(long)]
        c_standard: Option<String>,

        #[arg(long)]
        cxx_standard: Option<String>,

        #[arg(long)]
        xcode_version: Option<String>,

        #[arg(long)]
        bundle_id: Option<String>,
    },

    /// Apply a fix-set defined in config
    Apply {
        /// Fix-set name
        name: String,
    },

    /// List available fix-sets and their rules
    List,

    /// Restore a file from its newest backup
    Restore {
        /// File to restore, relative to the project dir
        file: PathBuf,
    },
}

impl Commands {
    /// Fix-set this command runs, if any
    fn fixset(&self) -> Option<&str> {
        Some(match self {
            Commands::DeploymentTarget { .. } => "deployment-target",
            Commands::Cpp14 { .. } => "cpp14",
            Commands::C11 { .. } => "c11",
            Commands::BundleId { .. } => "bundle-id",
            Commands::TargetDevice => "target-device",
            Commands::XcodeVersion { .. } => "xcode-version",
            Commands::All { .. } => "all",
            Commands::Apply { name } => name.as_str(),
            Commands::List | Commands::Restore { .. } => return None,
        })
    }

    /// Fold command-line values into the loaded config
    fn apply_overrides(&self, config: &mut PatcherConfig) {
        let d = &mut config.defaults;
        match self {
            Commands::DeploymentTarget { version } => set(&mut d.ios_version, version),
            Commands::Cpp14 { standard } => set(&mut d.cxx_standard, standard),
            Commands::C11 { standard } => set(&mut d.c_standard, standard),
            Commands::BundleId { id } => {
                if id.is_some() {
                    d.bundle_id = id.clone();
                }
            }
            Commands::XcodeVersion { version } => set(&mut d.xcode_version, version),
            Commands::All {
                ios_version,
                c_standard,
                cxx_standard,
                xcode_version,
                bundle_id,
            } => {
                set(&mut d.ios_version, ios_version);
                set(&mut d.c_standard, c_standard);
                set(&mut d.cxx_standard, cxx_standard);
                set(&mut d.xcode_version, xcode_version);
                if bundle_id.is_some() {
                    d.bundle_id = bundle_id.clone();
                }
            }
            Commands::TargetDevice
            | Commands::Apply { .. }
            | Commands::List
            | Commands::Restore { .. } => {}
        }
    }
}

fn set(slot: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match (&cli.log_file, cli.log) {
        (Some(path), _) => Some(config::expand(path)),
        (None, true) => Some(logging::default_log_path(
            cli.command.fixset().unwrap_or("cfgpatch"),
        )?),
        (None, false) => None,
    };
    logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let project_dir = match cli.dir {
        Some(ref dir) => config::expand(dir),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    let mut config = PatcherConfig::load(&project_dir, cli.config.as_deref())?;
    cli.command.apply_overrides(&mut config);
    if let Some(ref p) = cli.targets.podfile {
        config.paths.podfile = p.clone();
    }
    if let Some(ref p) = cli.targets.pbxproj {
        config.paths.pbxproj = p.clone();
    }
    if let Some(ref p) = cli.targets.ci {
        config.paths.ci = p.clone();
    }

    let mode = if cli.quiet { OutputMode::Quiet } else { cli.format };
    let handler = cli::create_handler(mode, cli.debug);

    let exit_code = match cli.command {
        Commands::List => cli::list(&config, &*handler),
        Commands::Restore { ref file } => cli::restore(&project_dir, file, &*handler),
        ref command => {
            let name = command.fixset().unwrap_or_default().to_string();
            let opts = RunOptions {
                project_dir: project_dir.clone(),
                dry_run: cli.dry_run,
                backup: cli.backup || config.defaults.backup,
                then: cli.then.clone(),
            };
            cli::run_fixset(&name, &config, &opts, &*handler).await?
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cfgpatch",
            "deployment-target",
            "--version",
            "16.0",
            "--dry-run",
            "--pbxproj",
            "ios/App.xcodeproj/project.pbxproj",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.command.fixset(), Some("deployment-target"));

        let mut config = PatcherConfig::default();
        cli.command.apply_overrides(&mut config);
        assert_eq!(config.defaults.ios_version, "16.0");
        assert_eq!(
            cli.targets.pbxproj,
            Some(PathBuf::from("ios/App.xcodeproj/project.pbxproj"))
        );
    }

    #[test]
    fn test_all_overrides_only_given_values() {
        let cli = Cli::try_parse_from([
            "cfgpatch",
            "all",
            "--bundle-id",
            "com.studybuddy.app",
            "--xcode-version",
            "15.4",
        ])
        .unwrap();

        let mut config = PatcherConfig::default();
        cli.command.apply_overrides(&mut config);
        assert_eq!(config.defaults.bundle_id.as_deref(), Some("com.studybuddy.app"));
        assert_eq!(config.defaults.xcode_version, "15.4");
        assert_eq!(config.defaults.ios_version, "15.0");
    }

    #[test]
    fn test_apply_and_list() {
        let cli = Cli::try_parse_from(["cfgpatch", "apply", "team-id"]).unwrap();
        assert_eq!(cli.command.fixset(), Some("team-id"));

        let cli = Cli::try_parse_from(["cfgpatch", "list", "--format", "json"]).unwrap();
        assert_eq!(cli.command.fixset(), None);
        assert_eq!(cli.format, OutputMode::Json);
    }
}
