//! Command line definitions.

use camkeep_config::Overrides;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Keeps a security camera upload directory organized and within its
/// storage limits.
#[derive(Debug, Parser)]
#[command(name = "camkeep")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// More log output (repeat for trace)
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}
impl Cli {
    /// Default log level, used when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan, organize and apply retention once
    Run(RunArgs),

    /// Validate the configuration without touching any file
    Check(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Upload directory, overriding the configuration
    #[arg(long)]
    pub root: Option<PathBuf>,
}
impl ConfigArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides { root: self.root.clone(), ..Default::default() }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Decide and report everything, but change nothing on disk
    #[arg(long)]
    pub dry_run: bool,

    /// Leave recordings where they were uploaded
    #[arg(long)]
    pub no_organize: bool,

    /// Never delete recordings
    #[arg(long)]
    pub no_delete: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}
impl RunArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            dry_run: self.dry_run.then_some(true),
            organize: self.no_organize.then_some(false),
            delete: self.no_delete.then_some(false),
            ..self.config.overrides()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from(["camkeep", "run", "--root", "/srv/ftp", "--dry-run", "--no-delete"]);
        let Command::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(
            args.overrides(),
            Overrides {
                root: Some(PathBuf::from("/srv/ftp")),
                organize: None,
                delete: Some(false),
                dry_run: Some(true),
            }
        );
    }

    #[rstest]
    #[case(&["camkeep", "check"], "info")]
    #[case(&["camkeep", "-q", "check"], "warn")]
    #[case(&["camkeep", "check", "-v"], "debug")]
    #[case(&["camkeep", "run", "-vv"], "trace")]
    fn test_log_level(#[case] args: &[&str], #[case] expected: &str) {
        assert_eq!(Cli::parse_from(args).log_level(), expected);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["camkeep", "-v", "-q", "run"]).is_err());
    }
}
