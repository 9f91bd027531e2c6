mod cli;
mod error;
mod output;

use crate::cli::{Cli, Command, ConfigArgs, RunArgs};
use crate::error::{Classify, ErrorKind, Result};
use camkeep_library::RunLock;
use camkeep_storage::BackendHandle;
use camkeep_storage::backend::LocalBackend;
use clap::Parser;
use exn::ResultExt;
use std::ops::Deref;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    let result = match &cli.command {
        Command::Run(args) => run(args).await,
        Command::Check(args) => check(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e.deref());
            tracing::debug!("{e:?}");
            ExitCode::from(e.exit_code())
        },
    }
}

/// Logs to stderr so that `--json` output on stdout stays parseable.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "camkeep={level},camkeep_library={level},camkeep_storage={level},camkeep_config={level}"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(args: &RunArgs) -> Result<()> {
    let settings = camkeep_config::load(args.config.config.as_deref(), &args.overrides()).classify(ErrorKind::Config)?;
    let root = absolute_root(&settings)?;
    let mut ctx = settings.context().classify(ErrorKind::Config)?;
    let backend: BackendHandle = Arc::new(LocalBackend::new("local", &root).classify(ErrorKind::Config)?);

    let lock_path = settings.lock_path().classify(ErrorKind::Config)?;
    let lock_path = std::path::absolute(&lock_path).or_raise(|| ErrorKind::Config(lock_path.display().to_string()))?;
    if let Ok(relative) = lock_path.strip_prefix(&root) {
        ctx.ignored.push(relative.to_path_buf());
    }
    let _lock = if ctx.dry_run {
        None
    } else {
        match RunLock::acquire(&lock_path).classify(ErrorKind::Lock)? {
            Some(lock) => Some(lock),
            None => {
                tracing::info!(lock = %lock_path.display(), "Another run is still in progress; skipping");
                return Ok(());
            },
        }
    };

    tracing::info!(root = %root.display(), dry_run = ctx.dry_run, "Starting run");
    let report = match camkeep_library::run(&backend, &ctx).await {
        Ok(report) => report,
        Err(e) if e.is_config() => return Err(e).classify(ErrorKind::Config),
        Err(e) => return Err(e).classify(ErrorKind::Run),
    };

    output::log_summary(&report);
    if args.json {
        output::write_json(&report, std::io::stdout().lock())?;
    }
    Ok(())
}

fn check(args: &ConfigArgs) -> Result<()> {
    let settings = camkeep_config::load(args.config.as_deref(), &args.overrides()).classify(ErrorKind::Config)?;
    let root = absolute_root(&settings)?;
    let ctx = settings.context().classify(ErrorKind::Config)?;
    let lock_path = settings.lock_path().classify(ErrorKind::Config)?;
    tracing::info!(
        root = %root.display(),
        lock = %lock_path.display(),
        organize = ctx.organize,
        delete = ctx.delete,
        dry_run = ctx.dry_run,
        policy = ?ctx.policy,
        "Configuration is valid"
    );
    if ctx.delete && ctx.policy.is_empty() {
        tracing::warn!("Deletion is enabled but no retention limit is configured");
    }
    Ok(())
}

fn absolute_root(settings: &camkeep_config::Settings) -> Result<PathBuf> {
    let root = settings.root().classify(ErrorKind::Config)?;
    std::path::absolute(root).or_raise(|| ErrorKind::Config(format!("upload root {} is unusable", root.display())))
}
