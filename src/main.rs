use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use caweb_migrate::db::advisory_lock::AdvisoryLockMode;
use caweb_migrate::db::schema_repo::{ConnectionRepo, Namespace, TransactionRepo};
use caweb_migrate::error::{EngineError, EngineResult};
use caweb_migrate::orchestrator::{self, MigrationRequest};
use caweb_migrate::role::Role;
use caweb_migrate::settings::Settings;

#[derive(Parser)]
#[command(author, version, about = "Atomic schema-and-config migrations for the caweb service", long_about = None)]
struct Cli {
    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move a running service from one database to another in one
    /// transaction, translating both schema and config as needed.
    Migrate {
        /// Path to the source service's YAML config.
        #[arg(long)]
        source_config: PathBuf,

        /// Path to the target service's YAML config.
        #[arg(long)]
        target_config: PathBuf,

        /// Override the source config's `database.pass-dir`.
        #[arg(long)]
        source_pass_dir: Option<PathBuf>,

        /// Override the target config's `database.pass-dir`.
        #[arg(long)]
        target_pass_dir: Option<PathBuf>,

        /// Fail immediately instead of blocking if another migration is
        /// already running against the target database.
        #[arg(long)]
        no_wait: bool,
    },

    /// Initialize an empty destination database from a config file that
    /// has never been migrated into before.
    Init {
        /// Path to the config the new database should be initialized from.
        #[arg(long)]
        config: PathBuf,

        /// Seed with fixture rows (`dev.sql`) instead of an empty prod
        /// database (`prod.sql`).
        #[arg(long)]
        dev: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);

    let result = tokio::select! {
        result = run(cli) => result,
        _ = wait_for_shutdown_signal() => {
            info!("received shutdown signal, exiting without completing the current operation");
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "caweb-migrate failed");
            match e {
                EngineError::InvalidInput(_) | EngineError::Unsupported(_) => ExitCode::from(64),
                _ => ExitCode::from(70),
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn" // default level
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run(cli: Cli) -> EngineResult<()> {
    match cli.command {
        Commands::Migrate {
            source_config,
            target_config,
            source_pass_dir,
            target_pass_dir,
            no_wait,
        } => {
            let request = MigrationRequest {
                source_config_path: source_config,
                target_config_path: target_config,
                source_pass_dir,
                target_pass_dir,
                lock_mode: if no_wait {
                    AdvisoryLockMode::TryLock
                } else {
                    AdvisoryLockMode::Block
                },
            };

            let (outcome, _snapshot) =
                orchestrator::migrate(&request, &orchestrator::identity_host_rewrite).await?;

            for violation in &outcome.violations {
                warn!(
                    field = %violation.field,
                    value = %violation.original,
                    clamped = %violation.clamped,
                    "bounds violation clamped during migration"
                );
            }
            info!(
                from_schema_major = outcome.source_schema_major,
                to_schema_major = outcome.destination_schema_major,
                "migration committed"
            );
            Ok(())
        }
        Commands::Init { config, dev } => cmd_init(&config, dev).await,
    }
}

async fn cmd_init(config_path: &std::path::Path, dev: bool) -> EngineResult<()> {
    let bytes = std::fs::read(config_path)?;
    let mut cfg = Settings::load_autodetect(&bytes)?;
    let violations = cfg.validate_and_normalize();
    for v in &violations {
        warn!(field = %v.field, value = %v.original, clamped = %v.clamped, "bounds violation clamped in config");
    }

    let admin_pool = cfg.database_connection_pool(Role::Admin).await?;

    ConnectionRepo::new(&admin_pool)
        .install_fdw_extension_if_missing()
        .await?;

    let suffix = cfg.role_suffix();
    let major = cfg.schema_version().major;

    {
        let mut tx = admin_pool
            .begin()
            .await
            .map_err(|e| EngineError::db("BEGIN (init bootstrap)", e))?;
        let mut repo = TransactionRepo::new(&mut tx, suffix.clone());
        repo.create_role_if_not_exists(Role::Normal).await?;
        repo.grant_fdw_usage(Role::Normal).await?;
        tx.commit()
            .await
            .map_err(|e| EngineError::db("COMMIT (init bootstrap)", e))?;
    }

    let finalizer = {
        let admin_pool = admin_pool.clone();
        let suffix = suffix.clone();
        let auth_method = cfg.database().auth_method;
        cfg.renew_passwords(&[Role::Normal], move |lines| {
            let admin_pool = admin_pool.clone();
            let suffix = suffix.clone();
            async move {
                let line = lines
                    .first()
                    .ok_or_else(|| EngineError::InvalidInput("no credential line to set".to_string()))?;
                let mut tx = admin_pool
                    .begin()
                    .await
                    .map_err(|e| EngineError::db("BEGIN (init password)", e))?;
                TransactionRepo::new(&mut tx, suffix)
                    .change_passwords(&[Role::Normal], &[line.password.clone()], auth_method)
                    .await?;
                tx.commit()
                    .await
                    .map_err(|e| EngineError::db("COMMIT (init password)", e))?;
                Ok(())
            }
        })
        .await?
    };

    {
        let mut tx = admin_pool
            .begin()
            .await
            .map_err(|e| EngineError::db("BEGIN (init schema)", e))?;

        TransactionRepo::new(&mut tx, suffix.clone())
            .create_schema(Namespace::Caweb { major })
            .await?;

        let mut settler = cfg.settings_persister(&mut tx)?;
        if dev {
            settler.init_dev_schema().await?;
        } else {
            settler.init_prod_schema().await?;
        }

        let mutable_bytes = cfg.serializable()?;
        let (min_bounds, max_bounds) = cfg.bounds_document()?;
        settler
            .persist_settings(&mutable_bytes, &min_bounds, &max_bounds)
            .await?;
        drop(settler);

        let mut repo = TransactionRepo::new(&mut tx, suffix.clone());
        repo.grant_privileges(Namespace::Caweb { major }, Role::Normal)
            .await?;
        repo.set_search_path(Namespace::Caweb { major }, Role::Normal)
            .await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::db("COMMIT (init schema)", e))?;
    }

    finalizer()?;
    info!(major, dev, "initialized destination database");
    Ok(())
}
