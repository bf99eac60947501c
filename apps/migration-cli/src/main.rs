use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use db_infra::db::{MigrateSettings, SettingsOverrides};
use db_infra::orchestrate_migration;
use migration::{MigrationCommand, MigrationOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "migration=info,db_infra=info,migration_cli=info,sqlx=warn,sea_orm=warn";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Command {
    /// Apply every pending script in version order
    Up,
    /// Show applied, pending and orphaned versions without changing anything
    Status,
}

impl From<Command> for MigrationCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::Up => MigrationCommand::Up,
            Command::Status => MigrationCommand::Status,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "migration")]
#[command(about = "Apply versioned SQL scripts to the meter-readings database")]
struct Args {
    /// Migration command to run
    #[arg(value_enum)]
    command: Command,

    /// Connection URL (postgres://, postgresql:// or sqlite:)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Directory holding <version>_<description>.sql scripts
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Abort the whole run after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Total connection attempts, 500ms apart
    #[arg(long)]
    connect_attempts: Option<u32>,

    /// Apply pending versions even when they sort before the latest applied one
    #[arg(long)]
    allow_out_of_order: bool,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            database_url: self.database_url.clone(),
            migrations_dir: self.dir.clone(),
            timeout_ms: self.timeout_ms,
            connect_attempts: self.connect_attempts,
            allow_out_of_order: self.allow_out_of_order,
        }
    }
}

#[tokio::main]
async fn main() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_env_filter(env_filter)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        // --help and --version exit 0, usage errors exit 2
        Err(e) => e.exit(),
    };

    let settings = match MigrateSettings::resolve(args.overrides()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Migration failed: {e}");
            std::process::exit(1);
        }
    };

    let cancellation_token = CancellationToken::new();
    let ctrl_c_token = cancellation_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, cancelling migration");
                ctrl_c_token.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    match orchestrate_migration(&settings, args.command.into(), cancellation_token).await {
        Ok(MigrationOutcome::Up(report)) if report.is_noop() => {
            info!("Database is up to date");
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("Migration failed: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_and_flags() {
        let args = Args::try_parse_from([
            "migration",
            "--database-url",
            "sqlite:///tmp/meters.db?mode=rwc",
            "--dir",
            "db/migrations",
            "--timeout-ms",
            "1500",
            "--connect-attempts",
            "3",
            "--allow-out-of-order",
            "up",
        ])
        .unwrap();

        assert_eq!(args.command, Command::Up);
        let overrides = args.overrides();
        assert_eq!(
            overrides.database_url.as_deref(),
            Some("sqlite:///tmp/meters.db?mode=rwc")
        );
        assert_eq!(overrides.migrations_dir, Some(PathBuf::from("db/migrations")));
        assert_eq!(overrides.timeout_ms, Some(1500));
        assert_eq!(overrides.connect_attempts, Some(3));
        assert!(overrides.allow_out_of_order);
    }

    #[test]
    fn status_is_a_command() {
        let args = Args::try_parse_from(["migration", "status"]).unwrap();
        assert_eq!(args.command, Command::Status);
        assert!(!args.allow_out_of_order);
        assert!(matches!(
            MigrationCommand::from(args.command),
            MigrationCommand::Status
        ));
    }

    #[test]
    fn unknown_command_is_a_usage_error() {
        let err = Args::try_parse_from(["migration", "down"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn command_is_required() {
        assert!(Args::try_parse_from(["migration"]).is_err());
    }
}
