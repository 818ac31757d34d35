mod commands;
mod header;
mod prompt;
mod scaffold;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datashift_config::{AppConfig, ConfigLoader, LogConfig, LogFormat};
use tracing_subscriber::EnvFilter;

use crate::commands::{Outcome, Session};
use crate::prompt::Interaction;
use crate::scaffold::Template;

/// datashift - versioned schema and data migrations
#[derive(Parser, Debug)]
#[command(name = "datashift")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to datashift.yml / datashift.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Plan and report without executing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Do not ask any interactive question
    #[arg(short = 'n', long, global = true)]
    no_interaction: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Data migrations
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Execute schema migrations up to a version
    Migrate {
        /// Target version or alias (first, prev, next, latest, current+N, current-N)
        #[arg(default_value = "latest")]
        version: String,
    },
    /// Apply all pending schema migrations, then all pending data migrations
    Continue,
    /// Drop the whole database and run every migration again
    Reset,
    /// Show where both migration streams stand
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DataCommands {
    /// Execute data migrations up to a version
    Migrate {
        /// Target version or alias (first, prev, next, latest, current+N, current-N)
        #[arg(default_value = "latest")]
        version: String,

        /// Run exactly this version, even if it was already executed
        #[arg(long)]
        only_force: bool,
    },
    /// Generate a blank data migration
    New {
        /// Directory for the new file
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Kind of file to generate
        #[arg(long, value_enum, default_value = "sql")]
        template: Template,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Data {
                action: DataCommands::Migrate { .. },
            } => "data migrate",
            Commands::Data {
                action: DataCommands::New { .. },
            } => "data new",
            Commands::Migrate { .. } => "migrate",
            Commands::Continue => "continue",
            Commands::Reset => "reset",
            Commands::Status { .. } => "status",
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli) {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Aborted) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            let resolution = e
                .downcast_ref::<datashift_common::Error>()
                .is_some_and(|e| e.is_resolution_failure());
            if resolution {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config_file = loader.resolve_path();
    let mut config = loader.load().context("failed to load configuration")?;
    apply_cli_overrides(&mut config, &cli);

    init_tracing(&config.log, cli.verbose);
    header::print_header(cli.command.name(), &config, config_file.as_deref());

    let session = Session {
        config,
        interaction: Interaction::detect(cli.no_interaction),
    };

    match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Migrate {
                version,
                only_force,
            } => session.data_migrate(&version, only_force),
            DataCommands::New { dir, template } => session.data_new(dir, template),
        },
        Commands::Migrate { version } => session.migrate(&version),
        Commands::Continue => session.continue_all(),
        Commands::Reset => session.reset(),
        Commands::Status { json } => session.status(json),
    }
}

fn apply_cli_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if cli.dry_run {
        config.migrations.dry_run = true;
    }
}

fn init_tracing(log: &LogConfig, verbose: bool) {
    let default = if verbose {
        "debug"
    } else {
        log.level.as_deref().unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_target(false).init(),
    }
}
