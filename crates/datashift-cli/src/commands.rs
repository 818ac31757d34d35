use std::path::PathBuf;

use anyhow::{Context, Result};
use datashift_common::{MigrationKind, VersionId};
use datashift_config::AppConfig;
use datashift_engine::{
    ExecutionReport, KindStatus, MigrationIo, Migrator, StatusReport, TracingObserver,
};
use tracing::info;

use crate::prompt::{Interaction, TerminalPrompt};
use crate::scaffold::{self, Template};

/// How a command ended, for the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The operator declined, or the request could not be satisfied.
    Aborted,
}

/// State shared by every command of one invocation.
pub struct Session {
    pub config: AppConfig,
    pub interaction: Interaction,
}

impl Session {
    fn migrator(&self) -> Result<Migrator> {
        let mut migrator = Migrator::open(self.config.clone()).with_context(|| {
            format!(
                "failed to open database {}",
                self.config.database.path.display()
            )
        })?;
        migrator.subscribe(TracingObserver);
        migrator.load().context("failed to load migrations")?;
        Ok(migrator)
    }

    fn io(&self) -> MigrationIo {
        let io = MigrationIo::stdout();
        if self.interaction.is_interactive() {
            io.with_prompt(TerminalPrompt)
        } else {
            io
        }
    }

    /// `data migrate`.
    pub fn data_migrate(&self, version: &str, only_force: bool) -> Result<Outcome> {
        let mut migrator = self.migrator()?;

        if only_force
            && !migrator
                .catalog(MigrationKind::Data)
                .contains(&VersionId::from(version))?
        {
            eprintln!("Could not find data migration version.");
            return Ok(Outcome::Aborted);
        }
        migrator.resolve(MigrationKind::Data, version)?;

        if !self.confirm_unavailable(&mut migrator, MigrationKind::Data)? {
            return Ok(Outcome::Aborted);
        }
        let question = "WARNING! You are about to execute a data migration that could result \
                        in data loss. Are you sure you wish to continue?";
        if !self.interaction.confirm(question, true)? {
            println!("Migration cancelled!");
            return Ok(Outcome::Aborted);
        }

        let report = migrator.migrate(MigrationKind::Data, version, only_force, &mut self.io())?;
        log_report(&report);
        Ok(Outcome::Done)
    }

    /// `data new`.
    pub fn data_new(&self, dir: Option<PathBuf>, template: Template) -> Result<Outcome> {
        let migrations = &self.config.migrations;
        let dir = match dir {
            Some(dir) => dir,
            None => self
                .interaction
                .choose_directory(&migrations.directories(MigrationKind::Data))?,
        };

        let version = VersionId::generate();
        let path = scaffold::write_data_migration(
            &dir,
            migrations.prefix(MigrationKind::Data),
            &migrations.extension,
            template,
            &version,
        )?;
        println!("Generated new data migration class to \"{}\"", path.display());
        if template == Template::Rust {
            println!("Register it with `RegisteredHandlers` in the program that embeds datashift.");
        }
        Ok(Outcome::Done)
    }

    /// `migrate`: schema migrations.
    pub fn migrate(&self, version: &str) -> Result<Outcome> {
        let mut migrator = self.migrator()?;
        migrator.resolve(MigrationKind::Scheme, version)?;

        if !self.confirm_unavailable(&mut migrator, MigrationKind::Scheme)? {
            return Ok(Outcome::Aborted);
        }
        let question = "WARNING! You are about to execute a database migration that could \
                        result in schema changes and data loss. Are you sure you wish to continue?";
        if !self.interaction.confirm(question, true)? {
            println!("Migration cancelled!");
            return Ok(Outcome::Aborted);
        }

        let report = migrator.migrate(MigrationKind::Scheme, version, false, &mut self.io())?;
        log_report(&report);
        Ok(Outcome::Done)
    }

    /// `continue`: schema then data, without questions.
    pub fn continue_all(&self) -> Result<Outcome> {
        let mut migrator = self.migrator()?;
        for report in migrator.continue_all(&mut MigrationIo::stdout())? {
            log_report(&report);
        }
        Ok(Outcome::Done)
    }

    /// `reset`: drop everything and rebuild.
    pub fn reset(&self) -> Result<Outcome> {
        let question = "WARNING! This will drop every table, view and trigger in the database \
                        and run all migrations again. Are you sure you wish to continue?";
        if !self.interaction.confirm(question, false)? {
            println!("Reset cancelled!");
            return Ok(Outcome::Aborted);
        }

        let mut migrator = self.migrator()?;
        for report in migrator.reset(&mut MigrationIo::stdout())? {
            log_report(&report);
        }
        Ok(Outcome::Done)
    }

    /// `status`.
    pub fn status(&self, json: bool) -> Result<Outcome> {
        let mut migrator = self.migrator()?;
        let status = migrator.status()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            print_status(&status);
        }
        Ok(Outcome::Done)
    }

    /// Warn about recorded versions without a unit and ask whether to go on.
    fn confirm_unavailable(&self, migrator: &mut Migrator, kind: MigrationKind) -> Result<bool> {
        let unavailable = migrator.unavailable_versions(kind)?;
        if unavailable.is_empty() {
            return Ok(true);
        }

        println!(
            "WARNING! You have {} previously executed {} migrations in the database that are not registered migrations.",
            unavailable.len(),
            kind.label()
        );
        for version in &unavailable {
            println!("    >> {} ({version})", version.display_datetime());
        }

        if self
            .interaction
            .confirm("Are you sure you wish to continue?", false)?
        {
            Ok(true)
        } else {
            println!("Migration cancelled!");
            Ok(false)
        }
    }
}

fn log_report(report: &ExecutionReport) {
    info!(
        kind = %report.kind,
        target = %report.target,
        executed = report.executed_count(),
        statements = report.statement_count(),
        dry_run = report.dry_run,
        "run finished"
    );
}

fn print_status(status: &StatusReport) {
    println!();
    println!("  Tracking table: {}", status.table);
    if status.dry_run {
        println!("  Dry run: the store is treated as empty");
    }
    for kind in [&status.schema, &status.data] {
        print_kind_status(kind);
    }
    println!();
}

fn print_kind_status(status: &KindStatus) {
    let version = |v: &VersionId| {
        if v.is_sentinel() {
            "0".to_string()
        } else {
            let when = v.display_datetime();
            if when.is_empty() {
                v.to_string()
            } else {
                format!("{when} ({v})")
            }
        }
    };

    println!();
    println!("  == {} migrations", status.kind.label());
    println!("    >> Current Version:       {}", version(&status.current));
    println!(
        "    >> Next Version:          {}",
        status
            .next
            .as_ref()
            .map(version)
            .unwrap_or_else(|| "Already at latest version".to_string())
    );
    println!("    >> Latest Version:        {}", version(&status.latest));
    println!("    >> Executed Migrations:   {}", status.executed);
    println!("    >> Executed Unavailable:  {}", status.unavailable.len());
    println!("    >> Available Migrations:  {}", status.available);
    println!("    >> New Migrations:        {}", status.pending);
}
