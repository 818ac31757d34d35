use std::rc::Rc;
use std::time::{Duration, Instant};

use datashift_common::{Error, MigrationKind, Result, VersionId};
use datashift_config::MigrationsConfig;
use datashift_db::{MigrationSession, QueryLog, TrackingStore};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::events::{MigrationEvent, MigrationObserver};
use crate::handler::{MigrationContext, MigrationIo};
use crate::planner::Plan;
use crate::resolver::AliasResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Resolving,
    Planning,
    Running,
    Marking,
    Reporting,
    Aborted,
}

/// A unit that ran successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedUnit {
    pub version: VersionId,
    pub elapsed: Duration,
    /// Statements the unit issued, transaction control excluded.
    pub statements: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub kind: MigrationKind,
    pub target: VersionId,
    /// Versions the plan contained, in order.
    pub planned: Vec<VersionId>,
    pub executed: Vec<ExecutedUnit>,
    pub elapsed: Duration,
    pub dry_run: bool,
}

impl ExecutionReport {
    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub fn statement_count(&self) -> usize {
        self.executed.iter().map(|u| u.statements.len()).sum()
    }

    pub fn executed_versions(&self) -> Vec<&VersionId> {
        self.executed.iter().map(|u| &u.version).collect()
    }

    pub fn is_noop(&self) -> bool {
        self.planned.is_empty()
    }
}

/// Resolves a target, plans the pending units and runs them in order,
/// recording each one as soon as it succeeds.
pub struct Executor<'a> {
    config: &'a MigrationsConfig,
    store: &'a TrackingStore,
    observers: Vec<Rc<dyn MigrationObserver>>,
    state: ExecutorState,
}

impl<'a> Executor<'a> {
    pub fn new(config: &'a MigrationsConfig, store: &'a TrackingStore) -> Self {
        Self {
            config,
            store,
            observers: Vec::new(),
            state: ExecutorState::Idle,
        }
    }

    pub fn subscribe(&mut self, observer: impl MigrationObserver + 'static) {
        self.observers.push(Rc::new(observer));
    }

    pub fn subscribe_shared(&mut self, observer: Rc<dyn MigrationObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    fn notify(&self, event: MigrationEvent<'_>) {
        for observer in &self.observers {
            observer.notify(self.config, &event);
        }
    }

    /// Migrate `catalog` to the version `token` resolves to. With `force`
    /// only that exact version runs, even if it is already recorded.
    pub fn migrate(
        &mut self,
        catalog: &mut Catalog,
        token: &str,
        force: bool,
        io: &mut MigrationIo,
    ) -> Result<ExecutionReport> {
        let result = self.run(catalog, token, force, io);
        self.state = match result {
            Ok(_) => ExecutorState::Idle,
            Err(_) => ExecutorState::Aborted,
        };
        result
    }

    fn run(
        &mut self,
        catalog: &mut Catalog,
        token: &str,
        force: bool,
        io: &mut MigrationIo,
    ) -> Result<ExecutionReport> {
        catalog.ensure_loaded()?;
        let kind = catalog.kind();

        self.state = ExecutorState::Resolving;
        let target = AliasResolver::new(catalog, self.store).resolve(token)?;

        self.state = ExecutorState::Planning;
        let plan = if force {
            Plan::forced(catalog, &target)?
        } else {
            let applied = self.store.applied_versions(kind)?;
            Plan::to_target(catalog, &target, &applied)?
        };
        let dry_run = self.store.is_dry_run();
        debug!(
            "planned {} {} migration(s) up to {target}",
            plan.len(),
            kind.label()
        );

        if !plan.is_empty() {
            self.notify(MigrationEvent::Migrating {
                kind,
                plan: &plan.versions,
                dry_run,
            });
        }

        let started = Instant::now();
        let mut executed = Vec::with_capacity(plan.len());

        if dry_run {
            for version in &plan.versions {
                io.writeln(format_args!(
                    "Would run migration {} {version}",
                    kind.label()
                ))?;
            }
        } else {
            // Created outside the per-unit transactions so a rollback cannot
            // undo it behind the store's back.
            self.store.ensure_ready()?;
            for version in &plan.versions {
                executed.push(self.execute_unit(catalog, version, force, io)?);
            }
        }

        self.state = ExecutorState::Reporting;
        let report = ExecutionReport {
            kind,
            target: plan.target.clone(),
            planned: plan.versions.clone(),
            executed,
            elapsed: started.elapsed(),
            dry_run,
        };
        write_summary(io, &report)?;

        self.notify(MigrationEvent::Migrated {
            kind,
            executed: &report.executed,
        });
        info!(
            "{} {} migration(s) executed, {} statement(s)",
            report.executed_count(),
            kind.label(),
            report.statement_count()
        );
        Ok(report)
    }

    fn execute_unit(
        &mut self,
        catalog: &mut Catalog,
        version: &VersionId,
        force: bool,
        io: &mut MigrationIo,
    ) -> Result<ExecutedUnit> {
        let kind = catalog.kind();
        self.state = ExecutorState::Running;
        self.notify(MigrationEvent::Executing { kind, version });
        io.writeln(format_args!("Run migration {} {version}", kind.label()))?;

        let log = QueryLog::new();
        let started = Instant::now();
        {
            let unit = catalog.get(version)?;
            let mut conn = self.store.connection()?;

            if self.config.transactional {
                let tx = conn
                    .transaction()
                    .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
                run_handler(unit.handler(), version, kind, &tx, &log, io)?;

                self.state = ExecutorState::Marking;
                self.store.mark_on(&tx, version, kind, force)?;
                tx.commit()
                    .map_err(|e| Error::Database(format!("failed to commit {version}: {e}")))?;
            } else {
                run_handler(unit.handler(), version, kind, &conn, &log, io)?;

                self.state = ExecutorState::Marking;
                self.store.mark_on(&conn, version, kind, force)?;
            }
        }
        let elapsed = started.elapsed();
        catalog.get_mut(version)?.set_elapsed(elapsed);

        let statements = log.into_statements();
        self.notify(MigrationEvent::Executed {
            kind,
            version,
            elapsed,
            statements: statements.len(),
        });

        Ok(ExecutedUnit {
            version: version.clone(),
            elapsed,
            statements,
        })
    }
}

fn run_handler(
    handler: &dyn crate::handler::MigrationHandler,
    version: &VersionId,
    kind: MigrationKind,
    conn: &Connection,
    log: &QueryLog,
    io: &mut MigrationIo,
) -> Result<()> {
    let mut ctx = MigrationContext::new(
        version,
        kind,
        MigrationSession::new(conn, log),
        &mut *io.output,
        io.prompt.as_deref(),
    );
    handler.execute(&mut ctx).map_err(|e| {
        warn!("migration {version} failed: {e}");
        Error::migration_failed(version.as_str(), e)
    })
}

fn write_summary(io: &mut MigrationIo, report: &ExecutionReport) -> Result<()> {
    if report.is_noop() {
        io.writeln(format_args!(
            "No {} migrations to execute.",
            report.kind.label()
        ))?;
        return Ok(());
    }
    if report.dry_run {
        io.writeln(format_args!(
            "{} {} migration(s) planned, nothing executed (dry run)",
            report.planned.len(),
            report.kind.label()
        ))?;
        return Ok(());
    }

    io.writeln("------------------------")?;
    io.writeln(format_args!(
        "++ finished in {}ms",
        report.elapsed.as_millis()
    ))?;
    io.writeln(format_args!(
        "++ {} migrations executed",
        report.executed_count()
    ))?;
    io.writeln(format_args!("++ {} sql queries", report.statement_count()))?;
    Ok(())
}
