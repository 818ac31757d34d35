use std::time::Duration;

use datashift_common::{MigrationKind, VersionId};
use datashift_config::MigrationsConfig;
use tracing::info;

use crate::executor::ExecutedUnit;

/// Lifecycle notifications emitted by the executor.
#[derive(Debug, Clone, Copy)]
pub enum MigrationEvent<'a> {
    /// The plan is ready and about to run. Not sent for an empty plan.
    Migrating {
        kind: MigrationKind,
        plan: &'a [VersionId],
        dry_run: bool,
    },
    /// A unit is about to run.
    Executing {
        kind: MigrationKind,
        version: &'a VersionId,
    },
    /// A unit finished and was recorded.
    Executed {
        kind: MigrationKind,
        version: &'a VersionId,
        elapsed: Duration,
        statements: usize,
    },
    /// The run completed.
    Migrated {
        kind: MigrationKind,
        executed: &'a [ExecutedUnit],
    },
}

impl MigrationEvent<'_> {
    pub fn kind(&self) -> MigrationKind {
        match self {
            MigrationEvent::Migrating { kind, .. }
            | MigrationEvent::Executing { kind, .. }
            | MigrationEvent::Executed { kind, .. }
            | MigrationEvent::Migrated { kind, .. } => *kind,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MigrationEvent::Migrating { .. } => "migrating",
            MigrationEvent::Executing { .. } => "executing",
            MigrationEvent::Executed { .. } => "executed",
            MigrationEvent::Migrated { .. } => "migrated",
        }
    }
}

/// Receives lifecycle notifications. Observers cannot veto a run.
pub trait MigrationObserver {
    fn notify(&self, config: &MigrationsConfig, event: &MigrationEvent<'_>);
}

impl<F> MigrationObserver for F
where
    F: Fn(&MigrationsConfig, &MigrationEvent<'_>),
{
    fn notify(&self, config: &MigrationsConfig, event: &MigrationEvent<'_>) {
        self(config, event)
    }
}

/// Logs every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl MigrationObserver for TracingObserver {
    fn notify(&self, config: &MigrationsConfig, event: &MigrationEvent<'_>) {
        match event {
            MigrationEvent::Migrating {
                kind,
                plan,
                dry_run,
            } => info!(
                table = %config.table,
                dry_run,
                "migrating {} {} migration(s)",
                plan.len(),
                kind.label()
            ),
            MigrationEvent::Executing { kind, version } => {
                info!("executing {} migration {version}", kind.label())
            }
            MigrationEvent::Executed {
                kind,
                version,
                elapsed,
                statements,
            } => info!(
                elapsed_ms = elapsed.as_millis() as u64,
                statements,
                "executed {} migration {version}",
                kind.label()
            ),
            MigrationEvent::Migrated { kind, executed } => {
                info!("migrated {} {} migration(s)", executed.len(), kind.label())
            }
        }
    }
}
