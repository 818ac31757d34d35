//! Migration catalog, version resolution and execution.
//!
//! A [`Migrator`] owns one [`Catalog`] per [`MigrationKind`] and the
//! [`TrackingStore`] they share. Most callers only need it; the individual
//! pieces are public for embedding the engine elsewhere.
//!
//! [`MigrationKind`]: datashift_common::MigrationKind
//! [`TrackingStore`]: datashift_db::TrackingStore

pub mod catalog;
pub mod events;
pub mod executor;
pub mod finder;
pub mod handler;
pub mod migrator;
pub mod planner;
pub mod resolver;
pub mod sql;

pub use catalog::{Catalog, MigrationUnit};
pub use events::{MigrationEvent, MigrationObserver, TracingObserver};
pub use executor::{ExecutedUnit, ExecutionReport, Executor, ExecutorState};
pub use finder::{FileFinder, MigrationFinder};
pub use handler::{
    FnHandler, HandlerLoader, HandlerRef, LoaderChain, MigrationContext, MigrationHandler,
    MigrationIo, Prompt, RegisteredHandlers, SqlFileLoader, SqlMigration,
};
pub use migrator::{KindStatus, Migrator, StatusReport};
pub use planner::{Plan, pending_to_target, unavailable_versions};
pub use resolver::{AliasResolver, VersionAlias};
