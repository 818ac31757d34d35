use std::rc::Rc;

use datashift_common::{Error, MigrationKind, Result, VersionId};
use datashift_config::{AppConfig, MigrationsConfig};
use datashift_db::{TrackingStore, TrackingTable, drop_all_objects};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::events::MigrationObserver;
use crate::executor::{ExecutionReport, Executor};
use crate::finder::FileFinder;
use crate::handler::{MigrationIo, RegisteredHandlers, SqlFileLoader};
use crate::planner::{pending_to_target, unavailable_versions};
use crate::resolver::AliasResolver;

/// Per-kind snapshot of where the database stands.
#[derive(Debug, Clone, Serialize)]
pub struct KindStatus {
    pub kind: MigrationKind,
    pub current: VersionId,
    pub latest: VersionId,
    pub next: Option<VersionId>,
    pub executed: usize,
    pub available: usize,
    pub pending: usize,
    pub unavailable: Vec<VersionId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub table: String,
    pub dry_run: bool,
    pub schema: KindStatus,
    pub data: KindStatus,
}

/// Owns the configuration, the tracking store and one catalog per kind.
pub struct Migrator {
    config: AppConfig,
    store: TrackingStore,
    schema: Catalog,
    data: Catalog,
    observers: Vec<Rc<dyn MigrationObserver>>,
}

impl Migrator {
    /// Open the configured database and set up file discovery for both kinds.
    pub fn open(config: AppConfig) -> Result<Self> {
        let table = tracking_table(&config.migrations);
        let path = &config.database.path;
        let store = if path.as_os_str() == ":memory:" {
            TrackingStore::in_memory(table)?
        } else {
            TrackingStore::open(path, table)?
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: TrackingStore) -> Result<Self> {
        let store = store.with_dry_run(config.migrations.dry_run);
        let schema = file_catalog(&config.migrations, MigrationKind::Scheme)?;
        let data = file_catalog(&config.migrations, MigrationKind::Data)?;
        Ok(Self {
            config,
            store,
            schema,
            data,
            observers: Vec::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &TrackingStore {
        &self.store
    }

    pub fn catalog(&self, kind: MigrationKind) -> &Catalog {
        match kind {
            MigrationKind::Scheme => &self.schema,
            MigrationKind::Data => &self.data,
        }
    }

    fn catalog_mut(&mut self, kind: MigrationKind) -> &mut Catalog {
        match kind {
            MigrationKind::Scheme => &mut self.schema,
            MigrationKind::Data => &mut self.data,
        }
    }

    /// Add compiled-in units for `kind`. Must happen before loading.
    pub fn register_handlers(&mut self, kind: MigrationKind, handlers: RegisteredHandlers) -> Result<()> {
        let catalog = self.catalog_mut(kind);
        catalog.add_finder(handlers.clone())?;
        catalog.add_loader(handlers)
    }

    pub fn subscribe(&mut self, observer: impl MigrationObserver + 'static) {
        self.observers.push(Rc::new(observer));
    }

    pub fn load(&mut self) -> Result<()> {
        self.schema.ensure_loaded()?;
        self.data.ensure_loaded()
    }

    pub fn resolve(&mut self, kind: MigrationKind, token: &str) -> Result<VersionId> {
        self.catalog_mut(kind).ensure_loaded()?;
        AliasResolver::new(self.catalog(kind), &self.store).resolve(token)
    }

    /// Versions that would run for `token`, without running them.
    pub fn pending(&mut self, kind: MigrationKind, token: &str) -> Result<Vec<VersionId>> {
        let target = self.resolve(kind, token)?;
        let applied = self.store.applied_versions(kind)?;
        pending_to_target(self.catalog(kind), &target, &applied)
    }

    pub fn migrate(
        &mut self,
        kind: MigrationKind,
        token: &str,
        force: bool,
        io: &mut MigrationIo,
    ) -> Result<ExecutionReport> {
        let catalog = match kind {
            MigrationKind::Scheme => &mut self.schema,
            MigrationKind::Data => &mut self.data,
        };
        let mut executor = Executor::new(&self.config.migrations, &self.store);
        for observer in &self.observers {
            executor.subscribe_shared(Rc::clone(observer));
        }
        executor.migrate(catalog, token, force, io)
    }

    /// Recorded versions of `kind` that have no unit any more.
    pub fn unavailable_versions(&mut self, kind: MigrationKind) -> Result<Vec<VersionId>> {
        self.catalog_mut(kind).ensure_loaded()?;
        let applied = self.store.applied_versions(kind)?;
        let missing = unavailable_versions(self.catalog(kind), &applied)?;
        if !missing.is_empty() {
            warn!(
                "{} previously executed {} migration(s) are not registered",
                missing.len(),
                kind.label()
            );
        }
        Ok(missing)
    }

    pub fn status(&mut self) -> Result<StatusReport> {
        self.load()?;
        Ok(StatusReport {
            table: self.config.migrations.table.clone(),
            dry_run: self.store.is_dry_run(),
            schema: self.kind_status(MigrationKind::Scheme)?,
            data: self.kind_status(MigrationKind::Data)?,
        })
    }

    fn kind_status(&mut self, kind: MigrationKind) -> Result<KindStatus> {
        let unavailable = self.unavailable_versions(kind)?;
        let catalog = self.catalog(kind);
        let resolver = AliasResolver::new(catalog, &self.store);
        let next = match resolver.next() {
            Ok(version) => Some(version),
            Err(Error::AtLatestVersion) => None,
            Err(e) => return Err(e),
        };
        let latest = resolver.latest()?;
        let applied = self.store.applied_versions(kind)?;

        Ok(KindStatus {
            kind,
            current: resolver.current()?,
            pending: pending_to_target(catalog, &latest, &applied)?.len(),
            latest,
            next,
            executed: self.store.executed_count(kind)?,
            available: catalog.len()?,
            unavailable,
        })
    }

    /// Bring both kinds to their latest version: schema first, then data.
    pub fn continue_all(&mut self, io: &mut MigrationIo) -> Result<Vec<ExecutionReport>> {
        self.load()?;
        let mut reports = Vec::with_capacity(2);

        if self.schema.is_empty()? {
            info!("no schema migrations registered, skipping schema step");
            io.writeln("No schema migrations available, skipping schema step.")?;
        } else {
            reports.push(self.migrate(MigrationKind::Scheme, "latest", false, io)?);
        }
        reports.push(self.migrate(MigrationKind::Data, "latest", false, io)?);
        Ok(reports)
    }

    /// Drop every object in the database, then run [`continue_all`](Self::continue_all).
    pub fn reset(&mut self, io: &mut MigrationIo) -> Result<Vec<ExecutionReport>> {
        if self.store.is_dry_run() {
            io.writeln("Dry run: the database would be dropped and rebuilt.")?;
        } else {
            let dropped = {
                let conn = self.store.connection()?;
                drop_all_objects(&conn)?
            };
            self.store.invalidate();
            io.writeln(format_args!("Dropped {dropped} database object(s)."))?;
        }
        self.continue_all(io)
    }
}

fn tracking_table(config: &MigrationsConfig) -> TrackingTable {
    TrackingTable::new(&config.table, &config.column, &config.type_column)
}

fn file_catalog(config: &MigrationsConfig, kind: MigrationKind) -> Result<Catalog> {
    let mut catalog = Catalog::new(kind, config.namespace(kind));
    for dir in config.directories(kind) {
        catalog.add_finder(FileFinder::new(dir, config.prefix(kind), &config.extension)?)?;
    }
    catalog.add_loader(SqlFileLoader::new(&config.extension))?;
    Ok(catalog)
}
