use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use datashift_common::{Error, MigrationKind, Result, VersionId};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info};

/// Names of the tracking table and its two columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingTable {
    pub table: String,
    pub version_column: String,
    pub type_column: String,
}

impl TrackingTable {
    pub fn new(
        table: impl Into<String>,
        version_column: impl Into<String>,
        type_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            version_column: version_column.into(),
            type_column: type_column.into(),
        }
    }
}

impl Default for TrackingTable {
    fn default() -> Self {
        Self::new("doctrine_migrations", "version", "type")
    }
}

/// One row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingRecord {
    pub version: VersionId,
    pub kind: MigrationKind,
}

/// Persistent ledger of applied (version, kind) pairs.
///
/// The table is created on first use and upgraded in place when an older
/// table lacks the kind column. Under dry run nothing is read or written
/// and the store behaves as if it were empty.
pub struct TrackingStore {
    conn: Mutex<Connection>,
    table: TrackingTable,
    dry_run: bool,
    ready: AtomicBool,
}

impl TrackingStore {
    pub fn open(db_path: &Path, table: TrackingTable) -> Result<Self> {
        info!("opening tracking store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self::from_connection(conn, table))
    }

    pub fn in_memory(table: TrackingTable) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self::from_connection(conn, table))
    }

    pub fn from_connection(conn: Connection, table: TrackingTable) -> Self {
        Self {
            conn: Mutex::new(conn),
            table,
            dry_run: false,
            ready: AtomicBool::new(false),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn table(&self) -> &TrackingTable {
        &self.table
    }

    /// The connection shared by the store and the migration units.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("tracking store lock poisoned".into()))
    }

    /// Forget that the table was checked, e.g. after the database was wiped.
    pub fn invalidate(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Create or upgrade the tracking table. Returns `true` when the table
    /// was created by this call.
    pub fn ensure_ready(&self) -> Result<bool> {
        let conn = self.connection()?;
        self.ensure_ready_on(&conn)
    }

    /// Same as [`ensure_ready`](Self::ensure_ready) on a connection the
    /// caller already holds, such as an open transaction.
    pub fn ensure_ready_on(&self, conn: &Connection) -> Result<bool> {
        if self.dry_run || self.ready.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let t = &self.table;
        let exists: bool = conn
            .query_row(
                "SELECT count(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                params![t.table],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to check tracking table: {e}")))?;

        if exists {
            self.upgrade_type_column(conn)?;
            self.ready.store(true, Ordering::SeqCst);
            return Ok(false);
        }

        let sql = format!(
            "CREATE TABLE {table} (
                {version} VARCHAR(255) NOT NULL,
                {kind} VARCHAR(255) NOT NULL DEFAULT 'scheme',
                PRIMARY KEY ({version}, {kind})
            )",
            table = quote_identifier(&t.table),
            version = quote_identifier(&t.version_column),
            kind = quote_identifier(&t.type_column),
        );
        conn.execute_batch(&sql)
            .map_err(|e| Error::Database(format!("failed to create tracking table: {e}")))?;

        info!("created tracking table {}", t.table);
        self.ready.store(true, Ordering::SeqCst);
        Ok(true)
    }

    fn upgrade_type_column(&self, conn: &Connection) -> Result<()> {
        let t = &self.table;
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(&t.table)))
            .map_err(|e| Error::Database(format!("failed to inspect tracking table: {e}")))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| Error::Database(format!("failed to inspect tracking table: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read column info: {e}")))?;

        if columns.iter().any(|c| c == &t.type_column) {
            return Ok(());
        }

        // Existing rows predate data migrations and become schema records.
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} VARCHAR(255) NOT NULL DEFAULT 'scheme'",
            quote_identifier(&t.table),
            quote_identifier(&t.type_column),
        ))
        .map_err(|e| Error::Database(format!("failed to add type column: {e}")))?;

        info!(
            "upgraded tracking table {}: added column {}",
            t.table, t.type_column
        );
        Ok(())
    }

    pub fn is_applied(&self, version: &VersionId, kind: MigrationKind) -> Result<bool> {
        let conn = self.connection()?;
        self.is_applied_on(&conn, version, kind)
    }

    fn is_applied_on(
        &self,
        conn: &Connection,
        version: &VersionId,
        kind: MigrationKind,
    ) -> Result<bool> {
        if self.dry_run {
            return Ok(false);
        }
        self.ensure_ready_on(conn)?;

        let t = &self.table;
        let sql = format!(
            "SELECT {version} FROM {table} WHERE {version} = ?1 AND {kind} = ?2",
            table = quote_identifier(&t.table),
            version = quote_identifier(&t.version_column),
            kind = quote_identifier(&t.type_column),
        );
        let found = conn
            .query_row(&sql, params![version.as_str(), kind.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| Error::Database(format!("failed to check version {version}: {e}")))?;

        Ok(found.is_some())
    }

    pub fn applied_versions(&self, kind: MigrationKind) -> Result<BTreeSet<VersionId>> {
        if self.dry_run {
            return Ok(BTreeSet::new());
        }
        let conn = self.connection()?;
        self.ensure_ready_on(&conn)?;

        let t = &self.table;
        let sql = format!(
            "SELECT {version} FROM {table} WHERE {kind} = ?1",
            table = quote_identifier(&t.table),
            version = quote_identifier(&t.version_column),
            kind = quote_identifier(&t.type_column),
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params![kind.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to query applied versions: {e}")))?;

        let mut versions = BTreeSet::new();
        for row in rows {
            let version =
                row.map_err(|e| Error::Database(format!("failed to read version row: {e}")))?;
            versions.insert(VersionId::from_string(version));
        }
        Ok(versions)
    }

    /// Greatest applied version of `kind` for which `available` holds, or
    /// the sentinel. Tracked ids whose unit no longer exists are skipped.
    pub fn current_version(
        &self,
        kind: MigrationKind,
        available: impl Fn(&VersionId) -> bool,
    ) -> Result<VersionId> {
        let current = self
            .applied_versions(kind)?
            .into_iter()
            .rev()
            .find(|v| available(v))
            .unwrap_or_else(VersionId::sentinel);
        Ok(current)
    }

    pub fn executed_count(&self, kind: MigrationKind) -> Result<usize> {
        if self.dry_run {
            return Ok(0);
        }
        let conn = self.connection()?;
        self.ensure_ready_on(&conn)?;

        let t = &self.table;
        let sql = format!(
            "SELECT COUNT({version}) FROM {table} WHERE {kind} = ?1",
            table = quote_identifier(&t.table),
            version = quote_identifier(&t.version_column),
            kind = quote_identifier(&t.type_column),
        );
        let count: i64 = conn
            .query_row(&sql, params![kind.as_str()], |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to count records: {e}")))?;
        Ok(count as usize)
    }

    /// Every record, ordered by version then kind.
    pub fn records(&self) -> Result<Vec<TrackingRecord>> {
        if self.dry_run {
            return Ok(Vec::new());
        }
        let conn = self.connection()?;
        self.ensure_ready_on(&conn)?;

        let t = &self.table;
        let sql = format!(
            "SELECT {version}, {kind} FROM {table} ORDER BY {version} ASC, {kind} ASC",
            table = quote_identifier(&t.table),
            version = quote_identifier(&t.version_column),
            kind = quote_identifier(&t.type_column),
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| Error::Database(format!("failed to query records: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            let (version, kind) =
                row.map_err(|e| Error::Database(format!("failed to read record row: {e}")))?;
            records.push(TrackingRecord {
                version: VersionId::from_string(version),
                kind: kind.parse()?,
            });
        }
        Ok(records)
    }

    /// Record `version` as applied. With `force`, an existing record is
    /// left alone instead of failing on the duplicate key. Returns whether
    /// a row was inserted.
    pub fn mark(&self, version: &VersionId, kind: MigrationKind, force: bool) -> Result<bool> {
        let conn = self.connection()?;
        self.mark_on(&conn, version, kind, force)
    }

    /// Same as [`mark`](Self::mark) on a connection the caller already
    /// holds, so the record can commit together with the unit's changes.
    pub fn mark_on(
        &self,
        conn: &Connection,
        version: &VersionId,
        kind: MigrationKind,
        force: bool,
    ) -> Result<bool> {
        if self.dry_run {
            return Ok(false);
        }
        self.ensure_ready_on(conn)?;

        if force && self.is_applied_on(conn, version, kind)? {
            debug!("version {version} already recorded as {kind}, skipping mark");
            return Ok(false);
        }

        let t = &self.table;
        let sql = format!(
            "INSERT INTO {table} ({version}, {kind}) VALUES (?1, ?2)",
            table = quote_identifier(&t.table),
            version = quote_identifier(&t.version_column),
            kind = quote_identifier(&t.type_column),
        );
        conn.execute(&sql, params![version.as_str(), kind.as_str()])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    Error::AlreadyRecorded {
                        version: version.to_string(),
                        kind: kind.to_string(),
                    }
                }
                other => Error::Database(format!("failed to record version {version}: {other}")),
            })?;

        debug!("recorded version {version} as {kind}");
        Ok(true)
    }
}

/// Double-quote an SQL identifier.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
