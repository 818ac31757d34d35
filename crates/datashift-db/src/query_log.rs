use std::cell::RefCell;

use datashift_common::{Error, Result};
use rusqlite::{Connection, Params, Row};
use tracing::info;

/// Records the statements a migration unit issues through its session.
/// Transaction control statements are executed but not recorded.
#[derive(Debug, Default)]
pub struct QueryLog {
    statements: RefCell<Vec<String>>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sql: &str) {
        if is_transaction_control(sql) {
            return;
        }
        let sql = sql.trim();
        info!(target: "datashift::sql", "{sql}");
        self.statements.borrow_mut().push(sql.to_string());
    }

    pub fn count(&self) -> usize {
        self.statements.borrow().len()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements.into_inner()
    }
}

/// `BEGIN`, `COMMIT`, `ROLLBACK` and friends.
pub fn is_transaction_control(sql: &str) -> bool {
    let head: Vec<String> = sql
        .split_whitespace()
        .take(2)
        .map(|w| w.trim_end_matches(';').to_ascii_uppercase())
        .collect();
    match head.first().map(String::as_str) {
        Some("BEGIN" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE") => true,
        Some("START") => head.get(1).is_some_and(|w| w == "TRANSACTION"),
        Some("END") => head.len() == 1 || head[1] == "TRANSACTION",
        _ => false,
    }
}

/// Connection handle given to a migration unit. Statements issued through
/// it are recorded in the attached [`QueryLog`].
pub struct MigrationSession<'a> {
    conn: &'a Connection,
    log: &'a QueryLog,
}

impl<'a> MigrationSession<'a> {
    pub fn new(conn: &'a Connection, log: &'a QueryLog) -> Self {
        Self { conn, log }
    }

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.log.record(sql);
        self.conn
            .execute(sql, params)
            .map_err(|e| Error::Database(format!("statement failed: {e}")))
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.log.record(sql);
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::Database(format!("statement failed: {e}")))
    }

    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.log.record(sql);
        self.conn
            .query_row(sql, params, f)
            .map_err(|e| Error::Database(format!("query failed: {e}")))
    }

    pub fn query_all<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.log.record(sql);
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params, f)
            .map_err(|e| Error::Database(format!("query failed: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read row: {e}")))
    }

    /// Raw connection. Statements issued here bypass the log.
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    pub fn statement_count(&self) -> usize {
        self.log.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn recognises_transaction_control() {
        for sql in [
            "BEGIN",
            "begin immediate",
            "COMMIT;",
            "ROLLBACK TO sp1",
            "START TRANSACTION",
            "SAVEPOINT sp1",
            "RELEASE sp1",
            "END",
            "end transaction",
        ] {
            assert!(is_transaction_control(sql), "{sql}");
        }
        for sql in [
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET begin = 1",
            "START something",
            "",
        ] {
            assert!(!is_transaction_control(sql), "{sql}");
        }
    }

    #[test]
    fn session_records_statements_but_not_transaction_control() {
        let conn = Connection::open_in_memory().unwrap();
        let log = QueryLog::new();
        let session = MigrationSession::new(&conn, &log);

        session.execute_batch("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        session.execute_batch("BEGIN").unwrap();
        session
            .execute("INSERT INTO t (id, name) VALUES (?1, ?2)", params![1, "a"])
            .unwrap();
        session.execute_batch("COMMIT").unwrap();
        let name: String = session
            .query_row("SELECT name FROM t WHERE id = ?1", params![1], |row| row.get(0))
            .unwrap();

        assert_eq!(name, "a");
        assert_eq!(session.statement_count(), 3);
        assert_eq!(
            log.statements(),
            vec![
                "CREATE TABLE t (id INTEGER, name TEXT)",
                "INSERT INTO t (id, name) VALUES (?1, ?2)",
                "SELECT name FROM t WHERE id = ?1",
            ]
        );
    }

    #[test]
    fn raw_connection_bypasses_the_log() {
        let conn = Connection::open_in_memory().unwrap();
        let log = QueryLog::new();
        let session = MigrationSession::new(&conn, &log);

        session
            .connection()
            .execute_batch("CREATE TABLE t (id INTEGER)")
            .unwrap();
        let ids: Vec<i64> = session
            .query_all("SELECT id FROM t", [], |row| row.get(0))
            .unwrap();

        assert!(ids.is_empty());
        assert_eq!(log.count(), 1);
    }

    #[test]
    fn failed_statement_is_a_database_error() {
        let conn = Connection::open_in_memory().unwrap();
        let log = QueryLog::new();
        let session = MigrationSession::new(&conn, &log);

        let err = session.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(log.count(), 1);
    }
}
