use datashift_common::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::tracking_store::quote_identifier;

/// Drop every user trigger, view and table (with their indexes). Returns
/// the number of objects dropped.
pub fn drop_all_objects(conn: &Connection) -> Result<usize> {
    let mut stmt = conn
        .prepare(
            "SELECT type, name FROM sqlite_master
             WHERE type IN ('trigger', 'view', 'table') AND name NOT LIKE 'sqlite_%'
             ORDER BY CASE type WHEN 'trigger' THEN 0 WHEN 'view' THEN 1 ELSE 2 END, name",
        )
        .map_err(|e| Error::Database(format!("failed to list schema objects: {e}")))?;
    let objects = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|e| Error::Database(format!("failed to list schema objects: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Database(format!("failed to read schema object: {e}")))?;
    drop(stmt);

    // Foreign keys cannot be toggled inside a transaction.
    conn.execute_batch("PRAGMA foreign_keys=OFF;")
        .map_err(|e| Error::Database(format!("failed to disable foreign keys: {e}")))?;

    let result = drop_objects(conn, &objects);

    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .map_err(|e| Error::Database(format!("failed to enable foreign keys: {e}")))?;

    result?;
    info!("dropped {} schema object(s)", objects.len());
    Ok(objects.len())
}

fn drop_objects(conn: &Connection, objects: &[(String, String)]) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
    for (kind, name) in objects {
        debug!("dropping {kind} {name}");
        let keyword = match kind.as_str() {
            "trigger" => "TRIGGER",
            "view" => "VIEW",
            _ => "TABLE",
        };
        tx.execute_batch(&format!(
            "DROP {keyword} IF EXISTS {}",
            quote_identifier(name)
        ))
        .map_err(|e| Error::Database(format!("failed to drop {kind} {name}: {e}")))?;
    }
    tx.commit()
        .map_err(|e| Error::Database(format!("failed to commit drop: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_tables_views_and_triggers() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (id INTEGER, parent_id INTEGER REFERENCES parent(id));
             CREATE INDEX child_parent ON child (parent_id);
             CREATE VIEW v AS SELECT * FROM child;
             CREATE TRIGGER trg AFTER INSERT ON parent BEGIN DELETE FROM child; END;
             INSERT INTO parent VALUES (1);
             INSERT INTO child VALUES (1, 1);",
        )
        .unwrap();

        assert_eq!(drop_all_objects(&conn).unwrap(), 4);

        let left: i64 = conn
            .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn empty_database_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(drop_all_objects(&conn).unwrap(), 0);
    }
}
