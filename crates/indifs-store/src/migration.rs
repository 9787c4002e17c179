//! SQLite schema setup.
//!
//! The schema version lives in `PRAGMA user_version`. A fresh database
//! gets the `kv` table; a database written by a newer release is refused.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Schema version written by this release.
pub const SCHEMA_VERSION: u32 = 1;

/// One ordered key-value table. BLOB keys compare with memcmp, which gives
/// the byte-wise ordering prefix scans rely on.
const SCHEMA: &str = r#"
    CREATE TABLE kv (
        key BLOB PRIMARY KEY,      -- headers | log/<be u64> | part/<hash> | file/<merkle>
        value BLOB NOT NULL        -- CBOR record or raw chunk bytes
    ) WITHOUT ROWID;
"#;

/// Create the schema if missing. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    match version {
        0 => {
            debug!(version = SCHEMA_VERSION, "creating store schema");
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        newer => Err(StoreError::Migration(format!(
            "schema version {} is newer than supported version {}",
            newer, SCHEMA_VERSION
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> u32 {
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_migration_creates_kv_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(tables, vec!["kv".to_string()]);
        assert_eq!(user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute("INSERT INTO kv (key, value) VALUES (x'01', x'02')", [])
            .unwrap();
        migrate(&mut conn).unwrap();

        let rows: u32 = conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::Migration(_)));
    }
}
