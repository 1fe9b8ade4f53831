//! SQLite storage implementation

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the work database at `path`
    ///
    /// The parent directory is created if it does not exist.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // The work database is rebuilt from checkpoints on recovery, so
        // durability of individual transactions is not required here.
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = OFF;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    // ===== Fingerprints =====

    fn insert_fingerprint(&mut self, fp: u64) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO fingerprints (fp) VALUES (?1)",
            params![fp as i64],
        )?;
        Ok(changed == 1)
    }

    fn insert_fingerprints(&mut self, fps: &[u64]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO fingerprints (fp) VALUES (?1)")?;
            for fp in fps {
                stmt.execute(params![*fp as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn contains_fingerprint(&self, fp: u64) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT fp FROM fingerprints WHERE fp = ?1",
                params![fp as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn count_fingerprints(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn export_fingerprints(
        &self,
        sink: &mut dyn FnMut(u64) -> std::io::Result<()>,
    ) -> StorageResult<()> {
        let mut stmt = self.conn.prepare("SELECT fp FROM fingerprints ORDER BY fp")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let fp: i64 = row.get(0)?;
            sink(fp as u64)?;
        }
        Ok(())
    }

    // ===== Spilled queue records =====

    fn spill(&mut self, key: &str, seq: i64, record: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO spilled_uris (queue_key, seq, record) VALUES (?1, ?2, ?3)",
            params![key, seq, record],
        )?;
        Ok(())
    }

    fn unspill(&mut self, key: &str, limit: usize) -> StorageResult<Vec<String>> {
        let tx = self.conn.transaction()?;
        let mut records = Vec::new();
        let mut last_seq = None;
        {
            let mut stmt = tx.prepare_cached(
                "SELECT seq, record FROM spilled_uris WHERE queue_key = ?1 ORDER BY seq LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![key, limit as i64])?;
            while let Some(row) = rows.next()? {
                last_seq = Some(row.get::<_, i64>(0)?);
                records.push(row.get::<_, String>(1)?);
            }
        }

        if let Some(seq) = last_seq {
            tx.execute(
                "DELETE FROM spilled_uris WHERE queue_key = ?1 AND seq <= ?2",
                params![key, seq],
            )?;
        }
        tx.commit()?;

        Ok(records)
    }

    fn read_spilled(&self, key: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT record FROM spilled_uris WHERE queue_key = ?1 ORDER BY seq")?;
        let records = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(records)
    }

    // ===== Maintenance =====

    fn reset(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("DELETE FROM fingerprints; DELETE FROM spilled_uris;")?;
        Ok(())
    }
}
