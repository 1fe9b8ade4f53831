//! Database schema definitions
//!
//! This module contains the SQL schema for the frontier's work database.
//! The work database only holds state that is too large for memory; it is
//! rebuilt from a checkpoint on recovery, never trusted across restarts.

/// SQL schema for the work database
pub const SCHEMA_SQL: &str = r#"
-- Fingerprints of every URI the frontier has accepted
CREATE TABLE IF NOT EXISTS fingerprints (
    fp INTEGER PRIMARY KEY
) WITHOUT ROWID;

-- Pending records that overflowed a queue's in-memory head
CREATE TABLE IF NOT EXISTS spilled_uris (
    queue_key TEXT NOT NULL,
    seq INTEGER NOT NULL,
    record TEXT NOT NULL,
    PRIMARY KEY (queue_key, seq)
) WITHOUT ROWID;
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
