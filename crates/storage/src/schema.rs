use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS accounts (
    account_id BLOB PRIMARY KEY CHECK (length(account_id) = 16),
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS records (
    record_id BLOB PRIMARY KEY CHECK (length(record_id) = 16),
    kind TEXT NOT NULL,
    owner_account BLOB CHECK (owner_account IS NULL OR length(owner_account) = 16),
    owner_session TEXT,
    name TEXT,
    description TEXT,
    definition BLOB,
    session_default INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    count INTEGER,
    created_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    updated_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER)),
    CHECK ((owner_account IS NULL) <> (owner_session IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_records_owner_account ON records (owner_account, kind) WHERE owner_account IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_records_owner_session ON records (owner_session, kind) WHERE owner_session IS NOT NULL;

-- One live session-default record per owner and kind.
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_default_account ON records (owner_account, kind)
    WHERE session_default = 1 AND archived = 0 AND owner_account IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_default_session ON records (owner_session, kind)
    WHERE session_default = 1 AND archived = 0 AND owner_session IS NOT NULL;

CREATE TABLE IF NOT EXISTS shares (
    record_id BLOB NOT NULL CHECK (length(record_id) = 16)
        REFERENCES records (record_id) ON DELETE CASCADE,
    account_id BLOB NOT NULL CHECK (length(account_id) = 16)
        REFERENCES accounts (account_id),
    PRIMARY KEY (record_id, account_id)
);
";
