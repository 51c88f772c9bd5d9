//! Schema definition and migration for the embedded database.

/// The current schema, applied with `execute_batch` on every open. All
/// statements are `IF NOT EXISTS` so opening an existing database is a
/// no-op; there is exactly one schema version, so no migration machinery is
/// needed yet.
pub const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS identity (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    blob BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS trust (
    node_id TEXT PRIMARY KEY,
    signing_pub TEXT NOT NULL,
    dh_pub TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    trusted INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS peers (
    node_id TEXT PRIMARY KEY,
    address TEXT NOT NULL,
    tcp_port INTEGER NOT NULL,
    signing_pub TEXT,
    dh_pub TEXT,
    shared_files TEXT NOT NULL DEFAULT '[]',
    last_seen INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    peer_id TEXT NOT NULL,
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    encrypted INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_peer_id ON messages (peer_id);

CREATE TABLE IF NOT EXISTS relay_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_node_id TEXT NOT NULL,
    sender_node_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relay_target ON relay_queue (target_node_id, id);
"#;
