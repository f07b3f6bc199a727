//! Database schema definitions

/// SQL to create the posts table (one row per page envelope)
pub const CREATE_POSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY,
    total INTEGER NOT NULL,
    pages INTEGER NOT NULL,
    page INTEGER NOT NULL,
    lim INTEGER NOT NULL,
    previous TEXT NOT NULL DEFAULT '',
    current TEXT NOT NULL DEFAULT '',
    next TEXT NOT NULL DEFAULT ''
)
"#;

/// SQL to create the items table
/// `seq` records insertion order so reconstruction can replay it
pub const CREATE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    envelope_id INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    owner_id INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT ''
)
"#;

/// SQL to create the ingest lease table
/// At most one row; whoever holds it owns the current ingestion run.
/// Not touched by a schema reset.
pub const CREATE_INGEST_LEASE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_lease (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    holder TEXT NOT NULL,
    acquired_at INTEGER NOT NULL
)
"#;

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_items_envelope ON items(envelope_id, seq)",
];

pub const DROP_TABLES: &[&str] = &[
    "DROP TABLE IF EXISTS items",
    "DROP TABLE IF EXISTS posts",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_POSTS_TABLE, CREATE_ITEMS_TABLE, CREATE_INGEST_LEASE_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
