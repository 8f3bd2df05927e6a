// File: src/storage/sqlite/config.rs

/// Connection settings for the document database
///
/// The issuance path and the retransmission job write to the same file, so the
/// defaults favour concurrent access: WAL journaling plus a busy timeout long
/// enough to outlast one contingency transaction.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file, or ":memory:"
    pub path: String,

    /// WAL journaling; ignored for in-memory databases
    pub wal_mode: bool,

    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u32,

    /// Enforces that contingency records and signer assignments point at
    /// existing documents, signers and taxpayers
    pub foreign_keys: bool,
}

impl SqliteConfig {
    /// Default settings for the database at `path`
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "dte.db".to_string(),
            wal_mode: true,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}
