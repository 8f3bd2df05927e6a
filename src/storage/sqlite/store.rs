// File: src/storage/sqlite/store.rs

use super::config::SqliteConfig;
use super::schema;
use crate::error::{ServerError, ServerResult, StorageError};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed store for documents, the contingency queue, the signer pool
/// and control-number sequences
///
/// Shared by the request path and the background jobs; every method takes the
/// connection lock for the duration of one statement or transaction.
pub struct SqliteStore {
    /// Database connection (protected by mutex for thread safety)
    conn: Arc<Mutex<Connection>>,

    config: SqliteConfig,
}

impl SqliteStore {
    /// Create a new SqliteStore with default configuration
    pub fn new<P: AsRef<Path>>(path: P) -> ServerResult<Self> {
        Self::with_config(SqliteConfig::for_path(path.as_ref().to_string_lossy()))
    }

    /// Create with custom configuration
    pub fn with_config(config: SqliteConfig) -> ServerResult<Self> {
        let conn = Connection::open(&config.path).map_err(|e| {
            ServerError::Storage(StorageError::ConnectionFailed(format!(
                "failed to open db: {}",
                e
            )))
        })?;

        Self::configure_connection(&conn, &config)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> ServerResult<Self> {
        let config = SqliteConfig {
            path: ":memory:".to_string(),
            wal_mode: false,
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Open an existing database (fails if doesn't exist)
    pub fn open<P: AsRef<Path>>(path: P) -> ServerResult<Self> {
        if !path.as_ref().exists() {
            return Err(ServerError::Storage(StorageError::ConnectionFailed(
                "database does not exist".into(),
            )));
        }
        Self::new(path)
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Configure SQLite connection pragmas
    fn configure_connection(conn: &Connection, config: &SqliteConfig) -> ServerResult<()> {
        if config.wal_mode && !config.is_in_memory() {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;
        if config.foreign_keys {
            conn.pragma_update(None, "foreign_keys", "ON")?;
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    /// Create the schema and bring it to the latest version (idempotent)
    pub fn initialize(&self) -> ServerResult<()> {
        let conn = self.get_conn()?;
        schema::create_tables(&conn)?;
        schema::migrate(&conn)
    }

    /// Check if the schema exists
    pub fn is_initialized(&self) -> bool {
        self.get_conn()
            .and_then(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'documents'",
                    [],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(ServerError::from)
            })
            .map(|count| count == 1)
            .unwrap_or(false)
    }

    /// Get locked connection for internal operations
    pub(crate) fn get_conn(&self) -> ServerResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            ServerError::Storage(StorageError::ConnectionFailed("lock poisoned".into()))
        })
    }
}

/// Current time as Unix nanoseconds (storage timestamp format)
pub(crate) fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

/// Convert a stored Unix-nanosecond timestamp back to UTC
pub(crate) fn from_nanos(nanos: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_nanos(nanos)
}
