// File: src/storage/sqlite/schema.rs

use crate::error::ServerResult;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Create all tables (idempotent)
pub fn create_tables(conn: &Connection) -> ServerResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Record the schema version; future migrations branch on the stored value
pub fn migrate(conn: &Connection) -> ServerResult<()> {
    let now = super::store::now_nanos();
    conn.execute(
        "INSERT OR REPLACE INTO dte_config (key, value, updated_at) VALUES ('schema_version', ?1, ?2)",
        rusqlite::params![SCHEMA_VERSION.to_string(), now],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Core configuration
CREATE TABLE IF NOT EXISTS dte_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Taxpayer credentials (read-only to the pipeline, owned by master data)
CREATE TABLE IF NOT EXISTS taxpayers (
    tax_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    signer_credential TEXT NOT NULL,        -- private key password handed to the signer
    authority_password TEXT NOT NULL,       -- tax authority API password
    environment TEXT NOT NULL DEFAULT '00', -- '00' test, '01' production
    created_at INTEGER NOT NULL
);

-- Documents: one row per legal document, never deleted
CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,           -- UUID (generation code)
    taxpayer_id TEXT NOT NULL,              -- issuer tax id
    document_type TEXT NOT NULL,            -- '01', '03', ...
    status TEXT NOT NULL,                   -- see DocumentStatus
    unsigned_payload TEXT NOT NULL,         -- JSON body before signing
    signed_token TEXT,                      -- latest signed token sent to the authority
    control_number TEXT NOT NULL,
    total_amount REAL NOT NULL DEFAULT 0,
    reception_stamp TEXT,
    error_message TEXT,
    error_details TEXT,                     -- JSON array
    created_at INTEGER NOT NULL,            -- Unix nanoseconds
    updated_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_control_number
    ON documents(taxpayer_id, document_type, control_number);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);

-- Contingency queue: retryable failures, never deleted (audit trail)
CREATE TABLE IF NOT EXISTS contingency_records (
    contingency_id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    document_type TEXT NOT NULL,
    taxpayer_tax_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending', -- 'pending', 'processed', 'failed'
    payload TEXT NOT NULL,                  -- JSON ContingencyPayload
    attempts INTEGER NOT NULL DEFAULT 0,
    authority_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    processed_at INTEGER,
    FOREIGN KEY (document_id) REFERENCES documents(document_id)
);

CREATE INDEX IF NOT EXISTS idx_contingency_status ON contingency_records(status, created_at);
CREATE INDEX IF NOT EXISTS idx_contingency_document ON contingency_records(document_id);

-- Signing endpoints
CREATE TABLE IF NOT EXISTS signers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    endpoint_url TEXT NOT NULL,
    certificate_location TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    health_status TEXT NOT NULL DEFAULT 'unknown',
    current_load INTEGER NOT NULL DEFAULT 0 CHECK (current_load >= 0),
    max_concurrent INTEGER NOT NULL DEFAULT 10,
    priority INTEGER NOT NULL DEFAULT 100,
    last_health_check INTEGER
);

-- Which signers a taxpayer may use
CREATE TABLE IF NOT EXISTS signer_assignments (
    taxpayer_id TEXT NOT NULL,
    signer_id INTEGER NOT NULL,
    is_primary INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (taxpayer_id, signer_id),
    FOREIGN KEY (signer_id) REFERENCES signers(id)
);

-- At most one primary signer per taxpayer
CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_primary
    ON signer_assignments(taxpayer_id) WHERE is_primary = 1;

-- Control-number sequences, created lazily per scope and year
CREATE TABLE IF NOT EXISTS control_number_sequences (
    taxpayer_id TEXT NOT NULL,
    document_type TEXT NOT NULL,
    establishment TEXT NOT NULL,
    point_of_sale TEXT NOT NULL,
    year INTEGER NOT NULL,
    next_value INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (taxpayer_id, document_type, establishment, point_of_sale, year)
);
"#;
