// File: src/storage/sqlite/taxpayers.rs

use super::store::{now_nanos, SqliteStore};
use crate::document::Environment;
use crate::error::ServerResult;
use crate::traits::{AuthorityCredentials, SigningCredentials};
use rusqlite::{params, OptionalExtension, Row};
use std::fmt;

/// Taxpayer credentials as provided by master data
#[derive(Clone)]
pub struct Taxpayer {
    pub tax_id: String,
    pub name: String,
    /// Private-key password handed to the signer
    pub signer_credential: String,
    /// Password for the authority's auth endpoint
    pub authority_password: String,
    pub environment: Environment,
}

impl Taxpayer {
    pub fn signing_credentials(&self) -> SigningCredentials {
        SigningCredentials {
            tax_id: self.tax_id.clone(),
            private_key_password: self.signer_credential.clone(),
        }
    }

    pub fn authority_credentials(&self) -> AuthorityCredentials {
        AuthorityCredentials {
            user: self.tax_id.clone(),
            password: self.authority_password.clone(),
        }
    }
}

impl fmt::Debug for Taxpayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Taxpayer")
            .field("tax_id", &self.tax_id)
            .field("name", &self.name)
            .field("signer_credential", &"<redacted>")
            .field("authority_password", &"<redacted>")
            .field("environment", &self.environment)
            .finish()
    }
}

fn row_to_taxpayer(row: &Row) -> rusqlite::Result<Taxpayer> {
    let environment: String = row.get(4)?;
    Ok(Taxpayer {
        tax_id: row.get(0)?,
        name: row.get(1)?,
        signer_credential: row.get(2)?,
        authority_password: row.get(3)?,
        environment: Environment::parse(&environment).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(4, "environment".into(), rusqlite::types::Type::Text)
        })?,
    })
}

impl SqliteStore {
    /// Insert or replace a taxpayer's credentials
    pub fn upsert_taxpayer(&self, taxpayer: &Taxpayer) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO taxpayers (tax_id, name, signer_credential, authority_password, environment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tax_id) DO UPDATE SET
                 name = excluded.name,
                 signer_credential = excluded.signer_credential,
                 authority_password = excluded.authority_password,
                 environment = excluded.environment",
            params![
                taxpayer.tax_id,
                taxpayer.name,
                taxpayer.signer_credential,
                taxpayer.authority_password,
                taxpayer.environment.code(),
                now_nanos(),
            ],
        )?;
        Ok(())
    }

    pub fn get_taxpayer(&self, tax_id: &str) -> ServerResult<Option<Taxpayer>> {
        let conn = self.get_conn()?;
        Ok(conn
            .query_row(
                "SELECT tax_id, name, signer_credential, authority_password, environment
                 FROM taxpayers WHERE tax_id = ?1",
                params![tax_id],
                row_to_taxpayer,
            )
            .optional()?)
    }
}
