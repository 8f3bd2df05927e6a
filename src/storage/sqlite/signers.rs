// File: src/storage/sqlite/signers.rs

use super::store::{from_nanos, now_nanos, SqliteStore};
use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::fmt;

/// Last observed state of a signing endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Timeout,
    Unknown,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Timeout => "timeout",
            HealthStatus::Unknown => "unknown",
            HealthStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "healthy" => Some(HealthStatus::Healthy),
            "unhealthy" => Some(HealthStatus::Unhealthy),
            "timeout" => Some(HealthStatus::Timeout),
            "unknown" => Some(HealthStatus::Unknown),
            "error" => Some(HealthStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signing endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Signer {
    pub id: i64,
    pub name: String,
    pub endpoint_url: String,
    pub certificate_location: String,
    pub is_active: bool,
    pub health_status: HealthStatus,
    pub current_load: u32,
    pub max_concurrent: u32,
    /// Lower value wins
    pub priority: i32,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl Signer {
    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_concurrent
    }

    pub fn is_available(&self) -> bool {
        self.is_active && self.health_status == HealthStatus::Healthy
    }
}

/// Registration data for a signing endpoint
#[derive(Debug, Clone)]
pub struct NewSigner {
    pub name: String,
    pub endpoint_url: String,
    pub certificate_location: String,
    pub max_concurrent: u32,
    pub priority: i32,
}

/// Signer reachable by a taxpayer through an assignment
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedSigner {
    pub signer: Signer,
    pub is_primary: bool,
}

const SIGNER_COLUMNS: &str = "s.id, s.name, s.endpoint_url, s.certificate_location, s.is_active, \
     s.health_status, s.current_load, s.max_concurrent, s.priority, s.last_health_check";

fn row_to_signer(row: &Row) -> rusqlite::Result<Signer> {
    let health: String = row.get(5)?;
    let current_load: i64 = row.get(6)?;
    let max_concurrent: i64 = row.get(7)?;
    let last_health_check: Option<i64> = row.get(9)?;

    Ok(Signer {
        id: row.get(0)?,
        name: row.get(1)?,
        endpoint_url: row.get(2)?,
        certificate_location: row.get(3)?,
        is_active: row.get(4)?,
        health_status: HealthStatus::parse(&health).unwrap_or(HealthStatus::Unknown),
        current_load: current_load.max(0) as u32,
        max_concurrent: max_concurrent.max(0) as u32,
        priority: row.get(8)?,
        last_health_check: last_health_check.map(from_nanos),
    })
}

impl SqliteStore {
    /// Register a signing endpoint (active, health unknown, no load)
    pub fn insert_signer(&self, signer: &NewSigner) -> ServerResult<Signer> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO signers (name, endpoint_url, certificate_location, max_concurrent, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                signer.name,
                signer.endpoint_url,
                signer.certificate_location,
                signer.max_concurrent as i64,
                signer.priority,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_signer(id)?
            .ok_or_else(|| ServerError::Internal("inserted signer not readable".into()))
    }

    pub fn get_signer(&self, id: i64) -> ServerResult<Option<Signer>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM signers s WHERE s.id = ?1", SIGNER_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_signer).optional()?)
    }

    /// Active signers, for the health monitor
    pub fn active_signers(&self) -> ServerResult<Vec<Signer>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM signers s WHERE s.is_active = 1 ORDER BY s.id",
            SIGNER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_signer)?;
        rows.map(|r| r.map_err(|e| e.into())).collect()
    }

    pub fn set_signer_active(&self, id: i64, active: bool) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE signers SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(())
    }

    pub fn update_signer_health(&self, id: i64, status: HealthStatus) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE signers SET health_status = ?1, last_health_check = ?2 WHERE id = ?3",
            params![status.as_str(), now_nanos(), id],
        )?;
        Ok(())
    }

    /// Allow a taxpayer to use a signer; a new primary replaces the previous one
    pub fn assign_signer(&self, taxpayer_id: &str, signer_id: i64, is_primary: bool) -> ServerResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if is_primary {
            tx.execute(
                "UPDATE signer_assignments SET is_primary = 0 WHERE taxpayer_id = ?1 AND is_primary = 1",
                params![taxpayer_id],
            )?;
        }

        tx.execute(
            "INSERT INTO signer_assignments (taxpayer_id, signer_id, is_primary) VALUES (?1, ?2, ?3)
             ON CONFLICT(taxpayer_id, signer_id) DO UPDATE SET is_primary = excluded.is_primary",
            params![taxpayer_id, signer_id, is_primary],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Number of assignments a taxpayer has, regardless of signer state
    pub fn assignment_count(&self, taxpayer_id: &str) -> ServerResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM signer_assignments WHERE taxpayer_id = ?1",
            params![taxpayer_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Active and healthy signers assigned to a taxpayer
    pub fn assigned_available_signers(&self, taxpayer_id: &str) -> ServerResult<Vec<AssignedSigner>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {}, a.is_primary FROM signer_assignments a
             JOIN signers s ON s.id = a.signer_id
             WHERE a.taxpayer_id = ?1 AND s.is_active = 1 AND s.health_status = ?2",
            SIGNER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![taxpayer_id, HealthStatus::Healthy.as_str()],
            |row| {
                Ok(AssignedSigner {
                    signer: row_to_signer(row)?,
                    is_primary: row.get(10)?,
                })
            },
        )?;
        rows.map(|r| r.map_err(|e| e.into())).collect()
    }

    /// Every active and healthy signer in the pool
    pub fn available_signers(&self) -> ServerResult<Vec<Signer>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM signers s WHERE s.is_active = 1 AND s.health_status = ?1",
            SIGNER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![HealthStatus::Healthy.as_str()], row_to_signer)?;
        rows.map(|r| r.map_err(|e| e.into())).collect()
    }

    /// Take one load slot if the signer still has capacity
    pub fn try_increment_load(&self, id: i64) -> ServerResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE signers SET current_load = current_load + 1
             WHERE id = ?1 AND is_active = 1 AND current_load < max_concurrent",
            params![id],
        )?;
        Ok(changed == 1)
    }

    /// Release one load slot; never goes below zero
    pub fn decrement_load(&self, id: i64) -> ServerResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE signers SET current_load = current_load - 1 WHERE id = ?1 AND current_load > 0",
            params![id],
        )?;
        Ok(())
    }
}
