//! Energy ledger storage

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

use super::models::{LedgerEntry, LedgerKey};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lock error")]
    Lock,
    #[error("Invalid bucket timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Persistent per-hour energy store with upsert-by-key semantics
pub trait EnergyLedger: Send {
    /// Add to the row for `key`, creating it when absent
    fn upsert(&mut self, key: &LedgerKey, energy_increment: f64, sample_increment: u32) -> Result<(), LedgerError>;

    /// All rows ordered by bucket, identifier, mode
    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// In-process ledger, mainly for tests and previews
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    rows: BTreeMap<LedgerKey, (f64, u32)>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LedgerKey) -> Option<LedgerEntry> {
        self.rows.get(key).map(|(energy_mah, sample_count)| LedgerEntry {
            key: key.clone(),
            energy_mah: *energy_mah,
            sample_count: *sample_count,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl EnergyLedger for MemoryLedger {
    fn upsert(&mut self, key: &LedgerKey, energy_increment: f64, sample_increment: u32) -> Result<(), LedgerError> {
        let row = self.rows.entry(key.clone()).or_insert((0.0, 0));
        row.0 += energy_increment;
        row.1 = row.1.saturating_add(sample_increment);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .rows
            .iter()
            .map(|(key, (energy_mah, sample_count))| LedgerEntry {
                key: key.clone(),
                energy_mah: *energy_mah,
                sample_count: *sample_count,
            })
            .collect())
    }
}

/// SQLite-backed ledger
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open (or create) the ledger database
    pub fn new(data_dir: Option<&str>) -> Result<Self, LedgerError> {
        let db_path = Self::get_db_path(data_dir);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::with_connection(conn)
    }

    /// Ledger that lives only as long as the value
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        let ledger = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        ledger.init_schema()?;
        Ok(ledger)
    }

    /// Get the database file path
    pub fn get_db_path(data_dir: Option<&str>) -> PathBuf {
        if let Some(dir) = data_dir {
            PathBuf::from(dir).join("energy_ledger.db")
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("battery-monitor")
                .join("energy_ledger.db")
        }
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Lock)?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS energy_ledger (
                bucket_start INTEGER NOT NULL,
                identifier TEXT NOT NULL,
                mode TEXT NOT NULL,
                energy_mah REAL NOT NULL,
                sample_count INTEGER NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (bucket_start, identifier, mode)
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_identifier ON energy_ledger(identifier);
        "#)?;

        Ok(())
    }

    /// Rows whose bucket starts within `[start, end]`
    pub fn query_range(
        &self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Lock)?;

        let start = start_time.map(|t| t.timestamp()).unwrap_or(i64::MIN);
        let end = end_time.map(|t| t.timestamp()).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(
            "SELECT bucket_start, identifier, mode, energy_mah, sample_count FROM energy_ledger
             WHERE bucket_start >= ?1 AND bucket_start <= ?2
             ORDER BY bucket_start ASC, identifier ASC, mode ASC",
        )?;

        let rows = stmt.query_map(params![start, end], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, u32>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (bucket, identifier, mode, energy_mah, sample_count) = row?;
            let bucket_start =
                DateTime::<Utc>::from_timestamp(bucket, 0).ok_or(LedgerError::InvalidTimestamp(bucket))?;
            entries.push(LedgerEntry {
                key: LedgerKey {
                    bucket_start,
                    identifier,
                    mode,
                },
                energy_mah,
                sample_count,
            });
        }

        Ok(entries)
    }

    /// Delete buckets older than the retention period
    pub fn cleanup_old_data(&self, retention_days: u32) -> Result<usize, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Lock)?;

        let cutoff = Utc::now()
            .checked_sub_signed(chrono::Duration::days(retention_days as i64))
            .map(|t| t.timestamp())
            .unwrap_or(0);

        let deleted = conn.execute("DELETE FROM energy_ledger WHERE bucket_start < ?1", params![cutoff])?;
        Ok(deleted)
    }

    /// Row count for diagnostics
    pub fn get_count(&self) -> Result<i64, LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Lock)?;
        let count = conn.query_row("SELECT COUNT(*) FROM energy_ledger", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl EnergyLedger for SqliteLedger {
    fn upsert(&mut self, key: &LedgerKey, energy_increment: f64, sample_increment: u32) -> Result<(), LedgerError> {
        let conn = self.conn.lock().map_err(|_| LedgerError::Lock)?;

        conn.execute(
            "INSERT INTO energy_ledger (bucket_start, identifier, mode, energy_mah, sample_count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(bucket_start, identifier, mode) DO UPDATE SET
                energy_mah = energy_mah + excluded.energy_mah,
                sample_count = sample_count + excluded.sample_count,
                updated_at = strftime('%s', 'now')",
            params![
                key.bucket_start.timestamp(),
                key.identifier,
                key.mode,
                energy_increment,
                sample_increment
            ],
        )?;

        Ok(())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.query_range(None, None)
    }
}

impl Clone for SqliteLedger {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}
