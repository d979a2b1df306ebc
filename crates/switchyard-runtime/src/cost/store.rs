//! SQLite-backed cost store.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use super::{CostError, CostRecord, PlatformTotal, SessionSummary};

const COLUMNS: &str =
    "task_id, platform, model, chain_id, input_tokens, output_tokens, cost, timestamp";

/// Single-connection store; the mutex serializes every writer.
pub struct CostStore {
    conn: Mutex<Connection>,
}

impl CostStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CostError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::from_connection(conn)
    }

    /// Store that lives only as long as this value.
    pub fn in_memory() -> Result<Self, CostError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// `SWITCHYARD_COST_STORE`, else `switchyard-costs.sqlite`.
    pub fn default_path() -> PathBuf {
        std::env::var("SWITCHYARD_COST_STORE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("switchyard-costs.sqlite"))
    }

    fn from_connection(conn: Connection) -> Result<Self, CostError> {
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_tables(conn: &Connection) -> Result<(), CostError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cost_records (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                task_id TEXT NOT NULL UNIQUE,\
                platform TEXT NOT NULL,\
                model TEXT,\
                chain_id TEXT,\
                input_tokens INTEGER NOT NULL DEFAULT 0,\
                output_tokens INTEGER NOT NULL DEFAULT 0,\
                cost REAL NOT NULL DEFAULT 0,\
                timestamp TEXT NOT NULL\
             );\
             CREATE INDEX IF NOT EXISTS idx_cost_records_chain ON cost_records(chain_id);\
             CREATE INDEX IF NOT EXISTS idx_cost_records_platform ON cost_records(platform);\
             CREATE INDEX IF NOT EXISTS idx_cost_records_timestamp ON cost_records(timestamp);",
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn drop_schema(&self) {
        self.conn.lock().execute_batch("DROP TABLE cost_records").unwrap();
    }

    /// Insert or replace the record for `record.task_id`.
    pub fn upsert(&self, record: &CostRecord) -> Result<(), CostError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cost_records \
                (task_id, platform, model, chain_id, input_tokens, output_tokens, cost, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(task_id) DO UPDATE SET \
                platform = excluded.platform, \
                model = excluded.model, \
                chain_id = excluded.chain_id, \
                input_tokens = excluded.input_tokens, \
                output_tokens = excluded.output_tokens, \
                cost = excluded.cost, \
                timestamp = excluded.timestamp",
            params![
                record.task_id,
                record.platform,
                record.model,
                record.chain_id,
                to_sql_int(record.input_tokens),
                to_sql_int(record.output_tokens),
                record.cost,
                format_timestamp(&record.timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Result<Option<CostRecord>, CostError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {COLUMNS} FROM cost_records WHERE task_id = ?1");
        let raw = conn
            .query_row(&sql, params![task_id], RawRecord::from_row)
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    pub fn task_cost(&self, task_id: &str) -> Result<Option<f64>, CostError> {
        let conn = self.conn.lock();
        let cost = conn
            .query_row(
                "SELECT cost FROM cost_records WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cost)
    }

    pub fn chain_cost(&self, chain_id: &str) -> Result<f64, CostError> {
        let conn = self.conn.lock();
        let cost: f64 = conn.query_row(
            "SELECT COALESCE(SUM(cost), 0.0) FROM cost_records WHERE chain_id = ?1",
            params![chain_id],
            |row| row.get(0),
        )?;
        Ok(cost)
    }

    /// Records in a chain, oldest first.
    pub fn chain_records(&self, chain_id: &str) -> Result<Vec<CostRecord>, CostError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {COLUMNS} FROM cost_records WHERE chain_id = ?1 ORDER BY timestamp, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![chain_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(RawRecord::from_row(row)?.into_record()?);
        }
        Ok(records)
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<CostRecord>, CostError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {COLUMNS} FROM cost_records ORDER BY timestamp DESC, id DESC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![to_sql_int(limit as u64)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(RawRecord::from_row(row)?.into_record()?);
        }
        Ok(records)
    }

    pub fn platform_totals(&self) -> Result<Vec<PlatformTotal>, CostError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT platform, COUNT(*), COALESCE(SUM(input_tokens), 0), \
                    COALESCE(SUM(output_tokens), 0), COALESCE(SUM(cost), 0.0) \
             FROM cost_records GROUP BY platform ORDER BY platform",
        )?;
        let mut rows = stmt.query([])?;
        let mut totals = Vec::new();
        while let Some(row) = rows.next()? {
            totals.push(platform_total(row)?);
        }
        Ok(totals)
    }

    /// Per-platform spend for one UTC day.
    pub fn session_summary(&self, day: NaiveDate) -> Result<SessionSummary, CostError> {
        let (start, end) = day_bounds(day);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT platform, COUNT(*), COALESCE(SUM(input_tokens), 0), \
                    COALESCE(SUM(output_tokens), 0), COALESCE(SUM(cost), 0.0) \
             FROM cost_records WHERE timestamp >= ?1 AND timestamp < ?2 \
             GROUP BY platform ORDER BY platform",
        )?;
        let mut rows = stmt.query(params![start, end])?;
        let mut totals = Vec::new();
        while let Some(row) = rows.next()? {
            totals.push(platform_total(row)?);
        }
        Ok(SessionSummary::from_totals(day, totals))
    }

    /// Put `task_id` into `chain_id` if it is not in a chain yet. Returns
    /// whether a row changed.
    pub fn attach_to_chain(&self, task_id: &str, chain_id: &str) -> Result<bool, CostError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE cost_records SET chain_id = ?2 WHERE task_id = ?1 AND chain_id IS NULL",
            params![task_id, chain_id],
        )?;
        Ok(changed > 0)
    }
}

struct RawRecord {
    task_id: String,
    platform: String,
    model: Option<String>,
    chain_id: Option<String>,
    input_tokens: i64,
    output_tokens: i64,
    cost: f64,
    timestamp: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            task_id: row.get(0)?,
            platform: row.get(1)?,
            model: row.get(2)?,
            chain_id: row.get(3)?,
            input_tokens: row.get(4)?,
            output_tokens: row.get(5)?,
            cost: row.get(6)?,
            timestamp: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<CostRecord, CostError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|_| CostError::Timestamp(self.timestamp.clone()))?
            .with_timezone(&Utc);
        Ok(CostRecord {
            task_id: self.task_id,
            platform: self.platform,
            model: self.model,
            chain_id: self.chain_id,
            input_tokens: from_sql_int(self.input_tokens),
            output_tokens: from_sql_int(self.output_tokens),
            cost: self.cost,
            timestamp,
        })
    }
}

fn platform_total(row: &Row<'_>) -> rusqlite::Result<PlatformTotal> {
    Ok(PlatformTotal {
        platform: row.get(0)?,
        task_count: from_sql_int(row.get(1)?),
        input_tokens: from_sql_int(row.get(2)?),
        output_tokens: from_sql_int(row.get(3)?),
        cost: row.get(4)?,
    })
}

// Timestamps are stored as fixed-width RFC 3339 UTC strings so that
// lexical order matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::default()));
    let end = start + chrono::Duration::days(1);
    (format_timestamp(&start), format_timestamp(&end))
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
