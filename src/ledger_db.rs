use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::market_records::{TransactionRecord, TxnAction};
use crate::record_merge::record_signature;
use crate::record_store::RecordStore;

const REQUIRED_TABLES: &[&str] = &["market_transactions", "sync_batches"];

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_market_history.sql",
        include_str!("../db/migrations/0001_market_history.sql"),
    ),
    (
        "0002_sync_batches.sql",
        include_str!("../db/migrations/0002_sync_batches.sql"),
    ),
];

#[derive(Debug, Serialize)]
pub struct MarketDbStatus {
    pub db_path: String,
    pub exists: bool,
    pub migration_files: Vec<String>,
    pub applied_versions: Vec<String>,
    pub pending_versions: Vec<String>,
    pub schema_migrations_table_exists: bool,
    pub ready: bool,
    pub record_count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MarketDbMigrateResult {
    pub db_path: String,
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
    pub applied_total: usize,
    pub pending_total: usize,
}

fn ensure_schema_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
}

fn has_schema_migrations_table(conn: &Connection) -> rusqlite::Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|v| v != 0)?;
    Ok(exists)
}

fn load_applied_versions(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

fn ensure_schema_ready(conn: &Connection) -> Result<(), String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table'")
        .map_err(|e| format!("inspect database tables failed: {e}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| format!("read database tables failed: {e}"))?;
    let mut table_names = HashSet::new();
    for row in rows {
        table_names.insert(row.map_err(|e| format!("read database tables failed: {e}"))?);
    }
    let missing = REQUIRED_TABLES
        .iter()
        .filter(|t| !table_names.contains(**t))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(format!(
            "database is missing tables: {}. Run migrations first.",
            missing.join(", ")
        ));
    }
    Ok(())
}

fn count_records(conn: &Connection) -> Result<i64, String> {
    conn.query_row("SELECT COUNT(*) FROM market_transactions", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|e| format!("count market_transactions failed: {e}"))
}

pub fn inspect_status_at_path(db_path: &Path) -> Result<MarketDbStatus, String> {
    let migration_files = MIGRATIONS
        .iter()
        .map(|(v, _)| (*v).to_string())
        .collect::<Vec<_>>();
    if !db_path.exists() {
        return Ok(MarketDbStatus {
            db_path: db_path.to_string_lossy().to_string(),
            exists: false,
            migration_files: migration_files.clone(),
            applied_versions: Vec::new(),
            pending_versions: migration_files,
            schema_migrations_table_exists: false,
            ready: false,
            record_count: None,
        });
    }

    let conn = Connection::open(db_path).map_err(|e| format!("open database failed: {e}"))?;
    let schema_table_exists = has_schema_migrations_table(&conn)
        .map_err(|e| format!("inspect schema_migrations failed: {e}"))?;

    let applied_versions = if schema_table_exists {
        load_applied_versions(&conn).map_err(|e| format!("read schema_migrations failed: {e}"))?
    } else {
        Vec::new()
    };
    let applied_set = applied_versions.iter().cloned().collect::<HashSet<_>>();
    let pending_versions = migration_files
        .iter()
        .filter(|v| !applied_set.contains(*v))
        .cloned()
        .collect::<Vec<_>>();
    let ready = pending_versions.is_empty();
    let record_count = if ready {
        Some(count_records(&conn)?)
    } else {
        None
    };

    Ok(MarketDbStatus {
        db_path: db_path.to_string_lossy().to_string(),
        exists: true,
        migration_files,
        applied_versions,
        pending_versions,
        schema_migrations_table_exists: schema_table_exists,
        ready,
        record_count,
    })
}

pub fn apply_embedded_migrations(db_path: &Path) -> Result<MarketDbMigrateResult, String> {
    let created = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("create database dir failed: {e}"))?;
        }
    }

    let mut conn = Connection::open(db_path).map_err(|e| format!("open database failed: {e}"))?;
    ensure_schema_migrations_table(&conn)
        .map_err(|e| format!("init schema_migrations failed: {e}"))?;

    let already = load_applied_versions(&conn)
        .map_err(|e| format!("read applied migrations failed: {e}"))?
        .into_iter()
        .collect::<HashSet<_>>();

    let mut applied_now = Vec::new();
    let mut skipped = Vec::new();

    for (version, sql) in MIGRATIONS {
        if already.contains(*version) {
            skipped.push((*version).to_string());
            continue;
        }
        let tx = conn
            .transaction()
            .map_err(|e| format!("begin migration failed ({version}): {e}"))?;
        tx.execute_batch(sql)
            .map_err(|e| format!("run migration failed ({version}): {e}"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version) VALUES (?1)",
            [*version],
        )
        .map_err(|e| format!("record migration failed ({version}): {e}"))?;
        tx.commit()
            .map_err(|e| format!("commit migration failed ({version}): {e}"))?;
        applied_now.push((*version).to_string());
    }

    let final_applied_total = load_applied_versions(&conn)
        .map_err(|e| format!("read migration result failed: {e}"))?
        .len();
    let pending_total = MIGRATIONS.len().saturating_sub(final_applied_total);
    if !applied_now.is_empty() {
        info!(db = %db_path.display(), applied = ?applied_now, "applied store migrations");
    }

    Ok(MarketDbMigrateResult {
        db_path: db_path.to_string_lossy().to_string(),
        created,
        applied_now,
        skipped,
        applied_total: final_applied_total,
        pending_total,
    })
}

pub fn signature_sha1(rec: &TransactionRecord) -> String {
    let mut hasher = Sha1::new();
    hasher.update(record_signature(rec).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SQLite-backed store; `row_no` carries the append order.
#[derive(Debug)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
    conn: Connection,
}

impl SqliteRecordStore {
    /// Migrates the database at `db_path` (creating it if needed) and opens it.
    pub fn open(db_path: &Path) -> Result<Self, String> {
        apply_embedded_migrations(db_path)?;
        Self::connect(db_path)
    }

    /// Opens an already migrated database.
    pub fn connect(db_path: &Path) -> Result<Self, String> {
        if !db_path.exists() {
            return Err(format!("database not found: {}", db_path.to_string_lossy()));
        }
        let conn = Connection::open(db_path).map_err(|e| format!("open database failed: {e}"))?;
        ensure_schema_ready(&conn)?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn,
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn read_all(&self) -> Result<Vec<TransactionRecord>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT txn_date, action, game, item, price FROM market_transactions ORDER BY row_no ASC",
            )
            .map_err(|e| format!("prepare store read failed: {e}"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TransactionRecord {
                    date: row.get::<_, String>(0)?,
                    action: TxnAction::from_label(&row.get::<_, String>(1)?),
                    game: row.get::<_, String>(2)?,
                    item: row.get::<_, String>(3)?,
                    price: row.get::<_, String>(4)?,
                })
            })
            .map_err(|e| format!("query store rows failed: {e}"))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| format!("read store row failed: {e}"))?);
        }
        Ok(out)
    }

    fn append(&mut self, records: &[TransactionRecord]) -> Result<usize, String> {
        if records.is_empty() {
            return Ok(0);
        }
        let batch_id = Uuid::new_v4().to_string();
        let synced_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let tx = self
            .conn
            .transaction()
            .map_err(|e| format!("begin append failed: {e}"))?;
        let mut first_row_no = None::<i64>;
        let mut last_row_no = None::<i64>;
        for rec in records {
            tx.execute(
                r#"
                INSERT INTO market_transactions(
                    txn_date, action, game, item, price, signature_sha1, batch_id, synced_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    rec.date,
                    rec.action.as_str(),
                    rec.game,
                    rec.item,
                    rec.price,
                    signature_sha1(rec),
                    batch_id,
                    synced_at,
                ],
            )
            .map_err(|e| format!("append row failed: {e}"))?;
            let row_no = tx.last_insert_rowid();
            if first_row_no.is_none() {
                first_row_no = Some(row_no);
            }
            last_row_no = Some(row_no);
        }
        let appended = i64::try_from(records.len()).unwrap_or(i64::MAX);
        tx.execute(
            r#"
            INSERT INTO sync_batches(id, appended_count, first_row_no, last_row_no, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![batch_id, appended, first_row_no, last_row_no, synced_at],
        )
        .map_err(|e| format!("record sync batch failed: {e}"))?;
        tx.commit().map_err(|e| format!("commit append failed: {e}"))?;

        info!(db = %self.db_path.display(), %batch_id, appended, "appended rows to sqlite store");
        Ok(records.len())
    }
}
