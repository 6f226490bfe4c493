/// SQLite persistence layer for approval requests
///
/// One row per request holds the JSON request document plus indexed
/// `status` and `version` columns. Audit entries live in their own table,
/// ordered by a per-request sequence; triggers reject any UPDATE or DELETE
/// on that table so the trail stays append-only at the database level.

use crate::error::{Result, WorkflowError};
use crate::storage::{AuditTrail, RequestStore};
use crate::workflow::types::{AuditEntry, Request, RequestDocument};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row, SqliteConnection,
};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) `approvals.db` under `data_dir` and initialize the schema
    pub async fn open(data_dir: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory '{}': {}", data_dir, e))?;
        let db_path = Path::new(data_dir).join("approvals.db");

        tracing::info!("🗄️ Opening approvals database: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database (single connection so every query sees the same data)
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables, indexes and append-only triggers
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                requester_email TEXT NOT NULL,
                status TEXT NOT NULL,
                version INTEGER NOT NULL,
                document JSON NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
                request_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                action TEXT NOT NULL,
                performed_by TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                entry JSON NOT NULL,
                PRIMARY KEY (request_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_entries_timestamp ON audit_entries(request_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        for (name, operation) in [
            ("audit_entries_no_update", "UPDATE"),
            ("audit_entries_no_delete", "DELETE"),
        ] {
            sqlx::query(&format!(
                r#"
                CREATE TRIGGER IF NOT EXISTS {name}
                BEFORE {operation} ON audit_entries
                BEGIN
                    SELECT RAISE(ABORT, 'audit entries are append-only');
                END
                "#
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

/// Append one entry at the next sequence number for `request_id`
async fn append_entry(conn: &mut SqliteConnection, request_id: &str, entry: &AuditEntry) -> Result<()> {
    let next_seq: i64 = sqlx::query(
        "SELECT COALESCE(MAX(seq), 0) + 1 AS next_seq FROM audit_entries WHERE request_id = ?",
    )
    .bind(request_id)
    .fetch_one(&mut *conn)
    .await?
    .get("next_seq");

    sqlx::query(
        r#"
        INSERT INTO audit_entries (request_id, seq, action, performed_by, timestamp, entry)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(request_id)
    .bind(next_seq)
    .bind(entry.action.to_string())
    .bind(&entry.performed_by)
    .bind(entry.timestamp.to_rfc3339())
    .bind(serde_json::to_string(entry)?)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn encode(request: &Request) -> Result<(String, &'static str)> {
    let document = RequestDocument::from(request.clone());
    let label = document.status.label();
    Ok((serde_json::to_string(&document)?, label))
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Request> {
    let document: String = row.get("document");
    Ok(serde_json::from_str(&document)?)
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn insert(&self, request: &Request, created: &AuditEntry) -> Result<()> {
        let (document, status) = encode(request)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO requests (id, category, requester_email, status, version, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id())
        .bind(request.category())
        .bind(&request.requester().email)
        .bind(status)
        .bind(request.version() as i64)
        .bind(&document)
        .bind(request.created_at().to_rfc3339())
        .bind(request.updated_at().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        append_entry(&mut *tx, request.id(), created).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Request>> {
        let row = sqlx::query("SELECT document FROM requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode).transpose()
    }

    async fn commit(&self, request: &Request, expected_version: u64, entry: &AuditEntry) -> Result<()> {
        let (document, status) = encode(request)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = ?, version = ?, document = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(status)
        .bind(request.version() as i64)
        .bind(&document)
        .bind(request.updated_at().to_rfc3339())
        .bind(request.id())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            if !self.exists(request.id()).await? {
                return Err(WorkflowError::NotFound(format!("request {}", request.id())));
            }
            return Err(WorkflowError::ConcurrentModification {
                request_id: request.id().to_string(),
                expected_version,
            });
        }

        append_entry(&mut *tx, request.id(), entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<Request>> {
        let rows = sqlx::query("SELECT document FROM requests WHERE status = 'pending' ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode).collect()
    }
}

#[async_trait]
impl AuditTrail for SqliteStore {
    async fn append(&self, request_id: &str, entry: &AuditEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT document FROM requests WHERE id = ?")
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(WorkflowError::NotFound(format!("request {}", request_id)));
        };

        let mut request = decode(&row)?;
        let expected_version = request.version();
        request.record(entry.clone());
        request.version += 1;
        let (document, status) = encode(&request)?;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = ?, version = ?, document = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(status)
        .bind(request.version() as i64)
        .bind(&document)
        .bind(request.updated_at().to_rfc3339())
        .bind(request_id)
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(WorkflowError::ConcurrentModification {
                request_id: request_id.to_string(),
                expected_version,
            });
        }

        append_entry(&mut *tx, request_id, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn history(&self, request_id: &str) -> Result<Vec<AuditEntry>> {
        if !self.exists(request_id).await? {
            return Err(WorkflowError::NotFound(format!("request {}", request_id)));
        }
        let rows = sqlx::query("SELECT entry FROM audit_entries WHERE request_id = ? ORDER BY seq")
            .bind(request_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<AuditEntry> {
                let entry: String = row.get("entry");
                Ok(serde_json::from_str(&entry)?)
            })
            .collect()
    }
}
