//! Audit database
//!
//! SQLite connection pool with WAL mode and the `risk_events` table.

use crate::audit::{AuditEvent, Severity};
use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

/// Type alias for the SQLite connection pool
pub type DbPool = Pool<Sqlite>;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS risk_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        resource TEXT NOT NULL,
        details TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_risk_events_created_at ON risk_events(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_risk_events_resource ON risk_events(resource)",
];

/// Initialize the database connection pool
pub async fn init_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Internal(format!("Failed to create database directory: {}", e))
            })?;
            info!("Created database directory: {:?}", parent);
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", config.path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        // Enable WAL mode for concurrent reads
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    info!(
        "Database pool initialized: {:?} (max {} connections)",
        config.path, config.max_connections
    );

    Ok(pool)
}

/// Create the audit tables if missing
pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database migrations completed");
    Ok(())
}

/// Insert an audit event
pub async fn insert_event(pool: &DbPool, event: &AuditEvent) -> AppResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO risk_events (event_type, severity, resource, details, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.event_type)
    .bind(event.severity.to_string())
    .bind(&event.resource)
    .bind(event.details.to_string())
    .bind(event.at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Most recent audit events, newest first
pub async fn recent_events(pool: &DbPool, limit: u32) -> AppResult<Vec<AuditEvent>> {
    let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT event_type, severity, resource, details, created_at
        FROM risk_events
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(event_type, severity, resource, details, created_at)| {
            let severity = Severity::from_str(&severity).map_err(AppError::Internal)?;
            let details = serde_json::from_str(&details)
                .map_err(|e| AppError::Internal(format!("Corrupt event details: {}", e)))?;
            let at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| AppError::Internal(format!("Corrupt event timestamp: {}", e)))?
                .with_timezone(&Utc);
            Ok(AuditEvent {
                event_type,
                severity,
                resource,
                details,
                at,
            })
        })
        .collect()
}

/// Number of stored events for a resource
pub async fn count_events_for(pool: &DbPool, resource: &str) -> AppResult<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM risk_events WHERE resource = ?")
        .bind(resource)
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}
