//! SQLite audit log tests

use serde_json::json;
use sizing_operator::audit::{AuditEvent, AuditSink, Severity, SqliteAuditLog};
use sizing_operator::config::DatabaseConfig;
use sizing_operator::db;
use tempfile::TempDir;

async fn setup() -> (TempDir, db::DbPool) {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("nested").join("audit.db"),
        max_connections: 2,
    };
    let pool = db::init_pool(&config).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    (dir, pool)
}

#[tokio::test]
async fn test_insert_and_read_back() {
    let (_dir, pool) = setup().await;

    let first = AuditEvent::new("RISK_LIMITS_ADJUSTED", Severity::Info, "portfolio", json!({"multiplier": 1.5}));
    let second = AuditEvent::new("ENTRY_VETOED", Severity::Warning, "AAPL", json!({"correlation": 0.9}));
    db::insert_event(&pool, &first).await.unwrap();
    let id = db::insert_event(&pool, &second).await.unwrap();
    assert!(id > 0);

    let events = db::recent_events(&pool, 10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "ENTRY_VETOED");
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].details["correlation"], 0.9);
    assert_eq!(events[1].resource, "portfolio");

    assert_eq!(db::count_events_for(&pool, "AAPL").await.unwrap(), 1);
    assert_eq!(db::count_events_for(&pool, "MSFT").await.unwrap(), 0);
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_dir, pool) = setup().await;
    db::run_migrations(&pool).await.unwrap();
    assert!(db::recent_events(&pool, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sqlite_sink_persists_after_flush() {
    let (_dir, pool) = setup().await;
    let log = SqliteAuditLog::new(pool.clone());

    for i in 0..5 {
        log.emit(AuditEvent::new(
            "ANALYSIS_FAILED",
            Severity::Warning,
            "GONE",
            json!({"attempt": i}),
        ));
    }
    log.flush().await;

    assert_eq!(db::count_events_for(&pool, "GONE").await.unwrap(), 5);
    let latest = db::recent_events(&pool, 1).await.unwrap();
    assert_eq!(latest.len(), 1);
}
