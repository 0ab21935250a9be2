//! Fire-and-forget audit events
//!
//! Emission never fails from the caller's point of view. Sinks log their own
//! errors and drop the event.

use crate::db::{self, DbPool};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// One audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// e.g. `ENTRY_VETOED`, `RISK_LIMITS_ADJUSTED`
    pub event_type: String,
    pub severity: Severity,
    /// Symbol or `portfolio`
    pub resource: String,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: &str, severity: Severity, resource: &str, details: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            severity,
            resource: resource.to_string(),
            details,
            at: Utc::now(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Writes events to the tracing log
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        match event.severity {
            Severity::Info => tracing::info!(
                event_type = %event.event_type,
                resource = %event.resource,
                details = %event.details,
                "Audit event"
            ),
            Severity::Warning | Severity::Critical => tracing::warn!(
                event_type = %event.event_type,
                severity = %event.severity,
                resource = %event.resource,
                details = %event.details,
                "Audit event"
            ),
        }
    }
}

/// Persists events to the `risk_events` table
///
/// Each insert runs on its own tokio task; `emit` must be called from within
/// a runtime. [`SqliteAuditLog::flush`] waits for pending inserts.
pub struct SqliteAuditLog {
    pool: DbPool,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl SqliteAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Wait for every insert spawned so far
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Audit insert task failed");
            }
        }
    }
}

impl AuditSink for SqliteAuditLog {
    fn emit(&self, event: AuditEvent) {
        let pool = self.pool.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = db::insert_event(&pool, &event).await {
                tracing::warn!(
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to persist audit event"
                );
            }
        });
        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}
