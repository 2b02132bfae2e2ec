//! Append-only event log
//!
//! Phase results, sync snapshots and ledger mutations are recorded as rows keyed
//! by `(entity_type, recorded_at)`. Rows are only ever dropped by [`compacted`],
//! which keeps every row replay depends on.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ReconcilerError;
use crate::filesys::file::File;

pub const ENTITY_SYNC_REPORT: &str = "sync_report";
pub const ENTITY_SETUP_PHASE: &str = "setup_phase";
pub const ENTITY_SETUP_RUN: &str = "setup_run";
pub const ENTITY_DEPLOYMENT_ERROR: &str = "deployment_error";
pub const ENTITY_DEPLOYMENT: &str = "deployment";
pub const ENTITY_REMEDIATION: &str = "remediation";

/// One persisted row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub entity_type: String,
    pub recorded_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Append-only sink for audit rows
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append a row; appends from concurrent callers never interleave
    async fn append(&self, entity_type: &str, payload: serde_json::Value)
        -> Result<(), ReconcilerError>;

    /// All rows of one entity type in insertion order
    async fn read_all(&self, entity_type: &str) -> Result<Vec<EventRow>, ReconcilerError>;

    /// Drop rows older than `cutoff` that replay no longer needs; returns the number removed
    async fn compact(&self, cutoff: DateTime<Utc>) -> Result<usize, ReconcilerError>;
}

/// Replay key of a row whose latest version must survive compaction
fn snapshot_key(row: &EventRow) -> Option<String> {
    let payload = &row.payload;
    let id = match row.entity_type.as_str() {
        ENTITY_DEPLOYMENT => payload["id"].as_str()?.to_string(),
        ENTITY_SETUP_PHASE => match payload["status"].as_str()? {
            "completed" | "failed" => payload["phase_id"].to_string(),
            _ => return None,
        },
        ENTITY_DEPLOYMENT_ERROR => ledger_upsert_id(row)?.to_string(),
        _ => return None,
    };
    Some(format!("{}:{}", row.entity_type, id))
}

fn ledger_upsert_id(row: &EventRow) -> Option<&str> {
    if row.entity_type != ENTITY_DEPLOYMENT_ERROR || row.payload["op"] != "upsert" {
        return None;
    }
    row.payload["error"]["id"].as_str()
}

/// Rows to keep: everything recorded at or after `cutoff`, plus the latest row
/// per deployment, terminal phase and ledger entry. Ledger entries that were
/// purged are dropped entirely. Insertion order is preserved.
pub fn compacted(rows: Vec<EventRow>, cutoff: DateTime<Utc>) -> Vec<EventRow> {
    let purged: HashSet<String> = rows
        .iter()
        .filter(|r| r.entity_type == ENTITY_DEPLOYMENT_ERROR && r.payload["op"] == "purged")
        .filter_map(|r| r.payload["ids"].as_array())
        .flatten()
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect();

    let keys: Vec<Option<String>> = rows.iter().map(snapshot_key).collect();
    let mut latest: HashMap<&str, usize> = HashMap::new();
    for (index, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            latest.insert(key.as_str(), index);
        }
    }

    let keep: Vec<bool> = rows
        .iter()
        .zip(&keys)
        .enumerate()
        .map(|(index, (row, key))| {
            if ledger_upsert_id(row).is_some_and(|id| purged.contains(id)) {
                return false;
            }
            row.recorded_at >= cutoff
                || key
                    .as_deref()
                    .is_some_and(|key| latest.get(key) == Some(&index))
        })
        .collect();

    rows.into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect()
}

/// Serialize and append, logging instead of failing the caller
pub async fn record<T: Serialize + ?Sized>(log: &dyn EventLog, entity_type: &str, value: &T) {
    let payload = match serde_json::to_value(value) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to serialize {} row: {}", entity_type, e);
            return;
        }
    };

    if let Err(e) = log.append(entity_type, payload).await {
        warn!("Failed to store {} row: {}", entity_type, e);
    }
}

/// JSON-lines file log
pub struct JsonlEventLog {
    file: File,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlEventLog {
    pub fn new(file: File) -> Self {
        Self {
            file,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Parse every line, skipping malformed ones
    fn parse(lines: &[String]) -> Vec<EventRow> {
        lines
            .iter()
            .enumerate()
            .filter_map(|(n, line)| match serde_json::from_str::<EventRow>(line) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!("Skipping malformed event log line {}: {}", n + 1, e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl EventLog for JsonlEventLog {
    async fn append(
        &self,
        entity_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), ReconcilerError> {
        let row = EventRow {
            entity_type: entity_type.to_string(),
            recorded_at: Utc::now(),
            payload,
        };
        let line = serde_json::to_string(&row)?;

        let _guard = self.write_lock.lock().await;
        self.file.append_line(&line).await?;
        debug!("Appended {} row", entity_type);
        Ok(())
    }

    async fn read_all(&self, entity_type: &str) -> Result<Vec<EventRow>, ReconcilerError> {
        let lines = {
            let _guard = self.write_lock.lock().await;
            self.file.read_lines().await?
        };

        Ok(Self::parse(&lines)
            .into_iter()
            .filter(|row| row.entity_type == entity_type)
            .collect())
    }

    async fn compact(&self, cutoff: DateTime<Utc>) -> Result<usize, ReconcilerError> {
        let _guard = self.write_lock.lock().await;
        let lines = self.file.read_lines().await?;
        let kept = compacted(Self::parse(&lines), cutoff);

        let removed = lines.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let kept = kept
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.file.write_lines(&kept).await?;

        info!("Compacted event log: {} row(s) removed, {} kept", removed, kept.len());
        Ok(removed)
    }
}

/// In-memory log for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryEventLog {
    rows: Mutex<Vec<EventRow>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows of one entity type
    pub fn count(&self, entity_type: &str) -> usize {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.iter().filter(|r| r.entity_type == entity_type).count()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(
        &self,
        entity_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), ReconcilerError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.push(EventRow {
            entity_type: entity_type.to_string(),
            recorded_at: Utc::now(),
            payload,
        });
        Ok(())
    }

    async fn read_all(&self, entity_type: &str) -> Result<Vec<EventRow>, ReconcilerError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows
            .iter()
            .filter(|r| r.entity_type == entity_type)
            .cloned()
            .collect())
    }

    async fn compact(&self, cutoff: DateTime<Utc>) -> Result<usize, ReconcilerError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();
        *rows = compacted(std::mem::take(&mut *rows), cutoff);
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn row(entity_type: &str, age_days: i64, payload: serde_json::Value) -> EventRow {
        EventRow {
            entity_type: entity_type.to_string(),
            recorded_at: Utc::now() - Duration::days(age_days),
            payload,
        }
    }

    #[test]
    fn test_compaction_keeps_latest_snapshots() {
        let rows = vec![
            row(ENTITY_SYNC_REPORT, 40, json!({ "overall": "synced" })),
            row(ENTITY_DEPLOYMENT, 40, json!({ "id": "dpl_1", "state": "building" })),
            row(ENTITY_DEPLOYMENT, 39, json!({ "id": "dpl_1", "state": "ready" })),
            row(ENTITY_SETUP_PHASE, 40, json!({ "phase_id": 2, "status": "completed" })),
            row(ENTITY_SETUP_PHASE, 39, json!({ "phase_id": 2, "status": "running" })),
            row(ENTITY_DEPLOYMENT_ERROR, 40, json!({ "op": "upsert", "error": { "id": "e1" } })),
            row(ENTITY_DEPLOYMENT_ERROR, 40, json!({ "op": "upsert", "error": { "id": "e2" } })),
            row(ENTITY_DEPLOYMENT_ERROR, 35, json!({ "op": "purged", "ids": ["e1"] })),
            row(ENTITY_REMEDIATION, 35, json!({ "fixed": [], "failed": [] })),
            row(ENTITY_SYNC_REPORT, 1, json!({ "overall": "drifted" })),
        ];

        let kept = compacted(rows, Utc::now() - Duration::days(30));
        let summary: Vec<_> = kept
            .iter()
            .map(|r| (r.entity_type.as_str(), r.payload.to_string()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (ENTITY_DEPLOYMENT, json!({ "id": "dpl_1", "state": "ready" }).to_string()),
                (ENTITY_SETUP_PHASE, json!({ "phase_id": 2, "status": "completed" }).to_string()),
                (
                    ENTITY_DEPLOYMENT_ERROR,
                    json!({ "op": "upsert", "error": { "id": "e2" } }).to_string()
                ),
                (ENTITY_SYNC_REPORT, json!({ "overall": "drifted" }).to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_jsonl_compaction_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::new(dir.path().join("events.jsonl"));
        let log = JsonlEventLog::new(file.clone());

        for _ in 0..5 {
            log.append(ENTITY_SYNC_REPORT, json!({ "overall": "synced" }))
                .await
                .unwrap();
        }
        log.append(ENTITY_DEPLOYMENT, json!({ "id": "dpl_1", "state": "ready" }))
            .await
            .unwrap();
        file.append_line("{not json").await.unwrap();

        let removed = log.compact(Utc::now() + Duration::seconds(1)).await.unwrap();
        assert_eq!(removed, 6);
        assert_eq!(file.read_lines().await.unwrap().len(), 1);
        assert_eq!(log.compact(Utc::now() + Duration::seconds(1)).await.unwrap(), 0);

        log.append(ENTITY_SYNC_REPORT, json!({ "overall": "drifted" }))
            .await
            .unwrap();
        assert_eq!(log.read_all(ENTITY_DEPLOYMENT).await.unwrap().len(), 1);
        assert_eq!(log.read_all(ENTITY_SYNC_REPORT).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_log_filters_by_entity() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlEventLog::new(File::new(dir.path().join("events.jsonl")));

        log.append(ENTITY_SYNC_REPORT, serde_json::json!({"overall": "synced"}))
            .await
            .unwrap();
        log.append(ENTITY_SETUP_PHASE, serde_json::json!({"phase_id": 1}))
            .await
            .unwrap();

        let rows = log.read_all(ENTITY_SETUP_PHASE).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload["phase_id"], 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(JsonlEventLog::new(File::new(dir.path().join("events.jsonl"))));

        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(ENTITY_DEPLOYMENT_ERROR, serde_json::json!({ "n": i }))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let rows = log.read_all(ENTITY_DEPLOYMENT_ERROR).await.unwrap();
        assert_eq!(rows.len(), 20);
    }
}
