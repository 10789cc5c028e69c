//! Where stage records go.
//!
//! Every pipeline stage of every session produces one [`StageRecord`]. The
//! default sink writes them as structured tracing events; tests collect
//! them in memory.

use std::sync::{Arc, Mutex};

use hamlet_types::{StageRecord, StageStatus};
use tracing::{info, warn};

/// Receives stage records. Called on the world thread only.
pub trait StageSink: Send + Sync {
    /// Accept one record.
    fn record(&self, record: StageRecord);
}

/// Emits each record as a tracing event on the `hamlet::stage` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStageSink;

impl StageSink for TracingStageSink {
    fn record(&self, record: StageRecord) {
        let speaker = record.speaker.map(|id| id.to_string()).unwrap_or_default();
        match record.status {
            StageStatus::Degraded => warn!(
                target: "hamlet::stage",
                session_id = %record.session_id,
                speaker = %speaker,
                stage = %record.stage,
                status = ?record.status,
                latency_ms = record.latency_ms,
                input = %record.input_summary,
                result = %record.result,
                "Stage degraded"
            ),
            StageStatus::Succeeded | StageStatus::Skipped => info!(
                target: "hamlet::stage",
                session_id = %record.session_id,
                speaker = %speaker,
                stage = %record.stage,
                status = ?record.status,
                latency_ms = record.latency_ms,
                input = %record.input_summary,
                result = %record.result,
                "Stage complete"
            ),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStageSink {
    records: Arc<Mutex<Vec<StageRecord>>>,
}

impl MemoryStageSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn records(&self) -> Vec<StageRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl StageSink for MemoryStageSink {
    fn record(&self, record: StageRecord) {
        let Ok(mut records) = self.records.lock() else {
            return;
        };
        records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use hamlet_types::{SessionId, Stage};

    use super::*;

    fn record(status: StageStatus) -> StageRecord {
        StageRecord {
            session_id: SessionId::new(),
            speaker: None,
            stage: Stage::Reflection,
            input_summary: "reflection".to_owned(),
            status,
            result: "Had a conversation".to_owned(),
            latency_ms: 12,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn memory_sink_collects_clones() {
        let sink = MemoryStageSink::new();
        let shared = sink.clone();
        shared.record(record(StageStatus::Succeeded));
        sink.record(record(StageStatus::Degraded));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records.get(1).map(|r| r.status), Some(StageStatus::Degraded));
    }

    #[test]
    fn tracing_sink_accepts_every_status() {
        let sink = TracingStageSink;
        for status in [StageStatus::Succeeded, StageStatus::Degraded, StageStatus::Skipped] {
            sink.record(record(status));
        }
    }
}
