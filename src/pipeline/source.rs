//! Telemetry sources.
//!
//! The orchestrator consumes tick batches through the `TelemetrySource`
//! trait; production wires a live feed poller behind it, tests and the
//! simulation binary wire a JSONL replay or synthetic generator.

use async_trait::async_trait;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::TelemetrySample;

/// One pull from a telemetry source.
#[derive(Debug, Clone)]
pub enum TickBatch {
    /// Samples for one orchestration pass (at most one per vessel).
    Batch(Vec<TelemetrySample>),
    /// The source is exhausted (replay files only; a live feed never ends).
    Eof,
}

/// Supplier of per-tick telemetry batches.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn next_batch(&mut self) -> anyhow::Result<TickBatch>;
}

// ============================================================================
// JSONL Replay
// ============================================================================

/// Replays recorded telemetry from a JSONL file: each line is a JSON array
/// of samples and becomes exactly one tick batch.
///
/// Unparseable lines are logged and skipped rather than aborting the
/// replay, matching the live-feed posture of dropping bad input.
pub struct JsonlReplay {
    lines: std::vec::IntoIter<String>,
    line_no: usize,
}

impl JsonlReplay {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let lines = BufReader::new(file)
            .lines()
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            path = %path.as_ref().display(),
            ticks = lines.len(),
            "Opened telemetry replay"
        );
        Ok(Self {
            lines: lines.into_iter(),
            line_no: 0,
        })
    }

    #[cfg(test)]
    fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines: lines.into_iter(),
            line_no: 0,
        }
    }
}

#[async_trait]
impl TelemetrySource for JsonlReplay {
    async fn next_batch(&mut self) -> anyhow::Result<TickBatch> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Vec<TelemetrySample>>(&line) {
                Ok(samples) => return Ok(TickBatch::Batch(samples)),
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "Skipping unparseable replay line");
                }
            }
        }
        Ok(TickBatch::Eof)
    }
}

// ============================================================================
// Snapshot Poll
// ============================================================================

/// Live-interval source: re-reads a snapshot file on every tick. An
/// external fetcher rewrites the file with the current fleet state (one
/// JSON array of samples); a missing or malformed file is an empty tick,
/// never a stop.
pub struct SnapshotPoll {
    path: PathBuf,
}

impl SnapshotPoll {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        info!(path = %path.as_ref().display(), "Polling telemetry snapshot file");
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl TelemetrySource for SnapshotPoll {
    async fn next_batch(&mut self) -> anyhow::Result<TickBatch> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Snapshot file unreadable this tick");
                return Ok(TickBatch::Batch(Vec::new()));
            }
        };
        match serde_json::from_str::<Vec<TelemetrySample>>(&text) {
            Ok(samples) => Ok(TickBatch::Batch(samples)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Snapshot file unparseable this tick");
                Ok(TickBatch::Batch(Vec::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_one_line_per_tick() {
        let lines = vec![
            r#"[{"vessel_id":"WALLA","departing_terminal":"SEA","at_dock":true,"timestamp":1000}]"#
                .to_string(),
            String::new(),
            r#"[{"vessel_id":"WALLA","departing_terminal":"SEA","at_dock":false,"timestamp":2000},
                {"vessel_id":"TACOMA","departing_terminal":"BBI","at_dock":true,"timestamp":2000}]"#
                .replace('\n', " "),
        ];
        let mut replay = JsonlReplay::from_lines(lines);

        let TickBatch::Batch(first) = replay.next_batch().await.unwrap() else {
            panic!("expected batch");
        };
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].vessel_id, "WALLA");

        let TickBatch::Batch(second) = replay.next_batch().await.unwrap() else {
            panic!("expected batch");
        };
        assert_eq!(second.len(), 2);

        assert!(matches!(replay.next_batch().await.unwrap(), TickBatch::Eof));
    }

    #[tokio::test]
    async fn test_bad_line_skipped_not_fatal() {
        let lines = vec![
            "not json".to_string(),
            r#"[{"vessel_id":"WALLA","departing_terminal":"SEA","at_dock":true,"timestamp":1000}]"#
                .to_string(),
        ];
        let mut replay = JsonlReplay::from_lines(lines);
        let TickBatch::Batch(batch) = replay.next_batch().await.unwrap() else {
            panic!("expected batch");
        };
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_poll_rereads_file_each_tick() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        let mut poll = SnapshotPoll::new(&path);

        // no file yet: empty tick, not an error
        let TickBatch::Batch(batch) = poll.next_batch().await.unwrap() else {
            panic!("expected batch");
        };
        assert!(batch.is_empty());

        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"vessel_id":"WALLA","departing_terminal":"SEA","at_dock":true,"timestamp":1000}}]"#
        )
        .unwrap();
        drop(file);

        let TickBatch::Batch(batch) = poll.next_batch().await.unwrap() else {
            panic!("expected batch");
        };
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].vessel_id, "WALLA");
    }
}
