//! Analysis Events
//!
//! Outbound lifecycle notifications (started, progress, completed, error)
//! go to an injected [`EventSink`]. Inbound [`SystemEvent`]s (cache clear,
//! memory pressure) arrive on a broadcast channel the service listens to.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::AnalysisType;

/// Default broadcast capacity
const CHANNEL_CAPACITY: usize = 256;

/// Milestones reported while an analysis runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Started,
    Preparing,
    Chunk,
    Merging,
    Processing,
    Completed,
}

/// Progress payload shared by listeners and the event sink
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub analysis_id: String,
    pub book_id: String,
    pub analysis_type: AnalysisType,
    /// 0.0 - 1.0
    pub progress: f32,
    pub stage: ProgressStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Callback registered with `BookAnalysisService::on_progress`
pub type ProgressListener = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalysisEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        analysis_id: String,
        book_id: String,
        analysis_type: AnalysisType,
        timestamp: DateTime<Utc>,
    },
    Progress(ProgressUpdate),
    #[serde(rename_all = "camelCase")]
    ChunkFailed {
        analysis_id: String,
        book_id: String,
        chunk_index: usize,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        analysis_id: String,
        book_id: String,
        analysis_type: AnalysisType,
        from_cache: bool,
        timestamp: DateTime<Utc>,
    },
    /// `analysis_type` stays a string so unsupported requests can be reported
    #[serde(rename_all = "camelCase")]
    Error {
        analysis_id: String,
        book_id: String,
        analysis_type: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    CacheCleared {
        book_id: Option<String>,
        removed: usize,
    },
}

impl AnalysisEvent {
    /// Channel-style event name
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Started { .. } => "ai:analysis:started",
            AnalysisEvent::Progress(_) => "ai:analysis:progress",
            AnalysisEvent::ChunkFailed { .. } => "ai:analysis:chunk_failed",
            AnalysisEvent::Completed { .. } => "ai:analysis:completed",
            AnalysisEvent::Error { .. } => "ai:analysis:error",
            AnalysisEvent::CacheCleared { .. } => "ai:cache:cleared",
        }
    }
}

/// Events the service reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    /// Clear one book's cached results, or everything when `book_id` is `None`
    CacheClear { book_id: Option<String> },
    MemoryPressure,
}

impl SystemEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SystemEvent::CacheClear { .. } => "ai:cache:clear",
            SystemEvent::MemoryPressure => "system:memory:pressure",
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receives outbound analysis events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AnalysisEvent);
}

pub type SharedSink = Arc<dyn EventSink>;

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AnalysisEvent) {}
}

/// Fans events out over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<AnalysisEvent>,
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: AnalysisEvent) {
        // no receivers is normal when nothing is listening
        let _ = self.sender.send(event);
    }
}

/// Records events in memory, for inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RwLock<Vec<AnalysisEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalysisEvent> {
        self.events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(AnalysisEvent::name).collect()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: AnalysisEvent) {
        self.events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

/// Sender half for inbound system events
pub fn system_channel() -> (
    broadcast::Sender<SystemEvent>,
    broadcast::Receiver<SystemEvent>,
) {
    broadcast::channel(CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_sink_delivers() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe();

        sink.emit(AnalysisEvent::CacheCleared {
            book_id: None,
            removed: 3,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "ai:cache:cleared");
    }

    #[test]
    fn test_broadcast_sink_without_receivers() {
        BroadcastSink::new(4).emit(AnalysisEvent::CacheCleared {
            book_id: Some("b1".to_string()),
            removed: 0,
        });
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(AnalysisEvent::Started {
            analysis_id: "a1".to_string(),
            book_id: "b1".to_string(),
            analysis_type: AnalysisType::Summary,
            timestamp: Utc::now(),
        });
        sink.emit(AnalysisEvent::Error {
            analysis_id: "a1".to_string(),
            book_id: "b1".to_string(),
            analysis_type: "summary".to_string(),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(sink.names(), vec!["ai:analysis:started", "ai:analysis:error"]);
    }

    #[test]
    fn test_event_serialization() {
        let event = AnalysisEvent::Progress(ProgressUpdate {
            analysis_id: "a1".to_string(),
            book_id: "b1".to_string(),
            analysis_type: AnalysisType::Themes,
            progress: 0.5,
            stage: ProgressStage::Chunk,
            detail: Some("chunk 2/3".to_string()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["analysisType"], "themes");
        assert_eq!(json["stage"], "chunk");
    }

    #[test]
    fn test_system_event_round_trip_from_json() {
        let event: SystemEvent =
            serde_json::from_str(r#"{"event":"cache_clear","book_id":"b7"}"#).unwrap();
        assert_eq!(
            event,
            SystemEvent::CacheClear {
                book_id: Some("b7".to_string())
            }
        );
        assert_eq!(event.name(), "ai:cache:clear");
    }
}
