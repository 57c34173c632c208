use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Running,
    Complete,
    /// Returned for ids the tracker does not know.
    Unknown,
}

/// Snapshot of one import, as shown to a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ImportProgress {
    fn initial() -> Self {
        Self {
            status: ProgressStatus::Pending,
            stage: Some("initializing".to_string()),
            percent: Some(0),
            message: Some("Starting import...".to_string()),
            success: None,
            result: None,
        }
    }

    pub fn unknown() -> Self {
        Self {
            status: ProgressStatus::Unknown,
            stage: None,
            percent: None,
            message: None,
            success: None,
            result: None,
        }
    }

    fn terminal(success: bool, result: Option<Value>) -> Self {
        Self {
            status: ProgressStatus::Complete,
            stage: None,
            percent: None,
            message: None,
            success: Some(success),
            result: Some(result.unwrap_or_else(|| Value::Object(Default::default()))),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ProgressStatus::Complete
    }
}

/// Partial change merged into an existing entry.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub status: Option<ProgressStatus>,
    pub stage: Option<String>,
    pub percent: Option<u8>,
    pub message: Option<String>,
}

impl ProgressUpdate {
    /// A running-stage update, the common case.
    pub fn stage(stage: &str, percent: u8, message: impl Into<String>) -> Self {
        Self {
            status: Some(ProgressStatus::Running),
            stage: Some(stage.to_string()),
            percent: Some(percent.min(100)),
            message: Some(message.into()),
        }
    }
}

/// In-memory progress table keyed by import id. Best effort: nothing
/// survives a restart.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    entries: Mutex<HashMap<String, ImportProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, import_id: &str) -> ImportProgress {
        let progress = ImportProgress::initial();
        self.entries
            .lock()
            .await
            .insert(import_id.to_string(), progress.clone());
        progress
    }

    /// Merges `changes` into the entry. Unknown ids are ignored.
    pub async fn update(&self, import_id: &str, changes: ProgressUpdate) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(import_id) {
            if let Some(status) = changes.status {
                entry.status = status;
            }
            if let Some(stage) = changes.stage {
                entry.stage = Some(stage);
            }
            if let Some(percent) = changes.percent {
                entry.percent = Some(percent.min(100));
            }
            if let Some(message) = changes.message {
                entry.message = Some(message);
            }
        }
    }

    /// Replaces the entry with its terminal record. Unknown ids are ignored.
    pub async fn complete(&self, import_id: &str, success: bool, result: Option<Value>) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(import_id) {
            *entry = ImportProgress::terminal(success, result);
        }
    }

    pub async fn get(&self, import_id: &str) -> ImportProgress {
        self.entries
            .lock()
            .await
            .get(import_id)
            .cloned()
            .unwrap_or_else(ImportProgress::unknown)
    }

    pub async fn delete(&self, import_id: &str) {
        self.entries.lock().await.remove(import_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// One server-sent progress frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub progress: ImportProgress,
}

impl ProgressEvent {
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::to_string(&self.progress)
            .unwrap_or_else(|_| r#"{"status":"unknown"}"#.to_string());
        format!("event: progress\ndata: {}\n\n", data)
    }
}

struct StreamState {
    tracker: Arc<ProgressTracker>,
    import_id: String,
    poll_interval: Duration,
    polls_left: u32,
    last: Option<ImportProgress>,
    finished: bool,
}

/// Streams progress for one import.
///
/// Yields the current snapshot immediately, then polls every `poll_interval`
/// (at most `max_polls` times) and yields whenever the snapshot changed. The
/// stream ends after yielding a complete snapshot, deleting the entry.
pub fn progress_stream(
    tracker: Arc<ProgressTracker>,
    import_id: &str,
    poll_interval: Duration,
    max_polls: u32,
) -> impl Stream<Item = ProgressEvent> + Send + 'static {
    let state = StreamState {
        tracker,
        import_id: import_id.to_string(),
        poll_interval,
        polls_left: max_polls,
        last: None,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let snapshot = if state.last.is_none() {
            state.tracker.get(&state.import_id).await
        } else {
            loop {
                if state.polls_left == 0 {
                    log::debug!("Progress stream for {} reached its poll limit", state.import_id);
                    return None;
                }
                tokio::time::sleep(state.poll_interval).await;
                state.polls_left -= 1;

                let snapshot = state.tracker.get(&state.import_id).await;
                if state.last.as_ref() != Some(&snapshot) {
                    break snapshot;
                }
            }
        };

        if snapshot.is_complete() {
            state.tracker.delete(&state.import_id).await;
            state.finished = true;
        }
        state.last = Some(snapshot.clone());
        Some((ProgressEvent { progress: snapshot }, state))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_update_complete() {
        let tracker = ProgressTracker::new();
        let created = tracker.create("imp-1").await;
        assert_eq!(created.status, ProgressStatus::Pending);
        assert_eq!(created.stage.as_deref(), Some("initializing"));
        assert_eq!(created.percent, Some(0));
        assert_eq!(created.message.as_deref(), Some("Starting import..."));

        tracker
            .update("imp-1", ProgressUpdate::stage("importing", 40, "Importing Application"))
            .await;
        let running = tracker.get("imp-1").await;
        assert_eq!(running.status, ProgressStatus::Running);
        assert_eq!(running.percent, Some(40));

        tracker.complete("imp-1", true, Some(json!({"applications": 2}))).await;
        let done = tracker.get("imp-1").await;
        assert!(done.is_complete());
        assert_eq!(done.success, Some(true));
        assert_eq!(done.stage, None);
        assert_eq!(done.result, Some(json!({"applications": 2})));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let tracker = ProgressTracker::new();
        tracker.update("missing", ProgressUpdate::stage("x", 10, "x")).await;
        tracker.complete("missing", true, None).await;
        assert_eq!(tracker.len().await, 0);

        let unknown = tracker.get("missing").await;
        assert_eq!(serde_json::to_value(&unknown).unwrap(), json!({"status": "unknown"}));
    }

    #[tokio::test]
    async fn test_complete_without_result_uses_empty_object() {
        let tracker = ProgressTracker::new();
        tracker.create("imp").await;
        tracker.complete("imp", false, None).await;
        let value = serde_json::to_value(tracker.get("imp").await).unwrap();
        assert_eq!(value, json!({"status": "complete", "success": false, "result": {}}));
    }

    #[test]
    fn test_sse_frame_format() {
        let event = ProgressEvent {
            progress: ImportProgress::unknown(),
        };
        assert_eq!(event.to_sse_frame(), "event: progress\ndata: {\"status\":\"unknown\"}\n\n");
    }

    #[tokio::test]
    async fn test_stream_emits_changes_and_deletes_on_complete() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.create("imp").await;

        let driver = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                tracker
                    .update("imp", ProgressUpdate::stage("importing", 50, "Halfway"))
                    .await;
                tokio::time::sleep(Duration::from_millis(30)).await;
                tracker.complete("imp", true, None).await;
            })
        };

        let events: Vec<ProgressEvent> =
            progress_stream(tracker.clone(), "imp", Duration::from_millis(5), 200)
                .collect()
                .await;
        driver.await.unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].progress.status, ProgressStatus::Pending);
        assert_eq!(events[1].progress.percent, Some(50));
        assert!(events[2].progress.is_complete());
        assert_eq!(tracker.len().await, 0);
    }

    #[tokio::test]
    async fn test_stream_stops_after_max_polls() {
        let tracker = Arc::new(ProgressTracker::new());
        tracker.create("stuck").await;

        let events: Vec<ProgressEvent> =
            progress_stream(tracker.clone(), "stuck", Duration::from_millis(1), 3)
                .collect()
                .await;
        assert_eq!(events.len(), 1);
        // Entry stays; only an observed completion removes it.
        assert_eq!(tracker.len().await, 1);
    }
}
