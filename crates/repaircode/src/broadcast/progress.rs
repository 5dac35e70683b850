//! Per-job progress fan-out.
//!
//! Delivery is in-process, best-effort and at-most-once: there is no replay
//! buffer, so a subscriber only sees events published after it joined.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

/// Event name used for stage failures.
pub const ERROR_EVENT: &str = "error";

/// A single progress notification for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    #[serde(skip)]
    pub job_id: String,
    pub event: String,
    /// Payload, always an object carrying `jobId`.
    pub data: Value,
}

impl ProgressEvent {
    /// Builds an event whose payload is `{jobId, ...data}`.
    ///
    /// Object fields of `data` are merged after `jobId` and may override it.
    /// Non-object payloads are dropped.
    pub fn new(job_id: &str, event: &str, data: Value) -> Self {
        let mut payload = Map::new();
        payload.insert("jobId".to_string(), Value::String(job_id.to_string()));
        match data {
            Value::Object(fields) => payload.extend(fields),
            Value::Null => {}
            other => log::debug!("Dropping non-object payload for '{}': {}", event, other),
        }

        Self {
            job_id: job_id.to_string(),
            event: event.to_string(),
            data: Value::Object(payload),
        }
    }

    /// Server-sent-events framing: `event: <name>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("subscriber disconnected")]
    Disconnected,

    #[error("failed to write event: {0}")]
    Write(String),
}

/// Anything that can receive progress events, typically one open client
/// connection. A failed write unsubscribes the sink.
pub trait ProgressSink: Send + Sync {
    fn write(&self, event: &ProgressEvent) -> Result<(), SinkError>;
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn write(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Handle returned by [`ProgressBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SinkMap = HashMap<String, HashMap<u64, Arc<dyn ProgressSink>>>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<SinkMap>,
}

/// Maps job ids to their live sinks. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct ProgressBus {
    inner: Arc<BusInner>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SinkMap> {
        match self.inner.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Progress subscriber map lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn subscribe(&self, job_id: &str, sink: Arc<dyn ProgressSink>) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(job_id.to_string())
            .or_default()
            .insert(id, sink);
        log::debug!("Subscriber {} joined job {}", id, job_id);
        SubscriptionId(id)
    }

    /// Subscribes a fresh channel and returns its receiving half.
    pub fn subscribe_channel(
        &self,
        job_id: &str,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(job_id, Arc::new(ChannelSink::new(tx)));
        (id, rx)
    }

    /// Removes a subscription. Returns whether it was present.
    pub fn unsubscribe(&self, job_id: &str, subscription: SubscriptionId) -> bool {
        let mut map = self.lock();
        let Some(sinks) = map.get_mut(job_id) else {
            return false;
        };
        let removed = sinks.remove(&subscription.0).is_some();
        if sinks.is_empty() {
            map.remove(job_id);
        }
        removed
    }

    /// Sends `{event, data: {jobId, ...data}}` to every current subscriber of
    /// `job_id`. Never fails; sinks that reject the write are dropped.
    pub fn publish(&self, job_id: &str, event: &str, data: Value) {
        let snapshot: Vec<(u64, Arc<dyn ProgressSink>)> = match self.lock().get(job_id) {
            Some(sinks) => sinks
                .iter()
                .map(|(id, sink)| (*id, Arc::clone(sink)))
                .collect(),
            None => return,
        };

        let message = ProgressEvent::new(job_id, event, data);
        let failed: Vec<u64> = snapshot
            .into_iter()
            .filter_map(|(id, sink)| match sink.write(&message) {
                Ok(()) => None,
                Err(e) => {
                    log::debug!("Dropping subscriber {} of job {}: {}", id, job_id, e);
                    Some(id)
                }
            })
            .collect();

        if failed.is_empty() {
            return;
        }

        let mut map = self.lock();
        if let Some(sinks) = map.get_mut(job_id) {
            for id in failed {
                sinks.remove(&id);
            }
            if sinks.is_empty() {
                map.remove(job_id);
            }
        }
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.lock().get(job_id).map_or(0, |sinks| sinks.len())
    }

    /// Creates a publisher bound to one job.
    pub fn tracker(&self, job_id: &str) -> ProgressTracker {
        ProgressTracker {
            job_id: job_id.to_string(),
            bus: self.clone(),
        }
    }
}

/// Publishes events for a single job.
#[derive(Clone)]
pub struct ProgressTracker {
    job_id: String,
    bus: ProgressBus,
}

impl ProgressTracker {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn emit(&self, event: &str, data: Value) {
        self.bus.publish(&self.job_id, event, data);
    }

    /// Publishes an `error` event for a failed stage.
    pub fn error(&self, stage: &str, message: &str) {
        self.emit(
            ERROR_EVENT,
            serde_json::json!({ "message": message, "stage": stage }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct BrokenSink;

    impl ProgressSink for BrokenSink {
        fn write(&self, _event: &ProgressEvent) -> Result<(), SinkError> {
            Err(SinkError::Write("socket closed".to_string()))
        }
    }

    #[test]
    fn test_two_subscribers_both_receive() {
        let bus = ProgressBus::new();
        let (_a, mut rx_a) = bus.subscribe_channel("job-1");
        let (_b, mut rx_b) = bus.subscribe_channel("job-1");

        bus.publish("job-1", "analysis_start", json!({}));

        assert_eq!(rx_a.try_recv().unwrap().event, "analysis_start");
        assert_eq!(rx_b.try_recv().unwrap().event, "analysis_start");
    }

    #[test]
    fn test_unsubscribed_sink_stops_receiving() {
        let bus = ProgressBus::new();
        let (a, mut rx_a) = bus.subscribe_channel("job-1");
        let (_b, mut rx_b) = bus.subscribe_channel("job-1");

        assert!(bus.unsubscribe("job-1", a));
        bus.publish("job-1", "fixes_done", json!({}));

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().event, "fixes_done");
        assert!(!bus.unsubscribe("job-1", a));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = ProgressBus::new();
        bus.publish("nobody", "analysis_done", json!({ "issues": 3 }));
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }

    #[test]
    fn test_jobs_are_isolated() {
        let bus = ProgressBus::new();
        let (_a, mut rx_a) = bus.subscribe_channel("job-a");
        let (_b, mut rx_b) = bus.subscribe_channel("job-b");

        bus.publish("job-b", "patch_start", json!({}));

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().job_id, "job-b");
    }

    #[test]
    fn test_failing_sink_is_removed_silently() {
        let bus = ProgressBus::new();
        bus.subscribe("job-1", Arc::new(BrokenSink));
        let (_ok, mut rx) = bus.subscribe_channel("job-1");

        bus.publish("job-1", "analysis_start", json!({}));

        assert_eq!(bus.subscriber_count("job-1"), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_receiver_empties_the_job_entry() {
        let bus = ProgressBus::new();
        let (_id, rx) = bus.subscribe_channel("job-1");
        drop(rx);

        bus.publish("job-1", "analysis_start", json!({}));

        assert_eq!(bus.subscriber_count("job-1"), 0);
    }

    #[test]
    fn test_payload_carries_job_id() {
        let event = ProgressEvent::new(
            "job-9",
            "analysis_chunk_start",
            json!({ "chunk": 1, "total": 2 }),
        );
        assert_eq!(
            event.data,
            json!({ "jobId": "job-9", "chunk": 1, "total": 2 })
        );
    }

    #[test]
    fn test_sse_framing() {
        let event = ProgressEvent::new("j", "error", json!({ "message": "boom" }));
        assert_eq!(
            event.to_sse(),
            "event: error\ndata: {\"jobId\":\"j\",\"message\":\"boom\"}\n\n"
        );
    }

    #[test]
    fn test_tracker_error_event() {
        let bus = ProgressBus::new();
        let (_id, mut rx) = bus.subscribe_channel("job-1");

        bus.tracker("job-1").error("fixes", "model unavailable");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, ERROR_EVENT);
        assert_eq!(event.data["stage"], "fixes");
        assert_eq!(event.data["message"], "model unavailable");
    }
}
