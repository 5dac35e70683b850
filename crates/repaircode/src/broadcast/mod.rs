//! Broadcasting of job progress to live subscribers.

pub mod progress;

pub use progress::{
    ChannelSink, ProgressBus, ProgressEvent, ProgressSink, ProgressTracker, SinkError,
    SubscriptionId, ERROR_EVENT,
};
