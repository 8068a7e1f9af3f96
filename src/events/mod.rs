//! # Events Module
//!
//! Progress streaming from the engine to any consumer (CLI, GUI, tests).
//!
//! Every pipeline or classifier invocation emits a sequence of
//! [`ProgressEvent`]s ending in exactly one terminal event, whatever the
//! outcome. Consumers that drop the receiver simply stop getting updates;
//! the engine keeps running.

mod channel;
mod progress;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use progress::ProgressTracker;
pub use types::{PartialUpdate, ProgressEvent, RunOutcome};
