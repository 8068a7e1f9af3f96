//! Monotonic, optionally throttled progress emission.

use std::time::{Duration, Instant};

use super::{EventSender, ProgressEvent};

/// Wraps an [`EventSender`] and enforces the progress contract: the percent
/// of consecutive events never decreases within one invocation, and emission
/// can be rate-limited so a fast walk does not flood the consumer.
///
/// Terminal events bypass the rate limit - every invocation ends with one.
pub struct ProgressTracker {
    sender: EventSender,
    last_percent: u8,
    min_interval: Option<Duration>,
    last_emit: Option<Instant>,
}

impl ProgressTracker {
    /// Tracker that emits every update.
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender,
            last_percent: 0,
            min_interval: None,
            last_emit: None,
        }
    }

    /// Tracker that drops non-terminal updates arriving within
    /// `min_interval` of the previous emission.
    pub fn throttled(sender: EventSender, min_interval: Duration) -> Self {
        Self {
            sender,
            last_percent: 0,
            min_interval: Some(min_interval),
            last_emit: None,
        }
    }

    /// The highest percent emitted so far.
    pub fn percent(&self) -> u8 {
        self.last_percent
    }

    /// Emit a non-terminal update. The percent is clamped so it never runs
    /// backwards; throttled updates are dropped entirely.
    pub fn update(&mut self, mut event: ProgressEvent) {
        debug_assert!(!event.is_terminal);

        if let Some(interval) = self.min_interval {
            if let Some(last) = self.last_emit {
                if last.elapsed() < interval {
                    return;
                }
            }
        }

        event.percent = event.percent.max(self.last_percent);
        self.last_percent = event.percent;
        self.last_emit = Some(Instant::now());
        self.sender.send(event);
    }

    /// Emit the terminal event. Never throttled; percent still never runs
    /// backwards.
    pub fn terminal(&mut self, mut event: ProgressEvent) {
        debug_assert!(event.is_terminal);

        event.percent = event.percent.max(self.last_percent);
        self.last_percent = event.percent;
        self.sender.send(event);
    }
}
