//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How an invocation ended. Present only on terminal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The invocation ran to completion
    Completed,
    /// The cancellation token was observed; accumulated results are valid
    Cancelled,
    /// A fatal orchestration-level failure; per-file errors never cause this
    Failed,
}

/// A lightweight payload attached to some progress events so consumers can
/// surface findings before the run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PartialUpdate {
    /// A duplicate group was assembled
    GroupFound {
        group_id: String,
        file_count: usize,
        total_size: u64,
    },
    /// A file was placed in a junk category
    JunkFound { path: PathBuf, size: u64 },
}

/// A single progress update from a pipeline or classifier invocation.
///
/// `percent` is monotonically non-decreasing within one invocation and
/// reaches 100 only on successful completion. Exactly one event per
/// invocation has `is_terminal = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Overall completion, 0-100
    pub percent: u8,
    /// Human-readable description of the current step
    pub message: String,
    /// Items processed so far in the current phase
    pub processed: usize,
    /// Total items in the current phase (0 when unknown)
    pub total: usize,
    /// Optional in-flight finding
    pub partial: Option<PartialUpdate>,
    /// Set on the last event of the invocation
    pub is_terminal: bool,
    /// Set only when `is_terminal` is true
    pub outcome: Option<RunOutcome>,
}

impl ProgressEvent {
    /// A non-terminal progress update.
    pub fn running(
        percent: u8,
        message: impl Into<String>,
        processed: usize,
        total: usize,
    ) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
            processed,
            total,
            partial: None,
            is_terminal: false,
            outcome: None,
        }
    }

    /// Attach a partial finding to this event.
    pub fn with_partial(mut self, partial: PartialUpdate) -> Self {
        self.partial = Some(partial);
        self
    }

    /// The terminal event of a successful invocation. Always 100%.
    pub fn finished(message: impl Into<String>, processed: usize, total: usize) -> Self {
        Self {
            percent: 100,
            message: message.into(),
            processed,
            total,
            partial: None,
            is_terminal: true,
            outcome: Some(RunOutcome::Completed),
        }
    }

    /// The terminal event of a cancelled invocation, frozen at the percent
    /// the run had reached.
    pub fn cancelled(percent: u8, processed: usize, total: usize) -> Self {
        Self {
            percent: percent.min(100),
            message: "cancelled".to_string(),
            processed,
            total,
            partial: None,
            is_terminal: true,
            outcome: Some(RunOutcome::Cancelled),
        }
    }

    /// The terminal event of a fatally failed invocation.
    pub fn failed(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
            processed: 0,
            total: 0,
            partial: None,
            is_terminal: true,
            outcome: Some(RunOutcome::Failed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = ProgressEvent::running(42, "hashing", 10, 50)
            .with_partial(PartialUpdate::GroupFound {
                group_id: "g1".to_string(),
                file_count: 3,
                total_size: 3072,
            });

        let json = serde_json::to_string(&event).unwrap();
        let back: ProgressEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back.percent, 42);
        assert!(matches!(
            back.partial,
            Some(PartialUpdate::GroupFound { file_count: 3, .. })
        ));
    }

    #[test]
    fn finished_event_is_terminal_at_100() {
        let event = ProgressEvent::finished("done", 50, 50);
        assert!(event.is_terminal);
        assert_eq!(event.percent, 100);
        assert_eq!(event.outcome, Some(RunOutcome::Completed));
    }

    #[test]
    fn cancelled_event_keeps_current_percent() {
        let event = ProgressEvent::cancelled(37, 12, 50);
        assert!(event.is_terminal);
        assert_eq!(event.percent, 37);
        assert_eq!(event.outcome, Some(RunOutcome::Cancelled));
    }

    #[test]
    fn percent_is_clamped_to_100() {
        let event = ProgressEvent::running(250, "overflow", 0, 0);
        assert_eq!(event.percent, 100);
    }
}
