//! Event channel implementation using crossbeam-channel.
//!
//! Provides a thread-safe way to stream progress from the engine to any
//! consumer thread.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::ProgressEvent;

/// Sends progress events from the engine.
///
/// A thin wrapper around crossbeam's Sender that can be cloned and sent
/// across threads.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<ProgressEvent>,
}

impl EventSender {
    /// Send an event.
    ///
    /// If the receiver has been dropped, the event is silently discarded,
    /// which makes progress reporting optional for the caller.
    pub fn send(&self, event: ProgressEvent) {
        let _ = self.inner.send(event);
    }
}

/// Receives progress events from the engine.
pub struct EventReceiver {
    inner: Receiver<ProgressEvent>,
}

impl EventReceiver {
    /// Block until the next event is received
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.inner.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.inner.try_recv().ok()
    }

    /// Returns an iterator over received events
    pub fn iter(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.inner.iter()
    }
}

/// Factory for event channel endpoints.
pub struct EventChannel;

impl EventChannel {
    /// Create a new unbounded event channel. Events are small; this is the
    /// right default.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (EventSender { inner: sender }, EventReceiver { inner: receiver })
    }

    /// Create a bounded event channel for consumers that want backpressure.
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = bounded(capacity);
        (EventSender { inner: sender }, EventReceiver { inner: receiver })
    }
}

/// An event sender with no receiver, for headless runs and tests.
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}
