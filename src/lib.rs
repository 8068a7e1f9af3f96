//! # Disk Declutter
//!
//! A duplicate-detection and junk-classification engine for local storage.
//!
//! ## Core Philosophy
//! - **Never delete** - the engine reads bytes and metadata and produces
//!   recommendations; acting on them belongs to the caller
//! - **Degrade gracefully** - per-file failures are counted and skipped,
//!   never fatal to a scan
//! - **Stay responsive** - progress streams over a channel and every walk
//!   honors a cancellation token between files
//!
//! ## Architecture
//! The library is split into a core engine (UI-agnostic) and presentation
//! layers:
//! - `core` - duplicate detection and junk classification
//! - `events` - event-driven progress reporting (GUI-ready)
//! - `error` - error types

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{DeclutterError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point (CLI or GUI).
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
