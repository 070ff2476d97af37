#![deny(missing_docs)]
//! Media relay core library.
//!
//! Transport-agnostic logic for relaying media between conversations:
//! history scanning, caption transforms, flood-aware dispatch and the
//! range relay engine.

/// Configuration management.
pub mod config;
/// Destination resolution for single-item relays.
pub mod destination;
/// Flood-aware, one-at-a-time media dispatch.
pub mod dispatcher;
/// Range relay engine.
pub mod engine;
/// Per-requester job tracking and cancellation.
pub mod jobs;
/// Message link and target spec parsing.
pub mod link;
/// Shared data model.
pub mod model;
/// Relay outcomes and their human-readable summaries.
pub mod outcome;
/// History scanning over an ID interval.
pub mod scanner;
/// Command-facing relay service.
pub mod service;
/// Per-requester settings store.
pub mod settings;
/// Caption transform pipeline.
pub mod transform;
/// Messaging platform boundary.
pub mod transport;

#[cfg(test)]
pub mod testing;
