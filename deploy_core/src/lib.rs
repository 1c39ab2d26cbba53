//! The deployment engine (spec.md §1): transforms declarative service
//! specifications into an ordered execution plan and runs that plan
//! against a fleet of machines while preserving availability.
//!
//! This crate is "the core" only — the command-line front-end,
//! on-disk client configuration, overlay networking, embedded DNS,
//! Caddy config generation, the membership store/gossip, and the
//! low-level container engine client are external collaborators,
//! reached solely through [`client::MachineClient`] and the plain data
//! this crate hands back to its caller.

pub mod client;
pub mod compose;
pub mod config;
pub mod coordinator;
pub mod entities;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod inspector;
pub mod labels;
pub mod planner;
pub mod scheduler;

pub use coordinator::Coordinator;
pub use error::Error;

/// Re-exported so a host process can initialize the `tracing` subscriber
/// this crate's `#[tracing::instrument]` spans emit into without taking
/// its own direct dependency on `logger` (spec.md §3.1). Named `logging`
/// rather than flattened to avoid colliding with `entities::LogConfig`
/// (a container's log-driver configuration — an unrelated concept).
pub use logger as logging;
