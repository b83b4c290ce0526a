// crates/engine/src/lib.rs
//! Session ingestion and normalization engine.
//!
//! Discovers on-disk session logs for eight AI coding-assistant CLIs,
//! parses each provider's native format, and normalizes everything into
//! the canonical message model from `agent-view-types`. Parsing is a
//! stateless, idempotent, read-only transform: nothing on disk is mutated
//! and nothing is cached between calls.

pub mod classify;
pub mod correlate;
pub mod error;
pub mod providers;
pub mod service;
pub mod timeutil;
pub mod truncate;

pub use error::*;
pub use providers::{provider_adapter, ScopeHint, SessionFinder, SessionLocation, SessionParser};
pub use service::SessionService;
