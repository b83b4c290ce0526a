// crates/types/src/lib.rs
//! Canonical session model shared by every provider adapter.
//!
//! Each provider parses its own on-disk format into these types; the
//! renderer and search layers consume them and never see provider schemas.

mod export;
mod model;

pub use export::*;
pub use model::*;
