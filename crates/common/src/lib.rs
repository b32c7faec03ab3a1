//! Splice Common Utilities
//!
//! Shared infrastructure for all Splice crates:
//! - Error types and result aliases
//! - Playback frame clock
//! - Identifier generation
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use ids::*;
