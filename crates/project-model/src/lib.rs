//! Splice Project Model
//!
//! Defines the core data contracts for Splice projects and the pure edit
//! machinery around them:
//! - **Model:** Media assets, tracks, clips, transforms, text and transitions
//! - **State:** The immutable [`TimelineState`] snapshot every layer reads
//! - **Commands:** The edit vocabulary and the total `apply` transition
//! - **Placement:** Free-slot search, move and trim resolution
//! - **Project:** On-disk project bundle load/save
//!
//! All times are in seconds. Clip positions are percentages of the canvas
//! so they survive canvas size changes.

pub mod command;
pub mod model;
pub mod placement;
pub mod project;
pub mod state;
pub mod store;

pub use command::*;
pub use model::*;
pub use placement::*;
pub use project::*;
pub use state::*;
pub use store::*;
