//! Splice Render Engine
//!
//! Export pipeline that resolves a timeline snapshot's media, compiles it
//! into a composition graph and hands the graph to an encode backend.
//!
//! # Pipeline Architecture
//!
//! ```text
//! TimelineState (owned snapshot)
//!        │
//!        ├── AssetSource::fetch ── concurrent, bounded ──┐
//!        ├── FontSource::resolve ── failures degrade ────┤
//!        │                                                ▼
//!        └── GraphCompiler::compile ──► CompositionGraph + sources + fonts
//!                                                         │
//!                                                         ▼
//!                                        EncodeBackend::encode (ffmpeg)
//!                                                         │
//!                                                         ▼
//!                                                   artifact bytes
//! ```

pub mod export;
pub mod ffmpeg;
pub mod sources;

pub use export::*;
pub use ffmpeg::FfmpegBackend;
pub use sources::{ConfiguredFontSource, FileAssetSource};
