//! Splice Processing Core: the Composition Graph Compiler
//!
//! Turns a timeline snapshot into a declarative processing graph:
//! - **Graph:** Nodes with named input/output streams, serializable to JSON
//! - **Compiler:** Canvas base, per-clip video chains, overlay folding,
//!   text burn-in, audio chains and the final mix
//!
//! This crate is pure computation: no I/O, no encoder. All inputs are data;
//! all outputs are data.

pub mod compiler;
pub mod graph;

pub use compiler::{compile, CompileOptions, GraphCompiler};
pub use graph::{CompositionGraph, GraphInput, GraphNode, Operation};
