//! Stackforge — dependency-ordered cloud assemblies.
//!
//! Deterministic topological ordering of artifacts, resources and lazy values.
//! Two-phase token resolution. BLAKE3 template fingerprints.

pub mod cli;
pub mod core;
pub mod graph;
