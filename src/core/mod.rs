//! Core assembly logic — types, tokens, parsing, loading, synthesis, planning.

pub mod artifact;
pub mod assembly;
pub mod error;
pub mod hasher;
pub mod parser;
pub mod planner;
pub mod stack;
pub mod synth;
pub mod tokens;
pub mod types;
