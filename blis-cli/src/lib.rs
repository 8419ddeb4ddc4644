//! BLIS CLI library
//!
//! This library exposes profile and summary types for testing and reuse.

pub mod completions;
pub mod config;
pub mod output;
