//! BLIS Core Library
//!
//! This crate provides the workload synthesis engine of the BLIS inference
//! simulator: workload specs and their compact forms, deterministic request
//! generation, the trace v2 format with replay, and offline calibration
//! against real traces.

pub mod calibrate;
pub mod error;
pub mod network;
pub mod seed;
pub mod trace;
pub mod workload;

pub use error::{Error, Result};
