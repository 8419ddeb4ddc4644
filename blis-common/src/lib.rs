//! Common building blocks for BLIS workload synthesis
//!
//! This crate provides the leaf pieces shared by the generator and its
//! tooling:
//! - `distributions`: token-length samplers
//! - `arrival`: inter-arrival time samplers
//! - `request`: the request record produced by the generator

pub mod arrival;
pub mod distributions;
pub mod request;

pub use arrival::{ArrivalProcess, ArrivalSampler, ArrivalSpec};
pub use distributions::{DistKind, DistSpec, EmpiricalPmf, LengthDistribution};
pub use request::{ModalityTokens, Request};
