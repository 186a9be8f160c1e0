//! # Core Module
//!
//! This module contains the core functionality of the CI matrix: data models,
//! configuration, matrix-cell resolution, target platforms, the single-run
//! driver and the matrix runner.

pub mod config;
pub mod driver;
pub mod error;
pub mod matrix;
pub mod models;
pub mod platform;
pub mod resolver;

// Re-exports
pub use config::{AxisCatalog, MatrixConfig, RunSettings};
pub use driver::run_single;
pub use error::CiError;
pub use matrix::{MatrixReport, run_all};
pub use models::{ConfigRequest, OsChoice, TestConfig, TestResult};
pub use resolver::resolve;
