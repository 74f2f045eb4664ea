//! Output module for reporting on harvest results
//!
//! This module handles:
//! - Loading statistics from the harvest database
//! - Printing them for operators

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};
