//! Shared utilities for the braid workspace.

pub mod stats;

pub use stats::StatsCounter;
