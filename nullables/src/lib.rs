//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies of a node (the clock and the transport) sit behind
//! ports. This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod network;

pub use clock::NullClock;
pub use network::NullTransport;
