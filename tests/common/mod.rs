//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure including:
//! - In-memory stores with a registered taxpayer and signer
//! - Mock signing and authority clients with call counters
//! - Custom assertions for document and queue state

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;

pub use std::sync::Arc;
