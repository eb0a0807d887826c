//! CBAT: convertible-bond bulletin watcher and auto-trader
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod bulletin;
pub mod market;
pub mod broker;
pub mod alerts;
pub mod engine;
pub mod storage;
