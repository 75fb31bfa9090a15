//! PINGPONG: randomized two-asset ping-pong swap bot for Jupiter on Solana.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod tokens;
pub mod wallet;
pub mod platforms;
pub mod engine;
pub mod dashboard;
