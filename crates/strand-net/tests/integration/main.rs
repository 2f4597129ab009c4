//! Integration test entry point for strand-net.
//!
//! Run with: cargo test --test integration

mod harness;

mod discovery;
mod lifecycle;
