//! Integration test suite for kubelens-updater
//!
//! End-to-end runs of the update pipeline against a `wiremock` release server, plus tests
//! of the `kubelens-updater` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **updater_e2e**: download, verify, apply and relaunch through the real Linux applier
//! - **cli**: command-line behavior of `check`, `update` and `cleanup`

mod cli;
mod updater_e2e;
