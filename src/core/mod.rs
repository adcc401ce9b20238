//! Core types for the updater
//!
//! This module holds the error taxonomy shared by every component of the update
//! subsystem and the user-facing error presentation used by the CLI.
//!
//! - [`UpdateError`] - enumerated failure modes (network, integrity, filesystem, apply)
//! - [`RollbackOutcome`] - what happened to the live installation after a failed apply
//! - [`ErrorContext`] / [`user_friendly_error`] - colored CLI output with suggestions

pub mod error;

pub use error::{ErrorContext, Result, RollbackOutcome, UpdateError, user_friendly_error};
