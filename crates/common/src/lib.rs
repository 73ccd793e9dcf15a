//! Shared error definitions and utilities used across all confab crates.

pub mod error;

pub use error::{ConfabError, Error, FromMessage, Result};
