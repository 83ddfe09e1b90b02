//! Shared types for the Circuit Analyzer client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
