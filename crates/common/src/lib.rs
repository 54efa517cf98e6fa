//! Shared types for the cloud API client crates

mod error;
mod retry;
mod secret;

pub use error::{Error, Result};
pub use retry::{RetryPolicy, retry};
pub use secret::Secret;
