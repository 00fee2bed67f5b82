//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod retry;
pub mod url;

pub use retry::RetryPolicy;
