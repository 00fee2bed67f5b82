// src/lib.rs

//! tsmirror library
//!
//! Incremental mirror of a public time-series directory tree into an object
//! store, with a queue handoff to an analytics consumer.

pub mod config;
pub mod error;
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
