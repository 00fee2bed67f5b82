//! Service layer for the mirror.
//!
//! This module contains the business logic for:
//! - Link classification (`LinkClassifier`)
//! - Crawl scheduling (`Frontier`) and the run deadline (`ExecutionBudget`)
//! - Directory discovery (`RecursiveCrawler`)
//! - Change-aware transfer (`SyncEngine`)
//! - Completion handoff (`CompletionPublisher`)
//! - The supplemental population dataset (`PopulationFetcher`)
//! - Analytics computations (`analytics`)

pub mod analytics;
mod budget;
mod classifier;
mod crawler;
mod frontier;
mod population;
mod publisher;
mod sync;

pub use budget::ExecutionBudget;
pub use classifier::LinkClassifier;
pub use crawler::RecursiveCrawler;
pub use frontier::{ClaimedTask, Frontier};
pub use population::PopulationFetcher;
pub use publisher::CompletionPublisher;
pub use sync::SyncEngine;
