//! samplecoach-core — evaluation scheduling and scoring engine.
//!
//! This crate defines the data model, the provider trait, and the pipeline
//! that turns a sample table and a question set into scored results:
//! prompt building, rate-limit window planning, dispatch with retries,
//! response scoring and aggregation.

pub mod aggregate;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod planner;
pub mod prompt;
pub mod report;
pub mod results;
pub mod retry;
pub mod scoring;
pub mod traits;
