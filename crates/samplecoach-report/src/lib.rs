//! samplecoach-report — result export.
//!
//! Writes an [`EvaluationReport`](samplecoach_core::report::EvaluationReport)
//! as a CSV result table or a self-contained HTML page.

pub mod csv;
pub mod html;
