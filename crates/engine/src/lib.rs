//! Deadline analysis, duplicate suppression, and check scheduling.

pub mod analyzer;
pub mod dedup;
pub mod scheduler;
