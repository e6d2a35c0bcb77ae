//! Shared types, configuration, and error handling for TaskHerald crates.

pub mod config;
pub mod error;
pub mod types;
