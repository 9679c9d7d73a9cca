//! Core types and configuration shared by the loglens crates.

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
