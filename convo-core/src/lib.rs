//! Core types and services for convo
//!
//! This crate provides configuration, error types, logging setup and the
//! session persistence layer (SQLite store plus in-process history cache)
//! shared by the other convo crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod prompts;
pub mod session;
pub mod utils;

pub use error::{Error, Result};
