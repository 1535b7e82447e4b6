//! # LinguaFlow Common Library
//!
//! Shared code for the LinguaFlow import services:
//! - Error types
//! - Bootstrap configuration loading and working-root resolution
//! - API request/response types (imported card records)

pub mod api;
pub mod config;
pub mod error;

pub use error::{Error, Result};
