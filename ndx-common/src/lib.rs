//! # NDX Common Library
//!
//! Shared code for NDX services including:
//! - Analysis request/response wire types
//! - Configuration loading
//! - Error types

pub mod api;
pub mod config;
pub mod error;

pub use error::{Error, Result};
