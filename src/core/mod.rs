//! Core infrastructure shared across the whole crate.
//!
//! - **config**: configuration loading, resolved types, and the lint schema.
//! - **error**: application-wide error enum.

pub mod config;
pub mod error;
