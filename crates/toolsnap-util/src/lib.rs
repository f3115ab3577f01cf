//! Shared utilities for toolsnap.
//!
//! This crate provides common utilities used across the toolsnap workspace:
//! - ULID-based identifier generation
//! - Path utilities and portable path keys
//! - Content checksums with self-describing algorithm prefixes
//! - Opt-in logging setup for embedding hosts

pub mod checksum;
pub mod id;
pub mod log;
pub mod path;

pub use checksum::HashAlgorithm;
pub use id::Identifier;
pub use log::{LogConfig, LogLevel};
