//! Common types shared across the watch room components.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;
