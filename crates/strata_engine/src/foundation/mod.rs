//! Foundation module - Core utilities and types
//!
//! - Time management for the application clock
//! - Logging utilities

pub mod time;
pub mod logging;
