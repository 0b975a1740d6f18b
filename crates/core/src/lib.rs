//! Shared utilities for the ember renderer.
//!
//! This crate provides the pieces every other crate leans on:
//! - Error type and result alias
//! - Logging initialization
//! - Frame timing

mod error;
mod logging;
mod timer;

pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
