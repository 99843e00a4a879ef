//! # Core Runtime Module
//!
//! Foundational infrastructure shared by the sync engine:
//! - Logging and tracing setup
//! - Engine configuration with validation
//! - Progress log sink and sync event bus

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
