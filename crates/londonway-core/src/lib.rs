//! Shared domain types, configuration and errors for LondonWay.

pub mod config;
pub mod error;
pub mod types;

pub use config::LondonWayConfig;
pub use error::{LondonWayError, Result};
pub use types::*;
