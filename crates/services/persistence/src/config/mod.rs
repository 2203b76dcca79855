//! Service configuration module
//!
//! Handles environment variables and persistence-wide constants.

mod constants;
mod settings;

pub use constants::*;
pub use settings::Config;
