//! Configuration Module
//!
//! Capture intervals, rate-limit planning inputs, Protect connection details
//! and time-lapse settings, loaded from a TOML file.
//!
//! ## Loading Order
//!
//! 1. `CAMLAPSE_CONFIG` environment variable (path to TOML file)
//! 2. `camlapse.toml` in the current working directory
//! 3. Built-in defaults
//!
//! `CAMLAPSE_PROTECT_API_KEY` and `CAMLAPSE_PROTECT_HOST` override the file.
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(LapseConfig::load()?);
//!
//! // Anywhere in the binary:
//! let intervals = &config::get().capture.intervals;
//! ```
//!
//! Library components take their sections by value so they stay testable
//! without the global.

mod lapse_config;
pub mod defaults;
pub mod validation;

pub use lapse_config::*;

use std::sync::OnceLock;

static LAPSE_CONFIG: OnceLock<LapseConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: LapseConfig) {
    if LAPSE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Panics if `init()` has not been called; that is a startup bug.
#[allow(clippy::expect_used)]
pub fn get() -> &'static LapseConfig {
    LAPSE_CONFIG
        .get()
        .expect("config::get() called before config::init()")
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    LAPSE_CONFIG.get().is_some()
}
