//! # CI Matrix Library
//!
//! This library provides the core functionality for the `ci-matrix` tool,
//! which builds a library inside a disposable container for every cell of an
//! Isabelle × Java (× OS) test matrix and collects the resulting reports.
//!
//! ## Modules
//!
//! - `core` - Data models, configuration, matrix-cell resolution, target platforms,
//!   the single-run driver and the matrix runner
//! - `infra` - Infrastructure services: process spawning, file system helpers and
//!   the local/remote execution backends
//! - `reporting` - Report post-processing, the index document and console summaries
//! - `cli` - Command-line interface and commands

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use crate::core::config;
pub use crate::core::driver;
pub use crate::core::matrix;
pub use crate::core::models;

/// Initializes the application's internationalization (i18n).
///
/// An explicit language wins. Otherwise the system locale is detected and matched
/// first in full (e.g., "zh-CN"), then by its language part (e.g., "en"), and
/// finally the default language ("en") is used.
pub fn init(language: Option<&str>) {
    let locale = language
        .map(str::to_string)
        .or_else(sys_locale::get_locale)
        .unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    let lang = if available_locales.contains(&locale.as_str()) {
        locale.as_str()
    } else {
        locale
            .split('-')
            .next()
            .filter(|lang_code| available_locales.contains(lang_code))
            .unwrap_or("en")
    };

    rust_i18n::set_locale(lang);
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
