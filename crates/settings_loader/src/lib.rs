//! # Settings Loader
//!
//! Loads the statement parser settings (`settings.json`): reconciliation
//! tolerances, duplicate-detection thresholds, extra categorisation rules and
//! the two-digit year pivot. Every field is optional; anything missing keeps
//! its built-in default.
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use settings_loader;
//! use std::path::PathBuf;
//!
//! // Load settings from a specific path
//! let settings = settings_loader::load_settings("config/my_settings.json")?;
//!
//! // Load optional settings (returns None if no path is given)
//! let path = Some(PathBuf::from("settings.json"));
//! let settings = settings_loader::load_optional_settings(path.as_ref())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use models::ParserSettings;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Loads settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<ParserSettings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: ParserSettings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    validate(&settings).with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(settings)
}

/// Loads settings from the default location (settings.json in the current directory)
pub fn load_default_settings() -> Result<ParserSettings> {
    load_settings(DEFAULT_SETTINGS_FILE)
}

/// Loads settings from an optional path, returning None if no path is provided
pub fn load_optional_settings(path: Option<&PathBuf>) -> Result<Option<ParserSettings>> {
    match path {
        Some(settings_path) => Ok(Some(load_settings(settings_path)?)),
        None => Ok(None),
    }
}

/// Tries the provided path, then the default location, then built-in defaults.
pub fn load_settings_with_fallback(path: Option<&PathBuf>) -> Result<ParserSettings> {
    if let Some(settings_path) = path {
        match load_settings(settings_path) {
            Ok(settings) => return Ok(settings),
            Err(err) => {
                tracing::warn!("Ignoring settings at {}: {:#}", settings_path.display(), err);
            }
        }
    }

    if settings_file_exists(DEFAULT_SETTINGS_FILE) {
        return load_default_settings();
    }

    tracing::debug!("No settings file found, using built-in defaults");
    Ok(ParserSettings::default())
}

/// Checks if a settings file exists at the given path
pub fn settings_file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists() && path.as_ref().is_file()
}

fn validate(settings: &ParserSettings) -> Result<()> {
    let threshold = settings.duplicates.similarity_threshold;
    ensure!(
        (0.0..=1.0).contains(&threshold),
        "duplicates.similarity_threshold must be within 0..=1, got {}",
        threshold
    );
    ensure!(
        !settings.reconcile.absolute_tolerance.is_sign_negative(),
        "reconcile.absolute_tolerance must not be negative"
    );
    ensure!(
        settings.duplicates.date_window_days >= 0,
        "duplicates.date_window_days must not be negative"
    );
    ensure!(
        settings.two_digit_year_pivot < 100,
        "two_digit_year_pivot must be below 100"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let file = write_temp(
            r#"{
                "duplicates": {"similarity_threshold": 0.9},
                "rules": {"extra_merchants": ["chaayos"]}
            }"#,
        );
        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.duplicates.similarity_threshold, 0.9);
        assert_eq!(settings.duplicates.min_token_len, 3);
        assert_eq!(settings.reconcile.max_corrections, 50);
        assert_eq!(settings.rules.extra_merchants, vec!["chaayos".to_string()]);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let file = write_temp(r#"{"duplicates": {"similarity_threshold": 1.5}}"#);
        let err = load_settings(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("similarity_threshold"));
    }

    #[test]
    fn test_optional_none() {
        assert!(load_optional_settings(None).unwrap().is_none());
    }

    #[test]
    fn test_fallback_ignores_broken_file() {
        let file = write_temp("not json");
        let path = file.path().to_path_buf();
        let settings = load_settings_with_fallback(Some(&path)).unwrap();
        assert_eq!(settings.reconcile.max_corrections, 50);
    }
}
