//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("caps.base_path must start and end with '/', got '{0}'")]
    InvalidBasePath(String),
    #[error("caps.base_path must not contain '*' or ':', got '{0}'")]
    BasePathWildcard(String),
    #[error("caps.key_file is required")]
    MissingKeyFile,
    #[error("caps.key_file does not exist: {0}")]
    KeyFileNotFound(String),
}

/// Check a base path without touching the filesystem.
pub fn check_base_path(base_path: &str) -> Result<(), ValidationError> {
    if !base_path.starts_with('/') || !base_path.ends_with('/') {
        return Err(ValidationError::InvalidBasePath(base_path.to_string()));
    }
    // axum route syntax
    if base_path.contains('*') || base_path.contains(':') {
        return Err(ValidationError::BasePathWildcard(base_path.to_string()));
    }
    Ok(())
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = check_base_path(&config.caps.base_path) {
        errors.push(e);
    }

    if config.caps.key_file.is_empty() {
        errors.push(ValidationError::MissingKeyFile);
    } else if !Path::new(&config.caps.key_file).exists() {
        errors.push(ValidationError::KeyFileNotFound(
            config.caps.key_file.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
