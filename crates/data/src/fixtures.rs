//! JSON fixture loading for offline runs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::memory::Dataset;

/// Reads a [`Dataset`] from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid dataset.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
    parse_dataset(&raw).with_context(|| format!("Invalid fixture: {}", path.display()))
}

/// Parses a [`Dataset`] from JSON text.
///
/// # Errors
/// Returns an error if the text is not a valid dataset.
pub fn parse_dataset(raw: &str) -> Result<Dataset> {
    let dataset: Dataset = serde_json::from_str(raw)?;
    Ok(dataset)
}
