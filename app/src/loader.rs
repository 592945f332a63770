//! Loading of settings and profile databases from disk.

use anyhow::{Context, Result};
pub use bc_config::de::parse_document;
use bc_config::{BuildSettings, MemoryStore};
use std::path::Path;

/// Load build settings; a missing path yields the defaults.
///
/// `BC_CORE_LOG_LEVEL` overrides the core log level of the document.
pub fn load_settings(path: Option<&Path>) -> Result<BuildSettings> {
    let mut settings = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read settings {}", path.display()))?;
            parse_document(&text).with_context(|| format!("parse settings {}", path.display()))?
        }
        None => BuildSettings::default(),
    };
    if let Ok(level) = std::env::var("BC_CORE_LOG_LEVEL") {
        if !level.trim().is_empty() {
            settings.log_level = level.trim().to_string();
        }
    }
    Ok(settings)
}

pub fn load_store(path: &Path) -> Result<MemoryStore> {
    MemoryStore::from_path(path)
}
