//! Composition options.
//!
//! Options are plain data with serde support so a driver can keep them in a
//! YAML file next to its templates:
//!
//! ```yaml
//! use_creation_ids: true
//! min_relationship_id: 100
//! deflate: false
//! ```

use crate::ooxml::error::{OoxmlError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs that change how elements are located, ids allocated and packages written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeOptions {
    /// Prefer an element's creation id over its display name when locating it.
    pub use_creation_ids: bool,

    /// Lowest relationship id handed out in target parts.
    pub min_relationship_id: u32,

    /// Compress entries when the target package is written.
    pub deflate: bool,

    /// Copy hyperlinks that point outside the package. When off, such
    /// references are dropped from the clone.
    pub copy_external_hyperlinks: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            use_creation_ids: true,
            min_relationship_id: 1,
            deflate: true,
            copy_external_hyperlinks: true,
        }
    }
}

impl ComposeOptions {
    /// Parse options from YAML text. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let options: Self = serde_saphyr::from_str(yaml)
            .map_err(|e| OoxmlError::Config(format!("Failed to parse options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub async fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self)
            .map_err(|e| OoxmlError::Config(format!("Failed to serialize options: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        if self.min_relationship_id == 0 {
            return Err(OoxmlError::Config(
                "min_relationship_id must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
