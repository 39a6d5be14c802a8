//! Engine configuration loaded from YAML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the unpacker treats an entity version outside its factory's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    /// Reject the stream.
    #[default]
    Strict,
    /// Log a warning and hand the bundle to the factory anyway.
    Lenient,
}

/// Settings shared by packers and unpackers.
///
/// Every field has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Label written into the stream header.
    pub label: String,

    /// Emit a `~created=<millis>L;` metadata line after the header.
    pub stamp_created: bool,

    /// Emit a `# pass N` comment before each packing pass.
    pub annotate_passes: bool,

    pub version_policy: VersionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: "graphpack".to_string(),
            stamp_created: false,
            annotate_passes: false,
            version_policy: VersionPolicy::Strict,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Arguments
    /// * `path` - Path to the YAML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or is not valid YAML
    ///
    /// # Example
    /// ```ignore
    /// use graphpack::EngineConfig;
    ///
    /// let config = EngineConfig::load_from_file("graphpack.yaml")?;
    /// println!("Header label: {}", config.label);
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}
