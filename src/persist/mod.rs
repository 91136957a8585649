//! Persistence layer for bridge configuration.
//!
//! Provides RON-based save/load for [`BridgeConfig`].

use std::fs;
use std::path::Path;

use bevy::prelude::*;

use crate::core::BridgeConfig;

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "concommand.ron";

impl BridgeConfig {
    /// Load config from a RON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))?;

        ron::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))
    }

    /// Save config to a RON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::Io(parent.display().to_string(), e.to_string()))?;
            }
        }

        let pretty = ron::ser::PrettyConfig::new().depth_limit(2);
        let contents = ron::ser::to_string_pretty(self, pretty)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e.to_string()))
    }

    /// Load config from file, returning default if it can't be read.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

/// Config persistence errors.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// IO error (path, message).
    Io(String, String),
    /// Parse error (path, message).
    Parse(String, String),
    /// Serialization error.
    Serialize(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, msg) => write!(f, "IO error for '{}': {}", path, msg),
            ConfigError::Parse(path, msg) => write!(f, "Parse error for '{}': {}", path, msg),
            ConfigError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resource tracking the config file path.
#[derive(Resource, Debug, Clone)]
pub struct ConfigPath(pub String);

impl Default for ConfigPath {
    fn default() -> Self {
        Self(DEFAULT_CONFIG_FILE.to_string())
    }
}

/// Replace the [`BridgeConfig`] resource with the file's contents, if any.
///
/// Runs before the script runtime opens.
pub fn load_config_on_startup(mut config: ResMut<BridgeConfig>, config_path: Res<ConfigPath>) {
    let path = &config_path.0;

    if !Path::new(path).exists() {
        info!("No bridge config found at '{}', using defaults", path);
        return;
    }

    match BridgeConfig::load(path) {
        Ok(loaded) => {
            info!("Loaded bridge config from '{}' ({} role)", path, loaded.role);
            *config = loaded;
        }
        Err(e) => {
            error!("Failed to load bridge config: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Role;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_file_roundtrip() {
        let mut config = BridgeConfig::for_role(Role::Client);
        config.namespace = "cc".to_string();
        config.interfaces.client_version = "VEngineClient013".to_string();

        let temp = NamedTempFile::new().unwrap();
        config.save(temp.path()).unwrap();

        let loaded = BridgeConfig::load(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_file_load_missing() {
        let result = BridgeConfig::load("nonexistent_file.ron");
        assert!(matches!(result, Err(ConfigError::Io(..))));
    }

    #[test]
    fn test_config_file_load_or_default() {
        let config = BridgeConfig::load_or_default("nonexistent_file.ron");
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_config_parse_ron() {
        let ron_content = r#"(
    role: Client,
    interfaces: (
        server_version: "VEngineServer023",
    ),
)"#;

        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(ron_content.as_bytes()).unwrap();
        temp.flush().unwrap();

        let config = BridgeConfig::load(temp.path()).unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.namespace, "concommand");
        assert_eq!(config.interfaces.server_version, "VEngineServer023");
        assert_eq!(config.interfaces.cvar_version, "VEngineCvar007");
    }

    #[test]
    fn test_config_parse_error() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"(role: Nowhere)").unwrap();
        temp.flush().unwrap();

        assert!(matches!(BridgeConfig::load(temp.path()), Err(ConfigError::Parse(..))));
    }
}
