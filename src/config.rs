// Configuration - load settings from config.toml
//
// Provides sensible defaults if the config file is missing, a section is
// missing, or a value fails to parse.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Lumen".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Backend name handed to the factory; validated before use.
    pub backend: String,
    /// RGBA clear color in the 0-1 range, applied by the empty render pass.
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: "vulkan".to_string(),
            clear_color: [0.468, 0.177, 0.741, 1.0],
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.backend, "vulkan");
        assert!(config.debug.validation_layers);
    }

    #[test]
    fn partial_file_fills_missing_sections_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            title = "Demo"
            width = 640
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Demo");
        assert_eq!(config.window.width, 640);
        // Unset fields and sections keep their defaults.
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.backend, "vulkan");
        assert!(config.debug.show_fps);
    }

    #[test]
    fn clear_color_parses_as_rgba() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            backend = "vulkan"
            clear_color = [0.0, 0.5, 1.0, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.clear_color, [0.0, 0.5, 1.0, 1.0]);
    }
}
