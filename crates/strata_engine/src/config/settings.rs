//! # Application Settings
//!
//! Typed configuration for the window, the Vulkan render layer, the shader
//! pipeline and the application clock. Every struct defaults field by field,
//! so a config file only needs to name the values it changes.

use serde::{Serialize, Deserialize};
use std::path::PathBuf;

use super::{Config, ConfigError};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name used for logging
    pub name: String,
    /// Window configuration
    pub window: WindowConfig,
    /// Render layer configuration
    pub renderer: RendererConfig,
    /// Clock configuration
    pub time: TimeConfig,
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        self.window.validate()?;
        self.renderer.validate()?;
        self.time.validate()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Strata".to_string(),
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
            time: TimeConfig::default(),
        }
    }
}

impl Config for AppConfig {}

/// Window configuration
///
/// The window is created with a fixed size; resizing is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Window width in screen coordinates
    pub width: u32,
    /// Window height in screen coordinates
    pub height: u32,
}

impl WindowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Application metadata used for instance creation, validation setup and the
/// shader schematic to build the pipeline from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Whether to enable Vulkan validation layers; `None` enables them in debug builds
    pub enable_validation: Option<bool>,
    /// Instance layers that must be present when validation is enabled
    pub validation_layers: Vec<String>,
    /// Also forward verbose validation messages
    pub verbose_validation: bool,
    /// Shader configuration
    pub shaders: ShaderConfig,
}

impl RendererConfig {
    /// Resolve the validation setting against the build type
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Renderer application name cannot be empty".to_string()));
        }
        if self.validation_enabled() && self.validation_layers.is_empty() {
            return Err(ConfigError::Invalid(
                "Validation is enabled but no validation layers are listed".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Strata App".to_string(),
            enable_validation: None,
            validation_layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            verbose_validation: false,
            shaders: ShaderConfig::default(),
        }
    }
}

/// # Shader Configuration
///
/// Location of the schematic source and of the compiled stage binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Schematic file bundling the pipeline's shader stages
    pub schematic_path: PathBuf,
    /// Directory compiled SPIR-V binaries are written to and loaded from
    pub output_dir: PathBuf,
    /// Skip the annotation line that follows every stage tag
    pub skip_annotation_line: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            schematic_path: PathBuf::from("resources/shaders/triangle.shader"),
            output_dir: PathBuf::from("target/shaders"),
            skip_annotation_line: true,
        }
    }
}

/// Clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Multiplier applied to the start time and frame deltas handed to layers
    pub delta_scale: f64,
}

impl TimeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.delta_scale.is_finite() && self.delta_scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "delta_scale must be a positive finite number, got {}",
                self.delta_scale
            )));
        }
        Ok(())
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { delta_scale: 1.0 }
    }
}
