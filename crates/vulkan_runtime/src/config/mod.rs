//! Runtime configuration
//!
//! Configuration types load from and save to TOML or RON, chosen by file
//! extension.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format implied by the extension of `path`
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("ron") => Ok(ConfigFormat::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Parse configuration text in `format`
    fn from_str_as(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Serialize configuration as `format`
    fn to_string_as(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }

    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;
        Self::from_str_as(&contents, format)
    }

    /// Load configuration from file, or use defaults when the file is absent
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_string_as(ConfigFormat::from_path(path)?)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Capacity of the shared descriptor pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorPoolSizes {
    /// Uniform buffer descriptors
    pub uniform_buffers: u32,
    /// Combined image sampler descriptors
    pub combined_image_samplers: u32,
    /// Maximum number of sets
    pub max_sets: u32,
}

impl Default for DescriptorPoolSizes {
    fn default() -> Self {
        Self {
            uniform_buffers: 16,
            combined_image_samplers: 16,
            max_sets: 8,
        }
    }
}

/// Settings used to bring up a device and its render context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Application name reported to the driver and used as window title
    pub app_name: String,
    /// Initial framebuffer width
    pub width: u32,
    /// Initial framebuffer height
    pub height: u32,
    /// Enable the Khronos validation layer when installed
    pub enable_validation: bool,
    /// Index into the enumerated physical devices
    pub physical_device_index: usize,
    /// Shared descriptor pool capacity
    pub descriptor_pool: DescriptorPoolSizes,
    /// Directory holding compiled SPIR-V shaders
    pub shader_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            app_name: "vulkan_runtime".to_string(),
            width: 800,
            height: 600,
            enable_validation: cfg!(debug_assertions),
            physical_device_index: 0,
            descriptor_pool: DescriptorPoolSizes::default(),
            shader_dir: PathBuf::from("target/shaders"),
        }
    }
}

impl Config for RuntimeConfig {}

impl RuntimeConfig {
    /// Set the application name
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the framebuffer size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable validation
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Select a physical device by enumeration index
    pub fn with_physical_device_index(mut self, index: usize) -> Self {
        self.physical_device_index = index;
        self
    }

    /// Set the descriptor pool capacity
    pub fn with_descriptor_pool(mut self, sizes: DescriptorPoolSizes) -> Self {
        self.descriptor_pool = sizes;
        self
    }

    /// Set the shader directory
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Path of a compiled shader inside the shader directory
    pub fn shader_path(&self, name: &str) -> PathBuf {
        self.shader_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("samples.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("dir/app.ron")).unwrap(), ConfigFormat::Ron);
        assert!(matches!(
            ConfigFormat::from_path(Path::new("settings.json")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(ConfigFormat::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_str_as(
            "app_name = \"cube\"\nwidth = 1280\n\n[descriptor_pool]\nmax_sets = 12\n",
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.app_name, "cube");
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 600);
        assert_eq!(config.descriptor_pool.max_sets, 12);
        assert_eq!(config.descriptor_pool.uniform_buffers, 16);
    }

    #[test]
    fn test_ron_config() {
        let config = RuntimeConfig::from_str_as(
            "(physical_device_index: 1, enable_validation: false)",
            ConfigFormat::Ron,
        )
        .unwrap();
        assert_eq!(config.physical_device_index, 1);
        assert!(!config.enable_validation);
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            RuntimeConfig::from_str_as("width = \"wide\"", ConfigFormat::Toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_builder_methods() {
        let config = RuntimeConfig::default()
            .with_app_name("deferred")
            .with_size(1024, 768)
            .with_validation(true)
            .with_physical_device_index(2)
            .with_shader_dir("shaders");
        assert_eq!(config.app_name, "deferred");
        assert_eq!((config.width, config.height), (1024, 768));
        assert!(config.enable_validation);
        assert_eq!(config.physical_device_index, 2);
        assert_eq!(config.shader_path("cube.vert.spv"), PathBuf::from("shaders/cube.vert.spv"));
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("vulkan_runtime_config_{}.toml", std::process::id()));
        let config = RuntimeConfig::default().with_size(320, 240);
        config.save_to_file(&path).unwrap();
        let loaded = RuntimeConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("vulkan_runtime_config_absent.toml");
        let _ = std::fs::remove_file(&path);
        assert_eq!(RuntimeConfig::load_or_default(&path).unwrap(), RuntimeConfig::default());
    }
}
