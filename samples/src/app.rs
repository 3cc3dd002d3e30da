//! Setup shared by the samples: configuration, errors and the cube material

use std::path::Path;
use thiserror::Error;
use vulkan_runtime::assets::{load_tga, ImageData, ImageLoadError};
use vulkan_runtime::config::{Config, ConfigError, RuntimeConfig};
use vulkan_runtime::scene::Material;
use vulkan_runtime::vulkan::{RenderContext, SamplerSettings, Texture, VulkanError};

use crate::window::WindowError;

/// Configuration file read from the working directory
pub const CONFIG_PATH: &str = "samples.toml";

/// Albedo texture of the cube
pub const CHECKER_PATH: &str = "samples/assets/checker.tga";

/// Any error that ends a sample
#[derive(Error, Debug)]
pub enum SampleError {
    /// Window or GLFW failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Vulkan failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Load `samples.toml`, falling back to defaults when it does not exist
pub fn load_config(app_name: &str) -> Result<RuntimeConfig, ConfigError> {
    let config = RuntimeConfig::load_or_default(CONFIG_PATH)?;
    Ok(config.with_app_name(app_name))
}

/// Load the checker texture, or generate one when the file is missing or unreadable
pub fn load_albedo(path: impl AsRef<Path>) -> ImageData {
    let path = path.as_ref();
    match load_tga(path) {
        Ok(image) => image,
        Err(ImageLoadError::Io { .. }) => {
            log::info!("{} not found, using a generated checkerboard", path.display());
            checker()
        }
        Err(e) => {
            log::warn!("Failed to load {}: {}, using a generated checkerboard", path.display(), e);
            checker()
        }
    }
}

fn checker() -> ImageData {
    ImageData::checkerboard(256, 32, [255, 255, 255, 255], [40, 40, 40, 255])
}

/// White material sampling the checker texture
///
/// The texture is returned alongside the material and must outlive it.
pub fn checker_material(ctx: &RenderContext) -> Result<(Texture, Material), VulkanError> {
    let image = load_albedo(CHECKER_PATH);
    let texture = Texture::from_image_data(ctx.device(), &image, &SamplerSettings::default())?;
    let mut material = Material::new(ctx, [1.0, 1.0, 1.0, 1.0])?;
    material.set_albedo(&texture);
    Ok((texture, material))
}
