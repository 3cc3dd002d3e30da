//! # Vulkan Runtime
//!
//! Thin, ownership-checked layer over Vulkan for small rendering programs.
//!
//! ## Features
//!
//! - **Device bring-up**: instance, validation logging, surface, physical
//!   device selection and a single graphics/present queue
//! - **Resources**: buffers, images, textures and samplers with RAII cleanup
//!   and staged uploads for device-local memory
//! - **Passes**: render passes with synthesized external dependencies,
//!   framebuffers validated against their pass, and a swapchain
//! - **Scene helpers**: meshes, materials, camera and light uniforms plus
//!   forward and deferred renderers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vulkan_runtime::prelude::*;
//!
//! fn run(window: &impl PresentTarget) -> Result<(), VulkanError> {
//!     let config = RuntimeConfig::default();
//!     let ctx = RenderContext::new(window, &config)?;
//!     let mut scene = Scene::new();
//!     scene.add_mesh(Mesh::cube(&ctx)?);
//!     let mut renderers = Renderers::new(&ctx, &Camera::default(), &LightUniform::default())?;
//!     renderers.add(MeshRenderer::new(&ctx, MeshPass::Forward, ctx.main_render_pass())?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod renderers;
pub mod scene;
pub mod vulkan;

/// Common imports for runtime users
pub mod prelude {
    pub use crate::{
        assets::{load_png, load_tga, ImageData, ImageLoadError},
        config::{Config, ConfigError, RuntimeConfig},
        renderers::{GBuffer, GBufferRenderer, MeshPass, MeshRenderer, PassTarget, Renderer, Renderers},
        scene::{Camera, LightUniform, Material, Mesh, Scene},
        vulkan::{
            ACQUIRE_WAIT_STAGE, ClearFlags, ClearValues, CommandBuffer, DeviceContext, PresentTarget, RenderContext,
            Semaphore, Texture, SamplerSettings, VulkanError, VulkanResult,
        },
    };
}
