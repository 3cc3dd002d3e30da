//! Vulkan runtime error types

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A required instance or device extension is not available
    #[error("Required extension not available: {name}")]
    MissingExtension {
        /// Name of the missing extension
        name: String,
    },

    /// The instance reported no physical devices
    #[error("No Vulkan physical device available")]
    NoPhysicalDevice,

    /// No queue family supports both graphics and presentation
    #[error("No queue family supports both graphics and presentation")]
    NoGraphicsPresentQueue,

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// A render pass declared more than one depth-stencil attachment
    #[error("Render pass declares {count} depth-stencil attachments, at most one is allowed")]
    MultipleDepthStencilAttachments {
        /// Number of depth-stencil attachments declared
        count: usize,
    },

    /// Framebuffer attachments do not match the render pass
    #[error("Framebuffer attachments do not match render pass: {reason}")]
    AttachmentMismatch {
        /// Description of the mismatch
        reason: String,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Shader file contained no bytecode
    #[error("Shader file is empty: {path:?}")]
    EmptyShader {
        /// Path of the shader file
        path: PathBuf,
    },

    /// Shader file could not be read
    #[error("Failed to read shader {path:?}: {source}")]
    ShaderIo {
        /// Path of the shader file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

impl VulkanError {
    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
