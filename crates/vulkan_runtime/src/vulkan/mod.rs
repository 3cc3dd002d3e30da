//! Vulkan resource and command lifecycle
//!
//! Every wrapper owns exactly one native object (or one object plus its
//! memory) and destroys it on drop. Aggregates declare their fields in
//! reverse creation order so teardown follows from drop order.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod queue;
pub mod render_pass;
pub mod staging;
pub mod swapchain;
pub mod sync;

pub use buffer::{Buffer, BufferSettings, UploadPath};
pub use commands::{ClearFlags, ClearValues, CommandBuffer, CommandBufferState, CommandPool};
pub use context::RenderContext;
pub use descriptor::{
    DescriptorPool, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetLayouts,
    DescriptorWriter,
};
pub use device::DeviceContext;
pub use error::{VulkanError, VulkanResult};
pub use framebuffer::Framebuffer;
pub use image::{ImageSettings, ImageView, Sampler, SamplerSettings, Texture};
pub use instance::PresentTarget;
pub use memory::{find_memory_type, DeviceMemory};
pub use physical_device::PhysicalDeviceInfo;
pub use pipeline::{GraphicsPipeline, GraphicsPipelineBuilder, PipelineCache, ShaderModule};
pub use queue::{Queue, ACQUIRE_WAIT_STAGE};
pub use render_pass::{AttachmentDesc, AttachmentKind, RenderPass, RenderPassSettings};
pub use staging::StagingUploader;
pub use swapchain::Swapchain;
pub use sync::{Fence, Semaphore};
