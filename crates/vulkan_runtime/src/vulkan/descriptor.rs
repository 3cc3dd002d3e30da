//! Descriptor pools, set layouts and descriptor sets
//!
//! The runtime uses a fixed table of set layouts ([`DescriptorSetLayouts`])
//! shared by every pipeline. Sets are allocated from a pool created with
//! `FREE_DESCRIPTOR_SET` so that each [`DescriptorSet`] can release itself.

use ash::{vk, Device};
use crate::config::DescriptorPoolSizes;
use crate::vulkan::buffer::Buffer;
use crate::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Bindings declared so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pool sizes requested from the driver for `sizes`
pub fn pool_sizes(sizes: &DescriptorPoolSizes) -> Vec<vk::DescriptorPoolSize> {
    [
        (vk::DescriptorType::UNIFORM_BUFFER, sizes.uniform_buffers),
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, sizes.combined_image_samplers),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
    .collect()
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool whose sets can be freed individually
    pub fn new(device: Device, sizes: &DescriptorPoolSizes) -> VulkanResult<Self> {
        let pool_sizes = pool_sizes(sizes);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(sizes.max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::Api)?;

        log::debug!(
            "Created descriptor pool: {} sets, {} uniform buffers, {} image samplers",
            sizes.max_sets, sizes.uniform_buffers, sizes.combined_image_samplers
        );

        Ok(Self { pool, device })
    }

    /// Allocate one set with `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> VulkanResult<DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(VulkanError::Api)?;
        let set = sets
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::invalid("driver returned no descriptor set"))?;

        Ok(DescriptorSet {
            device: self.device.clone(),
            pool: self.pool,
            set,
        })
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// A descriptor set returned to its pool on drop
///
/// Must be dropped before the pool it was allocated from.
pub struct DescriptorSet {
    device: Device,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

impl DescriptorSet {
    /// Get the descriptor set handle
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Start a batch of writes into this set
    pub fn writer(&self) -> DescriptorWriter {
        DescriptorWriter::new(self.set)
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.free_descriptor_sets(self.pool, &[self.set]) {
                log::warn!("Failed to free descriptor set: {:?}", e);
            }
        }
    }
}

enum PendingWrite {
    Buffer(u32, vk::DescriptorBufferInfo),
    Image(u32, vk::DescriptorImageInfo),
}

/// Batched descriptor updates for one set
///
/// Resource infos are kept until [`DescriptorWriter::update`] so that the
/// native write structures never point into a growing vector.
pub struct DescriptorWriter {
    set: vk::DescriptorSet,
    pending: Vec<PendingWrite>,
}

impl DescriptorWriter {
    /// Writer targeting `set`
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            pending: Vec::new(),
        }
    }

    /// Bind the whole of `buffer` as a uniform buffer
    pub fn buffer(mut self, binding: u32, buffer: &Buffer) -> Self {
        self.pending.push(PendingWrite::Buffer(binding, buffer.descriptor_info()));
        self
    }

    /// Bind a combined image sampler
    pub fn image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.pending.push(PendingWrite::Image(binding, info));
        self
    }

    /// Number of writes queued
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no writes are queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every queued write
    pub fn update(self, device: &Device) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|pending| match pending {
                PendingWrite::Buffer(binding, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build(),
                PendingWrite::Image(binding, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
                    .build(),
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Number of G-buffer attachments (color layers plus depth) sampled by the lighting pass
pub const GBUFFER_SAMPLED_LAYERS: u32 = 3;

/// The fixed set layouts shared by all pipelines
pub struct DescriptorSetLayouts {
    /// Camera uniform
    pub camera: DescriptorSetLayout,
    /// Per-mesh uniform
    pub mesh: DescriptorSetLayout,
    /// Material uniform and albedo texture
    pub material: DescriptorSetLayout,
    /// Light uniform
    pub light: DescriptorSetLayout,
    /// Single input texture of a post effect
    pub posteffect: DescriptorSetLayout,
    /// G-buffer layers and depth read by the lighting pass
    pub gbuffer: DescriptorSetLayout,
}

impl DescriptorSetLayouts {
    /// Create every layout of the table
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let vertex_fragment = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;

        let camera = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vertex_fragment)
            .build(device)?;
        let mesh = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(device)?;
        let material = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;
        let light = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vertex_fragment)
            .build(device)?;
        let posteffect = DescriptorSetLayoutBuilder::new()
            .add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;

        let mut gbuffer = DescriptorSetLayoutBuilder::new();
        for binding in 0..GBUFFER_SAMPLED_LAYERS {
            gbuffer = gbuffer.add_combined_image_sampler(binding, vk::ShaderStageFlags::FRAGMENT);
        }
        let gbuffer = gbuffer.build(device)?;

        Ok(Self {
            camera,
            mesh,
            material,
            light,
            posteffect,
            gbuffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_builder_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT);
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(bindings.iter().all(|b| b.descriptor_count == 1));
    }

    #[test]
    fn test_default_pool_sizes() {
        let sizes = pool_sizes(&DescriptorPoolSizes::default());
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 16);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 16);
    }

    #[test]
    fn test_zero_sized_pools_are_skipped() {
        let sizes = DescriptorPoolSizes {
            uniform_buffers: 4,
            combined_image_samplers: 0,
            max_sets: 2,
        };
        let pool = pool_sizes(&sizes);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn test_writer_queues_writes() {
        let writer = DescriptorWriter::new(vk::DescriptorSet::null()).image(
            0,
            vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        );
        assert_eq!(writer.len(), 1);
        assert!(DescriptorWriter::new(vk::DescriptorSet::null()).is_empty());
    }
}
