//! Shader modules, the pipeline cache and graphics pipeline creation

use ash::{vk, Device};
use std::ffi::CStr;
use std::path::Path;
use crate::vulkan::render_pass::RenderPass;
use crate::vulkan::{VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Copy SPIR-V bytes into native-endian 32-bit words
pub fn spirv_words(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(VulkanError::invalid(format!(
            "SPIR-V length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|word| u32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

/// Read SPIR-V bytecode from `path`, rejecting empty files
pub fn read_shader_bytes(path: &Path) -> VulkanResult<Vec<u8>> {
    let bytes = std::fs::read(path).map_err(|source| VulkanError::ShaderIo {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(VulkanError::EmptyShader {
            path: path.to_path_buf(),
        });
    }
    Ok(bytes)
}

/// SPIR-V shader module wrapper with automatic resource management
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: &Device, bytes: &[u8]) -> VulkanResult<Self> {
        if bytes.is_empty() {
            return Err(VulkanError::invalid("SPIR-V bytecode is empty"));
        }
        let words = spirv_words(bytes)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe {
            device.create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Created shader module from {} bytes", bytes.len());
        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Load shader from SPIR-V file
    pub fn from_file(device: &Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let bytes = read_shader_bytes(path.as_ref())?;
        Self::from_bytes(device, &bytes)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// In-memory pipeline cache shared by every pipeline of a context
pub struct PipelineCache {
    device: Device,
    cache: vk::PipelineCache,
}

impl PipelineCache {
    /// Create an empty cache
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::PipelineCacheCreateInfo::builder();
        let cache = unsafe {
            device.create_pipeline_cache(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, cache })
    }

    /// Get cache handle
    pub fn handle(&self) -> vk::PipelineCache {
        self.cache
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_cache(self.cache, None);
        }
    }
}

/// Graphics pipeline and its layout with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Color blend state for `count` attachments with blending disabled
pub fn opaque_blend_attachments(count: usize) -> Vec<vk::PipelineColorBlendAttachmentState> {
    vec![
        vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        };
        count
    ]
}

/// Builder for single-subpass graphics pipelines
///
/// Viewport and scissor are always dynamic. The number of color blend states
/// follows the render pass the pipeline is built for.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: &'a ShaderModule,
    fragment_shader: &'a ShaderModule,
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    depth_test: bool,
    cull_mode: vk::CullModeFlags,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Start a pipeline with the given shaders
    pub fn new(vertex_shader: &'a ShaderModule, fragment_shader: &'a ShaderModule) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            bindings: Vec::new(),
            attributes: Vec::new(),
            set_layouts: Vec::new(),
            depth_test: true,
            cull_mode: vk::CullModeFlags::BACK,
        }
    }

    /// Set the vertex input layout
    pub fn vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.bindings = vec![binding];
        self.attributes = attributes.to_vec();
        self
    }

    /// Set the descriptor set layouts, in set-index order
    pub fn set_layouts(mut self, layouts: &[vk::DescriptorSetLayout]) -> Self {
        self.set_layouts = layouts.to_vec();
        self
    }

    /// Enable or disable depth test and write
    pub fn depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    /// Set the face culling mode
    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Create the pipeline layout and pipeline for subpass 0 of `render_pass`
    pub fn build(
        self,
        device: &Device,
        render_pass: &RenderPass,
        cache: &PipelineCache,
    ) -> VulkanResult<GraphicsPipeline> {
        let shader_stages = [
            self.vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            self.fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_test)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = opaque_blend_attachments(render_pass.color_attachment_count());
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&self.set_layouts);
        let layout = unsafe {
            device.create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(cache.handle(), &[pipeline_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        log::debug!(
            "Created graphics pipeline with {} set layout(s) and {} color attachment(s)",
            self.set_layouts.len(),
            color_blend_attachments.len()
        );

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline,
            layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_words_preserve_bytes() {
        let magic = 0x0723_0203u32.to_ne_bytes();
        let version = 0x0001_0000u32.to_ne_bytes();
        let bytes: Vec<u8> = magic.iter().chain(version.iter()).copied().collect();
        assert_eq!(spirv_words(&bytes).unwrap(), vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_spirv_words_rejects_truncated_input() {
        assert!(matches!(
            spirv_words(&[0x03, 0x02, 0x23]),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_opaque_blend_states() {
        let states = opaque_blend_attachments(3);
        assert_eq!(states.len(), 3);
        assert!(states
            .iter()
            .all(|s| s.blend_enable == vk::FALSE && s.color_write_mask == vk::ColorComponentFlags::RGBA));
    }

    #[test]
    fn test_missing_shader_file() {
        let path = std::env::temp_dir().join("vulkan_runtime_missing_shader.spv");
        let _ = std::fs::remove_file(&path);
        match read_shader_bytes(&path) {
            Err(VulkanError::ShaderIo { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected io error, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_empty_shader_file() {
        let path = std::env::temp_dir().join(format!("vulkan_runtime_empty_{}.spv", std::process::id()));
        std::fs::write(&path, []).unwrap();
        let result = read_shader_bytes(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(VulkanError::EmptyShader { .. })));
    }
}
