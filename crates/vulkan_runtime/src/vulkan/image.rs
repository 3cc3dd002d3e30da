//! Images, image views, samplers and textures

use ash::{vk, Device};
use crate::assets::ImageData;
use crate::vulkan::device::DeviceContext;
use crate::vulkan::memory::DeviceMemory;
use crate::vulkan::{VulkanError, VulkanResult};

/// Size in bytes of one texel of an uncompressed color or depth format
pub fn texel_size(format: vk::Format) -> Option<usize> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB => 1,
        vk::Format::R8G8_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT
        | vk::Format::D32_SFLOAT
        | vk::Format::D24_UNORM_S8_UINT => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        _ => return None,
    };
    Some(size)
}

/// Creation parameters for an [`ImageView`]
#[derive(Debug, Clone)]
pub struct ImageSettings {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Depth in texels
    pub depth: u32,
    /// Mip level count
    pub mip_levels: u32,
    /// Array layer count
    pub array_layers: u32,
    /// Texel format
    pub format: vk::Format,
    /// Image usage
    pub usage: vk::ImageUsageFlags,
    /// Aspect covered by the view
    pub aspect: vk::ImageAspectFlags,
    /// Required memory properties for owned images
    pub memory_properties: vk::MemoryPropertyFlags,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }
}

impl ImageSettings {
    /// Sampled color image of the given size and format
    pub fn new(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    /// Color render target that can also be sampled
    pub fn color_target(width: u32, height: u32, format: vk::Format) -> Self {
        Self::new(width, height, format)
            .with_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
    }

    /// Depth render target
    pub fn depth_target(width: u32, height: u32, format: vk::Format) -> Self {
        Self::new(width, height, format)
            .with_usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .with_aspect(vk::ImageAspectFlags::DEPTH)
    }

    /// Set image usage
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    /// Set the mip level count
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the view aspect
    pub fn with_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    /// 2D extent
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// 3D extent
    pub fn extent_3d(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }

    /// Byte length of tightly packed texel data for the first mip level
    pub fn data_len(&self) -> Option<usize> {
        texel_size(self.format)
            .map(|texel| texel * self.width as usize * self.height as usize * self.depth as usize)
    }

    /// Every mip level and array layer of the image
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

/// An image plus a 2D view of it
///
/// Images created by [`ImageView::new`] own their memory. Images wrapped with
/// [`ImageView::borrowed`] belong to someone else (the swapchain) and only the
/// view is destroyed on drop.
pub struct ImageView {
    device: Device,
    image: vk::Image,
    view: vk::ImageView,
    memory: Option<DeviceMemory>,
    settings: ImageSettings,
    layout: vk::ImageLayout,
}

impl ImageView {
    /// Create an image with its own memory and optionally upload `data`
    ///
    /// Uploaded images end in `SHADER_READ_ONLY_OPTIMAL`. Images without data
    /// start out `UNDEFINED`.
    pub fn new(ctx: &DeviceContext, settings: &ImageSettings, data: Option<&[u8]>) -> VulkanResult<Self> {
        let mut settings = settings.clone();
        if data.is_some() {
            settings.usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }

        let device = ctx.device().clone();
        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(settings.extent_3d())
            .mip_levels(settings.mip_levels)
            .array_layers(settings.array_layers)
            .format(settings.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(settings.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device.create_image(&image_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = DeviceMemory::allocate(
            device.clone(),
            ctx.memory_properties(),
            requirements,
            settings.memory_properties,
        )
        .and_then(|memory| unsafe {
            device.bind_image_memory(image, memory.handle(), 0)
                .map_err(VulkanError::Api)?;
            Ok(memory)
        });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = match Self::create_view(&device, image, &settings) {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut image_view = Self {
            device,
            image,
            view,
            memory: Some(memory),
            settings,
            layout: vk::ImageLayout::UNDEFINED,
        };

        if let Some(data) = data {
            ctx.uploader().upload_image(
                ctx.queue(),
                ctx.memory_properties(),
                image_view.image,
                &image_view.settings,
                data,
            )?;
            image_view.layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        }

        log::debug!(
            "Created {}x{} {:?} image",
            image_view.settings.width, image_view.settings.height, image_view.settings.format
        );
        Ok(image_view)
    }

    /// Wrap an image owned elsewhere
    pub fn borrowed(device: Device, image: vk::Image, settings: &ImageSettings) -> VulkanResult<Self> {
        let view = Self::create_view(&device, image, settings)?;
        Ok(Self {
            device,
            image,
            view,
            memory: None,
            settings: settings.clone(),
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    /// Move every level and layer of an owned image into `new_layout`
    ///
    /// Blocks until the transition has executed.
    pub fn transition(&mut self, ctx: &DeviceContext, new_layout: vk::ImageLayout) -> VulkanResult<()> {
        if !self.owns_memory() {
            return Err(VulkanError::invalid("cannot transition a borrowed image"));
        }
        if self.layout == new_layout {
            return Ok(());
        }

        let (image, old_layout, range) = (self.image, self.layout, self.settings.subresource_range());
        ctx.uploader().submit_once(ctx.queue(), |cb| {
            cb.transfer_image_layout(image, old_layout, new_layout, range);
        })?;
        self.layout = new_layout;
        Ok(())
    }

    fn create_view(device: &Device, image: vk::Image, settings: &ImageSettings) -> VulkanResult<vk::ImageView> {
        let view_create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(settings.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(settings.subresource_range());

        unsafe {
            device.create_image_view(&view_create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Whether dropping this view also destroys the image and frees memory
    pub fn owns_memory(&self) -> bool {
        self.memory.is_some()
    }

    /// Get image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Get view handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.settings.format
    }

    /// View aspect
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.settings.aspect
    }

    /// 2D extent
    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent_2d()
    }

    /// Settings the image was created with
    pub fn settings(&self) -> &ImageSettings {
        &self.settings
    }

    /// Layout the runtime last left an owned image in
    ///
    /// Borrowed images report `UNDEFINED`; their layout belongs to the owner,
    /// and render passes move owned attachments without updating it.
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            if self.memory.is_some() {
                self.device.destroy_image(self.image, None);
            }
        }
        // memory, if any, is freed when the field drops
    }
}

/// Sampler creation parameters
#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    /// Addressing mode for U, V and W
    pub address_mode: vk::SamplerAddressMode,
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Filtering between mip levels
    pub mipmap_mode: vk::SamplerMipmapMode,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            address_mode: vk::SamplerAddressMode::REPEAT,
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        }
    }
}

impl SamplerSettings {
    /// Nearest filtering with edge clamping, for reading render targets
    pub fn nearest_clamped() -> Self {
        Self {
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        }
    }
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler
    pub fn new(device: Device, settings: &SamplerSettings) -> VulkanResult<Self> {
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(settings.mag_filter)
            .min_filter(settings.min_filter)
            .mipmap_mode(settings.mipmap_mode)
            .address_mode_u(settings.address_mode)
            .address_mode_v(settings.address_mode)
            .address_mode_w(settings.address_mode)
            .mip_lod_bias(0.0)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .unnormalized_coordinates(false);

        let sampler = unsafe {
            device.create_sampler(&sampler_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, sampler })
    }

    /// Get sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    /// Descriptor info sampling `view` in `SHADER_READ_ONLY_OPTIMAL`
    pub fn descriptor_image_info(&self, view: &ImageView) -> vk::DescriptorImageInfo {
        self.descriptor_image_info_in(view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    /// Descriptor info sampling `view` in `layout`
    pub fn descriptor_image_info_in(&self, view: &ImageView, layout: vk::ImageLayout) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: view.handle(),
            image_layout: layout,
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// A sampled image: view plus sampler
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
}

impl Texture {
    /// Create a texture and upload `data` into it
    ///
    /// The image is always left in `SHADER_READ_ONLY_OPTIMAL`, with undefined
    /// contents when there is no data.
    pub fn new(
        ctx: &DeviceContext,
        image_settings: &ImageSettings,
        sampler_settings: &SamplerSettings,
        data: Option<&[u8]>,
    ) -> VulkanResult<Self> {
        let mut view = ImageView::new(ctx, image_settings, data)?;
        view.transition(ctx, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
        let sampler = Sampler::new(ctx.device().clone(), sampler_settings)?;
        Ok(Self { sampler, view })
    }

    /// Create a texture from decoded image data
    pub fn from_image_data(
        ctx: &DeviceContext,
        image: &ImageData,
        sampler_settings: &SamplerSettings,
    ) -> VulkanResult<Self> {
        let settings = ImageSettings::new(image.width, image.height, image.format);
        Self::new(ctx, &settings, sampler_settings, Some(&image.data))
    }

    /// Descriptor info for a combined image sampler binding
    pub fn descriptor_image_info(&self) -> vk::DescriptorImageInfo {
        self.sampler.descriptor_image_info_in(&self.view, self.view.layout())
    }

    /// Underlying image view
    pub fn view(&self) -> &ImageView {
        &self.view
    }

    /// Underlying sampler
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::device::testing::gpu_context;

    #[test]
    fn test_image_settings_defaults() {
        let settings = ImageSettings::default();
        let extent = settings.extent_3d();
        assert_eq!((extent.width, extent.height, extent.depth), (1, 1, 1));
        assert_eq!(settings.mip_levels, 1);
        assert_eq!(settings.array_layers, 1);
        assert_eq!(settings.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(settings.usage, vk::ImageUsageFlags::SAMPLED);
        assert_eq!(settings.aspect, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_depth_target_settings() {
        let settings = ImageSettings::depth_target(640, 480, vk::Format::D32_SFLOAT);
        assert_eq!(settings.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(settings.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert_eq!(settings.data_len(), Some(640 * 480 * 4));
    }

    #[test]
    fn test_subresource_range_covers_every_level() {
        let settings = ImageSettings::new(16, 16, vk::Format::R8G8B8A8_UNORM).with_mip_levels(5);
        let range = settings.subresource_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!((range.base_mip_level, range.level_count), (0, 5));
        assert_eq!((range.base_array_layer, range.layer_count), (0, 1));
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(texel_size(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(texel_size(vk::Format::R16G16B16A16_SFLOAT), Some(8));
        assert_eq!(texel_size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
    }

    #[test]
    fn test_sampler_defaults() {
        let settings = SamplerSettings::default();
        assert_eq!(settings.address_mode, vk::SamplerAddressMode::REPEAT);
        assert_eq!(settings.mag_filter, vk::Filter::LINEAR);
        assert_eq!(settings.min_filter, vk::Filter::LINEAR);
        assert_eq!(settings.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_owned_and_borrowed_views() {
        let ctx = gpu_context();
        let settings = ImageSettings::new(4, 4, vk::Format::R8G8B8A8_UNORM);
        let owned = ImageView::new(&ctx, &settings, Some(&[255u8; 64])).unwrap();
        assert!(owned.owns_memory());

        let borrowed = ImageView::borrowed(ctx.device().clone(), owned.image(), &settings).unwrap();
        assert!(!borrowed.owns_memory());
        drop(borrowed);
        drop(owned);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_image_layout_tracking() {
        let ctx = gpu_context();
        let settings = ImageSettings::new(4, 4, vk::Format::R8G8B8A8_UNORM);

        let empty = ImageView::new(&ctx, &settings, None).unwrap();
        assert_eq!(empty.layout(), vk::ImageLayout::UNDEFINED);

        let uploaded = ImageView::new(&ctx, &settings, Some(&[255u8; 64])).unwrap();
        assert_eq!(uploaded.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        let mut borrowed = ImageView::borrowed(ctx.device().clone(), empty.image(), &settings).unwrap();
        assert!(borrowed.transition(&ctx, vk::ImageLayout::GENERAL).is_err());
        drop(borrowed);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_texture_without_data_is_sampleable() {
        let ctx = gpu_context();
        let settings = ImageSettings::new(8, 8, vk::Format::R8G8B8A8_UNORM).with_mip_levels(3);
        let texture = Texture::new(&ctx, &settings, &SamplerSettings::default(), None).unwrap();

        assert_eq!(texture.view().layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(
            texture.descriptor_image_info().image_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }
}
