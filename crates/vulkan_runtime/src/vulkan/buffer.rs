//! Buffer management for vertex, index and uniform data
//!
//! Host-visible buffers are written in place. Device-local buffers are filled
//! and read back through the staging uploader owned by the device context.

use ash::{vk, Device};
use crate::vulkan::device::DeviceContext;
use crate::vulkan::memory::DeviceMemory;
use crate::vulkan::{VulkanError, VulkanResult};

/// How bytes reach a buffer's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPath {
    /// Map, copy and unmap
    Direct,
    /// Copy through a temporary host-visible buffer and a one-shot transfer
    Staged,
}

impl UploadPath {
    /// Upload path for memory with the given property flags
    pub fn for_properties(flags: vk::MemoryPropertyFlags) -> Self {
        if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            UploadPath::Direct
        } else {
            UploadPath::Staged
        }
    }
}

/// Creation parameters for a [`Buffer`]
#[derive(Debug, Clone)]
pub struct BufferSettings {
    /// Buffer usage
    pub usage: vk::BufferUsageFlags,
    /// Required memory properties
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Sharing mode
    pub sharing_mode: vk::SharingMode,
    /// Queue families for concurrent sharing
    pub queue_family_indices: Vec<u32>,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            usage: vk::BufferUsageFlags::empty(),
            memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
        }
    }
}

impl BufferSettings {
    /// Host-visible buffer with `usage`
    pub fn new(usage: vk::BufferUsageFlags) -> Self {
        Self {
            usage,
            ..Default::default()
        }
    }

    /// Device-local buffer with `usage`
    pub fn device_local(usage: vk::BufferUsageFlags) -> Self {
        Self {
            usage,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        }
    }

    /// Set required memory properties
    pub fn with_memory_properties(mut self, flags: vk::MemoryPropertyFlags) -> Self {
        self.memory_properties = flags;
        self
    }

    /// Share the buffer between queue families
    pub fn with_concurrent_sharing(mut self, queue_family_indices: Vec<u32>) -> Self {
        self.sharing_mode = vk::SharingMode::CONCURRENT;
        self.queue_family_indices = queue_family_indices;
        self
    }

    /// Usage actually requested from the driver
    ///
    /// Buffers that cannot be mapped are reachable only through transfers, so
    /// they always carry both transfer bits.
    pub fn effective_usage(&self) -> vk::BufferUsageFlags {
        match UploadPath::for_properties(self.memory_properties) {
            UploadPath::Direct => self.usage,
            UploadPath::Staged => {
                self.usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC
            }
        }
    }
}

/// Buffer wrapper owning its memory
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: DeviceMemory,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Create a buffer of `size` bytes and optionally fill it with `data`
    pub fn new(
        ctx: &DeviceContext,
        settings: &BufferSettings,
        size: vk::DeviceSize,
        data: Option<&[u8]>,
    ) -> VulkanResult<Self> {
        let buffer = Self::allocate(ctx.device().clone(), ctx.memory_properties(), settings, size)?;
        if let Some(data) = data {
            buffer.update(ctx, data)?;
        }
        Ok(buffer)
    }

    /// Host-coherent uniform buffer initialized with `value`
    pub fn uniform<T: bytemuck::Pod>(ctx: &DeviceContext, value: &T) -> VulkanResult<Self> {
        let settings = BufferSettings::new(vk::BufferUsageFlags::UNIFORM_BUFFER).with_memory_properties(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        let bytes = bytemuck::bytes_of(value);
        Self::new(ctx, &settings, bytes.len() as vk::DeviceSize, Some(bytes))
    }

    /// Create and bind a buffer without uploading anything
    pub(crate) fn allocate(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        settings: &BufferSettings,
        size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::invalid("buffer size must be non-zero"));
        }

        let usage = settings.effective_usage();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(settings.sharing_mode)
            .queue_family_indices(&settings.queue_family_indices);

        let buffer = unsafe {
            device.create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = match DeviceMemory::allocate(
            device.clone(),
            memory_properties,
            requirements,
            settings.memory_properties,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory.handle(), 0) } {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(VulkanError::Api(e));
        }

        log::debug!("Created {} byte buffer with usage {:?}", size, usage);

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            usage,
        })
    }

    /// Upload path used by [`Buffer::update`] and [`Buffer::read_back`]
    pub fn upload_path(&self) -> UploadPath {
        UploadPath::for_properties(self.memory.property_flags())
    }

    /// Replace the start of the buffer with `data`
    pub fn update(&self, ctx: &DeviceContext, data: &[u8]) -> VulkanResult<()> {
        if data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::invalid(format!(
                "update of {} bytes exceeds buffer size {}",
                data.len(),
                self.size
            )));
        }
        if data.is_empty() {
            return Ok(());
        }

        match self.upload_path() {
            UploadPath::Direct => self.memory.write(data),
            UploadPath::Staged => ctx.uploader().upload_buffer(
                ctx.queue(),
                ctx.memory_properties(),
                self.buffer,
                data,
            ),
        }
    }

    /// Write the raw bytes of a plain-old-data value
    pub fn update_pod<T: bytemuck::Pod>(&self, ctx: &DeviceContext, value: &T) -> VulkanResult<()> {
        self.update(ctx, bytemuck::bytes_of(value))
    }

    /// Copy the whole buffer back to the host
    pub fn read_back(&self, ctx: &DeviceContext) -> VulkanResult<Vec<u8>> {
        match self.upload_path() {
            UploadPath::Direct => self.memory.read(self.size as usize),
            UploadPath::Staged => ctx.uploader().read_buffer(
                ctx.queue(),
                ctx.memory_properties(),
                self.buffer,
                self.size,
            ),
        }
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub(crate) fn memory(&self) -> &DeviceMemory {
        &self.memory
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::device::testing::gpu_context;

    #[test]
    fn test_upload_path_selection() {
        assert_eq!(
            UploadPath::for_properties(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT),
            UploadPath::Direct
        );
        assert_eq!(
            UploadPath::for_properties(vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE),
            UploadPath::Direct
        );
        assert_eq!(
            UploadPath::for_properties(vk::MemoryPropertyFlags::DEVICE_LOCAL),
            UploadPath::Staged
        );
    }

    #[test]
    fn test_device_local_buffers_gain_transfer_usage() {
        let settings = BufferSettings::device_local(vk::BufferUsageFlags::UNIFORM_BUFFER);
        let usage = settings.effective_usage();
        assert!(usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));

        let settings = BufferSettings::new(vk::BufferUsageFlags::VERTEX_BUFFER);
        assert_eq!(settings.effective_usage(), vk::BufferUsageFlags::VERTEX_BUFFER);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = BufferSettings::default();
        assert_eq!(settings.memory_properties, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(settings.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert!(settings.queue_family_indices.is_empty());
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_host_visible_round_trip() {
        let ctx = gpu_context();
        let data: Vec<u8> = (0..64).collect();
        let buffer = Buffer::new(
            &ctx,
            &BufferSettings::new(vk::BufferUsageFlags::UNIFORM_BUFFER),
            64,
            Some(&data),
        )
        .unwrap();
        assert_eq!(buffer.upload_path(), UploadPath::Direct);
        assert_eq!(buffer.read_back(&ctx).unwrap(), data);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_device_local_update_is_staged() {
        let ctx = gpu_context();
        let data: Vec<u8> = (0..64).map(|i| 255 - i).collect();
        let buffer = Buffer::new(
            &ctx,
            &BufferSettings::device_local(vk::BufferUsageFlags::UNIFORM_BUFFER),
            64,
            None,
        )
        .unwrap();
        assert_eq!(buffer.upload_path(), UploadPath::Staged);

        buffer.update(&ctx, &data).unwrap();
        assert_eq!(buffer.read_back(&ctx).unwrap(), data);
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn test_oversized_update_rejected() {
        let ctx = gpu_context();
        let buffer = Buffer::new(
            &ctx,
            &BufferSettings::new(vk::BufferUsageFlags::UNIFORM_BUFFER),
            16,
            None,
        )
        .unwrap();
        assert!(matches!(
            buffer.update(&ctx, &[0u8; 17]),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }
}
