//! Staged transfers between host memory and device-local resources
//!
//! Every transfer creates a temporary host-visible resource, records a single
//! copy into a one-shot command buffer from the upload pool, submits it and
//! blocks until the queue is idle. The temporary resource and the command
//! buffer are released before returning.

use ash::{vk, Device};
use crate::vulkan::buffer::{Buffer, BufferSettings};
use crate::vulkan::commands::{single_level_range, CommandBuffer, CommandPool};
use crate::vulkan::image::ImageSettings;
use crate::vulkan::memory::DeviceMemory;
use crate::vulkan::queue::Queue;
use crate::vulkan::{VulkanError, VulkanResult};

/// Copy `height` rows of `row_bytes` each from tightly packed `src` into
/// `dst`, where consecutive rows start `row_pitch` bytes apart.
pub fn copy_rows(src: &[u8], dst: &mut [u8], row_bytes: usize, row_pitch: usize, height: usize) -> VulkanResult<()> {
    if row_bytes == 0 || height == 0 {
        return Err(VulkanError::invalid(format!(
            "cannot copy {} rows of {} bytes",
            height, row_bytes
        )));
    }
    if row_pitch < row_bytes {
        return Err(VulkanError::invalid(format!(
            "row pitch {} is smaller than row size {}",
            row_pitch, row_bytes
        )));
    }
    if src.len() < row_bytes * height {
        return Err(VulkanError::invalid(format!(
            "{} bytes of image data, {} expected",
            src.len(),
            row_bytes * height
        )));
    }
    if dst.len() < row_pitch * (height - 1) + row_bytes {
        return Err(VulkanError::invalid("staging image is too small for the data"));
    }

    for (row, chunk) in src.chunks_exact(row_bytes).take(height).enumerate() {
        let start = row * row_pitch;
        dst[start..start + row_bytes].copy_from_slice(chunk);
    }
    Ok(())
}

/// Host-visible linear image used as the source of an image upload
struct LinearImage {
    device: Device,
    image: vk::Image,
    memory: DeviceMemory,
}

impl LinearImage {
    fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        settings: &ImageSettings,
    ) -> VulkanResult<Self> {
        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(settings.extent_3d())
            .mip_levels(1)
            .array_layers(1)
            .format(settings.format)
            .tiling(vk::ImageTiling::LINEAR)
            .initial_layout(vk::ImageLayout::PREINITIALIZED)
            .usage(vk::ImageUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device.create_image(&image_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = DeviceMemory::allocate(
            device.clone(),
            memory_properties,
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .and_then(|memory| unsafe {
            device.bind_image_memory(image, memory.handle(), 0)
                .map_err(VulkanError::Api)?;
            Ok(memory)
        });

        match memory {
            Ok(memory) => Ok(Self { device, image, memory }),
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    fn write(&self, settings: &ImageSettings, data: &[u8]) -> VulkanResult<()> {
        let texel = crate::vulkan::image::texel_size(settings.format).ok_or_else(|| {
            VulkanError::invalid(format!("cannot stage texel data of format {:?}", settings.format))
        })?;
        let row_bytes = texel * settings.width as usize;

        let layout = unsafe {
            self.device.get_image_subresource_layout(
                self.image,
                vk::ImageSubresource {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    array_layer: 0,
                },
            )
        };

        let offset = layout.offset as usize;
        let row_pitch = layout.row_pitch as usize;
        let height = settings.height as usize;
        self.memory.with_mapped(|mapped| {
            let dst = mapped.get_mut(offset..).unwrap_or_default();
            copy_rows(data, dst, row_bytes, row_pitch, height)
        })?
    }
}

impl Drop for LinearImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

/// Owner of the upload command pool
pub struct StagingUploader {
    pool: CommandPool,
}

impl StagingUploader {
    /// Create the upload pool on `queue_family_index`
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool = CommandPool::with_flags(
            device,
            queue_family_index,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        Ok(Self { pool })
    }

    /// Record with `record`, submit and block until the queue is idle
    pub fn submit_once(
        &self,
        queue: &Queue,
        record: impl FnOnce(&mut CommandBuffer),
    ) -> VulkanResult<()> {
        let mut buffers = self.pool.create_command_buffers(1)?;
        let result = Self::record_and_submit(&mut buffers[0], queue, record);
        self.pool.destroy_command_buffers(buffers)?;
        result
    }

    fn record_and_submit(
        command_buffer: &mut CommandBuffer,
        queue: &Queue,
        record: impl FnOnce(&mut CommandBuffer),
    ) -> VulkanResult<()> {
        command_buffer.begin_with_flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(command_buffer);
        command_buffer.end()?;

        queue.submit(&[&*command_buffer], &[], &[])?;
        queue.wait_idle()
    }

    /// Copy `data` into the start of the device-local `dst`
    pub fn upload_buffer(
        &self,
        queue: &Queue,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        dst: vk::Buffer,
        data: &[u8],
    ) -> VulkanResult<()> {
        let staging = self.host_buffer(memory_properties, vk::BufferUsageFlags::TRANSFER_SRC, data.len() as u64)?;
        staging.memory().write(data)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: data.len() as vk::DeviceSize,
        };
        self.submit_once(queue, |cb| {
            cb.copy_buffer(staging.handle(), dst, &[region]);
        })
    }

    /// Copy the first `size` bytes of the device-local `src` back to the host
    pub fn read_buffer(
        &self,
        queue: &Queue,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        src: vk::Buffer,
        size: vk::DeviceSize,
    ) -> VulkanResult<Vec<u8>> {
        let staging = self.host_buffer(memory_properties, vk::BufferUsageFlags::TRANSFER_DST, size)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.submit_once(queue, |cb| {
            cb.copy_buffer(src, staging.handle(), &[region]);
        })?;

        staging.memory().read(size as usize)
    }

    /// Upload tightly packed texel `data` into the first mip level of `dst`
    ///
    /// `dst` may be in any layout; it is left in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_image(
        &self,
        queue: &Queue,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        dst: vk::Image,
        settings: &ImageSettings,
        data: &[u8],
    ) -> VulkanResult<()> {
        if let Some(expected) = settings.data_len() {
            if data.len() != expected {
                return Err(VulkanError::invalid(format!(
                    "{} bytes of image data for a {}x{} {:?} image, {} expected",
                    data.len(), settings.width, settings.height, settings.format, expected
                )));
            }
        }

        let staging = LinearImage::new(self.device().clone(), memory_properties, settings)?;
        staging.write(settings, data)?;

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: settings.aspect,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent: settings.extent_3d(),
        };

        // Every level and layer leaves UNDEFINED, only the first level receives data
        let dst_range = settings.subresource_range();
        self.submit_once(queue, |cb| {
            cb.transfer_image_layout(
                staging.image,
                vk::ImageLayout::PREINITIALIZED,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                single_level_range(vk::ImageAspectFlags::COLOR),
            )
            .transfer_image_layout(
                dst,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                dst_range,
            )
            .copy_image(
                staging.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
            .transfer_image_layout(
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                dst_range,
            );
        })?;

        log::debug!("Uploaded {} bytes into {}x{} image", data.len(), settings.width, settings.height);
        Ok(())
    }

    fn device(&self) -> &Device {
        self.pool.device()
    }

    fn host_buffer(
        &self,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
    ) -> VulkanResult<Buffer> {
        let settings = BufferSettings::new(usage).with_memory_properties(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        Buffer::allocate(self.device().clone(), memory_properties, &settings, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_rows_honours_pitch() {
        let src: Vec<u8> = (1..=12).collect();
        let mut dst = vec![0u8; 16];
        copy_rows(&src, &mut dst, 4, 6, 3).unwrap();
        assert_eq!(
            dst,
            vec![1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0, 9, 10, 11, 12]
        );
    }

    #[test]
    fn test_copy_rows_tightly_packed() {
        let src = [7u8; 8];
        let mut dst = [0u8; 8];
        copy_rows(&src, &mut dst, 4, 4, 2).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_copy_rows_rejects_short_input() {
        let mut dst = [0u8; 32];
        assert!(copy_rows(&[0u8; 7], &mut dst, 4, 8, 2).is_err());
    }

    #[test]
    fn test_copy_rows_rejects_small_destination() {
        let mut dst = [0u8; 10];
        assert!(copy_rows(&[0u8; 8], &mut dst, 4, 8, 2).is_err());
    }

    #[test]
    fn test_copy_rows_rejects_pitch_below_row() {
        let mut dst = [0u8; 16];
        assert!(copy_rows(&[0u8; 8], &mut dst, 4, 3, 2).is_err());
    }

    #[test]
    fn test_copy_rows_rejects_empty_image() {
        let mut dst = [0u8; 4];
        assert!(matches!(
            copy_rows(&[], &mut dst, 0, 4, 1),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(copy_rows(&[1, 2, 3, 4], &mut dst, 4, 4, 0).is_err());
        assert_eq!(dst, [0u8; 4]);
    }
}
