//! Device memory type selection
//!
//! Every allocation in the runtime goes through [`find_memory_type`], which
//! scans the memory-type table cached in the physical device snapshot.

use ash::{vk, Device};
use crate::vulkan::{VulkanError, VulkanResult};

/// Find the first memory type allowed by `type_bits` whose property flags
/// contain all of `flags`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(flags)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// A device memory allocation chosen through [`find_memory_type`]
///
/// Keeps the property flags of the selected type so that mapped writes know
/// whether an explicit flush is needed.
pub struct DeviceMemory {
    device: Device,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    property_flags: vk::MemoryPropertyFlags,
}

impl DeviceMemory {
    /// Allocate memory satisfying `requirements` with the requested properties
    pub fn allocate(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let memory_type_index =
            find_memory_type(memory_properties, requirements.memory_type_bits, flags)?;
        let property_flags =
            memory_properties.memory_types[memory_type_index as usize].property_flags;

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device.allocate_memory(&allocate_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!(
            "Allocated {} bytes from memory type {} ({:?})",
            requirements.size, memory_type_index, property_flags
        );

        Ok(Self {
            device,
            memory,
            size: requirements.size,
            property_flags,
        })
    }

    /// Copy `data` into the allocation at offset 0
    ///
    /// The memory must be host visible. Non-coherent memory is flushed after
    /// the copy.
    pub fn write(&self, data: &[u8]) -> VulkanResult<()> {
        self.check_host_access(data.len())?;
        unsafe {
            let ptr = self.device
                .map_memory(self.memory, 0, data.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            let flushed = if self.is_coherent() {
                Ok(())
            } else {
                let range = self.whole_range();
                self.device.flush_mapped_memory_ranges(&[range])
            };
            self.device.unmap_memory(self.memory);
            flushed.map_err(VulkanError::Api)
        }
    }

    /// Read `len` bytes from the start of the allocation
    pub fn read(&self, len: usize) -> VulkanResult<Vec<u8>> {
        self.check_host_access(len)?;
        let mut out = vec![0u8; len];
        unsafe {
            let ptr = self.device
                .map_memory(self.memory, 0, len as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            if !self.is_coherent() {
                let range = self.whole_range();
                if let Err(e) = self.device.invalidate_mapped_memory_ranges(&[range]) {
                    self.device.unmap_memory(self.memory);
                    return Err(VulkanError::Api(e));
                }
            }
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), len);
            self.device.unmap_memory(self.memory);
        }
        Ok(out)
    }

    /// Map the allocation and hand the mapped bytes to `f`
    pub fn with_mapped<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> VulkanResult<R> {
        if !self.is_host_visible() {
            return Err(VulkanError::invalid("memory is not host visible"));
        }
        unsafe {
            let ptr = self.device
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            let bytes = std::slice::from_raw_parts_mut(ptr.cast::<u8>(), self.size as usize);
            let result = f(bytes);
            let flushed = if self.is_coherent() {
                Ok(())
            } else {
                let range = self.whole_range();
                self.device.flush_mapped_memory_ranges(&[range])
            };
            self.device.unmap_memory(self.memory);
            flushed.map_err(VulkanError::Api)?;
            Ok(result)
        }
    }

    /// Get memory handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Allocation size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Property flags of the selected memory type
    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    /// Whether the host can map this allocation
    pub fn is_host_visible(&self) -> bool {
        self.property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    fn is_coherent(&self) -> bool {
        self.property_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    fn whole_range(&self) -> vk::MappedMemoryRange {
        vk::MappedMemoryRange::builder()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .build()
    }

    fn check_host_access(&self, len: usize) -> VulkanResult<()> {
        if !self.is_host_visible() {
            return Err(VulkanError::invalid("memory is not host visible"));
        }
        if len as vk::DeviceSize > self.size {
            return Err(VulkanError::invalid(format!(
                "access of {} bytes exceeds allocation of {} bytes",
                len, self.size
            )));
        }
        Ok(())
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        unsafe {
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        props
    }

    fn typical_table() -> vk::PhysicalDeviceMemoryProperties {
        memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ])
    }

    #[test]
    fn test_selects_first_matching_type() {
        let props = typical_table();
        let index = find_memory_type(&props, 0b1111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_respects_type_bits() {
        let props = typical_table();
        let index = find_memory_type(&props, 0b1100, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 2);

        let index = find_memory_type(&props, 0b1000, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 3);
    }

    #[test]
    fn test_selected_type_is_superset_of_request() {
        let props = typical_table();
        let requests = [
            vk::MemoryPropertyFlags::empty(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ];
        for type_bits in 0u32..16 {
            for flags in requests {
                match find_memory_type(&props, type_bits, flags) {
                    Ok(index) => {
                        assert_ne!(type_bits & (1 << index), 0);
                        assert!(props.memory_types[index as usize].property_flags.contains(flags));
                    }
                    Err(VulkanError::NoSuitableMemoryType) => {
                        let any = (0..4).any(|i| {
                            type_bits & (1 << i) != 0
                                && props.memory_types[i].property_flags.contains(flags)
                        });
                        assert!(!any, "selection failed although type exists");
                    }
                    Err(e) => panic!("unexpected error {e}"),
                }
            }
        }
    }

    #[test]
    fn test_no_suitable_type() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }

    #[test]
    fn test_ignores_types_beyond_count() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        let result = find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType)));
    }
}
