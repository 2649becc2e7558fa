//! Vulkan buffer: VkBuffer plus its memory allocation.

use crate::{Buffer, BufferDescriptor, BufferMemoryPreference, BufferUsage, ResourceId};
use ash::vk;
use std::sync::Arc;

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.contains(BufferUsage::DEVICE_ADDRESS) {
        flags |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
    }
    flags
}

/// Create a buffer and bind freshly allocated memory according to the
/// descriptor's memory preference.
pub fn create_buffer(
    device: Arc<ash::Device>,
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    desc: &BufferDescriptor,
    id: ResourceId,
) -> Result<VulkanBuffer, String> {
    let size = desc.size.max(1);
    let create_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(buffer_usage_to_vk(desc.usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe {
        device.create_buffer(&create_info, None).map_err(|e| e.to_string())?
    };

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let props = unsafe { instance.get_physical_device_memory_properties(physical_device) };
    let wanted = match desc.memory {
        BufferMemoryPreference::HostVisible => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
        BufferMemoryPreference::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
    };
    let memory_type_index = (0..props.memory_type_count)
        .find(|i| {
            let suitable = (requirements.memory_type_bits & (1 << i)) != 0;
            suitable && props.memory_types[*i as usize].property_flags.contains(wanted)
        })
        .ok_or("No suitable memory type for buffer")?;

    let mut flags_info = vk::MemoryAllocateFlagsInfo::default()
        .flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
    let mut allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    if desc.usage.contains(BufferUsage::DEVICE_ADDRESS) {
        allocate_info = allocate_info.push_next(&mut flags_info);
    }
    let memory = unsafe {
        device.allocate_memory(&allocate_info, None).map_err(|e| e.to_string())?
    };
    unsafe {
        device.bind_buffer_memory(buffer, memory, 0).map_err(|e| e.to_string())?;
    }

    let device_address = if desc.usage.contains(BufferUsage::DEVICE_ADDRESS) {
        let info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
        Some(unsafe { device.get_buffer_device_address(&info) })
    } else {
        None
    };

    Ok(VulkanBuffer {
        device,
        buffer,
        memory,
        size,
        usage: desc.usage,
        host_visible: matches!(desc.memory, BufferMemoryPreference::HostVisible),
        device_address,
        id,
    })
}

pub struct VulkanBuffer {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) buffer: vk::Buffer,
    pub(crate) memory: vk::DeviceMemory,
    pub(crate) size: u64,
    pub(crate) usage: BufferUsage,
    pub(crate) host_visible: bool,
    pub(crate) device_address: Option<u64>,
    pub(crate) id: ResourceId,
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}

impl Buffer for VulkanBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn usage(&self) -> BufferUsage {
        self.usage
    }
    fn host_visible(&self) -> bool {
        self.host_visible
    }
    fn device_address(&self) -> Option<u64> {
        self.device_address
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
