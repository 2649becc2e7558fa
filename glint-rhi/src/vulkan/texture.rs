//! Vulkan texture: VkImage, memory, and the default whole-image view.

use crate::{
    ResourceId, Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureTiling,
    TextureUsage,
};
use ash::vk;
use std::sync::Arc;

use super::{aspects_to_vk, format_to_vk, sample_count_to_vk};

/// Create a Vulkan texture from descriptor.
pub fn create_texture(
    device: Arc<ash::Device>,
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    descriptor: &TextureDescriptor,
    id: ResourceId,
) -> Result<VulkanTexture, String> {
    let (width, height, depth_or_layers) = descriptor.size;

    let vk_format = format_to_vk(descriptor.format);
    let usage_flags = texture_usage_to_vk(descriptor.usage, descriptor.format);
    let image_type = dimension_to_image_type(descriptor.dimension);
    let array_layers = descriptor.array_layers();
    let depth = match descriptor.dimension {
        TextureDimension::D3 => depth_or_layers.max(1),
        _ => 1,
    };
    let extent = vk::Extent3D {
        width: width.max(1),
        height: height.max(1),
        depth,
    };
    let flags = match descriptor.dimension {
        TextureDimension::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
        _ => vk::ImageCreateFlags::empty(),
    };
    let tiling = match descriptor.tiling {
        TextureTiling::Optimal => vk::ImageTiling::OPTIMAL,
        TextureTiling::Linear => vk::ImageTiling::LINEAR,
    };
    let mip_levels = descriptor.mip_level_count.max(1);

    let create_info = vk::ImageCreateInfo::default()
        .image_type(image_type)
        .format(vk_format)
        .extent(extent)
        .mip_levels(mip_levels)
        .array_layers(array_layers)
        .samples(sample_count_to_vk(descriptor.sample_count))
        .tiling(tiling)
        .usage(usage_flags)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .flags(flags);

    let image = unsafe {
        device.create_image(&create_info, None).map_err(|e| e.to_string())?
    };

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory_props = unsafe { instance.get_physical_device_memory_properties(physical_device) };
    let memory_type_index = (0..memory_props.memory_type_count)
        .find(|i| {
            let suitable = (requirements.memory_type_bits & (1 << i)) != 0;
            let device_local = memory_props.memory_types[*i as usize]
                .property_flags
                .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL);
            suitable && device_local
        })
        .ok_or("No suitable device-local memory for texture")?;

    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    let memory = unsafe {
        device.allocate_memory(&allocate_info, None).map_err(|e| e.to_string())?
    };
    unsafe {
        device.bind_image_memory(image, memory, 0).map_err(|e| e.to_string())?;
    }

    let view_create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(dimension_to_view_type(descriptor.dimension))
        .format(vk_format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspects_to_vk(descriptor.format.aspects()))
                .base_mip_level(0)
                .level_count(mip_levels)
                .base_array_layer(0)
                .layer_count(array_layers),
        );
    let view = unsafe {
        device.create_image_view(&view_create_info, None).map_err(|e| e.to_string())?
    };

    Ok(VulkanTexture {
        device,
        image,
        memory,
        view,
        format: descriptor.format,
        size: descriptor.size,
        dimension: descriptor.dimension,
        mip_level_count: mip_levels,
        sample_count: descriptor.sample_count.max(1),
        usage: descriptor.usage,
        id,
    })
}

pub struct VulkanTexture {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) image: vk::Image,
    pub(crate) memory: vk::DeviceMemory,
    pub(crate) view: vk::ImageView,
    pub(crate) format: TextureFormat,
    pub(crate) size: (u32, u32, u32),
    pub(crate) dimension: TextureDimension,
    pub(crate) mip_level_count: u32,
    pub(crate) sample_count: u32,
    pub(crate) usage: TextureUsage,
    pub(crate) id: ResourceId,
}

impl VulkanTexture {
    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for VulkanTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTexture")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("format", &self.format)
            .finish()
    }
}

impl Texture for VulkanTexture {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn format(&self) -> TextureFormat {
        self.format
    }
    fn size(&self) -> (u32, u32, u32) {
        self.size
    }
    fn dimension(&self) -> TextureDimension {
        self.dimension
    }
    fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }
    fn sample_count(&self) -> u32 {
        self.sample_count
    }
    fn usage(&self) -> TextureUsage {
        self.usage
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) fn texture_usage_to_vk(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        if format.is_depth() {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }
    flags
}

pub(crate) fn dimension_to_image_type(dim: TextureDimension) -> vk::ImageType {
    match dim {
        TextureDimension::D2 | TextureDimension::D2Array | TextureDimension::Cube => {
            vk::ImageType::TYPE_2D
        }
        TextureDimension::D3 => vk::ImageType::TYPE_3D,
    }
}

pub(crate) fn dimension_to_view_type(dim: TextureDimension) -> vk::ImageViewType {
    match dim {
        TextureDimension::D2 => vk::ImageViewType::TYPE_2D,
        TextureDimension::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
        TextureDimension::D3 => vk::ImageViewType::TYPE_3D,
        TextureDimension::Cube => vk::ImageViewType::CUBE,
    }
}
