//! Vulkan swapchain and surface support (feature "window").

use crate::{
    ResourceId, Semaphore, Swapchain, Texture, TextureDimension, TextureFormat, TextureUsage,
};
use ash::khr::swapchain::Device as SwapchainDevice;
use ash::vk;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{format_to_vk, SurfaceState, VulkanSemaphore};

/// Swapchain image wrapper: implements Texture for use as color attachment. Does not own the VkImage (swapchain does).
pub struct VulkanSwapchainImage {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    pub(crate) format: TextureFormat,
    pub(crate) extent: (u32, u32),
    pub(crate) id: ResourceId,
}

impl VulkanSwapchainImage {
    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for VulkanSwapchainImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            // Do not destroy image - owned by swapchain
        }
    }
}

impl std::fmt::Debug for VulkanSwapchainImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSwapchainImage")
            .field("id", &self.id)
            .field("extent", &self.extent)
            .finish()
    }
}

impl Texture for VulkanSwapchainImage {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn format(&self) -> TextureFormat {
        self.format
    }
    fn size(&self) -> (u32, u32, u32) {
        (self.extent.0, self.extent.1, 1)
    }
    fn dimension(&self) -> TextureDimension {
        TextureDimension::D2
    }
    fn mip_level_count(&self) -> u32 {
        1
    }
    fn sample_count(&self) -> u32 {
        1
    }
    fn usage(&self) -> TextureUsage {
        TextureUsage::RENDER_ATTACHMENT
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Create a swapchain against the device's surface, preferring mailbox
/// presentation and the surface's first reported format.
pub(crate) fn create_swapchain(
    device: Arc<ash::Device>,
    state: &SurfaceState,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,
    extent: (u32, u32),
    old_swapchain: Option<&dyn Swapchain>,
    next_id: &AtomicU64,
) -> Result<Box<dyn Swapchain>, String> {
    let old_vk = old_swapchain.and_then(|s| {
        s.as_any()
            .downcast_ref::<VulkanSwapchain>()
            .map(|vs| vs.swapchain)
    });
    let caps = unsafe {
        state
            .surface_loader
            .get_physical_device_surface_capabilities(physical_device, state.surface)
            .map_err(|e| format!("get_physical_device_surface_capabilities: {:?}", e))?
    };
    let (width, height) = extent;
    let extent_vk = vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    };
    let image_count = (caps.min_image_count + 1)
        .min(caps.max_image_count)
        .max(caps.min_image_count);
    let formats = unsafe {
        state
            .surface_loader
            .get_physical_device_surface_formats(physical_device, state.surface)
            .map_err(|e| format!("get_physical_device_surface_formats: {:?}", e))?
    };
    let format = formats.first().copied().unwrap_or_default();
    let present_modes = unsafe {
        state
            .surface_loader
            .get_physical_device_surface_present_modes(physical_device, state.surface)
            .map_err(|e| format!("get_physical_device_surface_present_modes: {:?}", e))?
    };
    let present_mode = present_modes
        .iter()
        .copied()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO);
    let mut create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(state.surface)
        .min_image_count(image_count)
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent_vk)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true);
    if let Some(old) = old_vk {
        create_info.old_swapchain = old;
    }
    let swapchain = unsafe {
        state
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| format!("create_swapchain: {:?}", e))?
    };
    let rhi_format = if format.format == vk::Format::B8G8R8A8_UNORM {
        TextureFormat::Bgra8Unorm
    } else {
        TextureFormat::Rgba8Unorm
    };
    let vulkan_swapchain = VulkanSwapchain::new(
        device,
        state.swapchain_loader.clone(),
        swapchain,
        queue,
        (extent_vk.width, extent_vk.height),
        rhi_format,
        next_id,
    )?;
    Ok(Box::new(vulkan_swapchain))
}

pub struct VulkanSwapchain {
    swapchain_loader: SwapchainDevice,
    pub(crate) swapchain: vk::SwapchainKHR,
    images: Vec<Arc<VulkanSwapchainImage>>,
    queue: vk::Queue,
    extent: (u32, u32),
    format: TextureFormat,
}

impl VulkanSwapchain {
    pub fn new(
        device: Arc<ash::Device>,
        swapchain_loader: SwapchainDevice,
        swapchain: vk::SwapchainKHR,
        queue: vk::Queue,
        extent: (u32, u32),
        format: TextureFormat,
        next_id: &AtomicU64,
    ) -> Result<Self, String> {
        let vk_images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| format!("get_swapchain_images: {:?}", e))?
        };
        let vk_format = format_to_vk(format);
        let mut images = Vec::with_capacity(vk_images.len());
        for image in vk_images {
            let view_create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(vk_format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            let view = unsafe {
                device
                    .create_image_view(&view_create_info, None)
                    .map_err(|e| format!("create_image_view: {:?}", e))?
            };
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            images.push(Arc::new(VulkanSwapchainImage {
                device: Arc::clone(&device),
                image,
                view,
                format,
                extent,
                id,
            }));
        }
        Ok(Self {
            swapchain_loader,
            swapchain,
            images,
            queue,
            extent,
            format,
        })
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        self.images.clear(); // destroy image views
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

impl std::fmt::Debug for VulkanSwapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSwapchain")
            .field("extent", &self.extent)
            .field("image_count", &self.images.len())
            .finish()
    }
}

impl Swapchain for VulkanSwapchain {
    fn acquire_next_image(&mut self, signal: Option<&dyn Semaphore>) -> Result<u32, String> {
        let sem = signal
            .and_then(|s| s.as_any().downcast_ref::<VulkanSemaphore>().map(|vs| vs.semaphore))
            .unwrap_or(vk::Semaphore::null());
        let (index, _suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, sem, vk::Fence::null())
                .map_err(|e| format!("acquire_next_image: {:?}", e))?
        };
        Ok(index)
    }

    fn present(&self, image_index: u32, wait: Option<&dyn Semaphore>) -> Result<(), String> {
        let semaphore = wait.and_then(|s| {
            s.as_any().downcast_ref::<VulkanSemaphore>().map(|vs| vs.semaphore)
        });
        let wait_semas: Vec<vk::Semaphore> = semaphore.into_iter().collect();
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semas)
            .swapchains(std::slice::from_ref(&self.swapchain))
            .image_indices(&image_indices);
        unsafe {
            self.swapchain_loader
                .queue_present(self.queue, &present_info)
                .map_err(|e| format!("queue_present: {:?}", e))?;
        }
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn image(&self, index: u32) -> Arc<dyn Texture> {
        self.images[index as usize].clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
