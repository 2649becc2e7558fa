//! Vulkan 1.3 backend for Glint RHI.
//! Implements Device, Buffer, Texture, Sampler, CommandPool/CommandList,
//! pipelines, descriptors, Fence, Semaphore and (feature "window") Swapchain.
//! Requires dynamic rendering and synchronization2; both are core in 1.3.

mod buffer;
mod command;
mod descriptor;
mod pipeline;
mod sampler;
mod texture;

#[cfg(feature = "window")]
mod swapchain;

use crate::{
    Access, Buffer, BufferDescriptor, BufferUsage, CommandPool, CompareOp,
    ComputePipelineDescriptor, DescriptorPool, DescriptorPoolDescriptor, DescriptorSetLayout,
    DescriptorSetLayoutBinding, Device, DeviceLimits, Fence, GraphicsPipelineDescriptor,
    ImageLayout, LoadOp, PipelineStages, Queue, ResourceId, SamplerDescriptor, Semaphore, StoreOp,
    Texture, TextureAspects, TextureDescriptor, TextureFormat,
};
use ash::vk;
use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub use buffer::VulkanBuffer;
pub use command::{VulkanCommandList, VulkanCommandPool};
pub use descriptor::{VulkanDescriptorPool, VulkanDescriptorSet, VulkanDescriptorSetLayout};
pub use pipeline::{VulkanComputePipeline, VulkanGraphicsPipeline};
pub use sampler::VulkanSampler;
pub use texture::{create_texture as create_vulkan_texture, VulkanTexture};

#[cfg(feature = "window")]
pub use swapchain::{VulkanSwapchain, VulkanSwapchainImage};

/// Returns validation layer names to enable if validation is requested (feature or GLINT_VALIDATION=1).
#[cfg(feature = "validation")]
fn validation_layer_names(entry: &ash::Entry) -> Vec<CString> {
    let disable = std::env::var("GLINT_VALIDATION")
        .is_ok_and(|v| v == "0" || v.eq_ignore_ascii_case("false"));
    if disable {
        return vec![];
    }
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(l) => l,
        Err(_) => return vec![],
    };
    const KHRONOS: &str = "VK_LAYER_KHRONOS_validation";
    for prop in &layers {
        let name = unsafe { std::ffi::CStr::from_ptr(prop.layer_name.as_ptr()).to_string_lossy() };
        if name == KHRONOS {
            return vec![CString::new(KHRONOS).unwrap()];
        }
    }
    vec![]
}

#[cfg(not(feature = "validation"))]
fn validation_layer_names(_entry: &ash::Entry) -> Vec<CString> {
    if std::env::var("GLINT_VALIDATION").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
        log::warn!("GLINT_VALIDATION=1 set but glint-rhi built without 'validation' feature; validation layers not available");
    }
    vec![]
}

pub(crate) fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Undefined => vk::Format::UNDEFINED,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::R16Float => vk::Format::R16_SFLOAT,
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::D32Float => vk::Format::D32_SFLOAT,
        TextureFormat::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub(crate) fn layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub(crate) fn stages_to_vk(stages: PipelineStages) -> vk::PipelineStageFlags2 {
    let mut flags = vk::PipelineStageFlags2::empty();
    if stages.contains(PipelineStages::TOP_OF_PIPE) {
        flags |= vk::PipelineStageFlags2::TOP_OF_PIPE;
    }
    if stages.contains(PipelineStages::DRAW_INDIRECT) {
        flags |= vk::PipelineStageFlags2::DRAW_INDIRECT;
    }
    if stages.contains(PipelineStages::VERTEX_INPUT) {
        flags |= vk::PipelineStageFlags2::VERTEX_INPUT;
    }
    if stages.contains(PipelineStages::VERTEX_SHADER) {
        flags |= vk::PipelineStageFlags2::VERTEX_SHADER;
    }
    if stages.contains(PipelineStages::FRAGMENT_SHADER) {
        flags |= vk::PipelineStageFlags2::FRAGMENT_SHADER;
    }
    if stages.contains(PipelineStages::EARLY_FRAGMENT_TESTS) {
        flags |= vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS;
    }
    if stages.contains(PipelineStages::LATE_FRAGMENT_TESTS) {
        flags |= vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
    }
    if stages.contains(PipelineStages::COLOR_ATTACHMENT_OUTPUT) {
        flags |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
    }
    if stages.contains(PipelineStages::COMPUTE_SHADER) {
        flags |= vk::PipelineStageFlags2::COMPUTE_SHADER;
    }
    if stages.contains(PipelineStages::TRANSFER) {
        flags |= vk::PipelineStageFlags2::TRANSFER;
    }
    if stages.contains(PipelineStages::BOTTOM_OF_PIPE) {
        flags |= vk::PipelineStageFlags2::BOTTOM_OF_PIPE;
    }
    if stages.contains(PipelineStages::ALL_COMMANDS) {
        flags |= vk::PipelineStageFlags2::ALL_COMMANDS;
    }
    flags
}

pub(crate) fn access_to_vk(access: Access) -> vk::AccessFlags2 {
    let mut flags = vk::AccessFlags2::empty();
    if access.contains(Access::INDIRECT_COMMAND_READ) {
        flags |= vk::AccessFlags2::INDIRECT_COMMAND_READ;
    }
    if access.contains(Access::INDEX_READ) {
        flags |= vk::AccessFlags2::INDEX_READ;
    }
    if access.contains(Access::VERTEX_ATTRIBUTE_READ) {
        flags |= vk::AccessFlags2::VERTEX_ATTRIBUTE_READ;
    }
    if access.contains(Access::UNIFORM_READ) {
        flags |= vk::AccessFlags2::UNIFORM_READ;
    }
    if access.contains(Access::INPUT_ATTACHMENT_READ) {
        flags |= vk::AccessFlags2::INPUT_ATTACHMENT_READ;
    }
    if access.contains(Access::SHADER_READ) {
        flags |= vk::AccessFlags2::SHADER_READ;
    }
    if access.contains(Access::SHADER_WRITE) {
        flags |= vk::AccessFlags2::SHADER_WRITE;
    }
    if access.contains(Access::COLOR_ATTACHMENT_READ) {
        flags |= vk::AccessFlags2::COLOR_ATTACHMENT_READ;
    }
    if access.contains(Access::COLOR_ATTACHMENT_WRITE) {
        flags |= vk::AccessFlags2::COLOR_ATTACHMENT_WRITE;
    }
    if access.contains(Access::DEPTH_STENCIL_ATTACHMENT_READ) {
        flags |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if access.contains(Access::DEPTH_STENCIL_ATTACHMENT_WRITE) {
        flags |= vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if access.contains(Access::TRANSFER_READ) {
        flags |= vk::AccessFlags2::TRANSFER_READ;
    }
    if access.contains(Access::TRANSFER_WRITE) {
        flags |= vk::AccessFlags2::TRANSFER_WRITE;
    }
    if access.contains(Access::MEMORY_READ) {
        flags |= vk::AccessFlags2::MEMORY_READ;
    }
    if access.contains(Access::MEMORY_WRITE) {
        flags |= vk::AccessFlags2::MEMORY_WRITE;
    }
    flags
}

pub(crate) fn aspects_to_vk(aspects: TextureAspects) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if aspects.contains(TextureAspects::COLOR) {
        flags |= vk::ImageAspectFlags::COLOR;
    }
    if aspects.contains(TextureAspects::DEPTH) {
        flags |= vk::ImageAspectFlags::DEPTH;
    }
    if aspects.contains(TextureAspects::STENCIL) {
        flags |= vk::ImageAspectFlags::STENCIL;
    }
    flags
}

pub(crate) fn load_op_to_vk(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub(crate) fn store_op_to_vk(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn sample_count_to_vk(count: u32) -> vk::SampleCountFlags {
    match count {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Returns the VkImage for a texture (VulkanTexture or VulkanSwapchainImage).
pub(crate) fn image_for_texture(texture: &dyn Texture) -> Result<vk::Image, String> {
    if let Some(t) = texture.as_any().downcast_ref::<VulkanTexture>() {
        return Ok(t.image);
    }
    #[cfg(feature = "window")]
    if let Some(s) = texture.as_any().downcast_ref::<VulkanSwapchainImage>() {
        return Ok(s.image);
    }
    Err("texture must be a Vulkan texture or swapchain image".to_string())
}

/// Returns the VkImageView for a texture. Used for rendering attachments and descriptors.
pub(crate) fn view_for_texture(texture: &dyn Texture) -> Result<vk::ImageView, String> {
    if let Some(t) = texture.as_any().downcast_ref::<VulkanTexture>() {
        return Ok(t.view);
    }
    #[cfg(feature = "window")]
    if let Some(s) = texture.as_any().downcast_ref::<VulkanSwapchainImage>() {
        return Ok(s.view());
    }
    Err("texture must be a Vulkan texture or swapchain image".to_string())
}

#[cfg(feature = "window")]
pub(crate) struct SurfaceState {
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
}

/// Everything shared between the headless and windowed constructors.
struct DeviceCore {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    limits: DeviceLimits,
    buffer_device_address: bool,
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    device_extensions: &[*const i8],
) -> Result<DeviceCore, String> {
    // Feature negotiation: dynamic rendering and synchronization2 are
    // required; buffer device address and anisotropy are enabled when present.
    let mut supported12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut supported13 = vk::PhysicalDeviceVulkan13Features::default();
    let base_supported;
    {
        let mut supported2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut supported12)
            .push_next(&mut supported13);
        unsafe { instance.get_physical_device_features2(physical_device, &mut supported2) };
        base_supported = supported2.features;
    }
    if supported13.dynamic_rendering == vk::FALSE {
        return Err("device does not support dynamic rendering".to_string());
    }
    if supported13.synchronization2 == vk::FALSE {
        return Err("device does not support synchronization2".to_string());
    }
    let buffer_device_address = supported12.buffer_device_address == vk::TRUE;
    let anisotropy_supported = base_supported.sampler_anisotropy == vk::TRUE;

    let base_features =
        vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy_supported);
    let mut enabled12 =
        vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(buffer_device_address);
    let mut enabled13 = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities)];
    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(device_extensions)
        .enabled_features(&base_features)
        .push_next(&mut enabled12)
        .push_next(&mut enabled13);
    let device = unsafe {
        instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(|e| e.to_string())?
    };
    let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let limits = DeviceLimits {
        max_sampler_anisotropy: if anisotropy_supported {
            properties.limits.max_sampler_anisotropy
        } else {
            1.0
        },
    };
    Ok(DeviceCore {
        device: Arc::new(device),
        queue,
        limits,
        buffer_device_address,
    })
}

fn create_instance(entry: &ash::Entry, extensions: &[*const i8]) -> Result<ash::Instance, String> {
    let app_name = CString::new("Glint").unwrap();
    let engine_name = CString::new("Glint").unwrap();
    let app_info = vk::ApplicationInfo::default()
        .api_version(vk::API_VERSION_1_3)
        .application_name(&app_name)
        .engine_name(&engine_name);
    let layer_names: Vec<CString> = validation_layer_names(entry);
    let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|c| c.as_ptr()).collect();
    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(extensions)
        .enabled_layer_names(if layer_ptrs.is_empty() { &[] } else { &layer_ptrs });
    unsafe { entry.create_instance(&create_info, None).map_err(|e| e.to_string()) }
}

pub struct VulkanDevice {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    queue: VulkanQueue,
    #[allow(dead_code)]
    queue_family_index: u32,
    limits: DeviceLimits,
    buffer_device_address: bool,
    next_id: AtomicU64,
    #[cfg(feature = "window")]
    surface_state: Option<SurfaceState>,
}

impl VulkanDevice {
    /// Create a headless Vulkan 1.3 device on the first physical device with a graphics queue.
    pub fn new() -> Result<Arc<Self>, String> {
        let entry = unsafe { ash::Entry::load().map_err(|e| e.to_string())? };
        let instance = create_instance(&entry, &[])?;
        let physical_devices = unsafe {
            instance.enumerate_physical_devices().map_err(|e| e.to_string())?
        };
        let mut selected = None;
        for physical_device in physical_devices {
            let families = unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            };
            if let Some(index) = families
                .iter()
                .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            {
                selected = Some((physical_device, index as u32));
                break;
            }
        }
        let (physical_device, queue_family_index) =
            selected.ok_or("No Vulkan physical device with a graphics queue found")?;
        let core = create_logical_device(&instance, physical_device, queue_family_index, &[])?;
        Ok(Arc::new(Self {
            entry,
            instance,
            physical_device,
            queue: VulkanQueue {
                device: Arc::clone(&core.device),
                queue: core.queue,
                submit_lock: Mutex::new(()),
            },
            device: core.device,
            queue_family_index,
            limits: core.limits,
            buffer_device_address: core.buffer_device_address,
            next_id: AtomicU64::new(1),
            #[cfg(feature = "window")]
            surface_state: None,
        }))
    }

    /// Create a Vulkan device with a window surface for swapchain/presentation.
    #[cfg(feature = "window")]
    pub fn new_with_surface(
        window: &dyn raw_window_handle::HasWindowHandle,
    ) -> Result<Arc<Self>, String> {
        use ash::khr::surface::Instance as SurfaceInstance;
        use std::ffi::CStr;
        let handle = window.window_handle().map_err(|e| format!("window_handle: {:?}", e))?;
        let (hwnd, hinstance) = match handle.as_raw() {
            raw_window_handle::RawWindowHandle::Win32(win) => {
                let hwnd = win.hwnd.get() as isize;
                let hinstance = win.hinstance.map(|h| h.get() as isize).unwrap_or(0);
                (hwnd, hinstance)
            }
            _ => return Err("Only Win32 window is supported".to_string()),
        };
        let entry = unsafe { ash::Entry::load().map_err(|e| e.to_string())? };
        let instance_exts = unsafe {
            [
                CStr::from_bytes_with_nul_unchecked(b"VK_KHR_surface\0").as_ptr(),
                ash::khr::win32_surface::NAME.as_ptr(),
            ]
        };
        let instance = create_instance(&entry, &instance_exts)?;
        let surface_loader = SurfaceInstance::new(&entry, &instance);
        let win32_create_info = vk::Win32SurfaceCreateInfoKHR::default()
            .hinstance(hinstance)
            .hwnd(hwnd);
        let surface = unsafe {
            let win32 = ash::khr::win32_surface::Instance::new(&entry, &instance);
            win32
                .create_win32_surface(&win32_create_info, None)
                .map_err(|e| format!("create_win32_surface: {:?}", e))?
        };
        let physical_devices = unsafe {
            instance.enumerate_physical_devices().map_err(|e| e.to_string())?
        };
        let mut selected = None;
        'devices: for physical_device in physical_devices {
            let families = unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            };
            for (i, p) in families.iter().enumerate() {
                let graphics = p.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                let present = unsafe {
                    surface_loader
                        .get_physical_device_surface_support(physical_device, i as u32, surface)
                        .unwrap_or(false)
                };
                if graphics && present {
                    selected = Some((physical_device, i as u32));
                    break 'devices;
                }
            }
        }
        let (physical_device, queue_family_index) =
            selected.ok_or("No queue family with graphics and present support")?;
        let device_exts = [ash::khr::swapchain::NAME.as_ptr()];
        let core = create_logical_device(&instance, physical_device, queue_family_index, &device_exts)?;
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &core.device);
        Ok(Arc::new(Self {
            entry,
            instance,
            physical_device,
            queue: VulkanQueue {
                device: Arc::clone(&core.device),
                queue: core.queue,
                submit_lock: Mutex::new(()),
            },
            device: core.device,
            queue_family_index,
            limits: core.limits,
            buffer_device_address: core.buffer_device_address,
            next_id: AtomicU64::new(1),
            surface_state: Some(SurfaceState {
                surface,
                surface_loader,
                swapchain_loader,
            }),
        }))
    }

    fn next_id(&self) -> ResourceId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        #[cfg(feature = "window")]
        if let Some(ref s) = self.surface_state {
            unsafe {
                s.surface_loader.destroy_surface(s.surface, None);
            }
        }
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice").finish_non_exhaustive()
    }
}

impl Device for VulkanDevice {
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn Buffer>, String> {
        if !desc.is_valid() {
            return Err(format!("invalid buffer descriptor {:?}", desc.label));
        }
        if desc.usage.contains(BufferUsage::DEVICE_ADDRESS) && !self.buffer_device_address {
            return Err("device does not support buffer device address".to_string());
        }
        let buf = buffer::create_buffer(
            Arc::clone(&self.device),
            &self.instance,
            self.physical_device,
            desc,
            self.next_id(),
        )?;
        Ok(Box::new(buf))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<Box<dyn Texture>, String> {
        if !desc.is_valid() {
            return Err(format!("invalid texture descriptor {:?}", desc.label));
        }
        let tex = texture::create_texture(
            Arc::clone(&self.device),
            &self.instance,
            self.physical_device,
            desc,
            self.next_id(),
        )?;
        Ok(Box::new(tex))
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<Box<dyn crate::Sampler>, String> {
        let s = sampler::create_sampler(Arc::clone(&self.device), desc, &self.limits)?;
        Ok(Box::new(s))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>, String> {
        let create_info = vk::FenceCreateInfo::default().flags(if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        });
        let fence = unsafe {
            self.device.create_fence(&create_info, None).map_err(|e| e.to_string())?
        };
        Ok(Box::new(VulkanFence { device: Arc::clone(&self.device), fence }))
    }

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>, String> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            self.device.create_semaphore(&create_info, None).map_err(|e| e.to_string())?
        };
        Ok(Box::new(VulkanSemaphore { device: Arc::clone(&self.device), semaphore }))
    }

    fn create_command_pool(&self) -> Result<Box<dyn CommandPool>, String> {
        let pool =
            command::VulkanCommandPool::new(Arc::clone(&self.device), self.queue_family_index)?;
        Ok(Box::new(pool))
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<Box<dyn crate::GraphicsPipeline>, String> {
        let pipe = pipeline::VulkanGraphicsPipeline::create(Arc::clone(&self.device), desc)?;
        Ok(Box::new(pipe))
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Box<dyn crate::ComputePipeline>, String> {
        let pipe = pipeline::VulkanComputePipeline::create(Arc::clone(&self.device), desc)?;
        Ok(Box::new(pipe))
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<Box<dyn DescriptorSetLayout>, String> {
        let layout = descriptor::create_descriptor_set_layout(Arc::clone(&self.device), bindings)?;
        Ok(Box::new(layout))
    }

    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDescriptor,
    ) -> Result<Box<dyn DescriptorPool>, String> {
        let pool = descriptor::create_descriptor_pool(Arc::clone(&self.device), desc)?;
        Ok(Box::new(pool))
    }

    #[cfg(feature = "window")]
    fn create_swapchain(
        &self,
        extent: (u32, u32),
        old_swapchain: Option<&dyn crate::Swapchain>,
    ) -> Result<Box<dyn crate::Swapchain>, String> {
        let state = self
            .surface_state
            .as_ref()
            .ok_or("Device was created without a surface")?;
        swapchain::create_swapchain(
            Arc::clone(&self.device),
            state,
            self.physical_device,
            self.queue.queue,
            extent,
            old_swapchain,
            &self.next_id,
        )
    }

    fn queue(&self) -> &dyn Queue {
        &self.queue
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn write_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &[u8]) -> Result<(), String> {
        if !buffer.host_visible() {
            return Err("write_buffer requires a host-visible buffer".to_string());
        }
        let vk_buf = buffer
            .as_any()
            .downcast_ref::<buffer::VulkanBuffer>()
            .ok_or("Buffer is not a Vulkan buffer")?;
        unsafe {
            let ptr = self
                .device
                .map_memory(vk_buf.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(|e| e.to_string())?;
            let dst = ptr.cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
            self.device.unmap_memory(vk_buf.memory);
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), String> {
        unsafe { self.device.device_wait_idle().map_err(|e| e.to_string()) }
    }
}

pub(crate) struct VulkanQueue {
    device: Arc<ash::Device>,
    pub(crate) queue: vk::Queue,
    /// Queue submission requires external synchronization.
    submit_lock: Mutex<()>,
}

impl std::fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanQueue").finish()
    }
}

impl Queue for VulkanQueue {
    fn submit(
        &self,
        command_lists: &[&dyn crate::CommandList],
        wait_semaphores: &[(&dyn Semaphore, PipelineStages)],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> Result<(), String> {
        let cmd_infos: Vec<vk::CommandBufferSubmitInfo> = command_lists
            .iter()
            .map(|c| {
                c.as_any()
                    .downcast_ref::<VulkanCommandList>()
                    .map(|vc| vk::CommandBufferSubmitInfo::default().command_buffer(vc.buffer))
                    .ok_or_else(|| "command list must be VulkanCommandList".to_string())
            })
            .collect::<Result<_, _>>()?;
        let wait_infos: Vec<vk::SemaphoreSubmitInfo> = wait_semaphores
            .iter()
            .filter_map(|(s, stages)| {
                s.as_any().downcast_ref::<VulkanSemaphore>().map(|vs| {
                    vk::SemaphoreSubmitInfo::default()
                        .semaphore(vs.semaphore)
                        .stage_mask(stages_to_vk(*stages))
                })
            })
            .collect();
        let signal_infos: Vec<vk::SemaphoreSubmitInfo> = signal_semaphores
            .iter()
            .filter_map(|s| {
                s.as_any().downcast_ref::<VulkanSemaphore>().map(|vs| {
                    vk::SemaphoreSubmitInfo::default()
                        .semaphore(vs.semaphore)
                        .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                })
            })
            .collect();
        let fence = signal_fence
            .and_then(|f| f.as_any().downcast_ref::<VulkanFence>().map(|vf| vf.fence))
            .unwrap_or(vk::Fence::null());
        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&cmd_infos)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);
        let _guard = self.submit_lock.lock().map_err(|e| format!("submit lock: {}", e))?;
        unsafe {
            self.device
                .queue_submit2(self.queue, &[submit_info], fence)
                .map_err(|e| format!("queue submit: {:?}", e))?;
        }
        Ok(())
    }
}

pub(crate) struct VulkanFence {
    device: Arc<ash::Device>,
    pub(crate) fence: vk::Fence,
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

impl std::fmt::Debug for VulkanFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanFence").finish()
    }
}

impl Fence for VulkanFence {
    fn wait(&self, timeout_ns: u64) -> Result<(), String> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout_ns)
                .map_err(|e| e.to_string())
        }
    }

    fn reset(&self) -> Result<(), String> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(|e| e.to_string()) }
    }

    fn is_signaled(&self) -> Result<bool, String> {
        unsafe { self.device.get_fence_status(self.fence).map_err(|e| e.to_string()) }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) struct VulkanSemaphore {
    device: Arc<ash::Device>,
    pub(crate) semaphore: vk::Semaphore,
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

impl std::fmt::Debug for VulkanSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSemaphore").finish()
    }
}

impl Semaphore for VulkanSemaphore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
