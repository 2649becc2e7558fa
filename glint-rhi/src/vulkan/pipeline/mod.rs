//! Pipeline construction. SPIR-V module loading and the set-layout-driven
//! pipeline layout are shared between the graphics and compute paths.

mod compute;
mod graphics;

pub use compute::VulkanComputePipeline;
pub use graphics::VulkanGraphicsPipeline;

use super::descriptor::{self, VulkanDescriptorSetLayout};
use crate::DescriptorSetLayoutBinding;
use ash::vk;
use std::sync::Arc;

/// Wrap SPIR-V bytes in a shader module. The words arrive little-endian in
/// `ShaderStage::source`.
pub(crate) fn create_shader_module(
    device: &ash::Device,
    source: &[u8],
) -> Result<vk::ShaderModule, String> {
    if source.len() % 4 != 0 {
        return Err("SPIR-V must be 4-byte aligned".to_string());
    }
    let code: Vec<u32> = source
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe {
        device.create_shader_module(&create_info, None).map_err(|e| e.to_string())
    }
}

/// Build a pipeline layout from descriptor-set bindings. An empty binding
/// list yields an empty layout and no owned set layout.
pub(crate) fn create_pipeline_layout(
    device: &Arc<ash::Device>,
    bindings: &[DescriptorSetLayoutBinding],
) -> Result<(vk::PipelineLayout, Option<VulkanDescriptorSetLayout>), String> {
    if bindings.is_empty() {
        let create_info = vk::PipelineLayoutCreateInfo::default();
        let layout = unsafe {
            device.create_pipeline_layout(&create_info, None).map_err(|e| e.to_string())?
        };
        return Ok((layout, None));
    }
    let set_layout = descriptor::create_descriptor_set_layout(Arc::clone(device), bindings)?;
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(std::slice::from_ref(&set_layout.layout));
    let layout = unsafe {
        device.create_pipeline_layout(&create_info, None).map_err(|e| e.to_string())?
    };
    Ok((layout, Some(set_layout)))
}
