//! Vulkan compute pipeline. The render graph's compute passes bind one of
//! these in a plain (non-rendering) scope and dispatch against the storage
//! bindings its layout declares.

use crate::{ComputePipeline, ComputePipelineDescriptor, ShaderStages};
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

use super::super::descriptor::VulkanDescriptorSetLayout;
use super::{create_pipeline_layout, create_shader_module};

pub struct VulkanComputePipeline {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    label: Option<&'static str>,
    #[allow(dead_code)]
    pub(crate) _set_layout: Option<VulkanDescriptorSetLayout>,
}

impl VulkanComputePipeline {
    pub fn create(
        device: Arc<ash::Device>,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Self, String> {
        // Every binding must be visible to the compute stage.
        if let Some(binding) = desc
            .layout_bindings
            .iter()
            .find(|b| !b.stages.contains(ShaderStages::COMPUTE))
        {
            return Err(format!(
                "compute pipeline {:?}: binding {} is not compute-visible",
                desc.label, binding.binding
            ));
        }

        let (layout, set_layout) = create_pipeline_layout(&device, &desc.layout_bindings)?;
        let entry_point =
            CString::new(desc.shader.entry_point.as_str()).map_err(|e| e.to_string())?;
        let module = match create_shader_module(&device, &desc.shader.source) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(format!("compute pipeline {:?}: {}", desc.label, e));
            }
        };
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(&entry_point);
        let create_info =
            vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);
        let created = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        };
        unsafe {
            device.destroy_shader_module(module, None);
        }
        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_partial, result)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(format!("compute pipeline {:?}: {:?}", desc.label, result));
            }
        };
        Ok(Self {
            device,
            pipeline,
            layout,
            label: desc.label,
            _set_layout: set_layout,
        })
    }
}

impl Drop for VulkanComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
            // _set_layout drops and destroys descriptor set layout
        }
    }
}

impl std::fmt::Debug for VulkanComputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanComputePipeline")
            .field("label", &self.label)
            .finish()
    }
}

impl ComputePipeline for VulkanComputePipeline {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
