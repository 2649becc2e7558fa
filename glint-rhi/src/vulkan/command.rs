//! Vulkan command pool and primary command list recording.
//! Barriers use synchronization2; render scopes use dynamic rendering.

use crate::{
    BufferBarrier, CommandList, CommandPool, IndexFormat, RenderingInfo, SubresourceRange,
    TextureBarrier,
};
use ash::vk;
use std::sync::Arc;

use super::{
    access_to_vk, aspects_to_vk, image_for_texture, layout_to_vk, load_op_to_vk, stages_to_vk,
    store_op_to_vk, view_for_texture,
};

pub struct VulkanCommandPool {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
}

impl VulkanCommandPool {
    pub(crate) fn new(device: Arc<ash::Device>, queue_family_index: u32) -> Result<Self, String> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe {
            device.create_command_pool(&create_info, None).map_err(|e| e.to_string())?
        };
        Ok(Self { device, pool })
    }
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

impl std::fmt::Debug for VulkanCommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandPool").finish()
    }
}

impl CommandPool for VulkanCommandPool {
    fn allocate(&self) -> Result<Box<dyn CommandList>, String> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe {
            self.device.allocate_command_buffers(&alloc_info).map_err(|e| e.to_string())?
        };
        Ok(Box::new(VulkanCommandList {
            device: Arc::clone(&self.device),
            pool: self.pool,
            buffer: buffers[0],
            graphics_layout: vk::PipelineLayout::null(),
            compute_layout: vk::PipelineLayout::null(),
        }))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn level_count_to_vk(count: u32) -> u32 {
    if count == SubresourceRange::REMAINING {
        vk::REMAINING_MIP_LEVELS
    } else {
        count
    }
}

fn layer_count_to_vk(count: u32) -> u32 {
    if count == SubresourceRange::REMAINING {
        vk::REMAINING_ARRAY_LAYERS
    } else {
        count
    }
}

pub struct VulkanCommandList {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
    pub(crate) buffer: vk::CommandBuffer,
    /// Layout of the last bound pipeline, for descriptor set binds.
    graphics_layout: vk::PipelineLayout,
    compute_layout: vk::PipelineLayout,
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            self.device.free_command_buffers(self.pool, &[self.buffer]);
        }
    }
}

impl std::fmt::Debug for VulkanCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandList").finish()
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<(), String> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(self.buffer, &begin_info)
                .map_err(|e| e.to_string())
        }
    }

    fn end(&mut self) -> Result<(), String> {
        unsafe { self.device.end_command_buffer(self.buffer).map_err(|e| e.to_string()) }
    }

    fn pipeline_barrier(&mut self, textures: &[TextureBarrier<'_>], buffers: &[BufferBarrier<'_>]) {
        if textures.is_empty() && buffers.is_empty() {
            return;
        }
        let image_barriers: Vec<vk::ImageMemoryBarrier2> = textures
            .iter()
            .map(|b| {
                let image = match image_for_texture(b.texture) {
                    Ok(image) => image,
                    Err(e) => panic!("pipeline_barrier: {}", e),
                };
                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(stages_to_vk(b.src_stages))
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_stage_mask(stages_to_vk(b.dst_stages))
                    .dst_access_mask(access_to_vk(b.dst_access))
                    .old_layout(layout_to_vk(b.old_layout))
                    .new_layout(layout_to_vk(b.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(aspects_to_vk(b.range.aspects))
                            .base_mip_level(b.range.base_mip_level)
                            .level_count(level_count_to_vk(b.range.level_count))
                            .base_array_layer(b.range.base_array_layer)
                            .layer_count(layer_count_to_vk(b.range.layer_count)),
                    )
            })
            .collect();
        let buffer_barriers: Vec<vk::BufferMemoryBarrier2> = buffers
            .iter()
            .map(|b| {
                let buffer = match b
                    .buffer
                    .as_any()
                    .downcast_ref::<super::buffer::VulkanBuffer>()
                {
                    Some(vb) => vb.buffer,
                    None => panic!("pipeline_barrier: buffer must be VulkanBuffer"),
                };
                vk::BufferMemoryBarrier2::default()
                    .src_stage_mask(stages_to_vk(b.src_stages))
                    .src_access_mask(access_to_vk(b.src_access))
                    .dst_stage_mask(stages_to_vk(b.dst_stages))
                    .dst_access_mask(access_to_vk(b.dst_access))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(buffer)
                    .offset(b.offset)
                    .size(if b.size == 0 { vk::WHOLE_SIZE } else { b.size })
            })
            .collect();
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.buffer, &dependency_info);
        }
    }

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) -> Result<(), String> {
        let color_infos: Vec<vk::RenderingAttachmentInfo> = info
            .color_attachments
            .iter()
            .map(|a| {
                view_for_texture(a.texture).map(|view| {
                    vk::RenderingAttachmentInfo::default()
                        .image_view(view)
                        .image_layout(layout_to_vk(a.layout))
                        .load_op(load_op_to_vk(a.load_op))
                        .store_op(store_op_to_vk(a.store_op))
                        .clear_value(vk::ClearValue {
                            color: vk::ClearColorValue {
                                float32: [a.clear.r, a.clear.g, a.clear.b, a.clear.a],
                            },
                        })
                })
            })
            .collect::<Result<_, _>>()?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: info.render_area.0,
                height: info.render_area.1,
            },
        };
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(info.layer_count)
            .color_attachments(&color_infos);

        let depth_info;
        let stencil_info;
        if let Some(d) = &info.depth_attachment {
            let view = view_for_texture(d.texture)?;
            let clear = vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: d.clear_depth,
                    stencil: d.clear_stencil,
                },
            };
            depth_info = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(layout_to_vk(d.layout))
                .load_op(load_op_to_vk(d.depth_load_op))
                .store_op(store_op_to_vk(d.depth_store_op))
                .clear_value(clear);
            rendering_info = rendering_info.depth_attachment(&depth_info);
            if d.texture.format().has_stencil() {
                stencil_info = vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(layout_to_vk(d.layout))
                    .load_op(load_op_to_vk(d.stencil_load_op))
                    .store_op(store_op_to_vk(d.stencil_store_op))
                    .clear_value(clear);
                rendering_info = rendering_info.stencil_attachment(&stencil_info);
            }
        }

        unsafe {
            self.device.cmd_begin_rendering(self.buffer, &rendering_info);
        }
        Ok(())
    }

    fn end_rendering(&mut self) {
        unsafe {
            self.device.cmd_end_rendering(self.buffer);
        }
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        };
        unsafe {
            self.device.cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    fn set_graphics_pipeline(&mut self, pipeline: &dyn crate::GraphicsPipeline) {
        if let Some(vk_pipe) = pipeline
            .as_any()
            .downcast_ref::<super::pipeline::VulkanGraphicsPipeline>()
        {
            unsafe {
                self.device.cmd_bind_pipeline(
                    self.buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    vk_pipe.pipeline,
                );
            }
            self.graphics_layout = vk_pipe.layout;
        }
    }

    fn set_compute_pipeline(&mut self, pipeline: &dyn crate::ComputePipeline) {
        if let Some(vk_pipe) = pipeline
            .as_any()
            .downcast_ref::<super::pipeline::VulkanComputePipeline>()
        {
            unsafe {
                self.device.cmd_bind_pipeline(
                    self.buffer,
                    vk::PipelineBindPoint::COMPUTE,
                    vk_pipe.pipeline,
                );
            }
            self.compute_layout = vk_pipe.layout;
        }
    }

    fn bind_graphics_descriptor_set(&mut self, set_index: u32, set: &dyn crate::DescriptorSet) {
        if let Some(vk_set) = set.as_any().downcast_ref::<super::descriptor::VulkanDescriptorSet>() {
            if self.graphics_layout != vk::PipelineLayout::null() {
                unsafe {
                    self.device.cmd_bind_descriptor_sets(
                        self.buffer,
                        vk::PipelineBindPoint::GRAPHICS,
                        self.graphics_layout,
                        set_index,
                        &[vk_set.set],
                        &[],
                    );
                }
            }
        }
    }

    fn bind_compute_descriptor_set(&mut self, set_index: u32, set: &dyn crate::DescriptorSet) {
        if let Some(vk_set) = set.as_any().downcast_ref::<super::descriptor::VulkanDescriptorSet>() {
            if self.compute_layout != vk::PipelineLayout::null() {
                unsafe {
                    self.device.cmd_bind_descriptor_sets(
                        self.buffer,
                        vk::PipelineBindPoint::COMPUTE,
                        self.compute_layout,
                        set_index,
                        &[vk_set.set],
                        &[],
                    );
                }
            }
        }
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &dyn crate::Buffer, offset: u64) {
        if let Some(vb) = buffer.as_any().downcast_ref::<super::buffer::VulkanBuffer>() {
            unsafe {
                self.device.cmd_bind_vertex_buffers(self.buffer, index, &[vb.buffer], &[offset]);
            }
        }
    }

    fn set_index_buffer(&mut self, buffer: &dyn crate::Buffer, offset: u64, format: IndexFormat) {
        if let Some(vb) = buffer.as_any().downcast_ref::<super::buffer::VulkanBuffer>() {
            let index_type = match format {
                IndexFormat::Uint16 => vk::IndexType::UINT16,
                IndexFormat::Uint32 => vk::IndexType::UINT32,
            };
            unsafe {
                self.device.cmd_bind_index_buffer(self.buffer, vb.buffer, offset, index_type);
            }
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(self.buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe {
            self.device.cmd_dispatch(self.buffer, x, y, z);
        }
    }

    fn copy_buffer_to_buffer(
        &mut self,
        src: &dyn crate::Buffer,
        src_offset: u64,
        dst: &dyn crate::Buffer,
        dst_offset: u64,
        size: u64,
    ) {
        let src_buf = match src.as_any().downcast_ref::<super::buffer::VulkanBuffer>() {
            Some(b) => b,
            None => panic!("copy_buffer_to_buffer: src must be VulkanBuffer"),
        };
        let dst_buf = match dst.as_any().downcast_ref::<super::buffer::VulkanBuffer>() {
            Some(b) => b,
            None => panic!("copy_buffer_to_buffer: dst must be VulkanBuffer"),
        };
        let region = vk::BufferCopy::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe {
            self.device.cmd_copy_buffer(self.buffer, src_buf.buffer, dst_buf.buffer, &[region]);
        }
    }

    fn copy_buffer_to_texture(
        &mut self,
        src: &dyn crate::Buffer,
        src_offset: u64,
        dst: &dyn crate::Texture,
        dst_mip: u32,
        dst_origin: (u32, u32, u32),
        size: (u32, u32, u32),
    ) {
        let src_buf = match src.as_any().downcast_ref::<super::buffer::VulkanBuffer>() {
            Some(b) => b,
            None => panic!("copy_buffer_to_texture: src must be VulkanBuffer"),
        };
        let image = match image_for_texture(dst) {
            Ok(image) => image,
            Err(e) => panic!("copy_buffer_to_texture: {}", e),
        };
        let subresource = vk::ImageSubresourceLayers::default()
            .aspect_mask(aspects_to_vk(dst.format().aspects()))
            .mip_level(dst_mip)
            .base_array_layer(0)
            .layer_count(1);
        let region = vk::BufferImageCopy::default()
            .buffer_offset(src_offset)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(subresource)
            .image_offset(vk::Offset3D {
                x: dst_origin.0 as i32,
                y: dst_origin.1 as i32,
                z: dst_origin.2 as i32,
            })
            .image_extent(vk::Extent3D {
                width: size.0,
                height: size.1,
                depth: size.2,
            });
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.buffer,
                src_buf.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
