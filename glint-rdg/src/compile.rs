//! Graph compilation: cull, lifetimes, state validation, transient
//! allocation, and barrier synthesis. Runs once per frame between the last
//! declaration and execution; all phases mutate graph state monotonically.

use crate::handle::{BufferHandle, TextureHandle};
use crate::pass::{read_layout_for_access, PassRecord};
use crate::pool::TransientPool;
use crate::registry::{ResourceOrigin, ResourceRegistry};
use crate::RdgError;
use glint_rhi::{Access, ImageLayout, LoadOp, PipelineStages, SubresourceRange};
use std::collections::HashSet;

/// A synthesized image barrier, stored by handle; the executor resolves the
/// physical image when it replays the barrier.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextureBarrierRecord {
    pub handle: TextureHandle,
    pub src_stages: PipelineStages,
    pub src_access: Access,
    pub dst_stages: PipelineStages,
    pub dst_access: Access,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub range: SubresourceRange,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferBarrierRecord {
    pub handle: BufferHandle,
    pub src_stages: PipelineStages,
    pub src_access: Access,
    pub dst_stages: PipelineStages,
    pub dst_access: Access,
}

pub(crate) struct CompiledPass {
    pub index: usize,
    pub active: bool,
    pub texture_barriers: Vec<TextureBarrierRecord>,
    pub buffer_barriers: Vec<BufferBarrierRecord>,
}

pub(crate) struct CompiledGraph {
    pub passes: Vec<CompiledPass>,
    /// Present transitions for swapchain images, emitted after the last pass.
    pub final_barriers: Vec<TextureBarrierRecord>,
}

/// What a pass last did to a resource, for hazard tracking.
#[derive(Debug, Clone, Copy)]
struct AccessState {
    stages: PipelineStages,
    access: Access,
    was_write: bool,
}

impl AccessState {
    fn initial() -> Self {
        Self {
            stages: PipelineStages::TOP_OF_PIPE,
            access: Access::empty(),
            was_write: false,
        }
    }

    fn src_stages(&self) -> PipelineStages {
        if self.stages.is_empty() {
            PipelineStages::TOP_OF_PIPE
        } else {
            self.stages
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceRef {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

fn pass_reads(pass: &PassRecord) -> Vec<ResourceRef> {
    let mut reads: Vec<ResourceRef> = pass
        .texture_reads
        .iter()
        .map(|r| ResourceRef::Texture(r.handle))
        .chain(pass.buffer_reads.iter().map(|r| ResourceRef::Buffer(r.handle)))
        .collect();
    // Loaded attachments consume their previous contents.
    for attachment in &pass.color_attachments {
        if attachment.load_op == LoadOp::Load {
            reads.push(ResourceRef::Texture(attachment.handle));
        }
    }
    if let Some(d) = &pass.depth_stencil {
        if d.depth_load_op == LoadOp::Load || d.stencil_load_op == LoadOp::Load {
            reads.push(ResourceRef::Texture(d.handle));
        }
    }
    reads
}

fn pass_writes_resource(pass: &PassRecord, resource: ResourceRef) -> bool {
    match resource {
        ResourceRef::Texture(h) => {
            pass.color_attachments.iter().any(|a| a.handle == h)
                || pass.depth_stencil.as_ref().is_some_and(|d| d.handle == h)
                || pass.storage_texture_writes.iter().any(|w| w.handle == h)
        }
        ResourceRef::Buffer(h) => pass.storage_buffer_writes.iter().any(|w| w.handle == h),
    }
}

fn writes_external(pass: &PassRecord, registry: &ResourceRegistry) -> bool {
    pass.color_attachments
        .iter()
        .map(|a| a.handle)
        .chain(pass.depth_stencil.as_ref().map(|d| d.handle))
        .chain(pass.storage_texture_writes.iter().map(|w| w.handle))
        .any(|h| registry.texture(h).origin == ResourceOrigin::External)
        || pass
            .storage_buffer_writes
            .iter()
            .any(|w| registry.buffer(w.handle).origin == ResourceOrigin::External)
}

pub(crate) fn compile(
    passes: &[PassRecord],
    registry: &mut ResourceRegistry,
    pool: &TransientPool,
) -> Result<CompiledGraph, RdgError> {
    let mut compiled: Vec<CompiledPass> = (0..passes.len())
        .map(|index| CompiledPass {
            index,
            active: true,
            texture_barriers: Vec::new(),
            buffer_barriers: Vec::new(),
        })
        .collect();

    cull(passes, registry, &mut compiled);
    compute_lifetimes(passes, registry, &compiled);
    validate_resource_state(passes, registry, &compiled);
    allocate_transients(registry, pool)?;
    let final_barriers = synthesize_barriers(passes, registry, &mut compiled);

    Ok(CompiledGraph {
        passes: compiled,
        final_barriers,
    })
}

/// Mark-and-sweep from the root set: passes that write an externally owned
/// resource. A reachable reader makes every earlier writer of the resource
/// reachable too. Culled passes get no barriers and never execute, which
/// also keeps dead producers from forcing layout churn.
fn cull(passes: &[PassRecord], registry: &ResourceRegistry, compiled: &mut [CompiledPass]) {
    let mut active = vec![false; passes.len()];
    let mut worklist: Vec<usize> = Vec::new();
    for (i, pass) in passes.iter().enumerate() {
        if writes_external(pass, registry) {
            active[i] = true;
            worklist.push(i);
        }
    }
    while let Some(i) = worklist.pop() {
        for resource in pass_reads(&passes[i]) {
            for j in 0..i {
                if !active[j] && pass_writes_resource(&passes[j], resource) {
                    active[j] = true;
                    worklist.push(j);
                }
            }
        }
    }
    for (cp, is_active) in compiled.iter_mut().zip(active) {
        cp.active = is_active;
        if !is_active {
            log::debug!("culled pass '{}'", passes[cp.index].name);
        }
    }
}

/// Extend every referenced resource's lifetime over each active pass.
fn compute_lifetimes(
    passes: &[PassRecord],
    registry: &mut ResourceRegistry,
    compiled: &[CompiledPass],
) {
    for cp in compiled.iter().filter(|cp| cp.active) {
        let pass = &passes[cp.index];
        for attachment in &pass.color_attachments {
            registry.texture_mut(attachment.handle).lifetime.touch(cp.index);
        }
        if let Some(d) = &pass.depth_stencil {
            registry.texture_mut(d.handle).lifetime.touch(cp.index);
        }
        for declared in pass.texture_reads.iter().chain(&pass.storage_texture_writes) {
            registry.texture_mut(declared.handle).lifetime.touch(cp.index);
        }
        for declared in pass.buffer_reads.iter().chain(&pass.storage_buffer_writes) {
            registry.buffer_mut(declared.handle).lifetime.touch(cp.index);
        }
    }
}

/// Reading a transient nobody wrote is almost always a mistake, but patterns
/// like load-from-previous-frame exist, so it only warns.
fn validate_resource_state(
    passes: &[PassRecord],
    registry: &ResourceRegistry,
    compiled: &[CompiledPass],
) {
    let mut written_textures: HashSet<TextureHandle> = HashSet::new();
    let mut written_buffers: HashSet<BufferHandle> = HashSet::new();
    for cp in compiled.iter().filter(|cp| cp.active) {
        let pass = &passes[cp.index];
        for read in &pass.texture_reads {
            let record = registry.texture(read.handle);
            if record.origin == ResourceOrigin::Transient && !written_textures.contains(&read.handle)
            {
                log::warn!(
                    "pass '{}' reads transient texture '{}' that no earlier pass wrote",
                    pass.name,
                    record.name
                );
            }
        }
        for read in &pass.buffer_reads {
            let record = registry.buffer(read.handle);
            if record.origin == ResourceOrigin::Transient && !written_buffers.contains(&read.handle)
            {
                log::warn!(
                    "pass '{}' reads transient buffer '{}' that no earlier pass wrote",
                    pass.name,
                    record.name
                );
            }
        }
        for attachment in &pass.color_attachments {
            written_textures.insert(attachment.handle);
        }
        if let Some(d) = &pass.depth_stencil {
            written_textures.insert(d.handle);
        }
        for write in &pass.storage_texture_writes {
            written_textures.insert(write.handle);
        }
        for write in &pass.storage_buffer_writes {
            written_buffers.insert(write.handle);
        }
    }
}

/// Bind every used transient to a pooled or fresh backing. Unused transients
/// are never allocated.
fn allocate_transients(registry: &mut ResourceRegistry, pool: &TransientPool) -> Result<(), RdgError> {
    let texture_requests: Vec<TextureHandle> = registry
        .textures()
        .filter(|(_, r)| {
            r.origin == ResourceOrigin::Transient && r.lifetime.used && r.binding.is_none()
        })
        .map(|(h, _)| h)
        .collect();
    for handle in texture_requests {
        let (desc, lifetime) = {
            let record = registry.texture(handle);
            (record.desc, record.lifetime)
        };
        let backing = pool.acquire_texture(&desc, lifetime)?;
        registry.texture_mut(handle).binding = Some(backing);
    }

    let buffer_requests: Vec<BufferHandle> = registry
        .buffers()
        .filter(|(_, r)| {
            r.origin == ResourceOrigin::Transient && r.lifetime.used && r.binding.is_none()
        })
        .map(|(h, _)| h)
        .collect();
    for handle in buffer_requests {
        let (desc, lifetime) = {
            let record = registry.buffer(handle);
            (record.desc, record.lifetime)
        };
        let backing = pool.acquire_buffer(&desc, lifetime)?;
        registry.buffer_mut(handle).binding = Some(backing);
    }
    Ok(())
}

/// Walk active passes in order, tracking per-resource access state and
/// layout, and record the barriers each pass must emit before it runs.
/// Returns the trailing present transitions for swapchain images.
fn synthesize_barriers(
    passes: &[PassRecord],
    registry: &ResourceRegistry,
    compiled: &mut [CompiledPass],
) -> Vec<TextureBarrierRecord> {
    let mut texture_states = vec![AccessState::initial(); registry.texture_count()];
    let mut buffer_states = vec![AccessState::initial(); registry.buffer_count()];
    let mut layouts: Vec<ImageLayout> = registry.textures().map(|(_, r)| r.layout).collect();

    for cp in compiled.iter_mut().filter(|cp| cp.active) {
        let pass = &passes[cp.index];

        for read in &pass.texture_reads {
            let idx = read.handle.index();
            let wanted = read_layout_for_access(read.access);
            let state = texture_states[idx];
            if state.was_write || layouts[idx] != wanted {
                cp.texture_barriers.push(TextureBarrierRecord {
                    handle: read.handle,
                    src_stages: state.src_stages(),
                    src_access: state.access,
                    dst_stages: read.stages,
                    dst_access: read.access,
                    old_layout: layouts[idx],
                    new_layout: wanted,
                    range: whole_texture(registry, read.handle),
                });
                layouts[idx] = wanted;
            }
            texture_states[idx] = AccessState {
                stages: read.stages,
                access: read.access,
                was_write: false,
            };
        }

        for attachment in &pass.color_attachments {
            let idx = attachment.handle.index();
            let wanted = ImageLayout::ColorAttachment;
            let mut dst_access = Access::COLOR_ATTACHMENT_WRITE;
            if attachment.load_op == LoadOp::Load {
                dst_access |= Access::COLOR_ATTACHMENT_READ;
            }
            let state = texture_states[idx];
            if !state.access.is_empty() || layouts[idx] != wanted {
                cp.texture_barriers.push(TextureBarrierRecord {
                    handle: attachment.handle,
                    src_stages: state.src_stages(),
                    src_access: state.access,
                    dst_stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                    dst_access,
                    old_layout: layouts[idx],
                    new_layout: wanted,
                    range: whole_texture(registry, attachment.handle),
                });
                layouts[idx] = wanted;
            }
            texture_states[idx] = AccessState {
                stages: PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                access: dst_access,
                was_write: true,
            };
        }

        if let Some(d) = &pass.depth_stencil {
            let idx = d.handle.index();
            let wanted = ImageLayout::DepthStencilAttachment;
            let dst_stages =
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS;
            let mut dst_access = Access::DEPTH_STENCIL_ATTACHMENT_WRITE;
            if d.depth_load_op == LoadOp::Load || d.stencil_load_op == LoadOp::Load {
                dst_access |= Access::DEPTH_STENCIL_ATTACHMENT_READ;
            }
            let state = texture_states[idx];
            if !state.access.is_empty() || layouts[idx] != wanted {
                cp.texture_barriers.push(TextureBarrierRecord {
                    handle: d.handle,
                    src_stages: state.src_stages(),
                    src_access: state.access,
                    dst_stages,
                    dst_access,
                    old_layout: layouts[idx],
                    new_layout: wanted,
                    range: whole_texture(registry, d.handle),
                });
                layouts[idx] = wanted;
            }
            texture_states[idx] = AccessState {
                stages: dst_stages,
                access: dst_access,
                was_write: true,
            };
        }

        for write in &pass.storage_texture_writes {
            let idx = write.handle.index();
            let wanted = ImageLayout::General;
            let state = texture_states[idx];
            if !state.access.is_empty() || layouts[idx] != wanted {
                cp.texture_barriers.push(TextureBarrierRecord {
                    handle: write.handle,
                    src_stages: state.src_stages(),
                    src_access: state.access,
                    dst_stages: write.stages,
                    dst_access: write.access,
                    old_layout: layouts[idx],
                    new_layout: wanted,
                    range: whole_texture(registry, write.handle),
                });
                layouts[idx] = wanted;
            }
            texture_states[idx] = AccessState {
                stages: write.stages,
                access: write.access,
                was_write: true,
            };
        }

        // Buffers have no layouts; only write hazards (RAW, WAW) need a barrier.
        for read in &pass.buffer_reads {
            let idx = read.handle.index();
            let state = buffer_states[idx];
            if state.was_write {
                cp.buffer_barriers.push(BufferBarrierRecord {
                    handle: read.handle,
                    src_stages: state.src_stages(),
                    src_access: state.access,
                    dst_stages: read.stages,
                    dst_access: read.access,
                });
            }
            buffer_states[idx] = AccessState {
                stages: read.stages,
                access: read.access,
                was_write: false,
            };
        }

        for write in &pass.storage_buffer_writes {
            let idx = write.handle.index();
            let state = buffer_states[idx];
            if state.was_write {
                cp.buffer_barriers.push(BufferBarrierRecord {
                    handle: write.handle,
                    src_stages: state.src_stages(),
                    src_access: state.access,
                    dst_stages: write.stages,
                    dst_access: write.access,
                });
            }
            buffer_states[idx] = AccessState {
                stages: write.stages,
                access: write.access,
                was_write: true,
            };
        }
    }

    // Swapchain images leave the frame in PresentSrc, whatever happened above.
    let mut final_barriers = Vec::new();
    for (handle, record) in registry.textures() {
        if record.swapchain_index.is_none() {
            continue;
        }
        let idx = handle.index();
        if layouts[idx] == ImageLayout::PresentSrc {
            continue;
        }
        let state = texture_states[idx];
        final_barriers.push(TextureBarrierRecord {
            handle,
            src_stages: state.src_stages(),
            src_access: state.access,
            dst_stages: PipelineStages::BOTTOM_OF_PIPE,
            dst_access: Access::MEMORY_READ,
            old_layout: layouts[idx],
            new_layout: ImageLayout::PresentSrc,
            range: whole_texture(registry, handle),
        });
    }
    final_barriers
}

fn whole_texture(registry: &ResourceRegistry, handle: TextureHandle) -> SubresourceRange {
    SubresourceRange::all(registry.texture(handle).desc.format.aspects())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::PassCallback;
    use crate::test_rhi::{test_graph, TestSwapchain};
    use glint_rhi::{
        ClearColor, StoreOp, TextureAspects, TextureDescriptor, TextureFormat, TextureUsage,
    };

    fn color_desc(label: &'static str) -> TextureDescriptor {
        TextureDescriptor {
            label: Some(label),
            size: (512, 512, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        }
    }

    fn depth_desc() -> TextureDescriptor {
        TextureDescriptor {
            label: Some("shadow depth"),
            size: (1024, 1024, 1),
            format: TextureFormat::D32Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        }
    }

    #[test]
    fn swapchain_pass_gets_attachment_and_present_transitions() {
        let (mut graph, _device) = test_graph();
        let swapchain = TestSwapchain::new(2, (800, 600));
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph.add_pass("draw", PassCallback::noop()).write_color_attachment(
            target,
            glint_rhi::LoadOp::Clear,
            StoreOp::Store,
            ClearColor { r: 0.1, g: 0.1, b: 0.1, a: 1.0 },
        );

        let compiled = compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();

        let barriers = &compiled.passes[0].texture_barriers;
        assert_eq!(barriers.len(), 1);
        let b = &barriers[0];
        assert_eq!(b.old_layout, ImageLayout::Undefined);
        assert_eq!(b.new_layout, ImageLayout::ColorAttachment);
        assert_eq!(b.src_stages, PipelineStages::TOP_OF_PIPE);
        assert!(b.src_access.is_empty());
        assert_eq!(b.dst_stages, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(b.dst_access, Access::COLOR_ATTACHMENT_WRITE);

        assert_eq!(compiled.final_barriers.len(), 1);
        let f = &compiled.final_barriers[0];
        assert_eq!(f.old_layout, ImageLayout::ColorAttachment);
        assert_eq!(f.new_layout, ImageLayout::PresentSrc);
        assert!(f.src_stages.contains(PipelineStages::COLOR_ATTACHMENT_OUTPUT));
    }

    #[test]
    fn shadow_then_lighting_chains_layouts() {
        let (mut graph, _device) = test_graph();
        let swapchain = TestSwapchain::new(2, (800, 600));
        let depth = graph.create_transient_texture(&depth_desc());
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph
            .add_pass("shadow", PassCallback::noop())
            .write_depth_stencil_attachment(
                depth,
                glint_rhi::LoadOp::Clear,
                StoreOp::Store,
                glint_rhi::LoadOp::DontCare,
                StoreOp::DontCare,
                1.0,
                0,
            );
        graph
            .add_pass("lighting", PassCallback::noop())
            .read_texture(depth, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(
                target,
                glint_rhi::LoadOp::Clear,
                StoreOp::Store,
                ClearColor::TRANSPARENT,
            );

        let compiled = compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();

        // Shadow: Undefined -> DepthStencilAttachment.
        let shadow = &compiled.passes[0].texture_barriers;
        assert_eq!(shadow.len(), 1);
        assert_eq!(shadow[0].new_layout, ImageLayout::DepthStencilAttachment);
        assert_eq!(shadow[0].range.aspects, TextureAspects::DEPTH);

        // Lighting reads the depth in fragment: DepthStencilAttachment -> ShaderReadOnly
        // with src covering the depth write stages.
        let lighting = &compiled.passes[1].texture_barriers;
        assert_eq!(lighting.len(), 2);
        let depth_read = &lighting[0];
        assert_eq!(depth_read.old_layout, ImageLayout::DepthStencilAttachment);
        assert_eq!(depth_read.new_layout, ImageLayout::ShaderReadOnly);
        assert!(depth_read.src_stages.contains(PipelineStages::LATE_FRAGMENT_TESTS));
        assert!(depth_read.src_access.contains(Access::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(depth_read.dst_stages, PipelineStages::FRAGMENT_SHADER);
        assert_eq!(depth_read.dst_access, Access::SHADER_READ);

        // Depth was allocated exactly once.
        assert!(graph.registry.texture(depth).binding.is_some());
    }

    #[test]
    fn dead_passes_are_culled_and_never_allocated() {
        let (mut graph, device) = test_graph();
        let swapchain = TestSwapchain::new(2, (800, 600));
        let t1 = graph.create_transient_texture(&color_desc("t1"));
        let t2 = graph.create_transient_texture(&color_desc("t2"));
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph.add_pass("a", PassCallback::noop()).write_color_attachment(
            t1,
            glint_rhi::LoadOp::Clear,
            StoreOp::Store,
            ClearColor::TRANSPARENT,
        );
        graph
            .add_pass("b", PassCallback::noop())
            .read_texture(t1, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(t2, glint_rhi::LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);
        graph.add_pass("c", PassCallback::noop()).write_color_attachment(
            target,
            glint_rhi::LoadOp::Clear,
            StoreOp::Store,
            ClearColor::TRANSPARENT,
        );

        let compiled = compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();

        assert!(!compiled.passes[0].active);
        assert!(!compiled.passes[1].active);
        assert!(compiled.passes[2].active);
        assert!(graph.registry.texture(t1).binding.is_none());
        assert!(graph.registry.texture(t2).binding.is_none());
        assert_eq!(device.texture_allocations(), 0);
    }

    #[test]
    fn readers_keep_their_producers_alive() {
        let (mut graph, _device) = test_graph();
        let swapchain = TestSwapchain::new(2, (800, 600));
        let t1 = graph.create_transient_texture(&color_desc("t1"));
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph.add_pass("produce", PassCallback::noop()).write_color_attachment(
            t1,
            glint_rhi::LoadOp::Clear,
            StoreOp::Store,
            ClearColor::TRANSPARENT,
        );
        graph
            .add_pass("present", PassCallback::noop())
            .read_texture(t1, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(target, glint_rhi::LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);

        let compiled = compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();
        assert!(compiled.passes[0].active);
        assert!(compiled.passes[1].active);
    }

    #[test]
    fn disjoint_transients_alias_one_backing() {
        let (mut graph, device) = test_graph();
        let swapchain = TestSwapchain::new(2, (800, 600));
        let t1 = graph.create_transient_texture(&color_desc("t1"));
        let t2 = graph.create_transient_texture(&color_desc("t2"));
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph.add_pass("p1", PassCallback::noop()).write_color_attachment(
            t1,
            glint_rhi::LoadOp::Clear,
            StoreOp::Store,
            ClearColor::TRANSPARENT,
        );
        graph
            .add_pass("p2", PassCallback::noop())
            .read_texture(t1, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(target, glint_rhi::LoadOp::Load, StoreOp::Store, ClearColor::TRANSPARENT);
        graph.add_pass("p3", PassCallback::noop()).write_color_attachment(
            t2,
            glint_rhi::LoadOp::Clear,
            StoreOp::Store,
            ClearColor::TRANSPARENT,
        );
        graph
            .add_pass("p4", PassCallback::noop())
            .read_texture(t2, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(target, glint_rhi::LoadOp::Load, StoreOp::Store, ClearColor::TRANSPARENT);

        compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();

        let b1 = graph.registry.texture(t1).binding.as_ref().unwrap().id();
        let b2 = graph.registry.texture(t2).binding.as_ref().unwrap().id();
        assert_eq!(b1, b2);
        assert_eq!(device.texture_allocations(), 1);
    }

    #[test]
    fn producer_consumer_stages_are_subsumed() {
        // Property: whenever A writes R and B consumes R, B's barrier src
        // stages cover the stages A used.
        let (mut graph, _device) = test_graph();
        let swapchain = TestSwapchain::new(2, (800, 600));
        let storage = graph.create_transient_texture(&TextureDescriptor {
            label: Some("storage"),
            size: (128, 128, 1),
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::STORAGE_BINDING | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        });
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph.add_pass("generate", PassCallback::noop()).write_storage_texture(
            storage,
            PipelineStages::COMPUTE_SHADER,
            Access::SHADER_WRITE,
        );
        graph
            .add_pass("resolve", PassCallback::noop())
            .read_texture(storage, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
            .write_color_attachment(target, glint_rhi::LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);

        let compiled = compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();
        let read_barrier = compiled.passes[1]
            .texture_barriers
            .iter()
            .find(|b| b.handle == storage)
            .unwrap();
        assert!(read_barrier.src_stages.contains(PipelineStages::COMPUTE_SHADER));
        assert!(read_barrier.src_access.contains(Access::SHADER_WRITE));
        assert_eq!(read_barrier.old_layout, ImageLayout::General);
        assert_eq!(read_barrier.new_layout, ImageLayout::ShaderReadOnly);
    }

    #[test]
    fn buffer_write_then_read_emits_barrier() {
        let (mut graph, _device) = test_graph();
        let swapchain = TestSwapchain::new(2, (800, 600));
        let buffer = graph.create_transient_buffer(&glint_rhi::BufferDescriptor {
            label: Some("instances"),
            size: 4096,
            usage: glint_rhi::BufferUsage::STORAGE,
            memory: Default::default(),
        });
        let target = graph.import_swapchain_image(&swapchain, 0);
        graph.add_pass("cull", PassCallback::noop()).write_storage_buffer(
            buffer,
            PipelineStages::COMPUTE_SHADER,
            Access::SHADER_WRITE,
        );
        graph
            .add_pass("draw", PassCallback::noop())
            .read_buffer(buffer, PipelineStages::VERTEX_SHADER, Access::SHADER_READ)
            .write_color_attachment(target, glint_rhi::LoadOp::Clear, StoreOp::Store, ClearColor::TRANSPARENT);

        let compiled = compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();
        assert!(compiled.passes[0].buffer_barriers.is_empty());
        let barriers = &compiled.passes[1].buffer_barriers;
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].src_stages, PipelineStages::COMPUTE_SHADER);
        assert_eq!(barriers[0].src_access, Access::SHADER_WRITE);
        assert_eq!(barriers[0].dst_stages, PipelineStages::VERTEX_SHADER);
    }

    #[test]
    fn identical_graphs_compile_to_identical_barriers() {
        let build = || {
            let (mut graph, _device) = test_graph();
            let swapchain = TestSwapchain::new(2, (800, 600));
            let depth = graph.create_transient_texture(&depth_desc());
            let target = graph.import_swapchain_image(&swapchain, 0);
            graph
                .add_pass("shadow", PassCallback::noop())
                .write_depth_stencil_attachment(
                    depth,
                    glint_rhi::LoadOp::Clear,
                    StoreOp::Store,
                    glint_rhi::LoadOp::DontCare,
                    StoreOp::DontCare,
                    1.0,
                    0,
                );
            graph
                .add_pass("lighting", PassCallback::noop())
                .read_texture(depth, PipelineStages::FRAGMENT_SHADER, Access::SHADER_READ)
                .write_color_attachment(
                    target,
                    glint_rhi::LoadOp::Clear,
                    StoreOp::Store,
                    ClearColor::TRANSPARENT,
                );
            let compiled = compile(&graph.passes, &mut graph.registry, &graph.transients).unwrap();
            compiled
                .passes
                .iter()
                .flat_map(|p| p.texture_barriers.iter())
                .map(|b| (b.old_layout, b.new_layout, b.src_stages, b.dst_stages))
                .collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }
}
