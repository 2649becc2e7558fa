//! Graph execution: replay synthesized barriers, bracket graphics passes in
//! a dynamic rendering scope, invoke callbacks, submit once.
//!
//! A failing callback is isolated: the failure is logged, its rendering
//! scope is still closed, and the remaining passes run. The executor never
//! blocks the CPU; callers wait on the sync bundle's fence if they need to.

use crate::accessor::ResourceAccessor;
use crate::compile::{BufferBarrierRecord, CompiledGraph, TextureBarrierRecord};
use crate::pass::{PassCallback, PassRecord};
use crate::pool::TransientPool;
use crate::registry::ResourceRegistry;
use crate::sync::SyncBundle;
use crate::RdgError;
use glint_rhi::{
    BufferBarrier, CommandList, CommandPoolManager, ImageLayout, PipelineStages,
    RenderingColorAttachment, RenderingDepthAttachment, RenderingInfo, Semaphore, TextureBarrier,
};

pub(crate) fn execute(
    pools: &CommandPoolManager,
    registry: &mut ResourceRegistry,
    passes: &mut [PassRecord],
    compiled: &CompiledGraph,
    pool: &TransientPool,
    sync: Option<&SyncBundle>,
) -> Result<(), RdgError> {
    let handle = pools.acquire().map_err(RdgError::Recording)?;

    handle.record(|cmd| -> Result<(), RdgError> {
        cmd.begin().map_err(RdgError::Recording)?;

        for cp in compiled.passes.iter().filter(|cp| cp.active) {
            emit_barriers(cmd, registry, &cp.texture_barriers, &cp.buffer_barriers)?;

            let pass = &mut passes[cp.index];
            let opened_rendering = if pass.is_graphics() {
                let info = rendering_info(registry, pass)?;
                let render_area = info.render_area;
                cmd.begin_rendering(&info).map_err(RdgError::Recording)?;
                cmd.set_viewport(render_area.0, render_area.1);
                true
            } else {
                false
            };

            if let Some(callback) = pass.callback.take() {
                let outcome = match callback {
                    PassCallback::Plain(f) => f(cmd),
                    PassCallback::WithResources(f) => {
                        let accessor = ResourceAccessor::new(registry, pool);
                        f(cmd, &accessor)
                    }
                };
                if let Err(message) = outcome {
                    log::error!(
                        "pass '{}' failed: {}; continuing with remaining passes",
                        pass.name,
                        message
                    );
                }
            }

            if opened_rendering {
                cmd.end_rendering();
            }
        }

        emit_barriers(cmd, registry, &compiled.final_barriers, &[])?;
        cmd.end().map_err(RdgError::Recording)
    })?;

    let empty_waits: &[(std::sync::Arc<dyn Semaphore>, PipelineStages)] = &[];
    let (waits, signals, fence) = match sync {
        Some(bundle) => (bundle.waits(), bundle.signals(), bundle.fence()),
        None => (empty_waits, &[][..], None),
    };
    let wait_refs: Vec<(&dyn Semaphore, PipelineStages)> =
        waits.iter().map(|(s, stages)| (s.as_ref(), *stages)).collect();
    let signal_refs: Vec<&dyn Semaphore> = signals.iter().map(|s| s.as_ref()).collect();
    pools
        .submit(&[&handle], &wait_refs, &signal_refs, fence)
        .map_err(RdgError::Submit)
}

/// Replay one pass's barrier list as a single pipeline-barrier call, then
/// fold the layout transitions back into the registry so accessors observe
/// execution-time layouts.
fn emit_barriers(
    cmd: &mut dyn CommandList,
    registry: &mut ResourceRegistry,
    textures: &[TextureBarrierRecord],
    buffers: &[BufferBarrierRecord],
) -> Result<(), RdgError> {
    if textures.is_empty() && buffers.is_empty() {
        return Ok(());
    }
    {
        let texture_refs: Vec<TextureBarrier<'_>> = textures
            .iter()
            .map(|b| {
                let record = registry.texture(b.handle);
                let backing = record.binding.as_deref().ok_or_else(|| {
                    RdgError::Recording(format!("texture '{}' has no backing", record.name))
                })?;
                Ok(TextureBarrier {
                    texture: backing,
                    src_stages: b.src_stages,
                    src_access: b.src_access,
                    dst_stages: b.dst_stages,
                    dst_access: b.dst_access,
                    old_layout: b.old_layout,
                    new_layout: b.new_layout,
                    range: b.range,
                })
            })
            .collect::<Result<_, RdgError>>()?;
        let buffer_refs: Vec<BufferBarrier<'_>> = buffers
            .iter()
            .map(|b| {
                let record = registry.buffer(b.handle);
                let backing = record.binding.as_deref().ok_or_else(|| {
                    RdgError::Recording(format!("buffer '{}' has no backing", record.name))
                })?;
                Ok(BufferBarrier {
                    buffer: backing,
                    src_stages: b.src_stages,
                    src_access: b.src_access,
                    dst_stages: b.dst_stages,
                    dst_access: b.dst_access,
                    offset: 0,
                    size: 0,
                })
            })
            .collect::<Result<_, RdgError>>()?;
        cmd.pipeline_barrier(&texture_refs, &buffer_refs);
    }
    for b in textures {
        registry.texture_mut(b.handle).layout = b.new_layout;
    }
    Ok(())
}

/// Build the dynamic rendering attachment set for a graphics pass. The
/// render area comes from the first color attachment, or the depth
/// attachment for depth-only passes.
fn rendering_info<'a>(
    registry: &'a ResourceRegistry,
    pass: &PassRecord,
) -> Result<RenderingInfo<'a>, RdgError> {
    let render_area = pass
        .color_attachments
        .first()
        .map(|a| registry.texture(a.handle).desc.size)
        .or_else(|| {
            pass.depth_stencil
                .as_ref()
                .map(|d| registry.texture(d.handle).desc.size)
        })
        .map(|(w, h, _)| (w, h))
        .unwrap_or((1, 1));

    let color_attachments = pass
        .color_attachments
        .iter()
        .map(|a| {
            let record = registry.texture(a.handle);
            let texture = record.binding.as_deref().ok_or_else(|| {
                RdgError::Recording(format!("color attachment '{}' has no backing", record.name))
            })?;
            Ok(RenderingColorAttachment {
                texture,
                layout: ImageLayout::ColorAttachment,
                load_op: a.load_op,
                store_op: a.store_op,
                clear: a.clear,
            })
        })
        .collect::<Result<Vec<_>, RdgError>>()?;

    let depth_attachment = pass
        .depth_stencil
        .as_ref()
        .map(|d| {
            let record = registry.texture(d.handle);
            let texture = record.binding.as_deref().ok_or_else(|| {
                RdgError::Recording(format!("depth attachment '{}' has no backing", record.name))
            })?;
            Ok(RenderingDepthAttachment {
                texture,
                layout: ImageLayout::DepthStencilAttachment,
                depth_load_op: d.depth_load_op,
                depth_store_op: d.depth_store_op,
                stencil_load_op: d.stencil_load_op,
                stencil_store_op: d.stencil_store_op,
                clear_depth: d.clear_depth,
                clear_stencil: d.clear_stencil,
            })
        })
        .transpose()?;

    Ok(RenderingInfo {
        render_area,
        layer_count: 1,
        color_attachments,
        depth_attachment,
    })
}
