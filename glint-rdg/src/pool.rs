//! Transient backing pool. Lives across frames: retired transient backings
//! are matched against next frame's requests (and against later requests in
//! the same frame whose lifetimes do not overlap), so steady-state frames
//! allocate nothing. Also home to the graph's lazily created samplers.

use crate::accessor::SamplerKind;
use crate::registry::Lifetime;
use crate::RdgError;
use glint_rhi::{
    AddressMode, Buffer, BufferDescriptor, BufferUsage, CompareOp, Device, FilterMode, Sampler,
    SamplerDescriptor, Texture, TextureDescriptor,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Frames a pooled backing may sit unused before it is destroyed.
const DEFAULT_MAX_IDLE_FRAMES: u32 = 3;

struct PooledTexture {
    desc: TextureDescriptor,
    backing: Arc<dyn Texture>,
    /// Union of this frame's users; cleared at frame end.
    user: Lifetime,
    idle_frames: u32,
}

struct PooledBuffer {
    usage: BufferUsage,
    size: u64,
    backing: Arc<dyn Buffer>,
    user: Lifetime,
    idle_frames: u32,
}

#[derive(Default)]
struct PoolInner {
    textures: Vec<PooledTexture>,
    buffers: Vec<PooledBuffer>,
}

pub struct TransientPool {
    device: Arc<dyn Device>,
    inner: Mutex<PoolInner>,
    samplers: Mutex<HashMap<SamplerKind, Arc<dyn Sampler>>>,
    max_idle_frames: u32,
}

impl TransientPool {
    pub fn new(device: Arc<dyn Device>) -> Arc<Self> {
        Self::with_max_idle_frames(device, DEFAULT_MAX_IDLE_FRAMES)
    }

    pub fn with_max_idle_frames(device: Arc<dyn Device>, max_idle_frames: u32) -> Arc<Self> {
        Arc::new(Self {
            device,
            inner: Mutex::new(PoolInner::default()),
            samplers: Mutex::new(HashMap::new()),
            max_idle_frames,
        })
    }

    /// Find or allocate a backing for a transient texture. A pooled backing
    /// matches iff its descriptor is bit-exact (label aside) and no user with
    /// an overlapping lifetime holds it this frame.
    pub(crate) fn acquire_texture(
        &self,
        desc: &TextureDescriptor,
        lifetime: Lifetime,
    ) -> Result<Arc<dyn Texture>, RdgError> {
        let mut inner = self.lock_inner()?;
        for entry in inner.textures.iter_mut() {
            if texture_descs_match(&entry.desc, desc) && !entry.user.overlaps(&lifetime) {
                if entry.user.used {
                    entry.user.touch(lifetime.first);
                    entry.user.touch(lifetime.last);
                } else {
                    entry.user = lifetime;
                }
                entry.idle_frames = 0;
                log::trace!("transient texture {:?}: pool hit", desc.label);
                return Ok(Arc::clone(&entry.backing));
            }
        }
        let backing: Arc<dyn Texture> = self
            .device
            .create_texture(desc)
            .map_err(RdgError::Allocation)?
            .into();
        log::debug!(
            "transient texture {:?}: allocated {}x{} {:?}",
            desc.label,
            desc.size.0,
            desc.size.1,
            desc.format
        );
        inner.textures.push(PooledTexture {
            desc: *desc,
            backing: Arc::clone(&backing),
            user: lifetime,
            idle_frames: 0,
        });
        Ok(backing)
    }

    /// Find or allocate a backing for a transient buffer. Usage must match
    /// exactly; a pooled buffer may be larger than requested.
    pub(crate) fn acquire_buffer(
        &self,
        desc: &BufferDescriptor,
        lifetime: Lifetime,
    ) -> Result<Arc<dyn Buffer>, RdgError> {
        let mut inner = self.lock_inner()?;
        for entry in inner.buffers.iter_mut() {
            if entry.usage == desc.usage && entry.size >= desc.size && !entry.user.overlaps(&lifetime)
            {
                if entry.user.used {
                    entry.user.touch(lifetime.first);
                    entry.user.touch(lifetime.last);
                } else {
                    entry.user = lifetime;
                }
                entry.idle_frames = 0;
                log::trace!("transient buffer {:?}: pool hit", desc.label);
                return Ok(Arc::clone(&entry.backing));
            }
        }
        let backing: Arc<dyn Buffer> = self
            .device
            .create_buffer(desc)
            .map_err(RdgError::Allocation)?
            .into();
        log::debug!("transient buffer {:?}: allocated {} bytes", desc.label, desc.size);
        inner.buffers.push(PooledBuffer {
            usage: desc.usage,
            size: desc.size.max(1),
            backing: Arc::clone(&backing),
            user: lifetime,
            idle_frames: 0,
        });
        Ok(backing)
    }

    /// Retire the frame: clear per-frame users, age idle entries, and destroy
    /// backings that have sat unused too long.
    pub(crate) fn end_frame(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let max_idle = self.max_idle_frames;
        inner.textures.retain_mut(|entry| {
            if entry.user.used {
                entry.idle_frames = 0;
            } else {
                entry.idle_frames += 1;
            }
            entry.user = Lifetime::default();
            entry.idle_frames <= max_idle
        });
        inner.buffers.retain_mut(|entry| {
            if entry.user.used {
                entry.idle_frames = 0;
            } else {
                entry.idle_frames += 1;
            }
            entry.user = Lifetime::default();
            entry.idle_frames <= max_idle
        });
    }

    pub(crate) fn sampler(&self, kind: SamplerKind) -> Result<Arc<dyn Sampler>, String> {
        let mut samplers = self.samplers.lock().map_err(|e| format!("sampler lock: {}", e))?;
        if let Some(sampler) = samplers.get(&kind) {
            return Ok(Arc::clone(sampler));
        }
        let sampler: Arc<dyn Sampler> =
            self.device.create_sampler(&sampler_descriptor(kind, &self.device))?.into();
        samplers.insert(kind, Arc::clone(&sampler));
        Ok(sampler)
    }

    /// Pooled texture backings currently retained.
    pub fn pooled_texture_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.textures.len()).unwrap_or(0)
    }

    /// Pooled buffer backings currently retained.
    pub fn pooled_buffer_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.buffers.len()).unwrap_or(0)
    }

    fn lock_inner(&self) -> Result<std::sync::MutexGuard<'_, PoolInner>, RdgError> {
        self.inner
            .lock()
            .map_err(|e| RdgError::Allocation(format!("pool lock: {}", e)))
    }
}

/// Bit-exact descriptor match, ignoring the debug label.
fn texture_descs_match(a: &TextureDescriptor, b: &TextureDescriptor) -> bool {
    a.size == b.size
        && a.format == b.format
        && a.usage == b.usage
        && a.dimension == b.dimension
        && a.mip_level_count == b.mip_level_count
        && a.sample_count == b.sample_count
        && a.tiling == b.tiling
}

fn sampler_descriptor(kind: SamplerKind, device: &Arc<dyn Device>) -> SamplerDescriptor {
    let (filter, address, anisotropy, compare) = match kind {
        SamplerKind::NearestClamp => (FilterMode::Nearest, AddressMode::ClampToEdge, None, None),
        SamplerKind::NearestRepeat => (FilterMode::Nearest, AddressMode::Repeat, None, None),
        SamplerKind::LinearClamp => (FilterMode::Linear, AddressMode::ClampToEdge, None, None),
        SamplerKind::LinearRepeat => (FilterMode::Linear, AddressMode::Repeat, None, None),
        SamplerKind::AnisotropicClamp => (
            FilterMode::Linear,
            AddressMode::ClampToEdge,
            Some(device.limits().max_sampler_anisotropy),
            None,
        ),
        SamplerKind::AnisotropicRepeat => (
            FilterMode::Linear,
            AddressMode::Repeat,
            Some(device.limits().max_sampler_anisotropy),
            None,
        ),
        SamplerKind::ShadowPcf => (
            FilterMode::Linear,
            AddressMode::ClampToEdge,
            None,
            Some(CompareOp::LessOrEqual),
        ),
    };
    SamplerDescriptor {
        label: None,
        mag_filter: filter,
        min_filter: filter,
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        anisotropy_clamp: anisotropy,
        compare,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_rhi::TestDevice;
    use glint_rhi::{TextureFormat, TextureUsage};

    fn desc(label: &'static str) -> TextureDescriptor {
        TextureDescriptor {
            label: Some(label),
            size: (512, 512, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        }
    }

    fn span(first: usize, last: usize) -> Lifetime {
        let mut l = Lifetime::default();
        l.touch(first);
        l.touch(last);
        l
    }

    #[test]
    fn non_overlapping_lifetimes_share_a_backing() {
        let device = TestDevice::new();
        let pool = TransientPool::new(device.clone());
        let a = pool.acquire_texture(&desc("a"), span(0, 1)).unwrap();
        let b = pool.acquire_texture(&desc("b"), span(2, 3)).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(device.texture_allocations(), 1);
    }

    #[test]
    fn overlapping_lifetimes_do_not_alias() {
        let device = TestDevice::new();
        let pool = TransientPool::new(device.clone());
        let a = pool.acquire_texture(&desc("a"), span(0, 2)).unwrap();
        let b = pool.acquire_texture(&desc("b"), span(2, 3)).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(device.texture_allocations(), 2);
    }

    #[test]
    fn descriptor_mismatch_allocates() {
        let device = TestDevice::new();
        let pool = TransientPool::new(device.clone());
        pool.acquire_texture(&desc("a"), span(0, 1)).unwrap();
        let mut other = desc("b");
        other.format = TextureFormat::Rgba16Float;
        pool.acquire_texture(&other, span(2, 3)).unwrap();
        assert_eq!(device.texture_allocations(), 2);
    }

    #[test]
    fn next_frame_request_is_a_pool_hit() {
        let device = TestDevice::new();
        let pool = TransientPool::new(device.clone());
        pool.acquire_texture(&desc("a"), span(0, 1)).unwrap();
        pool.end_frame();
        pool.acquire_texture(&desc("a"), span(0, 1)).unwrap();
        assert_eq!(device.texture_allocations(), 1);
    }

    #[test]
    fn idle_backings_are_evicted() {
        let device = TestDevice::new();
        let pool = TransientPool::with_max_idle_frames(device.clone(), 1);
        pool.acquire_texture(&desc("a"), span(0, 1)).unwrap();
        pool.end_frame(); // used this frame
        pool.end_frame(); // idle 1
        assert_eq!(pool.pooled_texture_count(), 1);
        pool.end_frame(); // idle 2 > 1: evicted
        assert_eq!(pool.pooled_texture_count(), 0);
    }

    #[test]
    fn pooled_buffer_may_be_larger() {
        let device = TestDevice::new();
        let pool = TransientPool::new(device.clone());
        let big = BufferDescriptor {
            label: Some("big"),
            size: 1024,
            usage: BufferUsage::STORAGE,
            memory: Default::default(),
        };
        let small = BufferDescriptor {
            label: Some("small"),
            size: 256,
            usage: BufferUsage::STORAGE,
            memory: Default::default(),
        };
        pool.acquire_buffer(&big, span(0, 0)).unwrap();
        pool.end_frame();
        pool.acquire_buffer(&small, span(0, 0)).unwrap();
        assert_eq!(device.buffer_allocations(), 1);
    }

    #[test]
    fn samplers_are_created_once() {
        let device = TestDevice::new();
        let pool = TransientPool::new(device.clone());
        let a = pool.sampler(SamplerKind::LinearClamp).unwrap();
        let b = pool.sampler(SamplerKind::LinearClamp).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(device.sampler_allocations(), 1);
    }
}
