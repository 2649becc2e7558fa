//! Frames-in-flight synchronization: N rotating slots, each with an
//! in-flight fence and an image-available / render-finished semaphore pair.
//! `advance` is the only place the CPU blocks; everything else is wiring.

use crate::{RdgError, RdgResult};
use glint_rhi::{Device, Fence, PipelineStages, Semaphore};
use std::sync::Arc;

/// Wait/signal semaphores and the fence accompanying one queue submission.
/// The caller wires the current slot's semaphores in each frame; `advance`
/// clears the lists but keeps the fence binding.
#[derive(Default)]
pub struct SyncBundle {
    waits: Vec<(Arc<dyn Semaphore>, PipelineStages)>,
    signals: Vec<Arc<dyn Semaphore>>,
    fence: Option<Arc<dyn Fence>>,
}

impl SyncBundle {
    /// Add a semaphore the submission waits on, blocking at `stages`.
    pub fn wait(&mut self, semaphore: Arc<dyn Semaphore>, stages: PipelineStages) -> &mut Self {
        self.waits.push((semaphore, stages));
        self
    }

    /// Add a semaphore the submission signals.
    pub fn signal(&mut self, semaphore: Arc<dyn Semaphore>) -> &mut Self {
        self.signals.push(semaphore);
        self
    }

    pub fn waits(&self) -> &[(Arc<dyn Semaphore>, PipelineStages)] {
        &self.waits
    }

    pub fn signals(&self) -> &[Arc<dyn Semaphore>] {
        &self.signals
    }

    pub fn fence(&self) -> Option<&Arc<dyn Fence>> {
        self.fence.as_ref()
    }

    pub(crate) fn clear_semaphores(&mut self) {
        self.waits.clear();
        self.signals.clear();
    }
}

struct FrameSlot {
    fence: Arc<dyn Fence>,
    image_available: Arc<dyn Semaphore>,
    render_finished: Arc<dyn Semaphore>,
    bundle: SyncBundle,
}

pub struct FrameSyncManager {
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameSyncManager {
    /// Create N frame slots. Fences start signaled so the first pass through
    /// each slot does not block.
    pub fn new(device: &Arc<dyn Device>, frames_in_flight: usize) -> RdgResult<Self> {
        assert!(frames_in_flight >= 1, "frames_in_flight must be at least 1");
        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            let fence: Arc<dyn Fence> =
                device.create_fence(true).map_err(RdgError::Sync)?.into();
            let image_available: Arc<dyn Semaphore> =
                device.create_semaphore().map_err(RdgError::Sync)?.into();
            let render_finished: Arc<dyn Semaphore> =
                device.create_semaphore().map_err(RdgError::Sync)?.into();
            slots.push(FrameSlot {
                bundle: SyncBundle {
                    waits: Vec::new(),
                    signals: Vec::new(),
                    fence: Some(Arc::clone(&fence)),
                },
                fence,
                image_available,
                render_finished,
            });
        }
        Ok(Self { slots, current: 0 })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Index of the current frame slot.
    pub fn slot(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &SyncBundle {
        &self.slots[self.current].bundle
    }

    pub fn current_mut(&mut self) -> &mut SyncBundle {
        &mut self.slots[self.current].bundle
    }

    /// The (image-available, render-finished) semaphore pair of a slot.
    /// Image-available is handed to swapchain acquire; render-finished is
    /// signaled by the graph submission and waited on by present.
    pub fn swapchain_semaphores(&self, slot: usize) -> (Arc<dyn Semaphore>, Arc<dyn Semaphore>) {
        let slot = &self.slots[slot];
        (
            Arc::clone(&slot.image_available),
            Arc::clone(&slot.render_finished),
        )
    }

    /// Rotate to the next slot and wait for its previous submission to
    /// retire. This is the frame loop's only blocking point: when the GPU
    /// keeps up the wait returns immediately, when it is saturated this is
    /// where back-pressure appears.
    pub fn advance(&mut self) -> RdgResult<()> {
        self.current = (self.current + 1) % self.slots.len();
        let slot = &mut self.slots[self.current];
        slot.fence.wait(u64::MAX).map_err(RdgError::Sync)?;
        slot.fence.reset().map_err(RdgError::Sync)?;
        slot.bundle.clear_semaphores();
        Ok(())
    }

    /// Wait for every slot's fence; used for shutdown.
    pub fn wait_all(&self) -> RdgResult<()> {
        for slot in &self.slots {
            slot.fence.wait(u64::MAX).map_err(RdgError::Sync)?;
        }
        Ok(())
    }
}
