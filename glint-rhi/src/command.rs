//! Command pool management: one pool per recording thread, pooled
//! reference-counted command buffer handles, and queue submission.
//!
//! The thread that acquires a handle is the thread that records it; the
//! manager only shares the cross-thread pool map, never a pool itself.
//! Submitted handles are parked with their signal fence and recycled once
//! the fence reports signaled, so a command buffer is never reused while
//! the GPU may still be reading it.

use crate::{CommandList, CommandPool, Device, Fence, PipelineStages, Semaphore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

const ONETIME_TIMEOUT_NS: u64 = 10_000_000_000; // 10 s

struct PoolSlot {
    // Field order matters: recycled lists must drop before their pool.
    free: Vec<Box<dyn CommandList>>,
    pool: Box<dyn CommandPool>,
}

struct InFlight {
    fence: Arc<dyn Fence>,
    handles: Vec<CommandBufferHandle>,
}

pub struct CommandPoolManager {
    device: Arc<dyn Device>,
    pools: Mutex<HashMap<ThreadId, Arc<Mutex<PoolSlot>>>>,
    in_flight: Mutex<Vec<InFlight>>,
}

impl std::fmt::Debug for CommandPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPoolManager").finish_non_exhaustive()
    }
}

impl CommandPoolManager {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            pools: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Acquire a primary command buffer handle from the calling thread's pool,
    /// reusing a recycled one when available.
    pub fn acquire(&self) -> Result<CommandBufferHandle, String> {
        self.reclaim_completed();
        let tid = thread::current().id();
        let slot = {
            let mut pools = self.pools.lock().map_err(|e| format!("pool map lock: {}", e))?;
            match pools.get(&tid) {
                Some(slot) => Arc::clone(slot),
                None => {
                    let pool = self.device.create_command_pool()?;
                    log::debug!("created command pool for thread {:?}", tid);
                    let slot = Arc::new(Mutex::new(PoolSlot { pool, free: Vec::new() }));
                    pools.insert(tid, Arc::clone(&slot));
                    slot
                }
            }
        };
        let list = {
            let mut slot = slot.lock().map_err(|e| format!("pool lock: {}", e))?;
            match slot.free.pop() {
                Some(list) => list,
                None => slot.pool.allocate()?,
            }
        };
        Ok(CommandBufferHandle {
            inner: Arc::new(HandleInner {
                list: Mutex::new(Some(list)),
                home: slot,
                owner: tid,
            }),
        })
    }

    /// Submit recorded command buffers once. Each wait semaphore blocks the
    /// submission at its paired stages. Handles are retained internally until
    /// `signal_fence` signals; without a fence they are retained until the
    /// manager is dropped.
    pub fn submit(
        &self,
        command_buffers: &[&CommandBufferHandle],
        wait_semaphores: &[(&dyn Semaphore, PipelineStages)],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&Arc<dyn Fence>>,
    ) -> Result<(), String> {
        let guards: Vec<_> = command_buffers
            .iter()
            .map(|h| h.inner.list.lock().map_err(|e| format!("command list lock: {}", e)))
            .collect::<Result<_, _>>()?;
        let lists: Vec<&dyn CommandList> = guards
            .iter()
            .map(|g| {
                g.as_ref()
                    .map(|b| b.as_ref())
                    .ok_or_else(|| "command buffer already recycled".to_string())
            })
            .collect::<Result<_, _>>()?;
        self.device.queue().submit(
            &lists,
            wait_semaphores,
            signal_semaphores,
            signal_fence.map(|f| f.as_ref()),
        )?;
        drop(guards);
        if let Some(fence) = signal_fence {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|e| format!("in-flight lock: {}", e))?;
            in_flight.push(InFlight {
                fence: Arc::clone(fence),
                handles: command_buffers.iter().map(|h| (*h).clone()).collect(),
            });
        }
        Ok(())
    }

    /// Record, submit, and wait: the upload path. Blocks until the GPU is done.
    pub fn execute_onetime(
        &self,
        f: impl FnOnce(&mut dyn CommandList) -> Result<(), String>,
    ) -> Result<(), String> {
        let handle = self.acquire()?;
        handle.record(|cmd| {
            cmd.begin()?;
            f(cmd)?;
            cmd.end()
        })?;
        let fence: Arc<dyn Fence> = Arc::from(self.device.create_fence(false)?);
        self.submit(&[&handle], &[], &[], Some(&fence))?;
        fence.wait(ONETIME_TIMEOUT_NS)?;
        self.reclaim_completed();
        Ok(())
    }

    /// Drop in-flight records whose fence has signaled, returning their
    /// command buffers to the per-thread free lists.
    fn reclaim_completed(&self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.retain(|entry| !entry.fence.is_signaled().unwrap_or(false));
        }
    }
}

impl Drop for CommandPoolManager {
    fn drop(&mut self) {
        // Pools are destroyed next; make sure the GPU is no longer using them.
        let _ = self.device.wait_idle();
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.clear();
        }
    }
}

/// Reference-counted handle to a pooled primary command buffer. Cloning is
/// cheap; the backing command buffer returns to its pool's free list when the
/// last clone drops.
#[derive(Clone)]
pub struct CommandBufferHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    list: Mutex<Option<Box<dyn CommandList>>>,
    home: Arc<Mutex<PoolSlot>>,
    owner: ThreadId,
}

impl CommandBufferHandle {
    /// Record through the handle. Panics if called off the owning thread.
    pub fn record<R>(&self, f: impl FnOnce(&mut dyn CommandList) -> R) -> R {
        assert_eq!(
            thread::current().id(),
            self.inner.owner,
            "command buffer recorded off the thread that owns its pool"
        );
        let mut guard = self
            .inner
            .list
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_mut() {
            Some(list) => f(list.as_mut()),
            None => panic!("command buffer already recycled"),
        }
    }
}

impl std::fmt::Debug for CommandBufferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBufferHandle").finish()
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        let list = self
            .list
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(list) = list {
            if let Ok(mut slot) = self.home.lock() {
                slot.free.push(list);
            }
        }
    }
}
