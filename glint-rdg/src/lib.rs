//! Glint RDG: a per-frame render dependency graph over `glint-rhi`.
//!
//! A frame declares transient and imported resources, records passes with
//! explicit read/write declarations, then calls [`RenderGraph::execute`].
//! Compilation culls passes that cannot reach an externally visible write,
//! computes resource lifetimes, aliases transient backings whose lifetimes
//! do not overlap, and synthesizes the pipeline barriers between passes.
//! Execution records everything into one primary command buffer and submits
//! it once with the caller's synchronization bundle.
//!
//! The graph object is single-use: build one per frame. The
//! [`TransientPool`] and [`FrameSyncManager`] are the only long-lived
//! pieces; the pool carries retired transient backings (and the graph
//! samplers) across frames so steady-state frames allocate nothing.

mod accessor;
mod compile;
mod execute;
mod graph;
mod handle;
mod pass;
mod pool;
mod registry;
mod sync;

#[cfg(test)]
pub(crate) mod test_rhi;

pub use accessor::{ResourceAccessor, SamplerKind};
pub use graph::RenderGraph;
pub use handle::{BufferHandle, TextureHandle};
pub use pass::{PassBuilder, PassCallback};
pub use pool::TransientPool;
pub use sync::{FrameSyncManager, SyncBundle};

use thiserror::Error;

/// Frame-pacing and pooling knobs for the long-lived graph collaborators.
#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    /// CPU lead over the GPU; 2 or 3 in practice.
    pub frames_in_flight: usize,
    /// Frames a pooled transient backing may sit unused before eviction.
    pub pool_max_idle_frames: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            pool_max_idle_frames: 3,
        }
    }
}

/// Errors surfaced by compile and execute. Programming errors (unknown
/// handles, invalid descriptors, a second depth attachment) panic at the
/// declaration site instead of being deferred here.
#[derive(Debug, Error)]
pub enum RdgError {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("command recording failed: {0}")]
    Recording(String),

    #[error("queue submission failed: {0}")]
    Submit(String),

    #[error("synchronization failure: {0}")]
    Sync(String),
}

/// Result type for graph operations.
pub type RdgResult<T> = Result<T, RdgError>;
