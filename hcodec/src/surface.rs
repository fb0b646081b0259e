// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Display-surface collaborator.
//!
//! A surface is a buffer queue shared with a compositor (output side) or
//! with a frame producer (input side). The driver only borrows surface
//! buffers; whichever side currently holds one is tracked by the owning
//! [`crate::BufferRecord`].

use std::sync::Arc;

use uuid::Uuid;

use crate::{PortDefinition, Result};

/// Callback installed with [`Surface::set_release_listener`].
pub type ReleaseListener = Box<dyn Fn() + Send + Sync>;

/// One graphic buffer belonging to a surface queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBuffer {
    /// Queue-unique sequence number; stable for the buffer's lifetime.
    pub seq: u32,
    /// Native memory handle shared with the component.
    pub handle: u64,
    pub width: u32,
    pub height: u32,
    pub color_format: u32,
    pub size: u32,
}

/// Buffer-queue surface consumed or fed by the codec.
///
/// Implementations must be callable from the codec's loop thread; the release
/// listener may be invoked from any thread.
pub trait Surface: Send + Sync {
    /// Dequeues a buffer the caller may use. `None` means the queue has
    /// nothing to hand out right now.
    fn request_buffer(
        &self,
        width: u32,
        height: u32,
        color_format: u32,
    ) -> Result<Option<SurfaceBuffer>>;

    /// Returns a dequeued buffer without content.
    fn cancel_buffer(&self, buffer: &SurfaceBuffer) -> Result<()>;

    /// Queues a buffer with content for consumption.
    fn flush_buffer(&self, buffer: &SurfaceBuffer, pts_us: i64) -> Result<()>;

    /// Adds a buffer that was allocated elsewhere to this surface's queue.
    fn attach_buffer_to_queue(&self, buffer: &SurfaceBuffer) -> Result<()>;

    /// Installs the callback fired whenever a buffer becomes available to
    /// [`Self::request_buffer`] again.
    fn set_release_listener(&self, listener: ReleaseListener) -> Result<()>;
}

/// Creates producer surfaces for encoders fed from graphics.
pub trait SurfaceFactory: Send + Sync {
    fn create_input_surface(&self, def: &PortDefinition) -> Result<Arc<dyn Surface>>;
}

/// Client-visible identity of an input surface created by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub Uuid);

impl SurfaceHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Result of [`crate::HCodec::create_input_surface`]: the producer renders
/// into `surface`, `handle` names it in logs and diagnostics.
#[derive(Clone)]
pub struct InputSurface {
    pub handle: SurfaceHandle,
    pub surface: Arc<dyn Surface>,
}

impl std::fmt::Debug for InputSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSurface")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
