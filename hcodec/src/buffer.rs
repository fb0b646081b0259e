// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer records, payloads and the ownership protocol.
//!
//! Every buffer slot is a [`BufferRecord`] held in the [`BufferPool`] of its
//! port and addressed by a stable [`BufferId`]. Exactly one party owns a
//! record at any instant ([`Owner`]); ownership only ever moves between the
//! driver (`Pending`) and one other party.

pub mod pool;
pub mod record;

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::{Mutex, MutexGuard};

use crate::surface::SurfaceBuffer;

pub use pool::{BufferPool, OwnerCounts};
pub use record::BufferRecord;

/// Stable handle of one buffer slot, unique within a codec instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Party currently holding a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Held by the driver itself.
    Pending,
    WithApp,
    WithPeer,
    WithSurface,
}

impl Owner {
    /// Returns `true` if `from -> to` is an edge of the ownership graph.
    ///
    /// The graph is a star around `Pending`: every hand-off goes through the
    /// driver.
    pub fn can_transition(from: Owner, to: Owner) -> bool {
        from != to && (from == Owner::Pending || to == Owner::Pending)
    }
}

/// What happens to a buffer right after it comes back to the driver.
///
/// The mode is a property of the active state, not of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOperationMode {
    /// Leave it with the driver.
    Keep,
    /// Recirculate it: inputs to their producer, outputs to the component.
    Resubmit,
    /// Tear it down.
    Free,
}

/// Flag bits carried by a buffer, identical to the component's bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(pub u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const EOS: BufferFlags = BufferFlags(hcodec_sys::BUFFERFLAG_EOS);
    pub const SYNC_FRAME: BufferFlags = BufferFlags(hcodec_sys::BUFFERFLAG_SYNCFRAME);
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(hcodec_sys::BUFFERFLAG_CODECCONFIG);

    pub fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_eos(self) -> bool {
        self.contains(Self::EOS)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        BufferFlags(self.0 | rhs.0)
    }
}

/// Per-buffer metadata exchanged with the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferAttr {
    pub pts_us: i64,
    pub offset: u32,
    pub size: u32,
    pub flags: BufferFlags,
}

static NEXT_MEMORY_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle for driver-allocated memory.
pub(crate) fn next_memory_handle() -> u64 {
    NEXT_MEMORY_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// Driver-allocated memory shared with the component by handle.
///
/// Clones share the same bytes; the record stays the single owner in terms
/// of the ownership protocol.
#[derive(Debug, Clone)]
pub struct SharedMemory {
    handle: u64,
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedMemory {
    pub(crate) fn allocate(size: usize) -> Self {
        Self {
            handle: next_memory_handle(),
            data: Arc::new(Mutex::new(vec![0; size])),
        }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn capacity(&self) -> usize {
        self.data.lock().len()
    }

    /// Locks the bytes for reading or writing.
    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }
}

/// Component-allocated hardware (DMA) memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareMemory {
    pub handle: u64,
    pub capacity: u32,
}

/// Memory backing one buffer record.
#[derive(Debug, Clone)]
pub enum Payload {
    Shared(SharedMemory),
    Hardware(HardwareMemory),
    Surface(SurfaceBuffer),
}

impl Payload {
    /// Handle written into the component-visible descriptor.
    pub fn handle(&self) -> u64 {
        match self {
            Payload::Shared(memory) => memory.handle(),
            Payload::Hardware(memory) => memory.handle,
            Payload::Surface(buffer) => buffer.handle,
        }
    }

    pub fn capacity(&self) -> u32 {
        match self {
            Payload::Shared(memory) => memory.capacity() as u32,
            Payload::Hardware(memory) => memory.capacity,
            Payload::Surface(buffer) => buffer.size,
        }
    }

    pub fn surface_buffer(&self) -> Option<&SurfaceBuffer> {
        match self {
            Payload::Surface(buffer) => Some(buffer),
            _ => None,
        }
    }
}

/// How a port's buffers are backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStrategy {
    /// Driver-allocated shared memory registered with `use_buffer`.
    SharedMemory,
    /// Component-allocated memory via `allocate_buffer`.
    Hardware,
    /// Surface buffers registered with `use_buffer`.
    Surface,
}
