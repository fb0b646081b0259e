// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! # hcodec - hardware video codec driver
//!
//! Safe, message-driven driver for OMX-style hardware video components,
//! providing decode and encode with zero-copy buffer circulation between the
//! client, the component and display or producer surfaces.
//!
//! ## Overview
//!
//! A component is a remote codec instance reached through the raw RPC traits
//! of [`hcodec_sys`]. This crate wraps it in [`HCodec`]: a handle whose
//! requests are serialized onto one loop thread that owns the component, the
//! lifecycle state and every buffer record.
//!
//! ### Key Concepts
//!
//! - **State**: One of seven lifecycle states ([`StateId`]); transient ones
//!   defer client requests and are guarded by a watchdog
//! - **Buffer record**: One slot of a port ([`BufferRecord`]) with exactly
//!   one [`Owner`] at a time
//! - **Operation mode**: What the active state does with a buffer coming
//!   back to the driver ([`BufferOperationMode`])
//! - **Variant**: Decoder or encoder policy ([`CodecVariant`])
//! - **Surface**: Display target of decoded frames, or producer of frames to
//!   encode ([`Surface`])
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐  sync request / posted buffer  ┌──────────────┐
//! │ HCodec │ ─────────────────────────────► │ message loop │
//! └────────┘                                └──────┬───────┘
//!      ▲            CodecCallback                  │
//!      └───────────────────────────────────────────┤
//!                                                  ├─► ComponentLink ─► component
//!                                                  └─► Surface
//! ```
//!
//! Buffers move only along the edges `Pending <-> WithApp`,
//! `Pending <-> WithPeer` and `Pending <-> WithSurface`.
//!
//! ## Examples
//!
//! ### Decoding to client memory
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hcodec::{
//!     BufferAttr, BufferFlags, CallerInfo, CodecConfig, CodecKind, FormatDescriptor, HCodec,
//! };
//!
//! # fn main() -> Result<(), hcodec::Error> {
//! # let factory: Arc<dyn hcodec::sys::ComponentFactory> = unimplemented!();
//! # let callback: Box<dyn hcodec::CodecCallback> = unimplemented!();
//! let codec = HCodec::new(CodecConfig::default(), CodecKind::Decoder, factory)?;
//! codec.init(CallerInfo::current("player"))?;
//! codec.set_callback(callback)?;
//! codec.configure(
//!     &FormatDescriptor::new()
//!         .with("mime", "video/avc")
//!         .with("width", 1280i64)
//!         .with("height", 720i64),
//! )?;
//! codec.start()?;
//!
//! // Input buffers arrive through `on_input_buffer_available`; fill one
//! // and queue it back.
//! # let id = hcodec::BufferId(0);
//! codec.queue_input_buffer(
//!     id,
//!     BufferAttr {
//!         pts_us: 0,
//!         offset: 0,
//!         size: 4096,
//!         flags: BufferFlags::SYNC_FRAME,
//!     },
//! )?;
//!
//! codec.stop()?;
//! codec.release()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`HCodec`] is `Send + Sync`; every method may be called from any thread
//! - Callbacks run on the loop thread and must not call back into
//!   result-bearing methods of the same codec; those fail with an
//!   invalid-state error instead of deadlocking
//! - Component and surface notifications may arrive on any thread; they are
//!   posted to the loop and never touch driver state directly

mod buffer;
mod callback;
mod codec;
mod error;
mod format;
mod link;
mod looper;
mod state;
mod surface;

pub mod config;
pub mod variant;

pub use buffer::{
    AllocStrategy, BufferAttr, BufferFlags, BufferId, BufferOperationMode, BufferPool,
    BufferRecord, HardwareMemory, Owner, OwnerCounts, Payload, SharedMemory,
};
pub use callback::CodecCallback;
pub use codec::{CallerInfo, CodecSnapshot, HCodec};
pub use config::CodecConfig;
pub use error::{CODE_OWNERSHIP, CODE_SPURIOUS_EVENT, CODE_WATCHDOG, Error, ErrorKind, Result};
pub use format::*;
pub use link::ComponentLink;
pub use state::StateId;
pub use surface::{
    InputSurface, ReleaseListener, Surface, SurfaceBuffer, SurfaceFactory, SurfaceHandle,
};
pub use variant::{CodecKind, CodecVariant, Decoder, Encoder, OutputRoute};

/// Raw component interface and wire structures.
pub use hcodec_sys as sys;
