// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Notifications from the driver to its client.

use crate::{
    ErrorKind, FormatDescriptor,
    buffer::{BufferAttr, BufferId, Payload},
};

/// Client callback registered with [`crate::HCodec::set_callback`].
///
/// All methods run on the codec's loop thread, one at a time. They may post
/// buffers back with [`crate::HCodec::queue_input_buffer`] or
/// [`crate::HCodec::release_output_buffer`], but a result-bearing call made
/// from inside a callback fails with an invalid-state error.
pub trait CodecCallback: Send {
    /// An asynchronous failure. [`ErrorKind::Fatal`] means the codec has shut
    /// itself down and needs `reset` or `release`.
    fn on_error(&mut self, kind: ErrorKind, code: i32);

    /// The output port was renegotiated mid-stream.
    fn on_output_format_changed(&mut self, format: &FormatDescriptor);

    /// Input buffer `id` is now owned by the client and may be filled.
    fn on_input_buffer_available(&mut self, id: BufferId, payload: &Payload);

    /// Output buffer `id` holds data described by `attr`.
    fn on_output_buffer_available(&mut self, id: BufferId, payload: &Payload, attr: BufferAttr);
}
