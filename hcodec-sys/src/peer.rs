// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Raw RPC surface of a component instance.
//!
//! These traits mirror the remote interface one-to-one: every outbound call
//! returns a [`Status`], and completions travel back on a separate inbound
//! channel ([`PeerCallback`]) that may be invoked from any thread.

use std::sync::Arc;

use crate::{BufferHeader, Command, PeerState, Status};

/// Outbound half of a connection to one component instance.
///
/// Calls are requests; their effects are reported asynchronously through the
/// [`PeerCallback`] the instance was created with.
pub trait ComponentPeer: Send {
    fn send_command(&mut self, cmd: Command, param: u32) -> Status;

    fn get_state(&mut self, state: &mut PeerState) -> Status;

    /// Asks the component to allocate memory for a buffer. On success the
    /// component fills `header.handle` and `header.alloc_len`.
    fn allocate_buffer(&mut self, port: u32, header: &mut BufferHeader) -> Status;

    /// Registers client-provided memory described by `header` with the component.
    fn use_buffer(&mut self, port: u32, header: &mut BufferHeader) -> Status;

    fn free_buffer(&mut self, port: u32, buffer_id: u32) -> Status;

    fn empty_this_buffer(&mut self, header: &BufferHeader) -> Status;

    fn fill_this_buffer(&mut self, header: &BufferHeader) -> Status;

    fn get_parameter(&mut self, index: u32, blob: &mut [u8]) -> Status;

    fn set_parameter(&mut self, index: u32, blob: &[u8]) -> Status;

    fn get_config(&mut self, index: u32, blob: &mut [u8]) -> Status;

    fn set_config(&mut self, index: u32, blob: &[u8]) -> Status;
}

/// Inbound half: asynchronous notifications from the component.
pub trait PeerCallback: Send + Sync {
    fn event_handler(&self, event: u32, data1: u32, data2: u32);

    fn empty_buffer_done(&self, header: &BufferHeader);

    fn fill_buffer_done(&self, header: &BufferHeader);
}

/// Creates component instances by name.
pub trait ComponentFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        callback: Arc<dyn PeerCallback>,
    ) -> Result<Box<dyn ComponentPeer>, Status>;
}
