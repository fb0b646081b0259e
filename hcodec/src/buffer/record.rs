// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Descriptor of one buffer slot.

use hcodec_sys::BufferHeader;

use super::{BufferAttr, BufferFlags, BufferId, Owner, Payload};
use crate::Port;

/// One buffer slot of a port.
///
/// The record owns its payload exclusively. `header` is the descriptor the
/// component sees; it is round-tripped unchanged except for the fields the
/// driver or component legitimately update (lengths, flags, timestamp).
#[derive(Debug)]
pub struct BufferRecord {
    id: BufferId,
    port: Port,
    pub(super) owner: Owner,
    payload: Payload,
    header: BufferHeader,
}

impl BufferRecord {
    /// Creates a driver-owned record.
    pub(crate) fn new(id: BufferId, port: Port, payload: Payload, header: BufferHeader) -> Self {
        Self {
            id,
            port,
            owner: Owner::Pending,
            payload,
            header,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn header(&self) -> &BufferHeader {
        &self.header
    }

    /// Attributes of the data currently described by the header.
    pub fn attr(&self) -> BufferAttr {
        BufferAttr {
            pts_us: self.header.timestamp_us,
            offset: self.header.offset,
            size: self.header.filled_len,
            flags: BufferFlags(self.header.flags),
        }
    }

    /// Records the client's description of an input buffer before submission.
    pub(crate) fn set_attr(&mut self, attr: &BufferAttr) {
        self.header.timestamp_us = attr.pts_us;
        self.header.offset = attr.offset;
        self.header.filled_len = attr.size;
        self.header.flags = attr.flags.0;
    }

    /// Takes over the data description from a completion callback.
    ///
    /// Identity fields (`buffer_id`, `port_index`, `handle`) are kept from the
    /// record; the component must not change them.
    pub(crate) fn update_from_peer(&mut self, from_peer: &BufferHeader) {
        self.header.filled_len = from_peer.filled_len;
        self.header.offset = from_peer.offset;
        self.header.flags = from_peer.flags;
        self.header.timestamp_us = from_peer.timestamp_us;
    }

    /// Clears the data description so the slot can be refilled.
    pub(crate) fn reset_data(&mut self) {
        self.header.filled_len = 0;
        self.header.offset = 0;
        self.header.flags = 0;
    }
}
