// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer allocation and circulation between the client, the component and
//! the surfaces.
//!
//! Every move goes through [`BufferPool::transfer`]; what happens to a buffer
//! once it is back with the driver is decided by the operation modes of the
//! active state.

use hcodec_sys::BufferHeader;
use tracing::{debug, error, info, warn};

use super::driver::{CodecCore, no_component, peer_violation};
use crate::{
    BufferAttr, BufferFlags, BufferId, Error, ErrorKind, Port, PortDefinition, Result,
    buffer::{
        AllocStrategy, BufferOperationMode, BufferPool, BufferRecord, HardwareMemory, Owner,
        Payload, SharedMemory, next_memory_handle,
    },
    surface::SurfaceBuffer,
    variant::OutputRoute,
};

impl CodecCore {
    pub(super) fn pool(&self, port: Port) -> &BufferPool {
        match port {
            Port::Input => &self.input_pool,
            Port::Output => &self.output_pool,
        }
    }

    pub(super) fn pool_mut(&mut self, port: Port) -> &mut BufferPool {
        match port {
            Port::Input => &mut self.input_pool,
            Port::Output => &mut self.output_pool,
        }
    }

    fn surface_backed(&self, port: Port) -> bool {
        match port {
            Port::Input => self.input_surface.is_some(),
            Port::Output => self.output_surface.is_some(),
        }
    }

    /// Lets the variant size the port's buffers and writes the result back
    /// when it differs from what the component offered.
    fn negotiate_buffers(&mut self, port: Port) -> Result<PortDefinition> {
        let surface_backed = self.surface_backed(port);
        let link = self.link.as_mut().ok_or_else(no_component)?;
        let mut def = link.port_definition(port)?;
        let offered = def.clone();
        self.variant.size_buffers(&mut def, &self.config, surface_backed);
        if def != offered {
            link.set_port_definition(&def)?;
            def = link.port_definition(port)?;
        }
        self.set_def(def.clone());
        Ok(def)
    }

    /// Allocates and registers every buffer of `port`.
    ///
    /// Records start out `Pending`. Ids are never reused within a codec.
    ///
    /// # Errors
    ///
    /// Fails on the first buffer the component or the surface refuses;
    /// buffers registered before that stay in the pool for the caller to free.
    pub(super) fn allocate_pool(&mut self, port: Port) -> Result<()> {
        let def = self.negotiate_buffers(port)?;
        let strategy = self
            .variant
            .alloc_strategy(port, self.surface_backed(port));
        for _ in 0..def.buffer_count {
            let id = BufferId(self.next_buffer_id);
            self.next_buffer_id += 1;
            let mut header = BufferHeader::new(id.0, port.index());
            header.alloc_len = def.buffer_size;
            let payload = match strategy {
                AllocStrategy::SharedMemory => {
                    let memory = SharedMemory::allocate(def.buffer_size as usize);
                    header.handle = memory.handle();
                    self.link_mut()?.use_buffer(port, &mut header)?;
                    Payload::Shared(memory)
                }
                AllocStrategy::Hardware => {
                    self.link_mut()?.allocate_buffer(port, &mut header)?;
                    Payload::Hardware(HardwareMemory {
                        handle: header.handle,
                        capacity: header.alloc_len,
                    })
                }
                AllocStrategy::Surface => {
                    let buffer = self.acquire_surface_buffer(port, id, &def)?;
                    header.handle = buffer.handle;
                    header.alloc_len = buffer.size;
                    let registered = self
                        .link_mut()
                        .and_then(|link| link.use_buffer(port, &mut header));
                    if let Err(error) = registered {
                        self.return_to_surface(port, &buffer);
                        return Err(error);
                    }
                    Payload::Surface(buffer)
                }
            };
            self.pool_mut(port)
                .insert(BufferRecord::new(id, port, payload, header))?;
        }
        info!(
            codec = %self.id,
            ?port,
            count = def.buffer_count,
            size = def.buffer_size,
            ?strategy,
            "Buffers allocated"
        );
        Ok(())
    }

    fn acquire_surface_buffer(
        &self,
        port: Port,
        id: BufferId,
        def: &PortDefinition,
    ) -> Result<SurfaceBuffer> {
        match port {
            Port::Output => {
                let surface = self
                    .output_surface
                    .as_ref()
                    .ok_or_else(|| Error::Fatal("no output surface".to_string()))?;
                surface
                    .request_buffer(def.width, def.height, def.color_format)?
                    .ok_or(Error::OutOfMemory)
            }
            Port::Input => {
                let input = self
                    .input_surface
                    .as_ref()
                    .ok_or_else(|| Error::Fatal("no input surface".to_string()))?;
                let buffer = SurfaceBuffer {
                    seq: id.0,
                    handle: next_memory_handle(),
                    width: def.width,
                    height: def.height,
                    color_format: def.color_format,
                    size: def.buffer_size,
                };
                input.surface.attach_buffer_to_queue(&buffer)?;
                Ok(buffer)
            }
        }
    }

    /// Gives a dequeued output buffer back to the display surface unshown.
    fn return_to_surface(&self, port: Port, buffer: &SurfaceBuffer) {
        if port != Port::Output {
            return;
        }
        if let Some(surface) = self.output_surface.as_ref() {
            if let Err(error) = surface.cancel_buffer(buffer) {
                warn!(codec = %self.id, seq = buffer.seq, "Failed to cancel surface buffer: {error}");
            }
        }
    }

    /// Unregisters a `Pending` record and drops it.
    pub(super) fn free_record(&mut self, port: Port, id: BufferId, return_to_surface: bool) {
        let record = match self.pool_mut(port).remove(id) {
            Ok(record) => record,
            Err(error) => {
                error!(codec = %self.id, buffer_id = id.0, ?port, "Cannot free buffer: {error}");
                return;
            }
        };
        if let Some(link) = self.link.as_mut() {
            if let Err(error) = link.free_buffer(port, id.0) {
                warn!(codec = %self.id, buffer_id = id.0, ?port, "Component failed to free buffer: {error}");
            }
        }
        if return_to_surface {
            if let Some(buffer) = record.payload().surface_buffer() {
                self.return_to_surface(port, buffer);
            }
        }
        debug!(codec = %self.id, buffer_id = id.0, ?port, "Buffer freed");
    }

    /// Frees every `Pending` record of `port`.
    pub(super) fn free_pool(&mut self, port: Port, return_to_surface: bool) {
        for id in self.pool(port).ids_owned_by(Owner::Pending) {
            self.free_record(port, id, return_to_surface);
        }
        let left = self.pool(port).len();
        if left > 0 {
            debug!(codec = %self.id, ?port, left, "Buffers still out after freeing pool");
        }
    }

    /// Takes back everything the client holds on `port`.
    pub(super) fn reclaim_from_app(&mut self, port: Port) -> usize {
        let ids = self.pool(port).ids_owned_by(Owner::WithApp);
        for &id in &ids {
            if let Err(error) = self
                .pool_mut(port)
                .transfer(id, Owner::WithApp, Owner::Pending)
            {
                error!(codec = %self.id, ?port, "Reclaim failed: {error}");
            }
        }
        if !ids.is_empty() {
            debug!(codec = %self.id, ?port, count = ids.len(), "Reclaimed buffers from client");
        }
        ids.len()
    }

    /// Offers an empty input buffer to its producer: the input surface if
    /// there is one, the client otherwise.
    pub(super) fn recycle_input(&mut self, id: BufferId) {
        let Some(record) = self.input_pool.get_mut(id) else {
            return;
        };
        record.reset_data();
        if let Some(input) = self.input_surface.clone() {
            let Some(buffer) = record.payload().surface_buffer().cloned() else {
                warn!(codec = %self.id, buffer_id = id.0, "Input buffer is not surface-backed");
                return;
            };
            if let Err(error) = self
                .input_pool
                .transfer(id, Owner::Pending, Owner::WithSurface)
            {
                self.fatal(error);
                return;
            }
            if let Err(error) = input.surface.cancel_buffer(&buffer) {
                warn!(codec = %self.id, buffer_id = id.0, "Input surface refused buffer: {error}");
                if let Err(error) = self
                    .input_pool
                    .transfer(id, Owner::WithSurface, Owner::Pending)
                {
                    error!(codec = %self.id, "{error}");
                }
            }
            return;
        }
        if let Err(error) = self.input_pool.transfer(id, Owner::Pending, Owner::WithApp) {
            self.fatal(error);
            return;
        }
        let Some(record) = self.input_pool.get(id) else {
            return;
        };
        match self.callback.as_mut() {
            Some(callback) => callback.on_input_buffer_available(id, record.payload()),
            None => warn!(codec = %self.id, buffer_id = id.0, "No callback for input buffer"),
        }
    }

    /// Hands a `Pending` input buffer to the component.
    pub(super) fn submit_input(&mut self, id: BufferId) {
        if let Err(error) = self.input_pool.transfer(id, Owner::Pending, Owner::WithPeer) {
            self.fatal(error);
            return;
        }
        let Some(header) = self.input_pool.get(id).map(|record| *record.header()) else {
            return;
        };
        let submitted = self
            .link_mut()
            .and_then(|link| link.empty_this_buffer(&header));
        if let Err(error) = submitted {
            if let Err(error) = self
                .input_pool
                .transfer(id, Owner::WithPeer, Owner::Pending)
            {
                error!(codec = %self.id, "{error}");
            }
            self.report(ErrorKind::PeerFailure, &error);
            self.recycle_input(id);
            return;
        }
        debug!(
            codec = %self.id,
            buffer_id = id.0,
            size = header.filled_len,
            pts_us = header.timestamp_us,
            flags = header.flags,
            "Input to component"
        );
    }

    /// Hands a `Pending` output buffer to the component to be filled.
    pub(super) fn refill_output(&mut self, id: BufferId) {
        let Some(record) = self.output_pool.get_mut(id) else {
            return;
        };
        record.reset_data();
        let header = *record.header();
        if let Err(error) = self
            .output_pool
            .transfer(id, Owner::Pending, Owner::WithPeer)
        {
            self.fatal(error);
            return;
        }
        let submitted = self
            .link_mut()
            .and_then(|link| link.fill_this_buffer(&header));
        if let Err(error) = submitted {
            if let Err(error) = self
                .output_pool
                .transfer(id, Owner::WithPeer, Owner::Pending)
            {
                error!(codec = %self.id, "{error}");
            }
            self.report(ErrorKind::PeerFailure, &error);
        }
    }

    fn deliver_output(&mut self, id: BufferId) {
        if let Err(error) = self.output_pool.transfer(id, Owner::Pending, Owner::WithApp) {
            self.fatal(error);
            return;
        }
        let Some(record) = self.output_pool.get(id) else {
            return;
        };
        let attr = record.attr();
        debug!(
            codec = %self.id,
            buffer_id = id.0,
            size = attr.size,
            pts_us = attr.pts_us,
            flags = attr.flags.0,
            "Output to client"
        );
        match self.callback.as_mut() {
            Some(callback) => callback.on_output_buffer_available(id, record.payload(), attr),
            None => warn!(codec = %self.id, buffer_id = id.0, "No callback for output buffer"),
        }
    }

    /// Queues a released output buffer for display. Without a surface the
    /// buffer is simply refilled.
    fn render_output(&mut self, id: BufferId) {
        let Some(surface) = self.output_surface.clone() else {
            debug!(codec = %self.id, buffer_id = id.0, "Render without output surface");
            self.refill_output(id);
            return;
        };
        let target = self.output_pool.get(id).and_then(|record| {
            record
                .payload()
                .surface_buffer()
                .map(|buffer| (buffer.clone(), record.attr().pts_us))
        });
        let Some((buffer, pts_us)) = target else {
            self.refill_output(id);
            return;
        };
        if let Err(error) = self
            .output_pool
            .transfer(id, Owner::Pending, Owner::WithSurface)
        {
            self.fatal(error);
            return;
        }
        if let Err(error) = surface.flush_buffer(&buffer, pts_us) {
            warn!(codec = %self.id, buffer_id = id.0, "Failed to queue frame for display: {error}");
            if let Err(error) = self
                .output_pool
                .transfer(id, Owner::WithSurface, Owner::Pending)
            {
                error!(codec = %self.id, "{error}");
                return;
            }
            self.refill_output(id);
            return;
        }
        debug!(codec = %self.id, buffer_id = id.0, pts_us, "Output rendered");
    }

    /// Applies the input mode of the current state to a returned buffer.
    fn after_input_returned(&mut self, id: BufferId) {
        if self.held_for_resume() {
            return;
        }
        match self.state.id().buffer_modes().0 {
            BufferOperationMode::Keep => {}
            BufferOperationMode::Resubmit => self.recycle_input(id),
            BufferOperationMode::Free => self.free_record(Port::Input, id, true),
        }
    }

    /// Applies the output mode of the current state to a returned buffer.
    ///
    /// Only a buffer fresh from the component carries data worth routing to
    /// the client; one back from the surface is refilled. After a flush
    /// everything stays `Pending` until the next start.
    pub(super) fn after_output_returned(&mut self, id: BufferId, filled: bool) {
        if self.held_for_resume() {
            debug!(codec = %self.id, buffer_id = id.0, "Holding output until start");
            return;
        }
        match self.state.id().buffer_modes().1 {
            BufferOperationMode::Keep => {}
            BufferOperationMode::Free => self.free_record(Port::Output, id, true),
            BufferOperationMode::Resubmit => {
                let route = match self.output_pool.get(id) {
                    Some(record) if filled => self.variant.route_output(&record.attr()),
                    _ => OutputRoute::Refill,
                };
                match route {
                    OutputRoute::ToApp => self.deliver_output(id),
                    OutputRoute::Refill => self.refill_output(id),
                }
            }
        }
    }

    pub(super) fn on_queue_input(&mut self, id: BufferId, attr: BufferAttr) {
        if let Err(error) = self.input_pool.transfer(id, Owner::WithApp, Owner::Pending) {
            if attr.flags.is_eos() {
                // The end of stream claimed by this call never happened.
                self.clear_input_eos();
            }
            self.report(error.kind(), &error);
            return;
        }
        if let Some(record) = self.input_pool.get_mut(id) {
            record.set_attr(&attr);
        }
        if attr.flags.is_eos() {
            info!(codec = %self.id, buffer_id = id.0, "Input end of stream queued");
        }
        if self.state.id().accepts_buffers() {
            self.submit_input(id);
        } else {
            debug!(codec = %self.id, buffer_id = id.0, state = ?self.state.id(), "Holding input buffer");
        }
    }

    pub(super) fn on_release_output(&mut self, id: BufferId, render: bool) {
        if let Err(error) = self.output_pool.transfer(id, Owner::WithApp, Owner::Pending) {
            self.report(error.kind(), &error);
            return;
        }
        match self.state.id().buffer_modes().1 {
            BufferOperationMode::Keep => {}
            BufferOperationMode::Free => self.free_record(Port::Output, id, true),
            BufferOperationMode::Resubmit if render => self.render_output(id),
            BufferOperationMode::Resubmit => self.refill_output(id),
        }
    }

    pub(super) fn on_empty_done(&mut self, header: &BufferHeader) {
        let id = BufferId(header.buffer_id);
        if let Err(error) = self.input_pool.transfer(id, Owner::WithPeer, Owner::Pending) {
            self.fatal(peer_violation(error));
            return;
        }
        if let Some(record) = self.input_pool.get_mut(id) {
            record.update_from_peer(header);
        }
        debug!(codec = %self.id, buffer_id = id.0, "Input consumed");
        self.after_input_returned(id);
        self.on_buffer_returned();
    }

    pub(super) fn on_fill_done(&mut self, header: &BufferHeader) {
        let id = BufferId(header.buffer_id);
        if let Err(error) = self.output_pool.transfer(id, Owner::WithPeer, Owner::Pending) {
            self.fatal(peer_violation(error));
            return;
        }
        if let Some(record) = self.output_pool.get_mut(id) {
            record.update_from_peer(header);
        }
        if BufferFlags(header.flags).is_eos() {
            info!(codec = %self.id, buffer_id = id.0, "Output end of stream");
        }
        self.after_output_returned(id, true);
        self.on_buffer_returned();
    }

    pub(super) fn on_surface_released(&mut self, port: Port) {
        match port {
            Port::Output => self.drain_output_surface(),
            Port::Input => self.drain_input_surface(),
        }
    }

    /// Takes back every output buffer the display surface is done with.
    pub(super) fn drain_output_surface(&mut self) {
        let (Some(surface), Some(def)) = (self.output_surface.clone(), self.output_def.clone())
        else {
            return;
        };
        for _ in 0..=self.output_pool.len() {
            let buffer = match surface.request_buffer(def.width, def.height, def.color_format) {
                Ok(Some(buffer)) => buffer,
                Ok(None) => break,
                Err(error) => {
                    warn!(codec = %self.id, "Failed to dequeue from output surface: {error}");
                    break;
                }
            };
            let id = match self.output_pool.find_by_surface_seq(buffer.seq) {
                Some(id)
                    if self
                        .output_pool
                        .get(id)
                        .is_some_and(|record| record.owner() == Owner::WithSurface) =>
                {
                    id
                }
                _ => {
                    debug!(codec = %self.id, seq = buffer.seq, "Surface returned an untracked buffer");
                    self.return_to_surface(Port::Output, &buffer);
                    break;
                }
            };
            if let Err(error) = self
                .output_pool
                .transfer(id, Owner::WithSurface, Owner::Pending)
            {
                self.fatal(error);
                return;
            }
            debug!(codec = %self.id, buffer_id = id.0, "Output back from surface");
            self.after_output_returned(id, false);
        }
    }

    /// Picks up frames the producer wrote into the input surface.
    fn drain_input_surface(&mut self) {
        let (Some(input), Some(def)) = (self.input_surface.clone(), self.input_def.clone()) else {
            return;
        };
        for _ in 0..=self.input_pool.len() {
            let buffer = match input
                .surface
                .request_buffer(def.width, def.height, def.color_format)
            {
                Ok(Some(buffer)) => buffer,
                Ok(None) => break,
                Err(error) => {
                    warn!(codec = %self.id, "Failed to take frame from input surface: {error}");
                    break;
                }
            };
            let id = match self.input_pool.find_by_surface_seq(buffer.seq) {
                Some(id)
                    if self
                        .input_pool
                        .get(id)
                        .is_some_and(|record| record.owner() == Owner::WithSurface) =>
                {
                    id
                }
                _ => {
                    debug!(codec = %self.id, seq = buffer.seq, "Input surface produced an untracked buffer");
                    break;
                }
            };
            if let Err(error) = self
                .input_pool
                .transfer(id, Owner::WithSurface, Owner::Pending)
            {
                self.fatal(error);
                return;
            }
            if !self.state.id().accepts_buffers() || self.held_for_resume() {
                debug!(codec = %self.id, buffer_id = id.0, "Holding surface frame");
                continue;
            }
            if self.input_eos_queued() && !self.eos_on_next_frame {
                debug!(codec = %self.id, buffer_id = id.0, "Dropping frame after end of stream");
                self.recycle_input(id);
                continue;
            }
            let mut flags = BufferFlags::NONE;
            if self.eos_on_next_frame {
                self.eos_on_next_frame = false;
                flags = BufferFlags::EOS;
                info!(codec = %self.id, buffer_id = id.0, "End of stream on surface frame");
            }
            let attr = BufferAttr {
                pts_us: self.next_surface_pts(def.frame_rate),
                offset: 0,
                size: buffer.size,
                flags,
            };
            if let Some(record) = self.input_pool.get_mut(id) {
                record.set_attr(&attr);
            }
            self.submit_input(id);
        }
    }

    /// Timestamp of the next frame taken from the input surface.
    pub(super) fn next_surface_pts(&mut self, frame_rate: f64) -> i64 {
        let frame_rate = if frame_rate > 0.0 {
            frame_rate
        } else {
            crate::variant::DEFAULT_FRAME_RATE
        };
        let pts = (self.surface_frames as f64 * 1_000_000.0 / frame_rate) as i64;
        self.surface_frames += 1;
        pts
    }

    /// Puts every `Pending` buffer back into circulation.
    pub(super) fn resubmit_all(&mut self) {
        for id in self.input_pool.ids_owned_by(Owner::Pending) {
            self.recycle_input(id);
        }
        for id in self.output_pool.ids_owned_by(Owner::Pending) {
            self.refill_output(id);
        }
    }
}
