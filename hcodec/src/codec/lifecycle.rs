// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Client requests per state, and the start, flush and stop sequences.

use std::sync::Arc;

use hcodec_sys::{
    ALL_PORTS, COMMAND_FLUSH, COMMAND_PORT_DISABLE, COMMAND_PORT_ENABLE, COMMAND_STATE_SET,
    PORT_INDEX_INPUT, PORT_INDEX_OUTPUT, PeerState, STATE_EXECUTING, STATE_IDLE, STATE_LOADED,
};
use tracing::{debug, error, info, warn};

use super::{
    Msg, Request,
    driver::{CodecCore, no_component},
};
use crate::{
    BufferAttr, BufferFlags, Error, ErrorKind, FormatDescriptor, Port, Result,
    buffer::Owner,
    looper::{LoopSender, Replier},
    state::{AfterStop, PortChangeStep, State, StateId},
    surface::{InputSurface, ReleaseListener, Surface, SurfaceHandle},
};

/// Listener that turns a surface's buffer-release signal into a loop message.
fn release_listener(sender: LoopSender<Msg>, port: Port) -> ReleaseListener {
    Box::new(move || {
        if sender.post(Msg::SurfaceReleased(port)).is_err() {
            debug!(?port, "Surface released a buffer after loop exit");
        }
    })
}

impl CodecCore {
    pub(super) fn on_uninitialized_request(&mut self, request: Request) {
        match request {
            Request::Init(caller, reply) => {
                info!(codec = %self.id, ?caller, "Init");
                self.caller = Some(caller);
                reply.send(self.create_component());
            }
            Request::SetCallback(callback, reply) => {
                self.callback = Some(callback);
                reply.send(Ok(()));
            }
            Request::Release(reply) => reply.send(Ok(())),
            Request::Reset(reply) => reply.send(self.reset_component()),
            other => reject(other, StateId::Uninitialized),
        }
    }

    pub(super) fn on_initialized_request(&mut self, request: Request) {
        match request {
            Request::SetCallback(callback, reply) => {
                self.callback = Some(callback);
                reply.send(Ok(()));
            }
            Request::Configure(format, reply) => reply.send(self.configure(format)),
            Request::SetOutputSurface(surface, reply) => {
                reply.send(self.set_output_surface(surface))
            }
            Request::CreateInputSurface(reply) => reply.send(self.create_input_surface()),
            Request::Start(reply) => self.begin_start(reply),
            Request::Release(reply) => {
                self.drop_component();
                self.transition(State::Uninitialized);
                info!(codec = %self.id, "Released");
                reply.send(Ok(()));
            }
            Request::Reset(reply) => reply.send(self.reset_component()),
            Request::SetParameter(format, reply) => reply.send(self.apply_parameters(&format)),
            other => reject(other, StateId::Initialized),
        }
    }

    pub(super) fn on_running_request(&mut self, request: Request) {
        match request {
            Request::Start(reply) => {
                if !matches!(self.state, State::Running { flushed: true }) {
                    reject(Request::Start(reply), StateId::Running);
                    return;
                }
                self.state = State::Running { flushed: false };
                info!(codec = %self.id, "Resuming after flush");
                self.resubmit_all();
                self.publish();
                reply.send(Ok(()));
                self.run_pending_port_change();
            }
            Request::Stop(reply) => self.begin_stop(reply, AfterStop::Initialized),
            Request::Release(reply) => self.begin_stop(reply, AfterStop::Release),
            Request::Reset(reply) => self.begin_stop(reply, AfterStop::Reset),
            Request::Flush(reply) => self.begin_flush(reply),
            Request::SetParameter(format, reply) => reply.send(self.apply_parameters(&format)),
            Request::RequestIdr(reply) => {
                let result = match self.link.as_mut() {
                    Some(link) => self.variant.request_idr(link),
                    None => Err(no_component()),
                };
                reply.send(result);
            }
            Request::NotifyEos(reply) => reply.send(self.notify_eos()),
            other => reject(other, StateId::Running),
        }
    }

    fn configure(&mut self, format: FormatDescriptor) -> Result<()> {
        if self.poisoned {
            return Err(Error::invalid_state("configure", StateId::Initialized));
        }
        let output_surface = self.output_surface.is_some();
        let link = self.link.as_mut().ok_or_else(no_component)?;
        if let Err(error) = self.variant.configure(link, &format, output_surface) {
            self.format = None;
            self.input_def = None;
            self.output_def = None;
            return Err(error);
        }
        if self.input_surface.is_some() {
            let mut def = link.port_definition(Port::Input)?;
            self.variant.use_input_surface(&mut def)?;
            link.set_port_definition(&def)?;
        }
        let input = link.port_definition(Port::Input)?;
        let output = link.port_definition(Port::Output)?;
        info!(
            codec = %self.id,
            width = input.width,
            height = input.height,
            input_buffers = input.buffer_count,
            output_buffers = output.buffer_count,
            "Configured"
        );
        self.input_def = Some(input);
        self.output_def = Some(output);
        self.format = Some(format);
        Ok(())
    }

    fn set_output_surface(&mut self, surface: Arc<dyn Surface>) -> Result<()> {
        if !self.variant.supports_output_surface() {
            return Err(Error::InvalidArgument(format!(
                "{:?} cannot render to a surface",
                self.variant.kind()
            )));
        }
        surface.set_release_listener(release_listener(self.sender.clone(), Port::Output))?;
        if let Some(previous) = self.output_surface.replace(surface) {
            if let Err(error) = previous.set_release_listener(Box::new(|| {})) {
                warn!(codec = %self.id, "Failed to detach from previous output surface: {error}");
            }
        }
        debug!(codec = %self.id, "Output surface set");
        Ok(())
    }

    fn create_input_surface(&mut self) -> Result<InputSurface> {
        let Some(mut def) = self.input_def.clone() else {
            return Err(Error::invalid_state(
                "create_input_surface",
                StateId::Initialized,
            ));
        };
        self.variant.use_input_surface(&mut def)?;
        let factory = self.surface_factory.clone().ok_or_else(|| {
            Error::InvalidArgument("no surface factory to create an input surface".to_string())
        })?;
        let link = self.link_mut()?;
        link.set_port_definition(&def)?;
        let def = link.port_definition(Port::Input)?;
        let surface = factory.create_input_surface(&def)?;
        surface.set_release_listener(release_listener(self.sender.clone(), Port::Input))?;
        let input = InputSurface {
            handle: SurfaceHandle::new(),
            surface,
        };
        info!(codec = %self.id, handle = %input.handle.0, "Input surface created");
        self.input_def = Some(def);
        if let Some(previous) = self.input_surface.replace(input.clone()) {
            if let Err(error) = previous.surface.set_release_listener(Box::new(|| {})) {
                warn!(codec = %self.id, "Failed to detach from previous input surface: {error}");
            }
        }
        Ok(input)
    }

    fn apply_parameters(&mut self, format: &FormatDescriptor) -> Result<()> {
        let link = self.link.as_mut().ok_or_else(no_component)?;
        self.variant.set_parameter(link, format)
    }

    fn notify_eos(&mut self) -> Result<()> {
        if self.input_surface.is_none() || !self.mark_input_eos() {
            return Err(Error::invalid_state("notify_eos", StateId::Running));
        }
        info!(codec = %self.id, "End of stream signalled on input surface");
        let Some(id) = self.input_pool.ids_owned_by(Owner::Pending).first().copied() else {
            self.eos_on_next_frame = true;
            return Ok(());
        };
        let frame_rate = self
            .input_def
            .as_ref()
            .map_or(crate::variant::DEFAULT_FRAME_RATE, |def| def.frame_rate);
        let attr = BufferAttr {
            pts_us: self.next_surface_pts(frame_rate),
            offset: 0,
            size: 0,
            flags: BufferFlags::EOS,
        };
        if let Some(record) = self.input_pool.get_mut(id) {
            record.set_attr(&attr);
        }
        self.submit_input(id);
        Ok(())
    }

    fn begin_start(&mut self, reply: Replier<()>) {
        if self.poisoned || self.input_def.is_none() || self.output_def.is_none() {
            reply.send(Err(Error::invalid_state("start", StateId::Initialized)));
            return;
        }
        if let Err(error) = self
            .link_mut()
            .and_then(|link| link.request_state(STATE_IDLE))
        {
            reply.send(Err(error));
            return;
        }
        // An end of stream queued while the last session was stopping
        // belongs to no stream.
        self.clear_input_eos();
        self.transition(State::Starting {
            reply: Some(reply),
            awaiting: STATE_IDLE,
        });
        let allocated = self
            .allocate_pool(Port::Input)
            .and_then(|()| self.allocate_pool(Port::Output));
        if let Err(error) = allocated {
            self.abort_start(error);
        }
    }

    /// Unwinds a failed start back to `Initialized` and fails the reply.
    pub(super) fn abort_start(&mut self, error: Error) {
        warn!(codec = %self.id, "Start failed: {error}");
        let reply = self.state.take_reply();
        self.force_shutdown();
        self.transition(State::Initialized);
        if let Some(reply) = reply {
            reply.send(Err(error));
        }
    }

    /// Enters `Running` and puts every buffer into circulation.
    pub(super) fn enter_running(&mut self) {
        self.transition(State::Running { flushed: false });
        self.resubmit_all();
        self.publish();
        self.run_pending_port_change();
    }

    fn run_pending_port_change(&mut self) {
        if self.port_change_pending && matches!(self.state, State::Running { flushed: false }) {
            self.port_change_pending = false;
            self.begin_output_port_change();
        }
    }

    fn begin_flush(&mut self, reply: Replier<()>) {
        self.reclaim_from_app(Port::Input);
        self.reclaim_from_app(Port::Output);
        if let Err(error) = self
            .link_mut()
            .and_then(|link| link.send_command(COMMAND_FLUSH, ALL_PORTS))
        {
            self.resubmit_all();
            reply.send(Err(error));
            return;
        }
        self.transition(State::Flushing {
            reply: Some(reply),
            input_done: false,
            output_done: false,
        });
    }

    fn begin_stop(&mut self, reply: Replier<()>, then: AfterStop) {
        self.reclaim_from_app(Port::Input);
        self.reclaim_from_app(Port::Output);
        if let Err(error) = self
            .link_mut()
            .and_then(|link| link.request_state(STATE_IDLE))
        {
            warn!(codec = %self.id, "Component refused to go idle, forcing: {error}");
            self.force_shutdown();
            self.finish_stop(Some(reply), then);
            return;
        }
        self.transition(State::Stopping {
            reply: Some(reply),
            awaiting: STATE_IDLE,
            then,
        });
    }

    pub(super) fn on_command_complete(&mut self, command: u32, param: u32) {
        debug!(
            codec = %self.id,
            command = hcodec_sys::command_name(command),
            param,
            state = ?self.state.id(),
            "Command complete"
        );
        let issued = self
            .link
            .as_mut()
            .is_some_and(|link| link.settle_command(command, param));
        if !issued {
            self.fatal(Error::Fatal(format!(
                "component completed {} ({param}) that was never sent",
                hcodec_sys::command_name(command)
            )));
            return;
        }
        match (&self.state, command) {
            (State::Starting { awaiting, .. }, COMMAND_STATE_SET) if *awaiting == param => {
                self.on_start_progress(param)
            }
            (State::Flushing { .. }, COMMAND_FLUSH) => self.on_flush_progress(param),
            (State::Stopping { awaiting, .. }, COMMAND_STATE_SET) if *awaiting == param => {
                self.on_stop_progress(param)
            }
            (
                State::OutputPortChanged {
                    step: PortChangeStep::Disabling,
                },
                COMMAND_PORT_DISABLE,
            ) if param == PORT_INDEX_OUTPUT => self.on_output_disabled(),
            (
                State::OutputPortChanged {
                    step: PortChangeStep::Enabling,
                },
                COMMAND_PORT_ENABLE,
            ) if param == PORT_INDEX_OUTPUT => self.on_output_enabled(),
            // Sent by a state that was left early, by a watchdog or a fatal
            // error.
            _ => debug!(codec = %self.id, command, param, "Late command completion"),
        }
    }

    fn on_start_progress(&mut self, reached: PeerState) {
        if reached == STATE_IDLE {
            if let Err(error) = self
                .link_mut()
                .and_then(|link| link.request_state(STATE_EXECUTING))
            {
                self.abort_start(error);
                return;
            }
            if let State::Starting { awaiting, .. } = &mut self.state {
                *awaiting = STATE_EXECUTING;
            }
            return;
        }
        let reply = self.state.take_reply();
        info!(codec = %self.id, "Started");
        self.enter_running();
        if let Some(reply) = reply {
            reply.send(Ok(()));
        }
    }

    fn on_flush_progress(&mut self, port_index: u32) {
        if let State::Flushing {
            input_done,
            output_done,
            ..
        } = &mut self.state
        {
            match port_index {
                ALL_PORTS => {
                    *input_done = true;
                    *output_done = true;
                }
                PORT_INDEX_INPUT => *input_done = true,
                PORT_INDEX_OUTPUT => *output_done = true,
                other => warn!(codec = %self.id, port_index = other, "Flush of unknown port"),
            }
        }
        self.check_flush_done();
    }

    /// Called after any buffer comes back.
    pub(super) fn on_buffer_returned(&mut self) {
        if matches!(self.state, State::Flushing { .. }) {
            self.check_flush_done();
        }
    }

    /// Completes the flush once both ports are flushed and nothing is left
    /// with the component or the client.
    fn check_flush_done(&mut self) {
        if !matches!(
            self.state,
            State::Flushing {
                input_done: true,
                output_done: true,
                ..
            }
        ) {
            return;
        }
        let outstanding: usize = [&self.input_pool, &self.output_pool]
            .iter()
            .map(|pool| {
                let counts = pool.counts();
                counts.with_peer + counts.with_app
            })
            .sum();
        if outstanding > 0 {
            debug!(codec = %self.id, outstanding, "Flush waiting for buffers");
            return;
        }
        let reply = self.state.take_reply();
        self.clear_input_eos();
        self.transition(State::Running { flushed: true });
        info!(codec = %self.id, "Flushed");
        if let Some(reply) = reply {
            reply.send(Ok(()));
        }
    }

    fn on_stop_progress(&mut self, reached: PeerState) {
        if reached == STATE_IDLE {
            self.reclaim_leftovers();
            if let Err(error) = self
                .link_mut()
                .and_then(|link| link.request_state(STATE_LOADED))
            {
                warn!(codec = %self.id, "Component refused to unload, forcing: {error}");
                self.force_shutdown();
                let (reply, then) = self.take_stop();
                self.finish_stop(reply, then);
                return;
            }
            if let State::Stopping { awaiting, .. } = &mut self.state {
                *awaiting = STATE_LOADED;
            }
            self.free_pool(Port::Input, true);
            self.free_pool(Port::Output, true);
            return;
        }
        let (reply, then) = self.take_stop();
        self.finish_stop(reply, then);
    }

    /// Once idle the component holds nothing; whatever is still out is
    /// taken back, and surface-held buffers are written off.
    fn reclaim_leftovers(&mut self) {
        for port in [Port::Input, Port::Output] {
            for owner in [Owner::WithPeer, Owner::WithApp, Owner::WithSurface] {
                for id in self.pool(port).ids_owned_by(owner) {
                    if owner == Owner::WithPeer {
                        warn!(codec = %self.id, buffer_id = id.0, ?port, "Component kept buffer while idle");
                    }
                    if let Err(error) = self.pool_mut(port).transfer(id, owner, Owner::Pending) {
                        error!(codec = %self.id, "{error}");
                        continue;
                    }
                    if owner == Owner::WithSurface {
                        self.free_record(port, id, false);
                    }
                }
            }
        }
    }

    fn take_stop(&mut self) -> (Option<Replier<()>>, AfterStop) {
        let then = match &self.state {
            State::Stopping { then, .. } => *then,
            _ => AfterStop::Initialized,
        };
        (self.state.take_reply(), then)
    }

    fn finish_stop(&mut self, reply: Option<Replier<()>>, then: AfterStop) {
        self.clear_input_eos();
        self.port_change_pending = false;
        let result = match then {
            AfterStop::Initialized => {
                self.transition(State::Initialized);
                info!(codec = %self.id, "Stopped");
                Ok(())
            }
            AfterStop::Release => {
                self.drop_component();
                self.transition(State::Uninitialized);
                info!(codec = %self.id, "Released");
                Ok(())
            }
            AfterStop::Reset => self.reset_component(),
        };
        if let Some(reply) = reply {
            reply.send(result);
        }
    }

    pub(super) fn on_watchdog(&mut self) {
        let state = self.state.id();
        error!(codec = %self.id, ?state, "Watchdog expired");
        match &self.state {
            State::Stopping {
                then: AfterStop::Release | AfterStop::Reset,
                ..
            } => {
                self.report(ErrorKind::PeerFailure, &Error::Timeout);
                let (reply, then) = self.take_stop();
                self.force_shutdown();
                self.finish_stop(reply, then);
            }
            State::Starting { .. }
            | State::Flushing { .. }
            | State::OutputPortChanged { .. }
            | State::Stopping { .. } => self.fatal(Error::Timeout),
            State::Uninitialized | State::Initialized | State::Running { .. } => {
                debug!(codec = %self.id, ?state, "Watchdog in a stable state")
            }
        }
    }
}

fn reject(request: Request, state: StateId) {
    let op = request.name();
    request.reject(Error::invalid_state(op, state));
}
