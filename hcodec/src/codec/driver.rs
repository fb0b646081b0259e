// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Loop-thread side of a codec: owns the component, both pools and the
//! state, and dispatches every message to the active state.

use std::{
    collections::VecDeque,
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use hcodec_sys::{BufferHeader, ComponentFactory, PeerCallback};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{CallerInfo, CodecSnapshot, Msg, PeerEvent, Request, Shared};
use crate::{
    CodecCallback, CodecConfig, ComponentLink, Error, ErrorKind, FormatDescriptor, Port,
    PortDefinition, Result,
    buffer::BufferPool,
    looper::{Handler, LoopSender},
    state::{State, StateId},
    surface::{InputSurface, Surface, SurfaceFactory},
    variant::CodecVariant,
};

/// Forwards component callbacks onto the loop.
struct PeerEvents {
    sender: LoopSender<Msg>,
    instance: u64,
}

impl PeerEvents {
    fn forward(&self, event: PeerEvent) {
        if self
            .sender
            .post(Msg::Peer {
                instance: self.instance,
                event,
            })
            .is_err()
        {
            debug!(instance = self.instance, "Dropping component callback after loop exit");
        }
    }
}

impl PeerCallback for PeerEvents {
    fn event_handler(&self, event: u32, data1: u32, data2: u32) {
        self.forward(PeerEvent::Event {
            event,
            data1,
            data2,
        });
    }

    fn empty_buffer_done(&self, header: &BufferHeader) {
        self.forward(PeerEvent::EmptyDone(*header));
    }

    fn fill_buffer_done(&self, header: &BufferHeader) {
        self.forward(PeerEvent::FillDone(*header));
    }
}

pub(crate) struct CodecCore {
    pub(super) id: Uuid,
    pub(super) config: CodecConfig,
    pub(super) variant: Box<dyn CodecVariant>,
    factory: Arc<dyn ComponentFactory>,
    pub(super) surface_factory: Option<Arc<dyn SurfaceFactory>>,
    pub(super) sender: LoopSender<Msg>,
    shared: Arc<Shared>,

    pub(super) state: State,
    pub(super) link: Option<ComponentLink>,
    peer_instance: u64,
    pub(super) caller: Option<CallerInfo>,
    pub(super) callback: Option<Box<dyn CodecCallback>>,

    pub(super) format: Option<FormatDescriptor>,
    pub(super) input_def: Option<PortDefinition>,
    pub(super) output_def: Option<PortDefinition>,
    pub(super) input_pool: BufferPool,
    pub(super) output_pool: BufferPool,
    pub(super) next_buffer_id: u32,

    pub(super) output_surface: Option<Arc<dyn Surface>>,
    pub(super) input_surface: Option<InputSurface>,
    /// Tag the next frame taken from the input surface with EOS.
    pub(super) eos_on_next_frame: bool,
    pub(super) surface_frames: u64,

    /// Bumped on every transition; watchdogs of older generations are void.
    generation: u64,
    deferred: VecDeque<Request>,
    pub(super) poisoned: bool,
    /// The component asked for an output renegotiation while it could not
    /// be served.
    pub(super) port_change_pending: bool,
}

impl CodecCore {
    pub(super) fn new(
        id: Uuid,
        config: CodecConfig,
        variant: Box<dyn CodecVariant>,
        factory: Arc<dyn ComponentFactory>,
        surface_factory: Option<Arc<dyn SurfaceFactory>>,
        sender: LoopSender<Msg>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            id,
            config,
            variant,
            factory,
            surface_factory,
            sender,
            shared,
            state: State::Uninitialized,
            link: None,
            peer_instance: 0,
            caller: None,
            callback: None,
            format: None,
            input_def: None,
            output_def: None,
            input_pool: BufferPool::new(Port::Input),
            output_pool: BufferPool::new(Port::Output),
            next_buffer_id: 0,
            output_surface: None,
            input_surface: None,
            eos_on_next_frame: false,
            surface_frames: 0,
            generation: 0,
            deferred: VecDeque::new(),
            poisoned: false,
            port_change_pending: false,
        }
    }

    pub(super) fn link_mut(&mut self) -> Result<&mut ComponentLink> {
        self.link.as_mut().ok_or_else(no_component)
    }

    pub(super) fn def(&self, port: Port) -> Option<&PortDefinition> {
        match port {
            Port::Input => self.input_def.as_ref(),
            Port::Output => self.output_def.as_ref(),
        }
    }

    pub(super) fn set_def(&mut self, def: PortDefinition) {
        match def.port {
            Port::Input => self.input_def = Some(def),
            Port::Output => self.output_def = Some(def),
        }
    }

    /// Flushed and not resumed yet; returned buffers wait for the start.
    pub(super) fn held_for_resume(&self) -> bool {
        matches!(self.state, State::Running { flushed: true })
    }

    pub(super) fn clear_input_eos(&mut self) {
        self.shared.input_eos.store(false, Ordering::Release);
        self.eos_on_next_frame = false;
    }

    pub(super) fn input_eos_queued(&self) -> bool {
        self.shared.input_eos.load(Ordering::Acquire)
    }

    pub(super) fn mark_input_eos(&self) -> bool {
        self.shared
            .input_eos
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Switches state; the buffer modes switch with it. Arms the watchdog of
    /// the new state, if it has one.
    pub(super) fn transition(&mut self, next: State) {
        let from = self.state.id();
        let to = next.id();
        self.generation += 1;
        self.state = next;
        info!(codec = %self.id, ?from, ?to, generation = self.generation, "State transition");
        if let Some(timeout) = self.watchdog_for(to) {
            let watchdog = Msg::Watchdog {
                generation: self.generation,
            };
            if let Err(error) = self.sender.post_delayed(watchdog, timeout) {
                error!(codec = %self.id, "Failed to arm watchdog: {error}");
            }
        }
        self.publish();
    }

    fn watchdog_for(&self, state: StateId) -> Option<Duration> {
        match state {
            StateId::Starting => Some(self.config.starting_watchdog()),
            StateId::OutputPortChanged => Some(self.config.port_change_watchdog()),
            StateId::Flushing => Some(self.config.flushing_watchdog()),
            StateId::Stopping => Some(self.config.stopping_watchdog()),
            StateId::Uninitialized | StateId::Initialized | StateId::Running => None,
        }
    }

    /// Copies the diagnostic view out for [`super::HCodec::snapshot`].
    pub(super) fn publish(&self) {
        let snapshot = CodecSnapshot {
            state: self.state.id(),
            flushed: self.held_for_resume(),
            poisoned: self.poisoned,
            input_eos: self.input_eos_queued(),
            input: self.input_pool.counts(),
            output: self.output_pool.counts(),
            input_port: self.input_def.clone(),
            output_port: self.output_def.clone(),
        };
        *self.shared.snapshot.lock() = snapshot;
    }

    /// Instantiates a fresh component and enters `Initialized`.
    pub(super) fn create_component(&mut self) -> Result<()> {
        let name = if self.config.component_name.is_empty() {
            self.variant.kind().default_component_name().to_owned()
        } else {
            self.config.component_name.clone()
        };
        self.peer_instance += 1;
        let events = Arc::new(PeerEvents {
            sender: self.sender.clone(),
            instance: self.peer_instance,
        });
        let link = ComponentLink::create(self.factory.as_ref(), &name, events)?;
        info!(
            codec = %self.id,
            component = %name,
            caller = ?self.caller,
            "Component instantiated"
        );
        self.link = Some(link);
        self.transition(State::Initialized);
        Ok(())
    }

    /// Drops the component along with everything negotiated with it.
    pub(super) fn drop_component(&mut self) {
        if let Some(link) = self.link.take() {
            debug!(codec = %self.id, component = link.name(), "Component dropped");
        }
        self.format = None;
        self.input_def = None;
        self.output_def = None;
        if let Some(surface) = self.output_surface.take() {
            if let Err(error) = surface.set_release_listener(Box::new(|| {})) {
                warn!(codec = %self.id, "Failed to detach from output surface: {error}");
            }
        }
        if let Some(input) = self.input_surface.take() {
            if let Err(error) = input.surface.set_release_listener(Box::new(|| {})) {
                warn!(codec = %self.id, "Failed to detach from input surface: {error}");
            }
        }
        self.clear_input_eos();
        self.surface_frames = 0;
        self.port_change_pending = false;
    }

    /// Drops the component and instantiates a new one: configuration,
    /// surfaces and the fatal flag are cleared.
    pub(super) fn reset_component(&mut self) -> Result<()> {
        if self.link.is_some() {
            self.force_shutdown();
        }
        self.drop_component();
        self.poisoned = false;
        match self.create_component() {
            Ok(()) => Ok(()),
            Err(error) => {
                self.transition(State::Uninitialized);
                Err(error)
            }
        }
    }

    /// Pulls every buffer back regardless of owner and frees both pools.
    ///
    /// Buffers the driver held go back to their surface; buffers taken from
    /// the component, the client or a surface are written off.
    pub(super) fn force_shutdown(&mut self) {
        if let Some(link) = self.link.as_mut() {
            if let Err(error) = link.request_state(hcodec_sys::STATE_LOADED) {
                warn!(codec = %self.id, "Component refused to unload: {error}");
            }
        }
        self.free_pool(Port::Input, true);
        self.free_pool(Port::Output, true);
        let reclaimed = self.input_pool.reclaim_all() + self.output_pool.reclaim_all();
        warn!(codec = %self.id, reclaimed, "Forcing shutdown");
        self.free_pool(Port::Input, false);
        self.free_pool(Port::Output, false);
        self.clear_input_eos();
        self.port_change_pending = false;
    }

    /// Reports an asynchronous, non-fatal error to the client.
    pub(super) fn report(&mut self, kind: ErrorKind, error: &Error) {
        warn!(codec = %self.id, ?kind, code = error.code(), "{error}");
        if let Some(callback) = self.callback.as_mut() {
            callback.on_error(kind, error.code());
        }
    }

    /// Reports `error` as fatal once, fails the pending reply with it, forces
    /// a shutdown and refuses further starts until reset.
    pub(super) fn fatal(&mut self, error: Error) {
        let state = self.state.id();
        let code = error.code();
        error!(codec = %self.id, ?state, code, "Fatal: {error}");
        if let Some(callback) = self.callback.as_mut() {
            callback.on_error(ErrorKind::Fatal, code);
        }
        let reply = self.state.take_reply();
        self.force_shutdown();
        self.poisoned = true;
        if self.link.is_some() {
            self.transition(State::Initialized);
        } else {
            self.transition(State::Uninitialized);
        }
        if let Some(reply) = reply {
            reply.send(Err(error));
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        match msg {
            Msg::Request(request) => self.on_request(request),
            Msg::QueueInput { id, attr } => self.on_queue_input(id, attr),
            Msg::ReleaseOutput { id, render } => self.on_release_output(id, render),
            Msg::Peer { instance, event } => {
                if instance == self.peer_instance && self.link.is_some() {
                    self.on_peer_event(event);
                } else {
                    debug!(codec = %self.id, instance, ?event, "Ignoring event of a dropped component");
                }
            }
            Msg::SurfaceReleased(port) => self.on_surface_released(port),
            Msg::Watchdog { generation } => {
                if generation == self.generation {
                    self.on_watchdog();
                } else {
                    debug!(codec = %self.id, generation, current = self.generation, "Stale watchdog");
                }
            }
        }
    }

    fn on_request(&mut self, request: Request) {
        let state = self.state.id();
        let request = match request {
            Request::GetFormat(port, reply) => {
                let result = match self.def(port) {
                    Some(def) => Ok(self.variant.describe(def)),
                    None => Err(Error::invalid_state("get_format", state)),
                };
                reply.send(result);
                return;
            }
            other => other,
        };
        match state {
            StateId::Uninitialized => self.on_uninitialized_request(request),
            StateId::Initialized => self.on_initialized_request(request),
            StateId::Running => self.on_running_request(request),
            StateId::Starting
            | StateId::OutputPortChanged
            | StateId::Flushing
            | StateId::Stopping => {
                debug!(codec = %self.id, request = request.name(), ?state, "Deferring request");
                self.deferred.push_back(request);
            }
        }
    }

    /// Replays requests held by a transient state, in order, until the queue
    /// is empty or another transient state is entered.
    fn replay_deferred(&mut self) {
        while !self.state.id().is_transient() {
            let Some(request) = self.deferred.pop_front() else {
                break;
            };
            debug!(codec = %self.id, request = request.name(), "Replaying deferred request");
            self.on_request(request);
        }
    }

    fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::EmptyDone(header) => self.on_empty_done(&header),
            PeerEvent::FillDone(header) => self.on_fill_done(&header),
            PeerEvent::Event {
                event: hcodec_sys::EVENT_CMD_COMPLETE,
                data1,
                data2,
            } => self.on_command_complete(data1, data2),
            PeerEvent::Event {
                event: hcodec_sys::EVENT_ERROR,
                data1,
                ..
            } => self.on_peer_error(data1),
            PeerEvent::Event {
                event: hcodec_sys::EVENT_PORT_SETTINGS_CHANGED,
                data1,
                ..
            } => self.on_port_settings_changed(data1),
            PeerEvent::Event {
                event: hcodec_sys::EVENT_BUFFER_FLAG,
                data1,
                data2,
            } => debug!(codec = %self.id, port = data1, flags = data2, "Buffer flag event"),
            PeerEvent::Event { event, data1, data2 } => self.fatal(Error::Fatal(format!(
                "unknown component event {event:#x} ({data1}, {data2})"
            ))),
        }
    }

    fn on_peer_error(&mut self, status: u32) {
        let error = match Error::from_status(status) {
            Ok(()) => Error::Peer(status),
            Err(error) => error,
        };
        match self.state.id() {
            StateId::Starting => self.abort_start(error),
            StateId::Uninitialized | StateId::Initialized => {
                self.report(ErrorKind::PeerFailure, &error)
            }
            StateId::Running
            | StateId::OutputPortChanged
            | StateId::Flushing
            | StateId::Stopping => self.fatal(error),
        }
    }

    fn on_port_settings_changed(&mut self, port_index: u32) {
        if port_index != hcodec_sys::PORT_INDEX_OUTPUT {
            debug!(codec = %self.id, port_index, "Ignoring settings change of input port");
            return;
        }
        match self.state {
            State::Running { flushed: false } => self.begin_output_port_change(),
            State::Running { flushed: true } | State::Starting { .. } | State::Flushing { .. } => {
                debug!(codec = %self.id, "Output renegotiation postponed");
                self.port_change_pending = true;
            }
            State::OutputPortChanged { .. } | State::Stopping { .. } => {
                let state = self.state.id();
                self.fatal(Error::Fatal(format!("output settings changed while {state:?}")));
            }
            State::Uninitialized | State::Initialized => debug!(
                codec = %self.id,
                state = ?self.state.id(),
                "Ignoring output settings change of an idle component"
            ),
        }
    }
}

impl Handler for CodecCore {
    type Msg = Msg;

    fn handle(&mut self, msg: Msg) {
        self.dispatch(msg);
        self.replay_deferred();
        self.publish();
    }

    fn on_exit(&mut self) {
        for request in self.deferred.drain(..) {
            request.reject(Error::Other("Codec is shutting down.".to_string()));
        }
        if self.link.is_some() {
            if self.input_pool.len() + self.output_pool.len() > 0 {
                self.force_shutdown();
            }
            self.drop_component();
        }
        debug!(codec = %self.id, "Codec loop finished");
    }
}

/// Ownership errors against the component are never the client's fault.
pub(super) fn peer_violation(error: Error) -> Error {
    match error {
        Error::InvalidArgument(message) => {
            Error::Fatal(format!("component returned an unknown buffer: {message}"))
        }
        other => other,
    }
}

pub(super) fn no_component() -> Error {
    Error::Fatal("no component instance".to_string())
}
