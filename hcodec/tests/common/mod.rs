// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Scripted component and surfaces for driving a codec without hardware.
//!
//! The fake component follows the command/completion protocol closely
//! enough for the driver: state changes to idle complete once both ports are
//! populated, unloading completes once every buffer is freed, flushes and
//! disables hand held buffers back first. Every consumed input with data is
//! echoed into the next free output buffer.

#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    sync::{Arc, Once, mpsc},
    time::{Duration, Instant},
};

use bytemuck::{bytes_of, pod_read_unaligned};
use hcodec::{
    BufferAttr, BufferId, CallerInfo, CodecCallback, CodecConfig, CodecKind, CodecSnapshot,
    Encoder, Error, ErrorKind, FormatDescriptor, HCodec, Payload, PortDefinition,
    ReleaseListener, Result, Surface, SurfaceBuffer, SurfaceFactory,
    sys::{
        self, BufferHeader, ComponentFactory, ComponentPeer, PeerCallback, PeerState,
        PortDefinitionParam, Status, init_param,
    },
};
use parking_lot::Mutex;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: Once = Once::new();

/// How long a test waits for an asynchronous effect before failing.
pub const WAIT: Duration = Duration::from_secs(3);

pub const INPUT_BUFFERS: u32 = 4;
pub const OUTPUT_BUFFERS: u32 = 4;

pub fn init_tracing() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

/// Short watchdogs so timeout paths run quickly; the sync timeout stays
/// well above them.
pub fn test_config() -> CodecConfig {
    CodecConfig {
        sync_timeout_ms: 4000,
        starting_watchdog_ms: 500,
        port_change_watchdog_ms: 1500,
        flushing_watchdog_ms: 1500,
        stopping_watchdog_ms: 1500,
        ..CodecConfig::default()
    }
}

pub fn decoder_format(width: u32, height: u32) -> FormatDescriptor {
    FormatDescriptor::new()
        .with("mime", "video/avc")
        .with("width", width)
        .with("height", height)
        .with("frame_rate", 30.0)
}

pub fn encoder_format(width: u32, height: u32) -> FormatDescriptor {
    FormatDescriptor::new()
        .with("mime", "video/avc")
        .with("width", width)
        .with("height", height)
        .with("frame_rate", 30.0)
        .with("bitrate", 2_000_000u32)
        .with("bitrate_mode", "CBR")
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

struct FakePort {
    def: PortDefinitionParam,
    registered: Vec<u32>,
    held: VecDeque<BufferHeader>,
}

impl FakePort {
    fn new(index: u32, count: u32) -> Self {
        let mut def = init_param::<PortDefinitionParam>();
        def.port_index = index;
        def.dir = if index == sys::PORT_INDEX_INPUT {
            sys::DIR_INPUT
        } else {
            sys::DIR_OUTPUT
        };
        def.domain = sys::DOMAIN_VIDEO;
        def.enabled = 1;
        def.buffer_count_actual = count;
        def.buffer_count_min = 2;
        def.buffer_size = 64 * 1024;
        def.video.frame_rate_q16 = 30 << 16;
        Self {
            def,
            registered: Vec::new(),
            held: VecDeque::new(),
        }
    }

    fn populated(&self) -> bool {
        self.registered.len() as u32 >= self.def.buffer_count_actual
    }
}

struct Inner {
    callback: Option<Arc<dyn PeerCallback>>,
    names: Vec<String>,
    state: PeerState,
    pending_state: Option<PeerState>,
    ports: [FakePort; 2],
    disabling: bool,
    enabling: bool,
    /// Swallow every command completion.
    silent: bool,
    /// Consumed input data waiting for a free output buffer.
    backlog: VecDeque<BufferHeader>,
    params: HashMap<(u32, u32), Vec<u8>>,
    idr_requests: usize,
    inputs_consumed: usize,
}

impl Inner {
    fn new() -> Self {
        Self {
            callback: None,
            names: Vec::new(),
            state: sys::STATE_LOADED,
            pending_state: None,
            ports: [
                FakePort::new(sys::PORT_INDEX_INPUT, INPUT_BUFFERS),
                FakePort::new(sys::PORT_INDEX_OUTPUT, OUTPUT_BUFFERS),
            ],
            disabling: false,
            enabling: false,
            silent: false,
            backlog: VecDeque::new(),
            params: HashMap::new(),
            idr_requests: 0,
            inputs_consumed: 0,
        }
    }

    /// New instance: fresh ports and parameters, behaviour switches kept.
    fn reinstantiate(&mut self, name: &str, callback: Arc<dyn PeerCallback>) {
        let names = std::mem::take(&mut self.names);
        let silent = self.silent;
        let idr_requests = self.idr_requests;
        *self = Inner::new();
        self.names = names;
        self.names.push(name.to_owned());
        self.silent = silent;
        self.idr_requests = idr_requests;
        self.callback = Some(callback);
    }

    fn event(&self, event: u32, data1: u32, data2: u32) {
        if let Some(callback) = &self.callback {
            callback.event_handler(event, data1, data2);
        }
    }

    fn complete(&self, command: u32, param: u32) {
        if !self.silent {
            self.event(sys::EVENT_CMD_COMPLETE, command, param);
        }
    }

    fn return_held(&mut self, port: usize) {
        let held: Vec<BufferHeader> = self.ports[port].held.drain(..).collect();
        let Some(callback) = self.callback.clone() else {
            return;
        };
        for mut header in held {
            if port == sys::PORT_INDEX_INPUT as usize {
                callback.empty_buffer_done(&header);
            } else {
                header.filled_len = 0;
                header.flags = 0;
                callback.fill_buffer_done(&header);
            }
        }
    }

    /// Completes whatever pending command is now satisfied.
    fn settle(&mut self) {
        match self.pending_state {
            Some(sys::STATE_IDLE) if self.ports.iter().all(FakePort::populated) => {
                self.pending_state = None;
                self.state = sys::STATE_IDLE;
                self.complete(sys::COMMAND_STATE_SET, sys::STATE_IDLE);
            }
            Some(sys::STATE_LOADED) if self.ports.iter().all(|port| port.registered.is_empty()) => {
                self.pending_state = None;
                self.state = sys::STATE_LOADED;
                self.complete(sys::COMMAND_STATE_SET, sys::STATE_LOADED);
            }
            _ => {}
        }
        let output = &self.ports[sys::PORT_INDEX_OUTPUT as usize];
        if self.disabling && output.registered.is_empty() {
            self.disabling = false;
            self.ports[sys::PORT_INDEX_OUTPUT as usize].def.enabled = 0;
            self.complete(sys::COMMAND_PORT_DISABLE, sys::PORT_INDEX_OUTPUT);
        } else if self.enabling && output.populated() {
            self.enabling = false;
            self.complete(sys::COMMAND_PORT_ENABLE, sys::PORT_INDEX_OUTPUT);
        }
    }

    /// Pairs consumed input data with free output buffers.
    fn produce(&mut self) {
        let output = sys::PORT_INDEX_OUTPUT as usize;
        if self.disabling || self.ports[output].def.enabled == 0 {
            return;
        }
        while !self.backlog.is_empty() && !self.ports[output].held.is_empty() {
            let (Some(data), Some(mut header)) = (
                self.backlog.pop_front(),
                self.ports[output].held.pop_front(),
            ) else {
                break;
            };
            header.filled_len = data.filled_len;
            header.offset = 0;
            header.flags = data.flags;
            header.timestamp_us = data.timestamp_us;
            if let Some(callback) = &self.callback {
                callback.fill_buffer_done(&header);
            }
        }
    }

    fn set_state(&mut self, target: PeerState) -> Status {
        if target == self.state && self.pending_state.is_none() {
            self.complete(sys::COMMAND_STATE_SET, target);
            return sys::ERR_NONE;
        }
        match (self.state, target) {
            (sys::STATE_IDLE, sys::STATE_EXECUTING) => {
                self.state = sys::STATE_EXECUTING;
                self.complete(sys::COMMAND_STATE_SET, target);
            }
            (sys::STATE_EXECUTING, sys::STATE_IDLE) => {
                self.return_held(0);
                self.return_held(1);
                self.backlog.clear();
                self.state = sys::STATE_IDLE;
                self.complete(sys::COMMAND_STATE_SET, target);
            }
            (_, sys::STATE_IDLE | sys::STATE_LOADED) => {
                self.pending_state = Some(target);
                self.settle();
            }
            _ => return sys::ERR_INCORRECT_STATE_TRANSITION,
        }
        sys::ERR_NONE
    }

    fn port_mut(&mut self, port: u32) -> Option<&mut FakePort> {
        self.ports.get_mut(port as usize)
    }
}

/// Port index every parameter structure carries right after its header.
fn param_port(blob: &[u8]) -> Option<u32> {
    blob.get(8..12).map(pod_read_unaligned::<u32>)
}

struct FakePeer {
    inner: Arc<Mutex<Inner>>,
}

impl ComponentPeer for FakePeer {
    fn send_command(&mut self, cmd: u32, param: u32) -> Status {
        let mut inner = self.inner.lock();
        match cmd {
            sys::COMMAND_STATE_SET => inner.set_state(param),
            sys::COMMAND_FLUSH => {
                inner.return_held(0);
                inner.return_held(1);
                inner.backlog.clear();
                for port in [sys::PORT_INDEX_INPUT, sys::PORT_INDEX_OUTPUT] {
                    if param == sys::ALL_PORTS || param == port {
                        inner.complete(sys::COMMAND_FLUSH, port);
                    }
                }
                sys::ERR_NONE
            }
            sys::COMMAND_PORT_DISABLE if param == sys::PORT_INDEX_OUTPUT => {
                inner.return_held(1);
                inner.disabling = true;
                inner.settle();
                sys::ERR_NONE
            }
            sys::COMMAND_PORT_ENABLE if param == sys::PORT_INDEX_OUTPUT => {
                inner.ports[1].def.enabled = 1;
                inner.enabling = true;
                inner.settle();
                sys::ERR_NONE
            }
            _ => sys::ERR_BAD_PARAMETER,
        }
    }

    fn get_state(&mut self, state: &mut PeerState) -> Status {
        *state = self.inner.lock().state;
        sys::ERR_NONE
    }

    fn allocate_buffer(&mut self, port: u32, header: &mut BufferHeader) -> Status {
        let mut inner = self.inner.lock();
        let Some(fake) = inner.port_mut(port) else {
            return sys::ERR_BAD_PORT_INDEX;
        };
        header.handle = 0xA000 + u64::from(header.buffer_id);
        header.alloc_len = fake.def.buffer_size;
        fake.registered.push(header.buffer_id);
        inner.settle();
        sys::ERR_NONE
    }

    fn use_buffer(&mut self, port: u32, header: &mut BufferHeader) -> Status {
        let mut inner = self.inner.lock();
        let Some(fake) = inner.port_mut(port) else {
            return sys::ERR_BAD_PORT_INDEX;
        };
        fake.registered.push(header.buffer_id);
        inner.settle();
        sys::ERR_NONE
    }

    fn free_buffer(&mut self, port: u32, buffer_id: u32) -> Status {
        let mut inner = self.inner.lock();
        let Some(fake) = inner.port_mut(port) else {
            return sys::ERR_BAD_PORT_INDEX;
        };
        let Some(position) = fake.registered.iter().position(|id| *id == buffer_id) else {
            return sys::ERR_BAD_PARAMETER;
        };
        fake.registered.remove(position);
        fake.held.retain(|header| header.buffer_id != buffer_id);
        inner.settle();
        sys::ERR_NONE
    }

    fn empty_this_buffer(&mut self, header: &BufferHeader) -> Status {
        let mut inner = self.inner.lock();
        if inner.state != sys::STATE_EXECUTING {
            return sys::ERR_INCORRECT_STATE_OPERATION;
        }
        inner.inputs_consumed += 1;
        if let Some(callback) = &inner.callback {
            callback.empty_buffer_done(header);
        }
        if header.filled_len > 0 || header.flags & sys::BUFFERFLAG_EOS != 0 {
            inner.backlog.push_back(*header);
            inner.produce();
        }
        sys::ERR_NONE
    }

    fn fill_this_buffer(&mut self, header: &BufferHeader) -> Status {
        let mut inner = self.inner.lock();
        let output = &inner.ports[sys::PORT_INDEX_OUTPUT as usize];
        if inner.state != sys::STATE_EXECUTING || output.def.enabled == 0 || inner.disabling {
            return sys::ERR_INCORRECT_STATE_OPERATION;
        }
        inner.ports[1].held.push_back(*header);
        inner.produce();
        sys::ERR_NONE
    }

    fn get_parameter(&mut self, index: u32, blob: &mut [u8]) -> Status {
        let inner = self.inner.lock();
        let Some(port) = param_port(blob) else {
            return sys::ERR_BAD_PARAMETER;
        };
        if index == sys::INDEX_PARAM_PORT_DEFINITION {
            let Some(fake) = inner.ports.get(port as usize) else {
                return sys::ERR_BAD_PORT_INDEX;
            };
            let bytes = bytes_of(&fake.def);
            if blob.len() != bytes.len() {
                return sys::ERR_BAD_PARAMETER;
            }
            blob.copy_from_slice(bytes);
            return sys::ERR_NONE;
        }
        if let Some(stored) = inner.params.get(&(index, port)) {
            if stored.len() == blob.len() {
                blob.copy_from_slice(stored);
            }
        }
        sys::ERR_NONE
    }

    fn set_parameter(&mut self, index: u32, blob: &[u8]) -> Status {
        let mut inner = self.inner.lock();
        let Some(port) = param_port(blob) else {
            return sys::ERR_BAD_PARAMETER;
        };
        if index == sys::INDEX_PARAM_PORT_DEFINITION {
            if blob.len() != std::mem::size_of::<PortDefinitionParam>() {
                return sys::ERR_BAD_PARAMETER;
            }
            let mut def: PortDefinitionParam = pod_read_unaligned(blob);
            let Some(fake) = inner.port_mut(port) else {
                return sys::ERR_BAD_PORT_INDEX;
            };
            if def.buffer_count_actual < fake.def.buffer_count_min {
                return sys::ERR_BAD_PARAMETER;
            }
            def.dir = fake.def.dir;
            def.domain = fake.def.domain;
            def.enabled = fake.def.enabled;
            def.buffer_count_min = fake.def.buffer_count_min;
            fake.def = def;
            return sys::ERR_NONE;
        }
        inner.params.insert((index, port), blob.to_vec());
        sys::ERR_NONE
    }

    fn get_config(&mut self, index: u32, blob: &mut [u8]) -> Status {
        self.get_parameter(index, blob)
    }

    fn set_config(&mut self, index: u32, blob: &[u8]) -> Status {
        if index == sys::INDEX_CONFIG_INTRA_VOP_REFRESH {
            self.inner.lock().idr_requests += 1;
        }
        self.set_parameter(index, blob)
    }
}

/// Factory handing out instances of the scripted component. Clones share
/// the same instance state.
#[derive(Clone)]
pub struct FakeComponent {
    inner: Arc<Mutex<Inner>>,
}

impl FakeComponent {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    /// Stops sending command completions, so transient states never end.
    pub fn set_silent(&self, silent: bool) {
        self.inner.lock().silent = silent;
    }

    /// Pretends the stream switched to a new frame size.
    pub fn trigger_output_change(&self, width: u32, height: u32, buffer_count: u32) {
        let inner = &mut *self.inner.lock();
        let def = &mut inner.ports[sys::PORT_INDEX_OUTPUT as usize].def;
        def.video.frame_width = width;
        def.video.frame_height = height;
        def.video.stride = width as i32;
        def.video.slice_height = height;
        def.buffer_size = width * height * 3 / 2;
        def.buffer_count_actual = buffer_count;
        inner.event(sys::EVENT_PORT_SETTINGS_CHANGED, sys::PORT_INDEX_OUTPUT, 0);
    }

    /// Delivers a raw component event, as if the hardware raised it.
    pub fn inject_event(&self, event: u32, data1: u32, data2: u32) {
        self.inner.lock().event(event, data1, data2);
    }

    pub fn instances(&self) -> usize {
        self.inner.lock().names.len()
    }

    pub fn last_name(&self) -> Option<String> {
        self.inner.lock().names.last().cloned()
    }

    pub fn registered(&self, port: u32) -> usize {
        self.inner.lock().ports[port as usize].registered.len()
    }

    pub fn idr_requests(&self) -> usize {
        self.inner.lock().idr_requests
    }

    pub fn inputs_consumed(&self) -> usize {
        self.inner.lock().inputs_consumed
    }

    pub fn peer_state(&self) -> PeerState {
        self.inner.lock().state
    }
}

impl ComponentFactory for FakeComponent {
    fn create(
        &self,
        name: &str,
        callback: Arc<dyn PeerCallback>,
    ) -> std::result::Result<Box<dyn ComponentPeer>, Status> {
        if name.is_empty() {
            return Err(sys::ERR_INVALID_COMPONENT_NAME);
        }
        self.inner.lock().reinstantiate(name, callback);
        Ok(Box::new(FakePeer {
            inner: self.inner.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Surfaces
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DisplayInner {
    created: u32,
    free: VecDeque<SurfaceBuffer>,
    queued: VecDeque<(SurfaceBuffer, i64)>,
    shown: Vec<i64>,
    cancelled: usize,
}

/// Display surface with a fixed number of slots.
pub struct FakeDisplay {
    capacity: u32,
    inner: Mutex<DisplayInner>,
    listener: Mutex<Option<ReleaseListener>>,
}

impl FakeDisplay {
    pub fn new(capacity: u32) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            inner: Mutex::new(DisplayInner::default()),
            listener: Mutex::new(None),
        })
    }

    /// Shows every queued frame and gives the buffers back to the codec.
    pub fn consume_all(&self) -> usize {
        let count = {
            let inner = &mut *self.inner.lock();
            let count = inner.queued.len();
            while let Some((buffer, pts_us)) = inner.queued.pop_front() {
                inner.shown.push(pts_us);
                inner.free.push_back(buffer);
            }
            count
        };
        if count > 0 {
            if let Some(listener) = self.listener.lock().as_ref() {
                listener();
            }
        }
        count
    }

    pub fn queued(&self) -> usize {
        self.inner.lock().queued.len()
    }

    pub fn shown(&self) -> Vec<i64> {
        self.inner.lock().shown.clone()
    }

    pub fn cancelled(&self) -> usize {
        self.inner.lock().cancelled
    }
}

impl Surface for FakeDisplay {
    fn request_buffer(
        &self,
        width: u32,
        height: u32,
        color_format: u32,
    ) -> Result<Option<SurfaceBuffer>> {
        let mut inner = self.inner.lock();
        if let Some(buffer) = inner.free.pop_front() {
            return Ok(Some(buffer));
        }
        if inner.created >= self.capacity {
            return Ok(None);
        }
        let seq = 1000 + inner.created;
        inner.created += 1;
        Ok(Some(SurfaceBuffer {
            seq,
            handle: 0xD000 + u64::from(seq),
            width,
            height,
            color_format,
            size: width * height * 3 / 2,
        }))
    }

    fn cancel_buffer(&self, buffer: &SurfaceBuffer) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.cancelled += 1;
        inner.free.push_back(buffer.clone());
        Ok(())
    }

    fn flush_buffer(&self, buffer: &SurfaceBuffer, pts_us: i64) -> Result<()> {
        self.inner.lock().queued.push_back((buffer.clone(), pts_us));
        Ok(())
    }

    fn attach_buffer_to_queue(&self, _buffer: &SurfaceBuffer) -> Result<()> {
        Err(Error::InvalidArgument(
            "display surfaces do not take attached buffers".to_string(),
        ))
    }

    fn set_release_listener(&self, listener: ReleaseListener) -> Result<()> {
        *self.listener.lock() = Some(listener);
        Ok(())
    }
}

#[derive(Default)]
struct ProducerInner {
    attached: usize,
    /// Empty buffers the producer may draw into.
    free: VecDeque<SurfaceBuffer>,
    /// Drawn frames waiting for the codec.
    filled: VecDeque<SurfaceBuffer>,
}

/// Producer side of an encoder input surface.
#[derive(Default)]
pub struct FakeProducer {
    inner: Mutex<ProducerInner>,
    listener: Mutex<Option<ReleaseListener>>,
}

impl FakeProducer {
    /// Draws one frame into the next free buffer and signals the codec.
    pub fn draw_frame(&self) -> bool {
        let drawn = {
            let inner = &mut *self.inner.lock();
            match inner.free.pop_front() {
                Some(buffer) => {
                    inner.filled.push_back(buffer);
                    true
                }
                None => false,
            }
        };
        if drawn {
            if let Some(listener) = self.listener.lock().as_ref() {
                listener();
            }
        }
        drawn
    }

    pub fn free_buffers(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn attached(&self) -> usize {
        self.inner.lock().attached
    }
}

impl Surface for FakeProducer {
    fn request_buffer(
        &self,
        _width: u32,
        _height: u32,
        _color_format: u32,
    ) -> Result<Option<SurfaceBuffer>> {
        Ok(self.inner.lock().filled.pop_front())
    }

    fn cancel_buffer(&self, buffer: &SurfaceBuffer) -> Result<()> {
        self.inner.lock().free.push_back(buffer.clone());
        Ok(())
    }

    fn flush_buffer(&self, _buffer: &SurfaceBuffer, _pts_us: i64) -> Result<()> {
        Err(Error::InvalidArgument(
            "input surfaces are not displayed".to_string(),
        ))
    }

    fn attach_buffer_to_queue(&self, _buffer: &SurfaceBuffer) -> Result<()> {
        self.inner.lock().attached += 1;
        Ok(())
    }

    fn set_release_listener(&self, listener: ReleaseListener) -> Result<()> {
        *self.listener.lock() = Some(listener);
        Ok(())
    }
}

pub struct FakeSurfaceFactory {
    pub producer: Arc<FakeProducer>,
    pub created: Mutex<Vec<PortDefinition>>,
}

impl SurfaceFactory for FakeSurfaceFactory {
    fn create_input_surface(&self, def: &PortDefinition) -> Result<Arc<dyn Surface>> {
        self.created.lock().push(def.clone());
        let surface: Arc<dyn Surface> = self.producer.clone();
        Ok(surface)
    }
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Error(ErrorKind, i32),
    FormatChanged(FormatDescriptor),
    InputAvailable(BufferId),
    OutputAvailable(BufferId, BufferAttr),
}

struct Recorder {
    tx: mpsc::Sender<Event>,
}

impl Recorder {
    fn send(&self, event: Event) {
        // The receiving test may already be gone.
        let _ = self.tx.send(event);
    }
}

impl CodecCallback for Recorder {
    fn on_error(&mut self, kind: ErrorKind, code: i32) {
        self.send(Event::Error(kind, code));
    }

    fn on_output_format_changed(&mut self, format: &FormatDescriptor) {
        self.send(Event::FormatChanged(format.clone()));
    }

    fn on_input_buffer_available(&mut self, id: BufferId, _payload: &Payload) {
        self.send(Event::InputAvailable(id));
    }

    fn on_output_buffer_available(&mut self, id: BufferId, _payload: &Payload, attr: BufferAttr) {
        self.send(Event::OutputAvailable(id, attr));
    }
}

/// Callback events in arrival order.
pub struct Events {
    rx: mpsc::Receiver<Event>,
    skipped: RefCell<VecDeque<Event>>,
}

impl Events {
    /// Waits for the first event `pick` accepts. Events it passes over stay
    /// queued for later calls.
    pub fn expect<T>(&self, what: &str, mut pick: impl FnMut(&Event) -> Option<T>) -> T {
        let mut skipped = self.skipped.borrow_mut();
        for position in 0..skipped.len() {
            if let Some(picked) = pick(&skipped[position]) {
                skipped.remove(position);
                return picked;
            }
        }
        drop(skipped);
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let event = self
                .rx
                .recv_timeout(left)
                .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
            if let Some(picked) = pick(&event) {
                return picked;
            }
            self.skipped.borrow_mut().push_back(event);
        }
    }

    pub fn input(&self) -> BufferId {
        self.expect("an input buffer", |event| match event {
            Event::InputAvailable(id) => Some(*id),
            _ => None,
        })
    }

    pub fn inputs(&self, count: u32) -> Vec<BufferId> {
        (0..count).map(|_| self.input()).collect()
    }

    pub fn output(&self) -> (BufferId, BufferAttr) {
        self.expect("an output buffer", |event| match event {
            Event::OutputAvailable(id, attr) => Some((*id, *attr)),
            _ => None,
        })
    }

    pub fn error(&self) -> (ErrorKind, i32) {
        self.expect("an error", |event| match event {
            Event::Error(kind, code) => Some((*kind, *code)),
            _ => None,
        })
    }

    pub fn format_change(&self) -> FormatDescriptor {
        self.expect("a format change", |event| match event {
            Event::FormatChanged(format) => Some(format.clone()),
            _ => None,
        })
    }

    /// Everything received so far that no `expect` consumed.
    pub fn drain(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.skipped.borrow_mut().drain(..).collect();
        events.extend(self.rx.try_iter());
        events
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub codec: HCodec,
    pub component: FakeComponent,
    pub events: Events,
}

impl Harness {
    fn init(codec: HCodec, component: FakeComponent) -> Self {
        let (tx, rx) = mpsc::channel();
        codec.init(CallerInfo::current("hcodec-tests")).unwrap();
        codec.set_callback(Box::new(Recorder { tx })).unwrap();
        Self {
            codec,
            component,
            events: Events {
                rx,
                skipped: RefCell::new(VecDeque::new()),
            },
        }
    }

    pub fn decoder() -> Self {
        init_tracing();
        let component = FakeComponent::new();
        let codec = HCodec::new(
            test_config(),
            CodecKind::Decoder,
            Arc::new(component.clone()),
        )
        .unwrap();
        Self::init(codec, component)
    }

    pub fn encoder_with_producer() -> (Self, Arc<FakeProducer>) {
        init_tracing();
        let component = FakeComponent::new();
        let producer = Arc::new(FakeProducer::default());
        let surfaces = FakeSurfaceFactory {
            producer: producer.clone(),
            created: Mutex::new(Vec::new()),
        };
        let codec = HCodec::with_variant(
            test_config(),
            Box::new(Encoder::default()),
            Arc::new(component.clone()),
            Some(Arc::new(surfaces)),
        )
        .unwrap();
        (Self::init(codec, component), producer)
    }

    /// Configures and starts a decoder, returning the first input buffers.
    pub fn start_decoder(&self, width: u32, height: u32) -> Vec<BufferId> {
        self.codec.configure(&decoder_format(width, height)).unwrap();
        self.codec.start().unwrap();
        self.events.inputs(INPUT_BUFFERS)
    }

    /// Polls the codec's snapshot until `done` holds.
    pub fn wait_for(&self, what: &str, done: impl Fn(&CodecSnapshot) -> bool) -> CodecSnapshot {
        let deadline = Instant::now() + WAIT;
        loop {
            let snapshot = self.codec.snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {what}: {snapshot:?}"
            );
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

pub fn data(pts_us: i64, size: u32) -> BufferAttr {
    BufferAttr {
        pts_us,
        offset: 0,
        size,
        flags: hcodec::BufferFlags::NONE,
    }
}
