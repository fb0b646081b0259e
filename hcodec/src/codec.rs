// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! The public codec handle.
//!
//! [`HCodec`] is a thin, thread-safe front over a loop thread that owns all
//! mutable driver state. Result-bearing calls are turned into synchronous
//! messages and block for at most [`CodecConfig::sync_timeout`]; buffer
//! hand-backs are posted and return immediately.

mod buffers;
mod driver;
mod lifecycle;
mod port_change;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use hcodec_sys::{BufferHeader, ComponentFactory};
use parking_lot::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    BufferAttr, BufferId, CodecCallback, CodecConfig, Error, FormatDescriptor, Port,
    PortDefinition, Result,
    buffer::OwnerCounts,
    looper::{MessageLoop, Replier},
    state::StateId,
    surface::{InputSurface, Surface, SurfaceFactory},
    variant::{CodecKind, CodecVariant},
};

use self::driver::CodecCore;

/// Identity of the process that owns a codec, recorded for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerInfo {
    pub pid: u32,
    pub uid: u32,
    pub app_name: String,
}

impl CallerInfo {
    /// Describes the current process.
    pub fn current(app_name: &str) -> Self {
        Self {
            pid: std::process::id(),
            uid: 0,
            app_name: app_name.to_owned(),
        }
    }
}

/// Point-in-time view of a codec, refreshed after every processed message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecSnapshot {
    pub state: StateId,
    /// Running with every buffer held after a flush.
    pub flushed: bool,
    /// A fatal error occurred; only `reset` or `release` are accepted.
    pub poisoned: bool,
    pub input_eos: bool,
    pub input: OwnerCounts,
    pub output: OwnerCounts,
    pub input_port: Option<PortDefinition>,
    pub output_port: Option<PortDefinition>,
}

/// State mirrored out of the loop thread.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) snapshot: Mutex<CodecSnapshot>,
    /// Set by the client when it queues EOS, cleared by the loop on flush/stop.
    pub(crate) input_eos: AtomicBool,
}

/// A result-bearing client request.
pub(crate) enum Request {
    Init(CallerInfo, Replier<()>),
    SetCallback(Box<dyn CodecCallback>, Replier<()>),
    Configure(FormatDescriptor, Replier<()>),
    SetOutputSurface(Arc<dyn Surface>, Replier<()>),
    CreateInputSurface(Replier<InputSurface>),
    Start(Replier<()>),
    Stop(Replier<()>),
    Flush(Replier<()>),
    Reset(Replier<()>),
    Release(Replier<()>),
    SetParameter(FormatDescriptor, Replier<()>),
    RequestIdr(Replier<()>),
    NotifyEos(Replier<()>),
    GetFormat(Port, Replier<FormatDescriptor>),
}

impl Request {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Request::Init(..) => "init",
            Request::SetCallback(..) => "set_callback",
            Request::Configure(..) => "configure",
            Request::SetOutputSurface(..) => "set_output_surface",
            Request::CreateInputSurface(..) => "create_input_surface",
            Request::Start(..) => "start",
            Request::Stop(..) => "stop",
            Request::Flush(..) => "flush",
            Request::Reset(..) => "reset",
            Request::Release(..) => "release",
            Request::SetParameter(..) => "set_parameter",
            Request::RequestIdr(..) => "request_idr_frame",
            Request::NotifyEos(..) => "notify_eos",
            Request::GetFormat(..) => "get_format",
        }
    }

    /// Answers the request with `error`.
    pub(crate) fn reject(self, error: Error) {
        match self {
            Request::CreateInputSurface(reply) => reply.send(Err(error)),
            Request::GetFormat(_, reply) => reply.send(Err(error)),
            Request::Init(_, reply)
            | Request::SetCallback(_, reply)
            | Request::Configure(_, reply)
            | Request::SetOutputSurface(_, reply)
            | Request::Start(reply)
            | Request::Stop(reply)
            | Request::Flush(reply)
            | Request::Reset(reply)
            | Request::Release(reply)
            | Request::SetParameter(_, reply)
            | Request::RequestIdr(reply)
            | Request::NotifyEos(reply) => reply.send(Err(error)),
        }
    }
}

/// Raw callback from the component, already copied off the peer's thread.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PeerEvent {
    Event { event: u32, data1: u32, data2: u32 },
    EmptyDone(BufferHeader),
    FillDone(BufferHeader),
}

/// Everything the loop thread processes.
pub(crate) enum Msg {
    Request(Request),
    QueueInput { id: BufferId, attr: BufferAttr },
    ReleaseOutput { id: BufferId, render: bool },
    /// `instance` tells events of a replaced component apart.
    Peer { instance: u64, event: PeerEvent },
    SurfaceReleased(Port),
    Watchdog { generation: u64 },
}

/// Handle to one hardware codec instance.
///
/// The handle is `Send + Sync`; every method may be called from any thread.
/// Dropping it releases the component and joins the loop thread.
///
/// # Examples
///
/// ```ignore
/// use hcodec::{CallerInfo, CodecConfig, CodecKind, FormatDescriptor, HCodec};
///
/// let codec = HCodec::new(CodecConfig::default(), CodecKind::Decoder, factory)?;
/// codec.init(CallerInfo::current("player"))?;
/// codec.set_callback(Box::new(my_callback))?;
/// codec.configure(
///     &FormatDescriptor::new()
///         .with("mime", "video/avc")
///         .with("width", 1920i64)
///         .with("height", 1080i64),
/// )?;
/// codec.start()?;
/// ```
pub struct HCodec {
    id: Uuid,
    kind: CodecKind,
    looper: MessageLoop<Msg>,
    shared: Arc<Shared>,
    sync_timeout: Duration,
}

impl HCodec {
    /// Creates a codec of a built-in kind and spawns its loop thread.
    ///
    /// The codec starts `Uninitialized`; no component exists until
    /// [`Self::init`].
    ///
    /// # Arguments
    ///
    /// * `config` - Timeouts, buffer counts and the component name
    /// * `kind` - Decoder or encoder policy
    /// * `factory` - Creates component instances on `init` and `reset`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the loop thread cannot be spawned.
    pub fn new(
        config: CodecConfig,
        kind: CodecKind,
        factory: Arc<dyn ComponentFactory>,
    ) -> Result<Self> {
        Self::with_variant(config, kind.variant(), factory, None)
    }

    /// Creates a codec with an explicit variant and an optional factory for
    /// input surfaces.
    pub fn with_variant(
        config: CodecConfig,
        variant: Box<dyn CodecVariant>,
        factory: Arc<dyn ComponentFactory>,
        surface_factory: Option<Arc<dyn SurfaceFactory>>,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let kind = variant.kind();
        let shared = Arc::new(Shared::default());
        let sync_timeout = config.sync_timeout();
        let core_shared = shared.clone();
        let looper = MessageLoop::spawn(format!("hcodec-{id}"), move |sender| {
            CodecCore::new(
                id,
                config,
                variant,
                factory,
                surface_factory,
                sender,
                core_shared,
            )
        })?;
        debug!(codec = %id, ?kind, "Codec created");
        Ok(Self {
            id,
            kind,
            looper,
            shared,
            sync_timeout,
        })
    }

    /// Unique id of this instance, also part of the loop thread's name.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Current lifecycle state as last published by the loop thread.
    pub fn state(&self) -> StateId {
        self.shared.snapshot.lock().state
    }

    /// Full diagnostic view: state, per-owner buffer counts and ports.
    pub fn snapshot(&self) -> CodecSnapshot {
        let mut snapshot = self.shared.snapshot.lock().clone();
        snapshot.input_eos = self.shared.input_eos.load(Ordering::Acquire);
        snapshot
    }

    fn call<R>(&self, op: &'static str, make: impl FnOnce(Replier<R>) -> Msg) -> Result<R> {
        if self.looper.is_loop_thread() {
            return Err(Error::invalid_state(op, self.state()));
        }
        debug!(codec = %self.id, op, "Client request");
        self.looper.send_sync(make, self.sync_timeout)
    }

    fn request<R>(
        &self,
        op: &'static str,
        make: impl FnOnce(Replier<R>) -> Request,
    ) -> Result<R> {
        self.call(op, |reply| Msg::Request(make(reply)))
    }

    /// Instantiates the component. Valid only in `Uninitialized`.
    pub fn init(&self, caller: CallerInfo) -> Result<()> {
        self.request("init", |reply| Request::Init(caller, reply))
    }

    /// Registers the client callback, replacing any previous one.
    pub fn set_callback(&self, callback: Box<dyn CodecCallback>) -> Result<()> {
        self.request("set_callback", |reply| Request::SetCallback(callback, reply))
    }

    /// Negotiates both ports from `format`. Valid only in `Initialized`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if a required key is missing or mistyped
    /// - [`Error::InvalidState`] outside `Initialized`, or after a fatal
    ///   error until [`Self::reset`]
    pub fn configure(&self, format: &FormatDescriptor) -> Result<()> {
        let format = format.clone();
        self.request("configure", |reply| Request::Configure(format, reply))
    }

    /// Renders decoded output to `surface`. Decoders only, before `start`.
    pub fn set_output_surface(&self, surface: Arc<dyn Surface>) -> Result<()> {
        self.request("set_output_surface", |reply| {
            Request::SetOutputSurface(surface, reply)
        })
    }

    /// Creates the surface an encoder takes its frames from. Must be called
    /// after [`Self::configure`] and before [`Self::start`].
    pub fn create_input_surface(&self) -> Result<InputSurface> {
        self.request("create_input_surface", Request::CreateInputSurface)
    }

    /// Starts processing, or resumes after [`Self::flush`].
    ///
    /// On success every input buffer has been offered to the client (or the
    /// input surface) and every output buffer handed to the component.
    pub fn start(&self) -> Result<()> {
        self.request("start", Request::Start)
    }

    /// Stops processing and frees all buffers; the configuration is kept.
    pub fn stop(&self) -> Result<()> {
        self.request("stop", Request::Stop)
    }

    /// Discards all in-flight data. On success the codec is `Running` with
    /// every buffer held until the next [`Self::start`].
    pub fn flush(&self) -> Result<()> {
        self.request("flush", Request::Flush)
    }

    /// Returns to a fresh `Initialized` with a new component instance.
    pub fn reset(&self) -> Result<()> {
        self.request("reset", Request::Reset)
    }

    /// Stops if needed and drops the component. Calling it again is a no-op.
    pub fn release(&self) -> Result<()> {
        self.request("release", Request::Release)
    }

    /// Applies runtime parameters such as bitrate or frame rate.
    pub fn set_parameter(&self, format: &FormatDescriptor) -> Result<()> {
        let format = format.clone();
        self.request("set_parameter", |reply| Request::SetParameter(format, reply))
    }

    /// Asks an encoder for a key frame as soon as possible.
    pub fn request_idr_frame(&self) -> Result<()> {
        self.request("request_idr_frame", Request::RequestIdr)
    }

    /// Signals end of stream on an input surface.
    pub fn notify_eos(&self) -> Result<()> {
        self.request("notify_eos", Request::NotifyEos)
    }

    pub fn get_input_format(&self) -> Result<FormatDescriptor> {
        self.request("get_input_format", |reply| {
            Request::GetFormat(Port::Input, reply)
        })
    }

    pub fn get_output_format(&self) -> Result<FormatDescriptor> {
        self.request("get_output_format", |reply| {
            Request::GetFormat(Port::Output, reply)
        })
    }

    /// Hands a filled input buffer to the codec.
    ///
    /// The call does not wait for the loop thread. State and end-of-stream
    /// are checked here; ownership problems found later are reported through
    /// [`CodecCallback::on_error`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the codec is not running, or if end
    /// of stream was already queued and no flush, stop or reset followed.
    pub fn queue_input_buffer(&self, id: BufferId, attr: BufferAttr) -> Result<()> {
        let state = self.state();
        if !state.accepts_buffers() {
            return Err(Error::invalid_state("queue_input_buffer", state));
        }
        let claimed = if attr.flags.is_eos() {
            self.shared
                .input_eos
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        } else {
            !self.shared.input_eos.load(Ordering::Acquire)
        };
        if !claimed {
            return Err(Error::invalid_state("queue_input_buffer", state));
        }
        self.looper.post(Msg::QueueInput { id, attr })
    }

    /// Gives an output buffer back; with `render` it is shown on the output
    /// surface first.
    pub fn release_output_buffer(&self, id: BufferId, render: bool) -> Result<()> {
        let state = self.state();
        if !state.accepts_buffers() {
            return Err(Error::invalid_state("release_output_buffer", state));
        }
        self.looper.post(Msg::ReleaseOutput { id, render })
    }

    /// Shorthand for `release_output_buffer(id, true)`.
    pub fn render_output_buffer(&self, id: BufferId) -> Result<()> {
        self.release_output_buffer(id, true)
    }
}

impl std::fmt::Debug for HCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HCodec")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for HCodec {
    fn drop(&mut self) {
        if self.looper.is_loop_thread() {
            error!(codec = %self.id, "Codec dropped on its own loop thread; skipping release");
            return;
        }
        if let Err(error) = self.release() {
            error!(codec = %self.id, "Failed to release codec: {error}");
        }
    }
}
