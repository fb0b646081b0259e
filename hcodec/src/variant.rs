// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Decoder and encoder policy hooks.
//!
//! A [`CodecVariant`] decides how formats are negotiated, how buffers are
//! sized and backed, and where filled output goes. It never touches buffer
//! ownership or lifecycle state; those stay with the driver.

pub mod decoder;
pub mod encoder;

use hcodec_sys::ColorAspectsParam;

use crate::{
    BufferAttr, CodecConfig, ComponentLink, Error, FormatDescriptor, Port, PortDefinition, Result,
    buffer::AllocStrategy,
    format::{KEY_COLOR_MATRIX, KEY_COLOR_PRIMARIES, KEY_COLOR_RANGE, KEY_COLOR_TRANSFER},
};

pub use decoder::Decoder;
pub use encoder::Encoder;

/// Frame rate assumed when a format does not carry one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Which built-in variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    Decoder,
    Encoder,
}

impl CodecKind {
    /// Component instantiated when the configuration names none.
    pub fn default_component_name(self) -> &'static str {
        match self {
            CodecKind::Decoder => "hcodec.video.decoder",
            CodecKind::Encoder => "hcodec.video.encoder",
        }
    }

    pub(crate) fn variant(self) -> Box<dyn CodecVariant> {
        match self {
            CodecKind::Decoder => Box::new(Decoder::default()),
            CodecKind::Encoder => Box::new(Encoder::default()),
        }
    }
}

/// Where a filled output buffer goes while circulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRoute {
    /// Hand it to the client.
    ToApp,
    /// Nothing worth delivering; give it straight back to the component.
    Refill,
}

/// Policy of one kind of codec.
pub trait CodecVariant: Send {
    fn kind(&self) -> CodecKind;

    /// Pushes the client's format into both ports of the component.
    ///
    /// `output_surface` tells whether decoded frames will be rendered to a
    /// surface. The driver reads both port definitions back afterwards.
    fn configure(
        &mut self,
        link: &mut ComponentLink,
        format: &FormatDescriptor,
        output_surface: bool,
    ) -> Result<()>;

    /// Fixes buffer count and size of a negotiated port before allocation.
    fn size_buffers(&self, def: &mut PortDefinition, config: &CodecConfig, surface_backed: bool) {
        default_sizing(def, config, surface_backed);
    }

    /// How the buffers of `port` are backed.
    fn alloc_strategy(&self, port: Port, surface_backed: bool) -> AllocStrategy;

    /// Where a buffer just filled by the component goes.
    fn route_output(&self, attr: &BufferAttr) -> OutputRoute {
        if attr.size > 0 || attr.flags.is_eos() {
            OutputRoute::ToApp
        } else {
            OutputRoute::Refill
        }
    }

    /// Applies a runtime parameter change. Unknown keys are ignored.
    fn set_parameter(&mut self, link: &mut ComponentLink, format: &FormatDescriptor)
    -> Result<()>;

    fn request_idr(&mut self, _link: &mut ComponentLink) -> Result<()> {
        Err(Error::InvalidArgument(format!(
            "{:?} does not produce key frames",
            self.kind()
        )))
    }

    /// Adjusts the renegotiated output definition after a mid-stream change.
    fn on_output_port_changed(
        &mut self,
        _link: &mut ComponentLink,
        _def: &mut PortDefinition,
    ) -> Result<()> {
        Ok(())
    }

    /// Prepares the input port for frames coming from a producer surface.
    fn use_input_surface(&mut self, _def: &mut PortDefinition) -> Result<()> {
        Err(Error::InvalidArgument(format!(
            "{:?} cannot take input from a surface",
            self.kind()
        )))
    }

    fn supports_output_surface(&self) -> bool {
        false
    }

    /// Client-facing description of a negotiated port.
    fn describe(&self, def: &PortDefinition) -> FormatDescriptor {
        def.to_format()
    }
}

/// Bytes of one YUV 4:2:0 frame of the given port.
pub(crate) fn frame_size(def: &PortDefinition) -> u32 {
    let stride = (def.stride.max(0) as u32).max(def.width);
    let rows = def.slice_height.max(def.height);
    stride.saturating_mul(rows).saturating_mul(3) / 2
}

/// Sizing shared by all variants: configured count overrides, surface
/// headroom on the output side, raw ports at least one frame large.
pub(crate) fn default_sizing(def: &mut PortDefinition, config: &CodecConfig, surface_backed: bool) {
    let configured = match def.port {
        Port::Input => config.default_input_buffer_count,
        Port::Output => config.default_output_buffer_count,
    };
    if configured > 0 {
        def.buffer_count = configured;
    }
    if surface_backed && def.port == Port::Output {
        def.buffer_count = def
            .buffer_count
            .max(def.min_buffer_count.saturating_add(config.extra_surface_buffers));
    }
    def.buffer_count = def.buffer_count.max(def.min_buffer_count).max(1);
    if def.compression == hcodec_sys::CODING_UNUSED {
        def.buffer_size = def.buffer_size.max(frame_size(def));
    }
}

/// Writes any color keys of `format` into the component's color aspects of
/// `port`. Returns `false` when the format carries none.
pub(crate) fn apply_color_aspects(
    link: &mut ComponentLink,
    format: &FormatDescriptor,
    port: Port,
) -> Result<bool> {
    let keys = [
        KEY_COLOR_RANGE,
        KEY_COLOR_PRIMARIES,
        KEY_COLOR_TRANSFER,
        KEY_COLOR_MATRIX,
    ];
    if !keys.iter().any(|key| format.contains(key)) {
        return Ok(false);
    }
    let mut aspects = link.get_parameter::<ColorAspectsParam>(port.index())?;
    if let Some(range) = format.get_u32(KEY_COLOR_RANGE)? {
        aspects.range = range;
    }
    if let Some(primaries) = format.get_u32(KEY_COLOR_PRIMARIES)? {
        aspects.primaries = primaries;
    }
    if let Some(transfer) = format.get_u32(KEY_COLOR_TRANSFER)? {
        aspects.transfer = transfer;
    }
    if let Some(matrix) = format.get_u32(KEY_COLOR_MATRIX)? {
        aspects.matrix = matrix;
    }
    link.set_parameter(&aspects)?;
    Ok(true)
}

/// Reads the dimensions and frame rate every video format must carry.
pub(crate) fn video_geometry(format: &FormatDescriptor) -> Result<(u32, u32, f64)> {
    let width = format.require_u32(crate::format::KEY_WIDTH)?;
    let height = format.require_u32(crate::format::KEY_HEIGHT)?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidArgument(format!(
            "frame size {width}x{height} is empty"
        )));
    }
    let frame_rate = format
        .get_f64(crate::format::KEY_FRAME_RATE)?
        .unwrap_or(DEFAULT_FRAME_RATE);
    if !(frame_rate > 0.0 && frame_rate.is_finite()) {
        return Err(Error::InvalidArgument(format!(
            "frame rate {frame_rate} is not positive"
        )));
    }
    Ok((width, height, frame_rate))
}
