// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Video decoder policy.

use hcodec_sys::{FrameRateAdaptiveParam, FrameRateConfig, init_param};
use tracing::debug;

use super::{CodecKind, CodecVariant, apply_color_aspects, frame_size, video_geometry};
use crate::{
    ComponentLink, Error, FormatDescriptor, Port, PortDefinition, Result,
    buffer::AllocStrategy,
    format::{
        KEY_COLOR_FORMAT, KEY_FRAME_RATE, KEY_FRAME_RATE_ADAPTIVE, KEY_MAX_INPUT_SIZE, KEY_MIME,
        compression_for_mime, fps_to_q16,
    },
};

/// Compressed bitstream in, raw frames out.
///
/// Input buffers are driver-allocated shared memory. Output buffers are
/// component-allocated hardware memory, or surface buffers when an output
/// surface is set.
#[derive(Debug, Default)]
pub struct Decoder;

impl CodecVariant for Decoder {
    fn kind(&self) -> CodecKind {
        CodecKind::Decoder
    }

    fn configure(
        &mut self,
        link: &mut ComponentLink,
        format: &FormatDescriptor,
        output_surface: bool,
    ) -> Result<()> {
        let mime = format
            .get_str(KEY_MIME)?
            .ok_or_else(|| Error::InvalidArgument("format key \"mime\" is required".into()))?;
        let compression = compression_for_mime(mime)
            .ok_or_else(|| Error::InvalidArgument(format!("cannot decode \"{mime}\"")))?;
        let (width, height, frame_rate) = video_geometry(format)?;

        let mut input = link.port_definition(Port::Input)?;
        input.compression = compression;
        input.color_format = hcodec_sys::COLOR_FORMAT_UNUSED;
        input.width = width;
        input.height = height;
        input.frame_rate = frame_rate;
        if let Some(max_input_size) = format.get_u32(KEY_MAX_INPUT_SIZE)? {
            input.buffer_size = input.buffer_size.max(max_input_size);
        }
        link.set_port_definition(&input)?;

        let mut output = link.port_definition(Port::Output)?;
        output.compression = hcodec_sys::CODING_UNUSED;
        output.width = width;
        output.height = height;
        output.stride = width as i32;
        output.slice_height = height;
        output.frame_rate = frame_rate;
        output.color_format = match format.get_u32(KEY_COLOR_FORMAT)? {
            Some(color_format) => color_format,
            None if output_surface => hcodec_sys::COLOR_FORMAT_SURFACE,
            None => hcodec_sys::COLOR_FORMAT_YUV420_SEMI_PLANAR,
        };
        output.buffer_size = output.buffer_size.max(frame_size(&output));
        link.set_port_definition(&output)?;

        if format.get_i64(KEY_FRAME_RATE_ADAPTIVE)?.unwrap_or(0) != 0 {
            let mut adaptive = init_param::<FrameRateAdaptiveParam>();
            adaptive.port_index = Port::Output.index();
            adaptive.enable = 1;
            link.set_parameter(&adaptive)?;
            debug!("Frame-rate adaptive output enabled");
        }
        apply_color_aspects(link, format, Port::Input)?;

        debug!(mime, width, height, frame_rate, output_surface, "Decoder configured");
        Ok(())
    }

    fn alloc_strategy(&self, port: Port, surface_backed: bool) -> AllocStrategy {
        match port {
            Port::Input => AllocStrategy::SharedMemory,
            Port::Output if surface_backed => AllocStrategy::Surface,
            Port::Output => AllocStrategy::Hardware,
        }
    }

    fn set_parameter(
        &mut self,
        link: &mut ComponentLink,
        format: &FormatDescriptor,
    ) -> Result<()> {
        if let Some(frame_rate) = format.get_f64(KEY_FRAME_RATE)? {
            let mut config = init_param::<FrameRateConfig>();
            config.port_index = Port::Input.index();
            config.frame_rate_q16 = fps_to_q16(frame_rate);
            link.set_config(&config)?;
        }
        apply_color_aspects(link, format, Port::Input)?;
        Ok(())
    }

    /// The component has already re-derived the frame geometry; make sure
    /// every buffer can hold one frame of it.
    fn on_output_port_changed(
        &mut self,
        _link: &mut ComponentLink,
        def: &mut PortDefinition,
    ) -> Result<()> {
        if def.stride < def.width as i32 {
            def.stride = def.width as i32;
        }
        def.slice_height = def.slice_height.max(def.height);
        def.buffer_size = def.buffer_size.max(frame_size(def));
        debug!(
            width = def.width,
            height = def.height,
            buffer_count = def.buffer_count,
            "Decoder output renegotiated"
        );
        Ok(())
    }

    fn supports_output_surface(&self) -> bool {
        true
    }
}
