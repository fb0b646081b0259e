// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Video encoder policy.

use hcodec_sys::{
    BitrateConfig, FrameRateConfig, IFrameIntervalParam, IntraRefreshVopConfig, VideoBitrateParam,
    init_param,
};
use tracing::{debug, info};

use super::{CodecKind, CodecVariant, apply_color_aspects, frame_size, video_geometry};
use crate::{
    ComponentLink, Error, FormatDescriptor, Port, PortDefinition, Result,
    buffer::AllocStrategy,
    format::{
        KEY_BITRATE, KEY_BITRATE_MODE, KEY_COLOR_FORMAT, KEY_FRAME_RATE, KEY_I_FRAME_INTERVAL_MS,
        KEY_MIME, KEY_REQUEST_IDR, compression_for_mime, fps_to_q16,
    },
};

/// Raw frames in, compressed bitstream out.
///
/// Input comes from client shared memory or, after
/// [`crate::HCodec::create_input_surface`], from a producer surface. Output
/// buffers are shared memory.
#[derive(Debug, Default)]
pub struct Encoder {
    bitrate: Option<u32>,
}

fn control_rate(mode: Option<&str>) -> Result<u32> {
    match mode {
        None | Some("VBR") => Ok(hcodec_sys::RATE_CONTROL_VARIABLE),
        Some("CBR") => Ok(hcodec_sys::RATE_CONTROL_CONSTANT),
        Some("CQ") => Ok(hcodec_sys::RATE_CONTROL_CONSTANT_QUALITY),
        Some(other) => Err(Error::InvalidArgument(format!(
            "unknown bitrate mode \"{other}\""
        ))),
    }
}

fn i_frame_interval(format: &FormatDescriptor) -> Result<Option<i32>> {
    match format.get_i64(KEY_I_FRAME_INTERVAL_MS)? {
        None => Ok(None),
        Some(interval) => i32::try_from(interval).map(Some).map_err(|_| {
            Error::InvalidArgument(format!("i-frame interval {interval} out of range"))
        }),
    }
}

impl Encoder {
    fn set_i_frame_interval(&mut self, link: &mut ComponentLink, interval_ms: i32) -> Result<()> {
        let mut param = init_param::<IFrameIntervalParam>();
        param.port_index = Port::Output.index();
        param.interval_ms = interval_ms;
        link.set_parameter(&param)
    }
}

impl CodecVariant for Encoder {
    fn kind(&self) -> CodecKind {
        CodecKind::Encoder
    }

    fn configure(
        &mut self,
        link: &mut ComponentLink,
        format: &FormatDescriptor,
        _output_surface: bool,
    ) -> Result<()> {
        let mime = format
            .get_str(KEY_MIME)?
            .ok_or_else(|| Error::InvalidArgument("format key \"mime\" is required".into()))?;
        let compression = compression_for_mime(mime)
            .ok_or_else(|| Error::InvalidArgument(format!("cannot encode to \"{mime}\"")))?;
        let (width, height, frame_rate) = video_geometry(format)?;
        let mode = control_rate(format.get_str(KEY_BITRATE_MODE)?)?;
        let bitrate = format.get_u32(KEY_BITRATE)?;

        let mut input = link.port_definition(Port::Input)?;
        input.compression = hcodec_sys::CODING_UNUSED;
        input.color_format = format
            .get_u32(KEY_COLOR_FORMAT)?
            .unwrap_or(hcodec_sys::COLOR_FORMAT_YUV420_SEMI_PLANAR);
        input.width = width;
        input.height = height;
        input.stride = width as i32;
        input.slice_height = height;
        input.frame_rate = frame_rate;
        input.buffer_size = input.buffer_size.max(frame_size(&input));
        link.set_port_definition(&input)?;

        let mut output = link.port_definition(Port::Output)?;
        output.compression = compression;
        output.color_format = hcodec_sys::COLOR_FORMAT_UNUSED;
        output.width = width;
        output.height = height;
        output.frame_rate = frame_rate;
        link.set_port_definition(&output)?;

        let mut rate = link.get_parameter::<VideoBitrateParam>(Port::Output.index())?;
        rate.control_rate = mode;
        if let Some(bitrate) = bitrate {
            rate.target_bitrate = bitrate;
        }
        link.set_parameter(&rate)?;

        if let Some(interval_ms) = i_frame_interval(format)? {
            self.set_i_frame_interval(link, interval_ms)?;
        }
        apply_color_aspects(link, format, Port::Input)?;

        debug!(mime, width, height, frame_rate, ?bitrate, mode, "Encoder configured");
        self.bitrate = bitrate;
        Ok(())
    }

    fn alloc_strategy(&self, port: Port, surface_backed: bool) -> AllocStrategy {
        match port {
            Port::Input if surface_backed => AllocStrategy::Surface,
            Port::Input | Port::Output => AllocStrategy::SharedMemory,
        }
    }

    fn set_parameter(
        &mut self,
        link: &mut ComponentLink,
        format: &FormatDescriptor,
    ) -> Result<()> {
        if let Some(bitrate) = format.get_u32(KEY_BITRATE)? {
            let mut config = init_param::<BitrateConfig>();
            config.port_index = Port::Output.index();
            config.encode_bitrate = bitrate;
            link.set_config(&config)?;
            self.bitrate = Some(bitrate);
            info!(bitrate, "Encoder bitrate updated");
        }
        if let Some(frame_rate) = format.get_f64(KEY_FRAME_RATE)? {
            let mut config = init_param::<FrameRateConfig>();
            config.port_index = Port::Output.index();
            config.frame_rate_q16 = fps_to_q16(frame_rate);
            link.set_config(&config)?;
        }
        if let Some(interval_ms) = i_frame_interval(format)? {
            self.set_i_frame_interval(link, interval_ms)?;
        }
        if format.get_i64(KEY_REQUEST_IDR)?.unwrap_or(0) != 0 {
            self.request_idr(link)?;
        }
        Ok(())
    }

    fn request_idr(&mut self, link: &mut ComponentLink) -> Result<()> {
        let mut config = init_param::<IntraRefreshVopConfig>();
        config.port_index = Port::Output.index();
        config.intra_refresh_vop = 1;
        link.set_config(&config)?;
        debug!("Key frame requested");
        Ok(())
    }

    fn use_input_surface(&mut self, def: &mut PortDefinition) -> Result<()> {
        def.color_format = hcodec_sys::COLOR_FORMAT_SURFACE;
        Ok(())
    }

    fn describe(&self, def: &PortDefinition) -> FormatDescriptor {
        let mut format = def.to_format();
        if def.port == Port::Output {
            if let Some(bitrate) = self.bitrate {
                format.set(KEY_BITRATE, bitrate);
            }
        }
        format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_modes() {
        assert_eq!(control_rate(None).unwrap(), hcodec_sys::RATE_CONTROL_VARIABLE);
        assert_eq!(
            control_rate(Some("CBR")).unwrap(),
            hcodec_sys::RATE_CONTROL_CONSTANT
        );
        assert!(matches!(
            control_rate(Some("ABR")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn surface_input_switches_strategy() {
        let encoder = Encoder::default();
        assert_eq!(
            encoder.alloc_strategy(Port::Input, true),
            AllocStrategy::Surface
        );
        assert_eq!(
            encoder.alloc_strategy(Port::Input, false),
            AllocStrategy::SharedMemory
        );
        assert_eq!(
            encoder.alloc_strategy(Port::Output, true),
            AllocStrategy::SharedMemory
        );
    }
}
