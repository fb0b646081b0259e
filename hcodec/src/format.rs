// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Format descriptors and negotiated port definitions.
//!
//! A [`FormatDescriptor`] is the client-facing key-value description of a
//! stream (it serializes to a flat JSON object). A [`PortDefinition`] is the
//! negotiated, typed view of one port as agreed with the component.

use std::collections::BTreeMap;

use hcodec_sys::PortDefinitionParam;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const KEY_MIME: &str = "mime";
pub const KEY_WIDTH: &str = "width";
pub const KEY_HEIGHT: &str = "height";
pub const KEY_STRIDE: &str = "stride";
pub const KEY_SLICE_HEIGHT: &str = "slice_height";
pub const KEY_FRAME_RATE: &str = "frame_rate";
pub const KEY_COLOR_FORMAT: &str = "color_format";
pub const KEY_BITRATE: &str = "bitrate";
pub const KEY_BITRATE_MODE: &str = "bitrate_mode";
pub const KEY_I_FRAME_INTERVAL_MS: &str = "i_frame_interval_ms";
pub const KEY_MAX_INPUT_SIZE: &str = "max_input_size";
pub const KEY_FRAME_RATE_ADAPTIVE: &str = "frame_rate_adaptive";
pub const KEY_COLOR_RANGE: &str = "color_range";
pub const KEY_COLOR_PRIMARIES: &str = "color_primaries";
pub const KEY_COLOR_TRANSFER: &str = "color_transfer";
pub const KEY_COLOR_MATRIX: &str = "color_matrix";
pub const KEY_REQUEST_IDR: &str = "request_idr";
pub const KEY_BUFFER_COUNT: &str = "buffer_count";

pub const MIME_AVC: &str = "video/avc";
pub const MIME_HEVC: &str = "video/hevc";
pub const MIME_MPEG4: &str = "video/mp4v-es";
pub const MIME_VP9: &str = "video/x-vnd.on2.vp9";
pub const MIME_AV1: &str = "video/av01";
pub const MIME_RAW: &str = "video/raw";

/// One value of a [`FormatDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<i64> for FormatValue {
    fn from(value: i64) -> Self {
        FormatValue::Int(value)
    }
}

impl From<u32> for FormatValue {
    fn from(value: u32) -> Self {
        FormatValue::Int(value as i64)
    }
}

impl From<f64> for FormatValue {
    fn from(value: f64) -> Self {
        FormatValue::Float(value)
    }
}

impl From<&str> for FormatValue {
    fn from(value: &str) -> Self {
        FormatValue::Str(value.to_owned())
    }
}

/// Client-facing description of a stream format.
///
/// # Examples
///
/// ```
/// use hcodec::FormatDescriptor;
///
/// let format = FormatDescriptor::new()
///     .with("mime", "video/avc")
///     .with("width", 1920i64)
///     .with("height", 1080i64)
///     .with("frame_rate", 30.0);
/// assert_eq!(format.get_u32("width").unwrap(), Some(1920));
/// assert_eq!(format.get_f64("frame_rate").unwrap(), Some(30.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatDescriptor {
    entries: BTreeMap<String, FormatValue>,
}

impl FormatDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<FormatValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<FormatValue>) {
        self.entries.insert(key.to_owned(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FormatValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns an integer entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the entry exists but is not an integer.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(FormatValue::Int(value)) => Ok(Some(*value)),
            Some(other) => Err(Error::InvalidArgument(format!(
                "format key \"{key}\" holds {other:?}, integer required"
            ))),
        }
    }

    /// Returns a non-negative integer entry that fits in 32 bits.
    pub fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.get_i64(key)? {
            None => Ok(None),
            Some(value) => u32::try_from(value).map(Some).map_err(|_| {
                Error::InvalidArgument(format!("format key \"{key}\" out of range: {value}"))
            }),
        }
    }

    /// Returns a numeric entry; integers are widened.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(FormatValue::Float(value)) => Ok(Some(*value)),
            Some(FormatValue::Int(value)) => Ok(Some(*value as f64)),
            Some(other) => Err(Error::InvalidArgument(format!(
                "format key \"{key}\" holds {other:?}, number required"
            ))),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(FormatValue::Str(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(Error::InvalidArgument(format!(
                "format key \"{key}\" holds {other:?}, string required"
            ))),
        }
    }

    /// Like [`Self::get_u32`] but the key must be present.
    pub fn require_u32(&self, key: &str) -> Result<u32> {
        self.get_u32(key)?
            .ok_or_else(|| Error::InvalidArgument(format!("format key \"{key}\" is required")))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Maps a mime type to the component's compression format.
pub fn compression_for_mime(mime: &str) -> Option<u32> {
    match mime {
        MIME_AVC => Some(hcodec_sys::CODING_AVC),
        MIME_HEVC => Some(hcodec_sys::CODING_HEVC),
        MIME_MPEG4 => Some(hcodec_sys::CODING_MPEG4),
        MIME_VP9 => Some(hcodec_sys::CODING_VP9),
        MIME_AV1 => Some(hcodec_sys::CODING_AV1),
        _ => None,
    }
}

/// Maps a compression format back to its mime type.
pub fn mime_for_compression(coding: u32) -> &'static str {
    match coding {
        hcodec_sys::CODING_AVC => MIME_AVC,
        hcodec_sys::CODING_HEVC => MIME_HEVC,
        hcodec_sys::CODING_MPEG4 => MIME_MPEG4,
        hcodec_sys::CODING_VP9 => MIME_VP9,
        hcodec_sys::CODING_AV1 => MIME_AV1,
        _ => MIME_RAW,
    }
}

/// One data path of the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    Input,
    Output,
}

impl Port {
    pub fn index(self) -> u32 {
        match self {
            Port::Input => hcodec_sys::PORT_INDEX_INPUT,
            Port::Output => hcodec_sys::PORT_INDEX_OUTPUT,
        }
    }

    pub fn from_index(index: u32) -> Option<Port> {
        match index {
            hcodec_sys::PORT_INDEX_INPUT => Some(Port::Input),
            hcodec_sys::PORT_INDEX_OUTPUT => Some(Port::Output),
            _ => None,
        }
    }
}

/// Negotiated definition of one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub port: Port,
    pub width: u32,
    pub height: u32,
    pub stride: i32,
    pub slice_height: u32,
    /// Frames per second.
    pub frame_rate: f64,
    pub compression: u32,
    pub color_format: u32,
    pub buffer_size: u32,
    pub buffer_count: u32,
    pub min_buffer_count: u32,
    pub enabled: bool,
}

impl PortDefinition {
    /// Converts the component's structure to the typed view.
    pub fn from_param(param: &PortDefinitionParam) -> Result<Self> {
        let port = Port::from_index(param.port_index).ok_or_else(|| {
            Error::InvalidArgument(format!("unknown port index {}", param.port_index))
        })?;
        Ok(Self {
            port,
            width: param.video.frame_width,
            height: param.video.frame_height,
            stride: param.video.stride,
            slice_height: param.video.slice_height,
            frame_rate: q16_to_fps(param.video.frame_rate_q16),
            compression: param.video.compression_format,
            color_format: param.video.color_format,
            buffer_size: param.buffer_size,
            buffer_count: param.buffer_count_actual,
            min_buffer_count: param.buffer_count_min,
            enabled: param.enabled != 0,
        })
    }

    /// Writes the negotiable fields into `param`, leaving the rest untouched.
    pub fn apply_to(&self, param: &mut PortDefinitionParam) {
        param.port_index = self.port.index();
        param.video.frame_width = self.width;
        param.video.frame_height = self.height;
        param.video.stride = self.stride;
        param.video.slice_height = self.slice_height;
        param.video.frame_rate_q16 = fps_to_q16(self.frame_rate);
        param.video.compression_format = self.compression;
        param.video.color_format = self.color_format;
        param.buffer_size = self.buffer_size;
        param.buffer_count_actual = self.buffer_count;
    }

    /// Client-facing description of this port.
    pub fn to_format(&self) -> FormatDescriptor {
        let mut format = FormatDescriptor::new()
            .with(KEY_MIME, mime_for_compression(self.compression))
            .with(KEY_WIDTH, self.width)
            .with(KEY_HEIGHT, self.height)
            .with(KEY_FRAME_RATE, self.frame_rate)
            .with(KEY_BUFFER_COUNT, self.buffer_count)
            .with(KEY_MAX_INPUT_SIZE, self.buffer_size);
        if self.compression == hcodec_sys::CODING_UNUSED {
            format.set(KEY_COLOR_FORMAT, self.color_format);
            format.set(KEY_STRIDE, self.stride as i64);
            format.set(KEY_SLICE_HEIGHT, self.slice_height);
        }
        format
    }
}

pub(crate) fn fps_to_q16(fps: f64) -> u32 {
    (fps * 65536.0).round().max(0.0) as u32
}

pub(crate) fn q16_to_fps(q16: u32) -> f64 {
    q16 as f64 / 65536.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters_reject_mismatches() {
        let format = FormatDescriptor::new()
            .with(KEY_WIDTH, "wide")
            .with(KEY_HEIGHT, -1i64);
        assert!(format.get_u32(KEY_WIDTH).is_err());
        assert!(format.get_u32(KEY_HEIGHT).is_err());
        assert_eq!(format.get_u32(KEY_BITRATE).unwrap(), None);
        assert!(format.require_u32(KEY_BITRATE).is_err());
    }

    #[test]
    fn json_is_a_flat_object() {
        let format = FormatDescriptor::new()
            .with(KEY_MIME, MIME_HEVC)
            .with(KEY_FRAME_RATE, 29.97)
            .with(KEY_WIDTH, 1280i64);
        let json = format.to_json().unwrap();
        assert_eq!(json, r#"{"frame_rate":29.97,"mime":"video/hevc","width":1280}"#);
        assert_eq!(FormatDescriptor::from_json(&json).unwrap(), format);
    }

    #[test]
    fn port_definition_survives_the_wire_structure() {
        let mut param = hcodec_sys::init_param::<PortDefinitionParam>();
        let def = PortDefinition {
            port: Port::Output,
            width: 1920,
            height: 1080,
            stride: 1920,
            slice_height: 1088,
            frame_rate: 30.0,
            compression: hcodec_sys::CODING_UNUSED,
            color_format: hcodec_sys::COLOR_FORMAT_YUV420_SEMI_PLANAR,
            buffer_size: 1920 * 1088 * 3 / 2,
            buffer_count: 8,
            min_buffer_count: 0,
            enabled: false,
        };
        def.apply_to(&mut param);
        param.buffer_count_min = 4;
        param.enabled = 1;
        let back = PortDefinition::from_param(&param).unwrap();
        assert_eq!(back.width, 1920);
        assert_eq!(back.frame_rate, 30.0);
        assert_eq!(back.min_buffer_count, 4);
        assert!(back.enabled);
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(compression_for_mime(MIME_AVC), Some(hcodec_sys::CODING_AVC));
        assert_eq!(compression_for_mime("audio/aac"), None);
        assert_eq!(mime_for_compression(hcodec_sys::CODING_AV1), MIME_AV1);
    }
}
