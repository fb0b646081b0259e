// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-layout parameter structures exchanged with the component.
//!
//! All structures are `#[repr(C)]`, contain no implicit padding and begin
//! with a [`ParamHeader`]. Their byte image is the wire format.

use bytemuck::{Pod, Zeroable};

use crate::{
    INDEX_CONFIG_INTRA_VOP_REFRESH, INDEX_CONFIG_VIDEO_BITRATE, INDEX_CONFIG_VIDEO_FRAMERATE,
    INDEX_PARAM_COLOR_ASPECTS, INDEX_PARAM_FRAME_RATE_ADAPTIVE, INDEX_PARAM_I_FRAME_INTERVAL,
    INDEX_PARAM_PORT_DEFINITION, INDEX_PARAM_VIDEO_BITRATE, INDEX_PARAM_VIDEO_PORT_FORMAT,
};

/// Structure version understood by this crate.
pub const PARAM_VERSION: Version = Version {
    major: 1,
    minor: 1,
    revision: 2,
    step: 0,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
    pub step: u8,
}

/// Size/version header leading every parameter structure and buffer header.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ParamHeader {
    pub size: u32,
    pub version: Version,
}

/// A parameter or config structure addressed by a fixed index.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, start with a [`ParamHeader`] at offset
/// zero and be scoped to a single port.
pub unsafe trait Param: Pod {
    /// Index under which the component knows this structure.
    const INDEX: u32;

    fn header(&self) -> &ParamHeader;

    fn header_mut(&mut self) -> &mut ParamHeader;

    fn set_port(&mut self, port: u32);
}

/// Returns a zeroed `T` whose header carries its size and the current version.
pub fn init_param<T: Param>() -> T {
    let mut param: T = Zeroable::zeroed();
    let header = param.header_mut();
    header.size = std::mem::size_of::<T>() as u32;
    header.version = PARAM_VERSION;
    param
}

/// Returns `true` if `header` is valid for a structure of type `T`.
pub fn header_matches<T: Param>(header: &ParamHeader) -> bool {
    header.size as usize == std::mem::size_of::<T>() && header.version.major == PARAM_VERSION.major
}

macro_rules! impl_param {
    ($ty:ty, $index:expr) => {
        unsafe impl Param for $ty {
            const INDEX: u32 = $index;

            fn header(&self) -> &ParamHeader {
                &self.header
            }

            fn header_mut(&mut self) -> &mut ParamHeader {
                &mut self.header
            }

            fn set_port(&mut self, port: u32) {
                self.port_index = port;
            }
        }
    };
}

/// Video-domain block of a [`PortDefinitionParam`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VideoPortDefinition {
    pub frame_width: u32,
    pub frame_height: u32,
    pub stride: i32,
    pub slice_height: u32,
    pub bitrate: u32,
    /// Frame rate in Q16 fixed point.
    pub frame_rate_q16: u32,
    pub compression_format: u32,
    pub color_format: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PortDefinitionParam {
    pub header: ParamHeader,
    pub port_index: u32,
    pub dir: u32,
    pub buffer_count_actual: u32,
    pub buffer_count_min: u32,
    pub buffer_size: u32,
    pub enabled: u32,
    pub populated: u32,
    pub domain: u32,
    pub video: VideoPortDefinition,
    pub buffers_contiguous: u32,
    pub buffer_alignment: u32,
}
impl_param!(PortDefinitionParam, INDEX_PARAM_PORT_DEFINITION);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VideoPortFormatParam {
    pub header: ParamHeader,
    pub port_index: u32,
    pub index: u32,
    pub compression_format: u32,
    pub color_format: u32,
    pub frame_rate_q16: u32,
}
impl_param!(VideoPortFormatParam, INDEX_PARAM_VIDEO_PORT_FORMAT);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VideoBitrateParam {
    pub header: ParamHeader,
    pub port_index: u32,
    pub control_rate: u32,
    pub target_bitrate: u32,
}
impl_param!(VideoBitrateParam, INDEX_PARAM_VIDEO_BITRATE);

/// Runtime bitrate update, same layout as the parameter form minus the mode.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BitrateConfig {
    pub header: ParamHeader,
    pub port_index: u32,
    pub encode_bitrate: u32,
}
impl_param!(BitrateConfig, INDEX_CONFIG_VIDEO_BITRATE);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameRateConfig {
    pub header: ParamHeader,
    pub port_index: u32,
    pub frame_rate_q16: u32,
}
impl_param!(FrameRateConfig, INDEX_CONFIG_VIDEO_FRAMERATE);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IntraRefreshVopConfig {
    pub header: ParamHeader,
    pub port_index: u32,
    pub intra_refresh_vop: u32,
}
impl_param!(IntraRefreshVopConfig, INDEX_CONFIG_INTRA_VOP_REFRESH);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IFrameIntervalParam {
    pub header: ParamHeader,
    pub port_index: u32,
    /// Key frame interval in milliseconds; negative means only the first frame.
    pub interval_ms: i32,
}
impl_param!(IFrameIntervalParam, INDEX_PARAM_I_FRAME_INTERVAL);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameRateAdaptiveParam {
    pub header: ParamHeader,
    pub port_index: u32,
    pub enable: u32,
}
impl_param!(FrameRateAdaptiveParam, INDEX_PARAM_FRAME_RATE_ADAPTIVE);

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ColorAspectsParam {
    pub header: ParamHeader,
    pub port_index: u32,
    pub range: u32,
    pub primaries: u32,
    pub transfer: u32,
    pub matrix: u32,
}
impl_param!(ColorAspectsParam, INDEX_PARAM_COLOR_ASPECTS);

/// Peer-visible descriptor of one buffer.
///
/// The component hands this structure back unchanged in its completion
/// callbacks; `buffer_id` is how the driver finds its own record again.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BufferHeader {
    pub header: ParamHeader,
    pub buffer_id: u32,
    pub port_index: u32,
    pub alloc_len: u32,
    pub filled_len: u32,
    pub offset: u32,
    pub flags: u32,
    pub timestamp_us: i64,
    /// Memory handle: shared-memory key, DMA fd or surface buffer sequence.
    pub handle: u64,
    pub app_private: u64,
}

impl BufferHeader {
    /// Returns a zeroed header with size and version set.
    pub fn new(buffer_id: u32, port_index: u32) -> Self {
        Self {
            header: ParamHeader {
                size: std::mem::size_of::<Self>() as u32,
                version: PARAM_VERSION,
            },
            buffer_id,
            port_index,
            ..Zeroable::zeroed()
        }
    }
}
