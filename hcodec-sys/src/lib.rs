// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! # hcodec-sys: Raw wire contract with out-of-process codec components
//!
//! This crate describes the low-level surface exposed by a vendor codec
//! component living in another process. It contains:
//! - Fixed-layout, index-keyed parameter structures ([`params`])
//! - Status codes, command kinds, peer states, event kinds and buffer flags
//! - The raw RPC-shaped traits a component transport implements ([`peer`])
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe [`hcodec`]
//! driver instead, which provides:
//! - Buffer ownership tracking with stable buffer ids
//! - A serialized state machine for the component lifecycle
//! - Rust-idiomatic error handling with `Result`
//!
//! This crate is only needed for:
//! - Implementing a transport to a new vendor component
//! - Writing test doubles of a component
//!
//! ## Wire format
//!
//! Every parameter structure starts with a [`ParamHeader`] and must be
//! zero-initialized with its size and version set before it is exchanged.
//! [`init_param`] does both. Layouts are `#[repr(C)]` without padding and must
//! stay bit-exact with what the component expects.
//!
//! [`hcodec`]: https://docs.rs/hcodec

pub mod params;
pub mod peer;

pub use params::*;
pub use peer::{ComponentFactory, ComponentPeer, PeerCallback};

/// Raw status code returned by every component call.
pub type Status = u32;

pub const ERR_NONE: Status = 0;
pub const ERR_INSUFFICIENT_RESOURCES: Status = 0x8000_1000;
pub const ERR_UNDEFINED: Status = 0x8000_1001;
pub const ERR_INVALID_COMPONENT_NAME: Status = 0x8000_1002;
pub const ERR_COMPONENT_NOT_FOUND: Status = 0x8000_1003;
pub const ERR_BAD_PARAMETER: Status = 0x8000_1005;
pub const ERR_NOT_IMPLEMENTED: Status = 0x8000_1006;
pub const ERR_UNDERFLOW: Status = 0x8000_1007;
pub const ERR_OVERFLOW: Status = 0x8000_1008;
pub const ERR_HARDWARE: Status = 0x8000_1009;
pub const ERR_INVALID_STATE: Status = 0x8000_100A;
pub const ERR_STREAM_CORRUPT: Status = 0x8000_100B;
pub const ERR_TIMEOUT: Status = 0x8000_1011;
pub const ERR_SAME_STATE: Status = 0x8000_1012;
pub const ERR_INCORRECT_STATE_TRANSITION: Status = 0x8000_1017;
pub const ERR_INCORRECT_STATE_OPERATION: Status = 0x8000_1018;
pub const ERR_UNSUPPORTED_SETTING: Status = 0x8000_1019;
pub const ERR_UNSUPPORTED_INDEX: Status = 0x8000_101A;
pub const ERR_BAD_PORT_INDEX: Status = 0x8000_101B;
pub const ERR_PORT_UNPOPULATED: Status = 0x8000_101C;

/// Command kinds accepted by [`ComponentPeer::send_command`].
pub type Command = u32;

pub const COMMAND_STATE_SET: Command = 0;
pub const COMMAND_FLUSH: Command = 1;
pub const COMMAND_PORT_DISABLE: Command = 2;
pub const COMMAND_PORT_ENABLE: Command = 3;

/// Component lifecycle states as reported by the peer.
pub type PeerState = u32;

pub const STATE_INVALID: PeerState = 0;
pub const STATE_LOADED: PeerState = 1;
pub const STATE_IDLE: PeerState = 2;
pub const STATE_EXECUTING: PeerState = 3;

/// Event kinds delivered through [`PeerCallback::event_handler`].
pub type Event = u32;

pub const EVENT_CMD_COMPLETE: Event = 0;
pub const EVENT_ERROR: Event = 1;
pub const EVENT_PORT_SETTINGS_CHANGED: Event = 3;
pub const EVENT_BUFFER_FLAG: Event = 4;

/// Port index addressing every port at once (flush and enable/disable).
pub const ALL_PORTS: u32 = 0xFFFF_FFFF;
pub const PORT_INDEX_INPUT: u32 = 0;
pub const PORT_INDEX_OUTPUT: u32 = 1;

pub const DIR_INPUT: u32 = 0;
pub const DIR_OUTPUT: u32 = 1;

pub const DOMAIN_VIDEO: u32 = 1;

pub const BUFFERFLAG_EOS: u32 = 0x0000_0001;
pub const BUFFERFLAG_SYNCFRAME: u32 = 0x0000_0020;
pub const BUFFERFLAG_CODECCONFIG: u32 = 0x0000_0080;

pub const CODING_UNUSED: u32 = 0;
pub const CODING_MPEG4: u32 = 4;
pub const CODING_AVC: u32 = 7;
pub const CODING_VP9: u32 = 10;
pub const CODING_HEVC: u32 = 11;
pub const CODING_AV1: u32 = 12;

pub const COLOR_FORMAT_UNUSED: u32 = 0;
pub const COLOR_FORMAT_YUV420_PLANAR: u32 = 19;
pub const COLOR_FORMAT_YUV420_SEMI_PLANAR: u32 = 21;
pub const COLOR_FORMAT_YVU420_SEMI_PLANAR: u32 = 0x7FA3_0C00;
pub const COLOR_FORMAT_SURFACE: u32 = 0x7F00_0789;

pub const RATE_CONTROL_DISABLE: u32 = 0;
pub const RATE_CONTROL_VARIABLE: u32 = 1;
pub const RATE_CONTROL_CONSTANT: u32 = 2;
pub const RATE_CONTROL_CONSTANT_QUALITY: u32 = 0x7F00_0001;

pub const INDEX_PARAM_PORT_DEFINITION: u32 = 0x0100_0001;
pub const INDEX_PARAM_VIDEO_PORT_FORMAT: u32 = 0x0600_0001;
pub const INDEX_PARAM_VIDEO_BITRATE: u32 = 0x0600_0004;
pub const INDEX_CONFIG_VIDEO_BITRATE: u32 = 0x0900_0002;
pub const INDEX_CONFIG_VIDEO_FRAMERATE: u32 = 0x0900_0003;
pub const INDEX_CONFIG_INTRA_VOP_REFRESH: u32 = 0x0900_0004;
pub const INDEX_PARAM_I_FRAME_INTERVAL: u32 = 0x7F00_0101;
pub const INDEX_PARAM_FRAME_RATE_ADAPTIVE: u32 = 0x7F00_0102;
pub const INDEX_PARAM_COLOR_ASPECTS: u32 = 0x7F00_0103;

/// Returns a short human-readable name for a command, for logs.
pub fn command_name(cmd: Command) -> &'static str {
    match cmd {
        COMMAND_STATE_SET => "StateSet",
        COMMAND_FLUSH => "Flush",
        COMMAND_PORT_DISABLE => "PortDisable",
        COMMAND_PORT_ENABLE => "PortEnable",
        _ => "Unknown",
    }
}

/// Returns a short human-readable name for a peer state, for logs.
pub fn state_name(state: PeerState) -> &'static str {
    match state {
        STATE_LOADED => "Loaded",
        STATE_IDLE => "Idle",
        STATE_EXECUTING => "Executing",
        _ => "Invalid",
    }
}
