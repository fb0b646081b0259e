// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for codec driver operations.
//!
//! This module maps raw component status codes to idiomatic Rust errors and
//! classifies every error into the coarse [`ErrorKind`] reported to clients
//! through [`crate::CodecCallback::on_error`].

use hcodec_sys::Status;

use crate::{
    buffer::{BufferId, Owner},
    state::StateId,
};

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Code reported with [`ErrorKind::Fatal`] when a watchdog expires.
pub const CODE_WATCHDOG: i32 = -110;
/// Code reported when a buffer ownership rule is broken.
pub const CODE_OWNERSHIP: i32 = -22;
/// Code reported for an event the current state cannot explain.
pub const CODE_SPURIOUS_EVENT: i32 = -71;

/// Errors that can occur when driving a codec.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A handle, index or value passed by the caller is not acceptable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the current state.
    #[error("{op} is not allowed in state {state:?}")]
    InvalidState {
        /// Name of the rejected operation.
        op: &'static str,
        /// State the codec was in when the operation was rejected.
        state: StateId,
    },

    /// A buffer was not where the operation expected it to be.
    #[error("Buffer {id} is owned by {owner:?}, cannot move to {to:?}")]
    Ownership {
        id: BufferId,
        owner: Owner,
        to: Owner,
    },

    /// The component answered with a non-success status.
    #[error("Component returned status {0:#010x}")]
    Peer(Status),

    /// A synchronous wait or a watchdog expired.
    #[error("Timeout")]
    Timeout,

    /// Buffer or component allocation failed.
    #[error("Out of memory")]
    OutOfMemory,

    /// An unrecoverable inconsistency; the codec must be reset.
    #[error("Fatal: {0}")]
    Fatal(String),

    /// A format descriptor or configuration could not be (de)serialized.
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a configuration file failed.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// A generic error for failures not covered above.
    #[error("Other error: {0}")]
    Other(String),
}

/// Coarse error classification delivered through `on_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    PeerFailure,
    OutOfMemory,
    Fatal,
}

impl Error {
    /// Converts a raw component status code to a Rust [`Result`].
    ///
    /// # Returns
    ///
    /// - `Ok(())` if `status == ERR_NONE`
    /// - `Err(Error::...)` for any error status code
    ///
    /// # Examples
    ///
    /// ```ignore
    /// Error::from_status(peer.send_command(COMMAND_FLUSH, ALL_PORTS))?;
    /// ```
    pub fn from_status(status: Status) -> Result<()> {
        match status {
            hcodec_sys::ERR_NONE => Ok(()),
            hcodec_sys::ERR_INSUFFICIENT_RESOURCES => Err(Error::OutOfMemory),
            hcodec_sys::ERR_BAD_PARAMETER
            | hcodec_sys::ERR_BAD_PORT_INDEX
            | hcodec_sys::ERR_UNSUPPORTED_INDEX
            | hcodec_sys::ERR_UNSUPPORTED_SETTING => Err(Error::InvalidArgument(format!(
                "component rejected request with status {status:#010x}"
            ))),
            hcodec_sys::ERR_TIMEOUT => Err(Error::Timeout),
            other => Err(Error::Peer(other)),
        }
    }

    /// Classifies this error for client notification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) | Error::Json(_) => ErrorKind::InvalidArgument,
            Error::InvalidState { .. } | Error::Ownership { .. } => ErrorKind::InvalidState,
            Error::Peer(_) | Error::Timeout | Error::Io(_) | Error::Other(_) => {
                ErrorKind::PeerFailure
            }
            Error::OutOfMemory => ErrorKind::OutOfMemory,
            Error::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Numeric code accompanying [`Self::kind`] in `on_error`.
    pub fn code(&self) -> i32 {
        match self {
            Error::Peer(status) => *status as i32,
            Error::Timeout => CODE_WATCHDOG,
            Error::OutOfMemory => -12,
            Error::InvalidArgument(_) | Error::Json(_) => -22,
            Error::InvalidState { .. } => -38,
            Error::Ownership { .. } => CODE_OWNERSHIP,
            Error::Fatal(_) => CODE_SPURIOUS_EVENT,
            Error::Io(_) | Error::Other(_) => -1,
        }
    }

    pub(crate) fn invalid_state(op: &'static str, state: StateId) -> Self {
        Error::InvalidState { op, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(Error::from_status(hcodec_sys::ERR_NONE).is_ok());
        assert!(matches!(
            Error::from_status(hcodec_sys::ERR_INSUFFICIENT_RESOURCES),
            Err(Error::OutOfMemory)
        ));
        assert!(matches!(
            Error::from_status(hcodec_sys::ERR_BAD_PARAMETER),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Error::from_status(hcodec_sys::ERR_HARDWARE),
            Err(Error::Peer(hcodec_sys::ERR_HARDWARE))
        ));
    }

    #[test]
    fn kinds() {
        assert_eq!(Error::Timeout.kind(), ErrorKind::PeerFailure);
        assert_eq!(Error::Fatal("x".into()).kind(), ErrorKind::Fatal);
        assert_eq!(
            Error::invalid_state("start", StateId::Running).kind(),
            ErrorKind::InvalidState
        );
    }
}
