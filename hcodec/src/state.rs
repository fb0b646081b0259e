// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle states of a codec instance.
//!
//! [`StateId`] is the public name of a state. The loop thread keeps a
//! [`State`] value that also carries whatever that state is waiting for; the
//! buffer-operation modes are derived from the state itself, so switching the
//! state switches both modes in the same assignment.

use hcodec_sys::PeerState;

use crate::{buffer::BufferOperationMode, looper::Replier};

/// Name of the active lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StateId {
    #[default]
    Uninitialized,
    Initialized,
    Starting,
    Running,
    OutputPortChanged,
    Flushing,
    Stopping,
}

impl StateId {
    /// Buffer-operation modes applied to returning `(input, output)` buffers.
    pub fn buffer_modes(self) -> (BufferOperationMode, BufferOperationMode) {
        use BufferOperationMode::*;
        match self {
            StateId::Running => (Resubmit, Resubmit),
            StateId::OutputPortChanged => (Resubmit, Free),
            StateId::Uninitialized
            | StateId::Initialized
            | StateId::Starting
            | StateId::Flushing
            | StateId::Stopping => (Keep, Keep),
        }
    }

    /// States that wait for the component and defer client requests.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            StateId::Starting | StateId::OutputPortChanged | StateId::Flushing | StateId::Stopping
        )
    }

    /// States in which the client may queue input and release output.
    pub fn accepts_buffers(self) -> bool {
        matches!(self, StateId::Running | StateId::OutputPortChanged)
    }
}

/// Where a stop sequence ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AfterStop {
    /// Plain `stop`: back to a configured `Initialized`.
    Initialized,
    /// `release`: drop the component and go to `Uninitialized`.
    Release,
    /// `reset`: new component instance, configuration cleared.
    Reset,
}

/// Step of an output renegotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PortChangeStep {
    Disabling,
    Enabling,
}

/// Active state plus the data it is waiting on.
#[derive(Debug)]
pub(crate) enum State {
    Uninitialized,
    Initialized,
    Starting {
        reply: Option<Replier<()>>,
        awaiting: PeerState,
    },
    Running {
        /// Every buffer was pulled back by a flush and is held until `start`.
        flushed: bool,
    },
    OutputPortChanged {
        step: PortChangeStep,
    },
    Flushing {
        reply: Option<Replier<()>>,
        input_done: bool,
        output_done: bool,
    },
    Stopping {
        reply: Option<Replier<()>>,
        awaiting: PeerState,
        then: AfterStop,
    },
}

impl State {
    pub(crate) fn id(&self) -> StateId {
        match self {
            State::Uninitialized => StateId::Uninitialized,
            State::Initialized => StateId::Initialized,
            State::Starting { .. } => StateId::Starting,
            State::Running { .. } => StateId::Running,
            State::OutputPortChanged { .. } => StateId::OutputPortChanged,
            State::Flushing { .. } => StateId::Flushing,
            State::Stopping { .. } => StateId::Stopping,
        }
    }

    /// Takes the held reply of a transient state, if any.
    pub(crate) fn take_reply(&mut self) -> Option<Replier<()>> {
        match self {
            State::Starting { reply, .. }
            | State::Flushing { reply, .. }
            | State::Stopping { reply, .. } => reply.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferOperationMode::*;

    #[test]
    fn modes_follow_the_state() {
        assert_eq!(StateId::Running.buffer_modes(), (Resubmit, Resubmit));
        assert_eq!(StateId::OutputPortChanged.buffer_modes(), (Resubmit, Free));
        assert_eq!(StateId::Flushing.buffer_modes(), (Keep, Keep));
        assert_eq!(StateId::Stopping.buffer_modes(), (Keep, Keep));
        assert_eq!(
            State::Running { flushed: false }.id().buffer_modes(),
            (Resubmit, Resubmit)
        );
    }

    #[test]
    fn transient_states_do_not_take_buffers() {
        for state in [
            StateId::Starting,
            StateId::Flushing,
            StateId::Stopping,
            StateId::OutputPortChanged,
        ] {
            assert!(state.is_transient());
        }
        assert!(StateId::OutputPortChanged.accepts_buffers());
        assert!(!StateId::Flushing.accepts_buffers());
        assert!(!StateId::Initialized.is_transient());
    }
}
