// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Mid-stream renegotiation of the output port.
//!
//! The output port is disabled, its buffers are freed as they come back,
//! the new definition is read and adjusted, and a fresh pool is allocated
//! once the port is enabled again. Input keeps circulating throughout.

use hcodec_sys::{COMMAND_PORT_DISABLE, COMMAND_PORT_ENABLE, PORT_INDEX_OUTPUT};
use tracing::{debug, info, warn};

use super::driver::{CodecCore, no_component};
use crate::{
    Error, Port, Result,
    buffer::Owner,
    state::{PortChangeStep, State},
};

impl CodecCore {
    pub(super) fn begin_output_port_change(&mut self) {
        info!(codec = %self.id, "Output settings changed, renegotiating");
        let reclaimed = self.reclaim_from_app(Port::Output);
        if let Err(error) = self
            .link_mut()
            .and_then(|link| link.send_command(COMMAND_PORT_DISABLE, PORT_INDEX_OUTPUT))
        {
            self.fatal(error);
            return;
        }
        self.transition(State::OutputPortChanged {
            step: PortChangeStep::Disabling,
        });
        for id in self.output_pool.ids_owned_by(Owner::Pending) {
            self.free_record(Port::Output, id, true);
        }
        // Whatever the display gives back now is freed; the rest is not
        // waited for.
        self.drain_output_surface();
        if let Err(error) = self.write_off_outputs(&[Owner::WithSurface]) {
            self.fatal(error);
            return;
        }
        debug!(
            codec = %self.id,
            reclaimed,
            with_component = self.output_pool.counts().with_peer,
            "Output port disabling"
        );
    }

    /// Frees output records held by `owners` without waiting for them.
    fn write_off_outputs(&mut self, owners: &[Owner]) -> Result<()> {
        for &owner in owners {
            for id in self.output_pool.ids_owned_by(owner) {
                if owner != Owner::WithSurface {
                    warn!(codec = %self.id, buffer_id = id.0, ?owner, "Writing off output buffer");
                }
                self.output_pool.transfer(id, owner, Owner::Pending)?;
                self.free_record(Port::Output, id, owner != Owner::WithSurface);
            }
        }
        Ok(())
    }

    pub(super) fn on_output_disabled(&mut self) {
        let written_off =
            self.write_off_outputs(&[Owner::WithPeer, Owner::WithApp, Owner::WithSurface]);
        if let Err(error) = written_off.and_then(|()| self.reallocate_output()) {
            self.fatal(error);
            return;
        }
        if let State::OutputPortChanged { step } = &mut self.state {
            *step = PortChangeStep::Enabling;
        }
        debug!(codec = %self.id, "Output port enabling");
    }

    fn reallocate_output(&mut self) -> Result<()> {
        let link = self.link.as_mut().ok_or_else(no_component)?;
        let mut def = link.port_definition(Port::Output)?;
        let reported = def.clone();
        self.variant.on_output_port_changed(link, &mut def)?;
        if def != reported {
            link.set_port_definition(&def)?;
        }
        link.send_command(COMMAND_PORT_ENABLE, PORT_INDEX_OUTPUT)?;
        self.allocate_pool(Port::Output)
    }

    pub(super) fn on_output_enabled(&mut self) {
        let Some(format) = self
            .output_def
            .as_ref()
            .map(|def| self.variant.describe(def))
        else {
            self.fatal(Error::Fatal("output port lost its definition".to_string()));
            return;
        };
        info!(codec = %self.id, ?format, "Output format changed");
        if let Some(callback) = self.callback.as_mut() {
            callback.on_output_format_changed(&format);
        }
        self.enter_running();
    }
}
