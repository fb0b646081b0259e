// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Command and parameter channel to the component instance.
//!
//! [`ComponentLink`] wraps the raw [`ComponentPeer`] with status-to-`Result`
//! conversion and typed, header-checked parameter marshalling. Completions
//! never come back through this type; they arrive on the loop as messages,
//! and [`ComponentLink::settle_command`] matches them against the commands
//! sent so far.

use std::sync::Arc;

use bytemuck::{bytes_of, bytes_of_mut};
use hcodec_sys::{
    BufferHeader, ComponentFactory, ComponentPeer, Param, PeerCallback, PeerState,
    PortDefinitionParam, header_matches, init_param,
};
use tracing::{debug, trace};

use crate::{Error, Port, PortDefinition, Result};

/// Connection to one live component instance.
pub struct ComponentLink {
    peer: Box<dyn ComponentPeer>,
    name: String,
    /// Commands accepted by the component and not completed yet.
    issued: Vec<(u32, u32)>,
}

impl std::fmt::Debug for ComponentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentLink")
            .field("name", &self.name)
            .field("issued", &self.issued)
            .finish_non_exhaustive()
    }
}

impl ComponentLink {
    /// Instantiates the component `name` and routes its callbacks to `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the component could not allocate the
    /// instance, or the mapped component status otherwise.
    pub(crate) fn create(
        factory: &dyn ComponentFactory,
        name: &str,
        callback: Arc<dyn PeerCallback>,
    ) -> Result<Self> {
        let peer = factory.create(name, callback).map_err(|status| {
            match Error::from_status(status) {
                Ok(()) => Error::Other(format!("Failed to create component \"{name}\".")),
                Err(error) => error,
            }
        })?;
        debug!(component = name, "Component instance created");
        Ok(Self {
            peer,
            name: name.to_owned(),
            issued: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send_command(&mut self, cmd: u32, param: u32) -> Result<()> {
        debug!(
            command = hcodec_sys::command_name(cmd),
            param, "Sending command to component"
        );
        Error::from_status(self.peer.send_command(cmd, param))?;
        if cmd == hcodec_sys::COMMAND_FLUSH && param == hcodec_sys::ALL_PORTS {
            self.issued.push((cmd, hcodec_sys::PORT_INDEX_INPUT));
            self.issued.push((cmd, hcodec_sys::PORT_INDEX_OUTPUT));
        } else {
            self.issued.push((cmd, param));
        }
        Ok(())
    }

    /// Marks the command behind a completion as done.
    ///
    /// Returns `false` if no such command is outstanding. A flush of all
    /// ports may complete once for both or once per port.
    pub fn settle_command(&mut self, cmd: u32, param: u32) -> bool {
        if cmd == hcodec_sys::COMMAND_FLUSH && param == hcodec_sys::ALL_PORTS {
            let before = self.issued.len();
            self.issued.retain(|&(issued, _)| issued != hcodec_sys::COMMAND_FLUSH);
            return self.issued.len() < before;
        }
        match self.issued.iter().position(|&issued| issued == (cmd, param)) {
            Some(index) => {
                self.issued.remove(index);
                true
            }
            None => false,
        }
    }

    /// Asks the component to move to `state`; completion is reported later.
    pub fn request_state(&mut self, state: PeerState) -> Result<()> {
        self.send_command(hcodec_sys::COMMAND_STATE_SET, state)
    }

    /// Reads the parameter structure `T` for `port`.
    ///
    /// The structure is zero-initialized with its header set before the call,
    /// and the header the component returns is checked.
    pub fn get_parameter<T: Param>(&mut self, port: u32) -> Result<T> {
        let mut param = init_param::<T>();
        param.set_port(port);
        Error::from_status(self.peer.get_parameter(T::INDEX, bytes_of_mut(&mut param)))?;
        check_header(&param)?;
        Ok(param)
    }

    pub fn set_parameter<T: Param>(&mut self, param: &T) -> Result<()> {
        check_header(param)?;
        trace!(index = T::INDEX, "Setting parameter");
        Error::from_status(self.peer.set_parameter(T::INDEX, bytes_of(param)))
    }

    pub fn set_config<T: Param>(&mut self, config: &T) -> Result<()> {
        check_header(config)?;
        trace!(index = T::INDEX, "Setting config");
        Error::from_status(self.peer.set_config(T::INDEX, bytes_of(config)))
    }

    /// Reads the negotiated definition of `port`.
    pub fn port_definition(&mut self, port: Port) -> Result<PortDefinition> {
        let param = self.get_parameter::<PortDefinitionParam>(port.index())?;
        PortDefinition::from_param(&param)
    }

    /// Writes `def` over the component's current definition of its port.
    pub fn set_port_definition(&mut self, def: &PortDefinition) -> Result<()> {
        let mut param = self.get_parameter::<PortDefinitionParam>(def.port.index())?;
        def.apply_to(&mut param);
        self.set_parameter(&param)
    }

    pub(crate) fn allocate_buffer(&mut self, port: Port, header: &mut BufferHeader) -> Result<()> {
        Error::from_status(self.peer.allocate_buffer(port.index(), header))
    }

    pub(crate) fn use_buffer(&mut self, port: Port, header: &mut BufferHeader) -> Result<()> {
        Error::from_status(self.peer.use_buffer(port.index(), header))
    }

    pub(crate) fn free_buffer(&mut self, port: Port, buffer_id: u32) -> Result<()> {
        Error::from_status(self.peer.free_buffer(port.index(), buffer_id))
    }

    pub(crate) fn empty_this_buffer(&mut self, header: &BufferHeader) -> Result<()> {
        Error::from_status(self.peer.empty_this_buffer(header))
    }

    pub(crate) fn fill_this_buffer(&mut self, header: &BufferHeader) -> Result<()> {
        Error::from_status(self.peer.fill_this_buffer(header))
    }
}

fn check_header<T: Param>(param: &T) -> Result<()> {
    if header_matches::<T>(param.header()) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "parameter {:#x} has header size {} version {:?}, expected size {}",
            T::INDEX,
            param.header().size,
            param.header().version,
            std::mem::size_of::<T>()
        )))
    }
}
