// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Smoke test for the public wire types.

use hcodec_sys::{Param, PortDefinitionParam, init_param};

/// Verifies that parameter structures can be prepared for the wire from
/// outside the crate.
#[test]
fn port_definition_is_wire_ready() {
    let mut def = init_param::<PortDefinitionParam>();
    def.set_port(hcodec_sys::PORT_INDEX_OUTPUT);
    def.video.frame_width = 1920;

    assert_eq!(PortDefinitionParam::INDEX, hcodec_sys::INDEX_PARAM_PORT_DEFINITION);
    assert_eq!(def.header().size as usize, std::mem::size_of::<PortDefinitionParam>());
    assert_eq!(bytemuck::bytes_of(&def).len(), def.header.size as usize);
    assert_eq!(def.port_index, 1);
}
