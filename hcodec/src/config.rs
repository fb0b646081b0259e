// SPDX-FileCopyrightText: 2026 Contributors to the hcodec project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration for a codec instance.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Default bound for result-bearing calls.
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 5000;
/// Default watchdog for every transient state.
pub const DEFAULT_WATCHDOG_MS: u64 = 3000;
/// Default number of output buffers kept beyond what the surface needs.
pub const DEFAULT_EXTRA_SURFACE_BUFFERS: u32 = 2;

/// Driver configuration.
///
/// # Examples
///
/// ```
/// use hcodec::CodecConfig;
///
/// let config = CodecConfig::from_json_str(r#"{"sync_timeout_ms": 1000}"#).unwrap();
/// assert_eq!(config.sync_timeout_ms, 1000);
/// assert_eq!(config.starting_watchdog_ms, 3000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Component to instantiate; empty picks the variant's default name.
    pub component_name: String,

    /// Upper bound for blocking calls such as `start` or `stop`.
    pub sync_timeout_ms: u64,

    /// How long `Starting` may wait for the component to reach executing.
    pub starting_watchdog_ms: u64,

    /// How long an output renegotiation may take before it is aborted.
    pub port_change_watchdog_ms: u64,

    /// How long `Flushing` may wait for both ports to report completion.
    pub flushing_watchdog_ms: u64,

    /// How long `Stopping` may wait for the component to unload.
    pub stopping_watchdog_ms: u64,

    /// Input buffer count override (0 keeps the component's value).
    pub default_input_buffer_count: u32,

    /// Output buffer count override (0 keeps the component's value).
    pub default_output_buffer_count: u32,

    /// Output buffers added on top of the minimum when rendering to a surface.
    pub extra_surface_buffers: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            component_name: String::new(),
            sync_timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            starting_watchdog_ms: DEFAULT_WATCHDOG_MS,
            port_change_watchdog_ms: DEFAULT_WATCHDOG_MS,
            flushing_watchdog_ms: DEFAULT_WATCHDOG_MS,
            stopping_watchdog_ms: DEFAULT_WATCHDOG_MS,
            default_input_buffer_count: 0,
            default_output_buffer_count: 0,
            extra_surface_buffers: DEFAULT_EXTRA_SURFACE_BUFFERS,
        }
    }
}

impl CodecConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub(crate) fn starting_watchdog(&self) -> Duration {
        Duration::from_millis(self.starting_watchdog_ms)
    }

    pub(crate) fn port_change_watchdog(&self) -> Duration {
        Duration::from_millis(self.port_change_watchdog_ms)
    }

    pub(crate) fn flushing_watchdog(&self) -> Duration {
        Duration::from_millis(self.flushing_watchdog_ms)
    }

    pub(crate) fn stopping_watchdog(&self) -> Duration {
        Duration::from_millis(self.stopping_watchdog_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(CodecConfig::from_json_str("{}").unwrap(), CodecConfig::default());
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(CodecConfig::from_json_str(r#"{"sync_timeout_ms": "soon"}"#).is_err());
    }
}
