// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Application configuration management.
//!
//! Configuration is stored as TOML through `confy`. It covers the heartbeat
//! server's socket settings, the operator idle window, the status refresh
//! interval and the counters seeded at start-up.

use std::net::{AddrParseError, IpAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use station_core::tcp::{
    ServerConfig, DEFAULT_BACKLOG, DEFAULT_IDLE_TIMEOUT, DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE,
};

const APP_NAME: &str = "station-status";
const CONFIG_NAME: &str = "config";

/// Heartbeat server settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Address to listen on; "0.0.0.0" listens on all interfaces
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pending connection backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Seconds of silence before a connection is closed
    #[serde(default = "default_connection_idle_secs")]
    pub connection_idle_secs: u64,

    /// Maximum bytes read per request
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
            connection_idle_secs: default_connection_idle_secs(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl ServerSettings {
    /// Convert to the server's runtime configuration. Zero idle seconds or
    /// buffer size are raised to 1.
    pub fn to_server_config(&self) -> Result<ServerConfig, AddrParseError> {
        let bind_address: IpAddr = self.bind_address.parse()?;
        Ok(ServerConfig {
            bind_address,
            port: self.port,
            backlog: self.backlog,
            idle_timeout: Duration::from_secs(self.connection_idle_secs.max(1)),
            read_buffer_size: self.read_buffer_size.max(1),
        })
    }
}

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Configuration schema version
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Heartbeat server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Operator inactivity window in seconds
    #[serde(default = "default_idle_timer_seconds")]
    pub idle_timer_seconds: u64,

    /// Status refresh interval in milliseconds
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Auto time carried over from earlier runs, in seconds
    #[serde(default)]
    pub total_auto_seconds: u64,

    /// Inspected parts carried over from earlier runs
    #[serde(default)]
    pub total_parts: u64,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_connection_idle_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_secs()
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_idle_timer_seconds() -> u64 {
    300
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            server: ServerSettings::default(),
            idle_timer_seconds: default_idle_timer_seconds(),
            refresh_interval_ms: default_refresh_interval_ms(),
            total_auto_seconds: 0,
            total_parts: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform config directory, creating it with
    /// defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Load configuration from an explicit file path
    pub fn load_from(path: &Path) -> Result<Self, confy::ConfyError> {
        confy::load_path(path)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Refresh interval as a duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_server_defaults() {
        let config = AppConfig::default();
        let server = config.server.to_server_config().unwrap();
        assert_eq!(server.socket_addr().to_string(), "0.0.0.0:8016");
        assert_eq!(server.backlog, 5);
        assert_eq!(server.idle_timeout, Duration::from_secs(10));
        assert_eq!(server.read_buffer_size, 256);
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_server_limits_are_raised() {
        let settings = ServerSettings {
            connection_idle_secs: 0,
            read_buffer_size: 0,
            ..Default::default()
        };
        let server = settings.to_server_config().unwrap();
        assert_eq!(server.idle_timeout, Duration::from_secs(1));
        assert_eq!(server.read_buffer_size, 1);
        assert_eq!(server.port, 8016);
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let settings = ServerSettings {
            bind_address: "not-an-ip".to_string(),
            ..Default::default()
        };
        assert!(settings.to_server_config().is_err());
    }

    #[test]
    fn test_load_from_missing_path_writes_defaults() {
        let path = std::env::temp_dir().join(format!(
            "station-status-test-{}/config.toml",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
