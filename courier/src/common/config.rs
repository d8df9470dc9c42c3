/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Courier configuration loaded from XDG-compliant locations.

use std::path::PathBuf;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Configuration for a courier runtime.
///
/// Loaded from `$XDG_CONFIG_HOME/courier/config.toml`. Every section is
/// optional; missing values fall back to their defaults.
///
/// # Example Configuration File
///
/// ```toml
/// [app]
/// app_id = "billing"
///
/// [routing]
/// default_timeout_ms = 10000
/// inbound_capacity = 256
///
/// [pipes]
/// namespace = "courier"
/// server_name = "billing-1"
/// socket_mode = 0o660
/// max_connections = 100
///
/// [redis]
/// url = "redis://127.0.0.1:6379"
/// namespace = "courier"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Application identity defaults.
    pub app: AppConfig,
    /// Router chain settings.
    pub routing: RoutingConfig,
    /// Named-pipe transport settings.
    pub pipes: PipesConfig,
    /// Redis transport settings.
    pub redis: RedisConfig,
    /// Service Bus transport settings.
    pub service_bus: ServiceBusConfig,
}

/// Application identity defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application id used when none is given explicitly.
    pub app_id: String,
    /// Fixed instance id. A fresh one is generated when `None`.
    pub app_instance_id: Option<String>,
}

/// Router chain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Reply timeout in milliseconds for messages without their own.
    pub default_timeout_ms: u64,
    /// Capacity of the inbound message queue.
    pub inbound_capacity: usize,
}

/// Named-pipe transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipesConfig {
    /// Directory segment shared by every pipe of a deployment.
    pub namespace: String,
    /// Name of this instance's listening pipe. Defaults to the instance id.
    pub server_name: Option<String>,
    /// Override for the runtime directory.
    ///
    /// If `None`, `$XDG_RUNTIME_DIR` is used, falling back to `/tmp`.
    pub runtime_dir: Option<PathBuf>,
    /// Socket file permissions (Unix only).
    pub socket_mode: u32,
    /// Maximum concurrent inbound connections.
    pub max_connections: usize,
    /// Maximum frame payload in bytes.
    pub max_message_size: usize,
    /// Outbound connection timeout in milliseconds.
    pub connection_timeout_ms: u64,
}

/// Redis transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Server URL handed to the connector.
    pub url: String,
    /// Channel prefix.
    pub namespace: String,
}

/// Service Bus transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceBusConfig {
    /// Connection string handed to the connector.
    pub connection_string: String,
    /// Queue name prefix.
    pub namespace: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: "courier".to_string(),
            app_instance_id: None,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            inbound_capacity: 256,
        }
    }
}

impl Default for PipesConfig {
    fn default() -> Self {
        Self {
            namespace: "courier".to_string(),
            server_name: None,
            runtime_dir: None,
            socket_mode: 0o660,
            max_connections: 100,
            max_message_size: 1_048_576, // 1 MiB
            connection_timeout_ms: 10_000,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            namespace: "courier".to_string(),
        }
    }
}

impl Default for ServiceBusConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            namespace: "courier".to_string(),
        }
    }
}

impl PipesConfig {
    /// Directory holding every pipe of the namespace.
    ///
    /// `<runtime dir>/<namespace>`
    #[must_use]
    pub fn socket_dir(&self) -> PathBuf {
        let runtime_dir = self.runtime_dir.clone().unwrap_or_else(|| {
            std::env::var("XDG_RUNTIME_DIR").map_or_else(|_| PathBuf::from("/tmp"), PathBuf::from)
        });
        runtime_dir.join(&self.namespace)
    }

    /// Path of the pipe served by `server_name`.
    #[must_use]
    pub fn socket_path(&self, server_name: &str) -> PathBuf {
        self.socket_dir().join(format!("{server_name}.pipe"))
    }

    /// Outbound connection timeout as a `Duration`.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl CourierConfig {
    /// Reply timeout for messages without their own.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.routing.default_timeout_ms)
    }

    /// Load configuration from XDG-compliant locations.
    ///
    /// Reads `$XDG_CONFIG_HOME/courier/config.toml` (usually
    /// `~/.config/courier/config.toml`). If no file is found the defaults are
    /// returned. A file that cannot be read or parsed is logged and ignored.
    #[must_use]
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("courier") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(config_str) => Self::from_toml(&config_str).unwrap_or_else(|e| {
                error!("Failed to parse configuration file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed input.
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

lazy_static! {
    /// Global configuration instance loaded from XDG-compliant locations
    pub static ref CONFIG: CourierConfig = CourierConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CourierConfig::default();
        assert_eq!(config.default_timeout(), Duration::from_secs(10));
        assert_eq!(config.routing.inbound_capacity, 256);
        assert_eq!(config.pipes.max_connections, 100);
        assert_eq!(config.pipes.socket_mode, 0o660);
        assert_eq!(config.pipes.connection_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = CourierConfig::from_toml(
            r#"
            [routing]
            default_timeout_ms = 2500

            [pipes]
            namespace = "orders"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_timeout(), Duration::from_millis(2500));
        assert_eq!(config.routing.inbound_capacity, 256);
        assert_eq!(config.pipes.namespace, "orders");
        assert_eq!(config.pipes.max_message_size, 1_048_576);
        assert_eq!(config.redis.namespace, "courier");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(CourierConfig::from_toml("[routing\ndefault_timeout_ms = 1").is_err());
    }

    #[test]
    fn test_socket_path_layout() {
        let mut config = PipesConfig::default();
        config.runtime_dir = Some(PathBuf::from("/run/user/1000"));

        assert_eq!(config.socket_dir(), PathBuf::from("/run/user/1000/courier"));
        assert_eq!(
            config.socket_path("billing-1"),
            PathBuf::from("/run/user/1000/courier/billing-1.pipe")
        );
    }
}
