//! # Configuration Management
//!
//! Centralized configuration for a dispatcher process.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides (`REALTIME_DISPATCH_*`) via `from_env()` / `apply_env()`
//!
//! Durations are written in milliseconds.
//!
//! ```toml
//! [server]
//! id = "connector-1"
//! server_type = "connector"
//! frontend = true
//!
//! [dispatch]
//! messages_buffer_size = 100
//! local_process_buffer_size = 100
//! remote_process_buffer_size = 100
//! workers = 4
//! drain_timeout = 5000
//!
//! [heartbeat]
//! timeout = 30000
//!
//! [codec]
//! serializer = "json"
//! data_compression = false
//! ```

use crate::cluster::Server;
use crate::core::codec::PacketCodec;
use crate::core::message::MessageCodec;
use crate::core::packet::MAX_PACKET_SIZE;
use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::service::handler::HandlerServiceOptions;
use crate::utils::compression::CompressionKind;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "REALTIME_DISPATCH_";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DispatchConfig {
    /// Identity of this server process
    #[serde(default)]
    pub server: ServerConfig,

    /// Queue sizes and worker pools
    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Packet and message codec settings
    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DispatchConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override settings from `REALTIME_DISPATCH_*` environment variables.
    ///
    /// Unparsable numeric values are errors rather than silently ignored.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("SERVER_ID") {
            self.server.id = id;
        }
        if let Some(server_type) = lookup("SERVER_TYPE") {
            self.server.server_type = server_type;
        }
        if let Some(size) = lookup("MESSAGES_BUFFER_SIZE") {
            self.dispatch.messages_buffer_size = parse_env("MESSAGES_BUFFER_SIZE", &size)?;
        }
        if let Some(size) = lookup("LOCAL_PROCESS_BUFFER_SIZE") {
            self.dispatch.local_process_buffer_size = parse_env("LOCAL_PROCESS_BUFFER_SIZE", &size)?;
        }
        if let Some(size) = lookup("REMOTE_PROCESS_BUFFER_SIZE") {
            self.dispatch.remote_process_buffer_size =
                parse_env("REMOTE_PROCESS_BUFFER_SIZE", &size)?;
        }
        if let Some(workers) = lookup("WORKERS") {
            self.dispatch.workers = parse_env("WORKERS", &workers)?;
        }
        if let Some(ms) = lookup("HEARTBEAT_TIMEOUT_MS") {
            self.heartbeat.timeout = Duration::from_millis(parse_env("HEARTBEAT_TIMEOUT_MS", &ms)?);
        }
        if let Some(serializer) = lookup("SERIALIZER") {
            self.codec.serializer = serializer.parse()?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.log_level = level
                .parse()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {level}")))?;
        }
        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.dispatch.validate());
        errors.extend(self.heartbeat.validate());
        errors.extend(self.codec.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Descriptor of this server.
    pub fn server(&self) -> Server {
        Server::new(
            self.server.id.clone(),
            self.server.server_type.clone(),
            self.server.frontend,
        )
    }

    /// Build dispatcher options from this configuration.
    pub fn handler_options(&self) -> Result<HandlerServiceOptions> {
        let packet_codec = Arc::new(PacketCodec::new(self.codec.max_packet_size));

        let mut message_codec = MessageCodec::new(false);
        if self.codec.data_compression {
            message_codec =
                message_codec.with_compression(self.codec.compression, self.codec.compression_threshold);
        }
        if !self.codec.route_dictionary.is_empty() {
            message_codec = message_codec.with_dictionary(self.codec.route_dictionary.clone())?;
        }

        Ok(HandlerServiceOptions {
            decoder: packet_codec.clone(),
            encoder: packet_codec,
            serializer: self.codec.serializer,
            heartbeat_timeout: self.heartbeat.timeout,
            messages_buffer_size: self.dispatch.messages_buffer_size,
            local_process_buffer_size: self.dispatch.local_process_buffer_size,
            remote_process_buffer_size: self.dispatch.remote_process_buffer_size,
            workers: self.dispatch.workers,
            drain_timeout: self.dispatch.drain_timeout,
            message_encoder: Arc::new(message_codec),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {ENV_PREFIX}{key}: '{value}'")))
}

/// Server identity
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Unique id within the cluster
    pub id: String,

    /// Server type that routes address, e.g. "connector"
    pub server_type: String,

    /// Whether clients connect to this server directly
    pub frontend: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            id: String::from("server-1"),
            server_type: String::from("connector"),
            frontend: true,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push("Server id cannot be empty".to_string());
        }

        if self.server_type.is_empty() {
            errors.push("Server type cannot be empty".to_string());
        } else if self.server_type.contains('.') {
            errors.push(format!(
                "Server type '{}' cannot contain '.' (it is the first route segment)",
                self.server_type
            ));
        }

        errors
    }
}

/// Dispatch queues and worker pools
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchSettings {
    /// Outbound packets buffered per session
    pub messages_buffer_size: usize,

    /// Capacity of the local dispatch queue
    pub local_process_buffer_size: usize,

    /// Capacity of the remote dispatch queue
    pub remote_process_buffer_size: usize,

    /// Workers per queue
    pub workers: usize,

    /// How long workers drain queued work after shutdown begins
    #[serde(with = "duration_serde")]
    pub drain_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            messages_buffer_size: 100,
            local_process_buffer_size: 100,
            remote_process_buffer_size: 100,
            workers: 4,
            drain_timeout: timeout::DRAIN_TIMEOUT,
        }
    }
}

impl DispatchSettings {
    /// Validate dispatch configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("Messages buffer size", self.messages_buffer_size),
            ("Local process buffer size", self.local_process_buffer_size),
            ("Remote process buffer size", self.remote_process_buffer_size),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            } else if value > 1_000_000 {
                errors.push(format!("{name} too large: {value} (max recommended: 1,000,000)"));
            }
        }

        if self.workers == 0 {
            errors.push("Worker count must be greater than 0".to_string());
        } else if self.workers > 1024 {
            errors.push(format!("Worker count too high: {} (maximum: 1024)", self.workers));
        }

        if self.drain_timeout.as_secs() > 60 {
            errors.push("Drain timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Heartbeat enforcement
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatConfig {
    /// Sessions silent for longer than this are kicked; 0 disables the check
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout: timeout::HEARTBEAT_TIMEOUT,
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.timeout.is_zero() && self.timeout.as_millis() < 100 {
            errors.push("Heartbeat timeout too short (minimum: 100ms, or 0 to disable)".to_string());
        } else if self.timeout.as_secs() > 3600 {
            errors.push("Heartbeat timeout too long (maximum: 1 hour)".to_string());
        }
        errors
    }
}

/// Codec configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecConfig {
    /// Largest accepted packet body in bytes
    pub max_packet_size: usize,

    /// Serializer for message bodies and error payloads
    pub serializer: SerializationFormat,

    /// Compress message data when it shrinks
    pub data_compression: bool,

    pub compression: CompressionKind,

    /// Bodies smaller than this are never compressed
    pub compression_threshold: usize,

    /// Route codes advertised in the handshake
    #[serde(default)]
    pub route_dictionary: HashMap<String, u16>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            serializer: SerializationFormat::Json,
            data_compression: false,
            compression: CompressionKind::default(),
            compression_threshold: 512,
            route_dictionary: HashMap::new(),
        }
    }
}

impl CodecConfig {
    /// Validate codec configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_packet_size == 0 {
            errors.push("Max packet size must be greater than 0".to_string());
        } else if self.max_packet_size > MAX_PACKET_SIZE {
            errors.push(format!(
                "Max packet size {} exceeds the 24-bit length field ({MAX_PACKET_SIZE})",
                self.max_packet_size
            ));
        }

        let mut codes: HashMap<u16, &str> = HashMap::new();
        for (route, code) in &self.route_dictionary {
            if let Some(other) = codes.insert(*code, route) {
                errors.push(format!("Route dictionary code {code} used by both '{other}' and '{route}'"));
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("realtime-dispatch"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SERVER_TYPE", "room"),
            ("WORKERS", "8"),
            ("HEARTBEAT_TIMEOUT_MS", "2500"),
            ("SERIALIZER", "msgpack"),
            ("LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = DispatchConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.server_type, "room");
        assert_eq!(config.dispatch.workers, 8);
        assert_eq!(config.heartbeat.timeout, Duration::from_millis(2500));
        assert_eq!(config.codec.serializer, SerializationFormat::MessagePack);
        assert_eq!(config.logging.log_level, Level::DEBUG);
    }

    #[test]
    fn test_example_config_parses_back() {
        let parsed = DispatchConfig::from_toml(&DispatchConfig::example_config()).unwrap();
        assert_eq!(parsed.dispatch.workers, DispatchConfig::default().dispatch.workers);
        assert!(parsed.validate().is_empty());
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = DispatchConfig::default();
        let result = config.apply_overrides(|key| (key == "WORKERS").then(|| "many".to_string()));
        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
    }

    #[test]
    fn test_handler_options_follow_config() {
        let config = DispatchConfig::default_with_overrides(|c| {
            c.dispatch.messages_buffer_size = 10;
            c.dispatch.local_process_buffer_size = 9;
            c.dispatch.remote_process_buffer_size = 8;
            c.codec.route_dictionary.insert("room.Room.Join".into(), 1);
        });
        let options = config.handler_options().unwrap();
        assert_eq!(options.messages_buffer_size, 10);
        assert_eq!(options.local_process_buffer_size, 9);
        assert_eq!(options.remote_process_buffer_size, 8);
        assert_eq!(
            options.message_encoder.route_dictionary().get("room.Room.Join"),
            Some(&1)
        );
    }
}
