//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use realtime_dispatch::config::{DispatchConfig, LoggingConfig};
use realtime_dispatch::core::serialization::SerializationFormat;
use realtime_dispatch::utils::compression::CompressionKind;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = DispatchConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_empty_server_identity() {
    let mut config = DispatchConfig::default();
    config.server.id = String::new();
    config.server.server_type = String::new();

    let errors = config.validate();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.contains("cannot be empty")));
}

#[test]
fn test_dotted_server_type() {
    let mut config = DispatchConfig::default();
    config.server.server_type = "game.room".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot contain '.'")));
}

#[test]
fn test_zero_buffer_sizes() {
    let mut config = DispatchConfig::default();
    config.dispatch.messages_buffer_size = 0;
    config.dispatch.local_process_buffer_size = 0;
    config.dispatch.remote_process_buffer_size = 0;

    let errors = config.validate();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.contains("must be greater than 0")));
}

#[test]
fn test_excessive_buffer_size() {
    let mut config = DispatchConfig::default();
    config.dispatch.local_process_buffer_size = 2_000_000;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Local process buffer size too large")));
}

#[test]
fn test_zero_workers() {
    let mut config = DispatchConfig::default();
    config.dispatch.workers = 0;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Worker count")));
}

#[test]
fn test_heartbeat_bounds() {
    let mut config = DispatchConfig::default();
    config.heartbeat.timeout = Duration::from_millis(50);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Heartbeat timeout too short")));

    config.heartbeat.timeout = Duration::ZERO;
    assert!(config.validate().is_empty(), "zero disables the heartbeat check");

    config.heartbeat.timeout = Duration::from_secs(7200);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Heartbeat timeout too long")));
}

#[test]
fn test_max_packet_size_bounds() {
    let mut config = DispatchConfig::default();
    config.codec.max_packet_size = 0;
    assert!(!config.validate().is_empty());

    config.codec.max_packet_size = 1 << 24;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("exceeds the 24-bit length field")));
}

#[test]
fn test_duplicate_route_codes() {
    let mut config = DispatchConfig::default();
    config.codec.route_dictionary.insert("Room.Join".into(), 1);
    config.codec.route_dictionary.insert("Room.Leave".into(), 1);

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Route dictionary code 1")));
    assert!(config.handler_options().is_err());
}

#[test]
fn test_empty_app_name() {
    let mut config = DispatchConfig::default();
    config.logging = LoggingConfig {
        app_name: String::new(),
        ..LoggingConfig::default()
    };

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Application name")));
}

#[test]
fn test_validate_strict_with_invalid_config() {
    let mut config = DispatchConfig::default();
    config.dispatch.workers = 0;
    config.logging.app_name = "x".repeat(100);

    let err = config.validate_strict().unwrap_err();
    let text = err.to_string();
    assert!(text.contains("Configuration validation failed"));
    assert!(text.contains("Worker count"));
    assert!(text.contains("Application name too long"));
}

#[test]
fn test_toml_round_trip_through_file() {
    let config = DispatchConfig::default_with_overrides(|c| {
        c.server.server_type = "room".into();
        c.dispatch.workers = 16;
        c.heartbeat.timeout = Duration::from_secs(10);
        c.codec.serializer = SerializationFormat::MessagePack;
        c.codec.data_compression = true;
        c.codec.compression = CompressionKind::Lz4;
        c.logging.log_level = Level::WARN;
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dispatch.toml");
    config.save_to_file(&path).unwrap();
    let loaded = DispatchConfig::from_file(&path).unwrap();

    assert_eq!(loaded.server.server_type, "room");
    assert_eq!(loaded.dispatch.workers, 16);
    assert_eq!(loaded.heartbeat.timeout, Duration::from_secs(10));
    assert_eq!(loaded.codec.serializer, SerializationFormat::MessagePack);
    assert_eq!(loaded.codec.compression, CompressionKind::Lz4);
    assert_eq!(loaded.logging.log_level, Level::WARN);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = DispatchConfig::from_toml(
        r#"
        [server]
        id = "room-3"
        server_type = "room"
        frontend = false

        [heartbeat]
        timeout = 1500
        "#,
    )
    .unwrap();

    assert_eq!(config.server.id, "room-3");
    assert!(!config.server.frontend);
    assert_eq!(config.heartbeat.timeout, Duration::from_millis(1500));
    assert_eq!(config.dispatch.workers, 4);

    let server = config.server();
    assert_eq!(server.server_type, "room");
    let options = config.handler_options().unwrap();
    assert_eq!(options.heartbeat_timeout, Duration::from_millis(1500));
}

#[test]
fn test_bad_toml_is_config_error() {
    let err = DispatchConfig::from_toml("[dispatch]\nworkers = \"four\"").unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}
