// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::protocol::handshake::*;
use std::collections::HashMap;
use std::time::Duration;

#[test]
fn test_client_handshake_parsing() {
    let body = br#"{"sys":{"platform":"android","libVersion":"0.3.5","clientVersion":"1.2.0"},"user":{"age":30}}"#;
    let request = parse_handshake(body).expect("valid handshake");
    assert_eq!(request.sys.platform, "android");
    assert_eq!(request.sys.lib_version, "0.3.5");
    assert_eq!(request.sys.client_version, "1.2.0");
    assert!(request.sys.client_build_number.is_empty());
    assert_eq!(request.user.get("age"), Some(&serde_json::json!(30)));
}

#[test]
fn test_empty_handshake_is_anonymous_client() {
    let request = parse_handshake(b"").expect("empty body is allowed");
    assert_eq!(request, HandshakeRequest::default());
}

#[test]
fn test_malformed_handshake_rejected() {
    let err = parse_handshake(b"{\"sys\":").unwrap_err();
    assert!(err.is_protocol_violation());
    assert!(err.to_string().starts_with("Handshake failed"));
}

#[test]
fn test_handshake_response_shape() {
    let mut dict = HashMap::new();
    dict.insert("Room.Join".to_string(), 1u16);
    let response = HandshakeResponse::new(Duration::from_secs(30), "json", dict);
    let value: serde_json::Value = serde_json::from_slice(&response.to_bytes().unwrap()).unwrap();

    assert_eq!(value["code"], 200);
    assert_eq!(value["sys"]["heartbeat"], 30);
    assert_eq!(value["sys"]["heartbeatMs"], 30_000);
    assert_eq!(value["sys"]["serializer"], "json");
    assert_eq!(value["sys"]["dict"]["Room.Join"], 1);
}

#[test]
fn test_sub_second_heartbeat_is_not_rounded_up() {
    let response = HandshakeResponse::new(Duration::from_millis(250), "json", HashMap::new());
    assert_eq!(response.sys.heartbeat, 0);
    assert_eq!(response.sys.heartbeat_ms, 250);
    let text = String::from_utf8(response.to_bytes().unwrap()).unwrap();
    assert!(!text.contains("dict"));
}

#[test]
fn test_kick_reason_body() {
    let body = KickReason {
        reason: "heartbeat timeout".into(),
    }
    .to_bytes()
    .unwrap();
    assert_eq!(body, br#"{"reason":"heartbeat timeout"}"#.to_vec());
}
