// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use super::*;
use serde_json::json;

#[test]
fn post_event_request_shape() {
    let request = Request::PostEvent {
        id: InstanceId::new("wf-1"),
        event: ExternalEvent::new("processed", json!({ "output": 0.4 })),
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "PostEvent",
            "id": "wf-1",
            "event": { "type": "processed", "payload": { "output": 0.4 } }
        })
    );

    let decoded: Request = decode(&encode(&request).unwrap()).unwrap();
    assert_eq!(decoded, request);
}

#[test]
fn unit_requests_are_tagged() {
    let encoded = encode(&Request::CreateInstance).unwrap();
    assert_eq!(std::str::from_utf8(&encoded).unwrap(), r#"{"type":"CreateInstance"}"#);
}

#[test]
fn status_response_roundtrip() {
    let response = Response::Status {
        uptime_secs: 3600,
        instances: 5,
        live_runs: 3,
    };

    let decoded: Response = decode(&encode(&response).unwrap()).unwrap();
    assert_eq!(response, decoded);
}

#[test]
fn unknown_request_type_fails_to_decode() {
    let result: Result<Request, _> = decode(br#"{"type":"LaunchRockets"}"#);
    assert!(matches!(result, Err(ProtocolError::Json(_))));
}

#[test]
fn encode_returns_json_without_length_prefix() {
    let encoded = encode(&Response::Ok).unwrap();
    let json_str = std::str::from_utf8(&encoded).unwrap();
    assert!(json_str.starts_with('{'), "should be JSON object: {}", json_str);
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original).await.unwrap();

    // write_message adds 4-byte length prefix
    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.unwrap();

    assert_eq!(read_back, original);
}

#[tokio::test]
async fn write_message_adds_big_endian_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data).await.unwrap();

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn read_from_empty_stream_is_connection_closed() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    assert!(matches!(
        read_message(&mut cursor).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let mut frame = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(b"{}");
    let mut cursor = std::io::Cursor::new(frame);
    assert!(matches!(
        read_message(&mut cursor).await,
        Err(ProtocolError::MessageTooLarge { .. })
    ));
}

#[tokio::test]
async fn request_and_response_frames_roundtrip() {
    let mut buffer = Vec::new();
    let bytes = encode(&Request::GetInstance {
        id: InstanceId::new("wf-9"),
    })
    .unwrap();
    write_message(&mut buffer, &bytes).await.unwrap();
    write_response(&mut buffer, &Response::Pong, DEFAULT_TIMEOUT)
        .await
        .unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let request = read_request(&mut cursor, DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(
        request,
        Request::GetInstance {
            id: InstanceId::new("wf-9")
        }
    );
    let response: Response = decode(&read_message(&mut cursor).await.unwrap()).unwrap();
    assert_eq!(response, Response::Pong);
}
