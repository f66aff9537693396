//! WebSocket protocol tests against a live listener

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use voxgate::EngineKind;

/// Serve the router on an ephemeral port and return its address
async fn serve(app: axum::Router) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

async fn mock_elevenlabs(audio: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/voices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voices": [{"voice_id": "mockvoice", "name": "Mock Voice"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/mockvoice"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(audio),
        )
        .mount(&server)
        .await;
    server
}

fn as_json(msg: &Message) -> Value {
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthenticated_connect_gets_error_frame_then_close() {
    let (app, _state) = authed_app().await;
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let frame = socket.next().await.unwrap().unwrap();
    let body = as_json(&frame);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert!(body["error"].is_string());

    // Server closes after the error frame.
    loop {
        match socket.next().await {
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(other)) => panic!("unexpected frame after error: {other:?}"),
            Some(Err(_)) => break,
        }
    }
}

#[tokio::test]
async fn authenticated_connect_serves_commands() {
    let (app, _state) = authed_app().await;
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws?api_key={ADMIN_SECRET}"))
        .await
        .unwrap();

    socket
        .send(Message::Text(r#"{"type":"engines"}"#.into()))
        .await
        .unwrap();
    let body = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(body["type"], "engines");
    assert_eq!(body["engines"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn malformed_command_gets_error_frame_but_keeps_connection() {
    let (app, _state) = open_app().await;
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    socket
        .send(Message::Text(r#"{"type":"shout"}"#.into()))
        .await
        .unwrap();
    let body = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // Connection survives: a valid command still works.
    socket
        .send(Message::Text(r#"{"type":"engines"}"#.into()))
        .await
        .unwrap();
    let body = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(body["type"], "engines");
}

#[tokio::test]
async fn binary_frames_are_rejected() {
    let (app, _state) = open_app().await;
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    socket
        .send(Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();
    let body = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn speak_streams_meta_chunks_and_end() {
    let upstream = mock_elevenlabs(vec![0x5Au8; 1000]).await;
    let (app, state) = open_app().await;
    state.registry.set_credentials(
        EngineKind::Elevenlabs,
        [
            ("api_key".to_string(), "test".to_string()),
            ("api_base_url".to_string(), upstream.uri()),
        ]
        .into_iter()
        .collect(),
    );
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let command = json!({
        "type": "speak",
        "text": "Hello over the wire",
        "voice": "elevenlabs:mockvoice",
        "format": "mp3",
        "stream": true,
        "chunk_size": 100,
    });
    socket
        .send(Message::Text(command.to_string().into()))
        .await
        .unwrap();

    let meta = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(meta["type"], "meta");
    assert_eq!(meta["format"], "mp3");
    assert_eq!(meta["engine"], "elevenlabs");
    assert_eq!(meta["voice"], "elevenlabs:mockvoice");
    assert_eq!(meta["bytes"], 1000);
    assert_eq!(meta["chunks"], 10);

    let mut received = 0usize;
    let mut chunks = 0usize;
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Binary(data) => {
                assert!(data.len() <= 100);
                received += data.len();
                chunks += 1;
            }
            Message::Text(text) => {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(frame["type"], "end");
                assert_eq!(frame["bytes"], 1000);
                assert_eq!(frame["chunks"], 10);
                break;
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
    assert_eq!(received, 1000);
    assert_eq!(chunks, 10);
}

#[tokio::test]
async fn speak_without_stream_sends_single_binary_frame() {
    let upstream = mock_elevenlabs(vec![0x77u8; 512]).await;
    let (app, state) = open_app().await;
    state.registry.set_credentials(
        EngineKind::Elevenlabs,
        [
            ("api_key".to_string(), "test".to_string()),
            ("api_base_url".to_string(), upstream.uri()),
        ]
        .into_iter()
        .collect(),
    );
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let command = json!({
        "type": "speak",
        "text": "single frame please",
        "voice": "elevenlabs:mockvoice",
        "format": "mp3",
    });
    socket
        .send(Message::Text(command.to_string().into()))
        .await
        .unwrap();

    let meta = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(meta["type"], "meta");
    assert_eq!(meta["chunks"], 1);

    match socket.next().await.unwrap().unwrap() {
        Message::Binary(data) => assert_eq!(data.len(), 512),
        other => panic!("expected one binary frame, got {other:?}"),
    }

    let end = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(end["type"], "end");
    assert_eq!(end["bytes"], 512);
    assert_eq!(end["chunks"], 1);
}

#[tokio::test]
async fn speak_advances_key_usage_counters() {
    let upstream = mock_elevenlabs(vec![0x11u8; 64]).await;
    let (app, state) = authed_app().await;
    state.registry.set_credentials(
        EngineKind::Elevenlabs,
        [
            ("api_key".to_string(), "test".to_string()),
            ("api_base_url".to_string(), upstream.uri()),
        ]
        .into_iter()
        .collect(),
    );
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws?api_key={ADMIN_SECRET}"))
        .await
        .unwrap();

    let command = json!({
        "type": "speak",
        "text": "count me",
        "voice": "elevenlabs:mockvoice",
        "format": "mp3",
    });
    socket
        .send(Message::Text(command.to_string().into()))
        .await
        .unwrap();
    loop {
        let frame = socket.next().await.unwrap().unwrap();
        if matches!(&frame, Message::Text(t) if t.as_str().contains("\"end\"")) {
            break;
        }
    }

    // Commands are handled sequentially, so once this reply arrives the
    // speak bookkeeping has finished.
    socket
        .send(Message::Text(r#"{"type":"engines"}"#.into()))
        .await
        .unwrap();
    let body = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(body["type"], "engines");

    let key = state.keys.authenticate(ADMIN_SECRET).await.unwrap();
    assert_eq!(key.request_count, 1);
    assert!(key.last_used_ms.is_some());
}

#[tokio::test]
async fn speak_for_unknown_voice_reports_error_frame() {
    let (app, _state) = open_app().await;
    let addr = serve(app).await;

    let (mut socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let command = json!({
        "type": "speak",
        "text": "hello",
        "voice": "definitely-not-a-voice",
    });
    socket
        .send(Message::Text(command.to_string().into()))
        .await
        .unwrap();

    let body = as_json(&socket.next().await.unwrap().unwrap());
    assert_eq!(body["code"], "VOICE_NOT_FOUND");
}
