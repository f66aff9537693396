//! End-to-end synthesis through the router against a mocked ElevenLabs API

mod common;

use axum::http::StatusCode;
use base64::Engine as _;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use voxgate::EngineKind;

const MOCK_API_KEY: &str = "mock-elevenlabs-key";

/// Point the elevenlabs adapter at a wiremock server exposing one voice
async fn mock_backend() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/voices"))
        .and(header("xi-api-key", MOCK_API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voices": [{
                "voice_id": "mockvoice",
                "name": "Mock Voice",
                "labels": {"gender": "female", "accent": "american"},
                "verified_languages": [{"language": "en"}],
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/mockvoice"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![0xABu8; 1000]),
        )
        .mount(&server)
        .await;

    server
}

async fn app_with_mock() -> (axum::Router, MockServer) {
    let server = mock_backend().await;
    let (app, state) = open_app().await;
    state.registry.set_credentials(
        EngineKind::Elevenlabs,
        [
            ("api_key".to_string(), MOCK_API_KEY.to_string()),
            ("api_base_url".to_string(), server.uri()),
        ]
        .into_iter()
        .collect(),
    );
    state.catalog.invalidate();
    (app, server)
}

#[tokio::test]
async fn catalog_lists_namespaced_voice() {
    let (app, _server) = app_with_mock().await;

    let response = send(&app, get("/v1/voices", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let voice = body["voices"]
        .as_array()
        .unwrap()
        .iter()
        .find(|v| v["voice_id"] == "elevenlabs:mockvoice")
        .expect("mock voice present under unified id");
    assert_eq!(voice["name"], "Mock Voice");
    assert_eq!(voice["labels"]["engine"], "elevenlabs");
}

#[tokio::test]
async fn get_single_voice_and_404() {
    let (app, _server) = app_with_mock().await;

    let response = send(&app, get("/v1/voices/elevenlabs:mockvoice", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["voice_id"], "elevenlabs:mockvoice");

    let response = send(&app, get("/v1/voices/elevenlabs:missing", None)).await;
    let code = error_code(response, StatusCode::NOT_FOUND).await;
    assert_eq!(code, "VOICE_NOT_FOUND");
}

#[tokio::test]
async fn text_to_speech_returns_audio_with_headers() {
    let (app, _server) = app_with_mock().await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/text-to-speech/elevenlabs:mockvoice",
            None,
            json!({"text": "Hello"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("audio/"));
    assert_eq!(
        response.headers().get("x-character-count").unwrap(),
        "5"
    );
    assert!(response.headers().get("x-audio-format").is_some());
    assert!(response.headers().get("x-sample-rate").is_some());

    let body = body_bytes(response).await;
    assert_eq!(body.len(), 1000);
}

#[tokio::test]
async fn bare_voice_id_resolves_by_engine_scan() {
    let (app, _server) = app_with_mock().await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/text-to-speech/mockvoice",
            None,
            json!({"text": "Hello again"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert!(!body.is_empty());
}

#[tokio::test]
async fn with_timestamps_returns_base64_and_empty_alignment() {
    let (app, _server) = app_with_mock().await;

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/text-to-speech/elevenlabs:mockvoice/stream/with-timestamps",
            None,
            json!({"text": "Hello"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let audio = base64::engine::general_purpose::STANDARD
        .decode(body["audio_base64"].as_str().unwrap())
        .unwrap();
    assert_eq!(audio.len(), 1000);
    assert_eq!(body["alignment"]["characters"].as_array().unwrap().len(), 0);
    assert_eq!(
        body["normalized_alignment"]["characters"]
            .as_array()
            .unwrap()
            .len(),
        0
    );
}

#[tokio::test]
async fn voice_settings_are_forwarded() {
    let server = mock_backend().await;
    let (app, state) = open_app().await;
    state.registry.set_credentials(
        EngineKind::Elevenlabs,
        [
            ("api_key".to_string(), MOCK_API_KEY.to_string()),
            ("api_base_url".to_string(), server.uri()),
        ]
        .into_iter()
        .collect(),
    );

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/text-to-speech/elevenlabs:mockvoice",
            None,
            json!({
                "text": "Hello",
                "voice_settings": {"stability": 0.4, "similarity_boost": 0.7}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().starts_with("/v1/text-to-speech/"))
        .collect::<Vec<_>>();
    assert_eq!(requests.len(), 1);
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    // Settings are f64 end-to-end, so the wire values are exact decimals.
    assert_eq!(sent["voice_settings"]["stability"], 0.4);
    assert_eq!(sent["voice_settings"]["similarity_boost"], 0.7);
}

#[tokio::test]
async fn upstream_failure_maps_to_generation_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/voices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "voices": [{"voice_id": "brokenvoice", "name": "Broken"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/brokenvoice"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let (app, state) = open_app().await;
    state.registry.set_credentials(
        EngineKind::Elevenlabs,
        [
            ("api_key".to_string(), MOCK_API_KEY.to_string()),
            ("api_base_url".to_string(), server.uri()),
        ]
        .into_iter()
        .collect(),
    );

    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/text-to-speech/elevenlabs:brokenvoice",
            None,
            json!({"text": "Hello"}),
        ),
    )
    .await;
    let code = error_code(response, StatusCode::INTERNAL_SERVER_ERROR).await;
    assert_eq!(code, "SPEECH_GENERATION_FAILED");
}

#[tokio::test]
async fn disabled_engine_is_unavailable_for_that_key() {
    let server = mock_backend().await;
    let (app, state) = authed_app().await;
    state.registry.set_credentials(
        EngineKind::Elevenlabs,
        [
            ("api_key".to_string(), MOCK_API_KEY.to_string()),
            ("api_base_url".to_string(), server.uri()),
        ]
        .into_iter()
        .collect(),
    );

    let response = send(
        &app,
        json_request(
            "POST",
            "/admin/api/keys",
            Some(ADMIN_SECRET),
            json!({"name": "restricted"}),
        ),
    )
    .await;
    let body = body_json(response).await;
    let secret = body["secret"].as_str().unwrap().to_string();
    let id = body["key"]["id"].as_str().unwrap().to_string();

    let response = send(
        &app,
        json_request(
            "PUT",
            &format!("/admin/api/keys/{id}/engines"),
            Some(ADMIN_SECRET),
            json!({"elevenlabs": {"enabled": false}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The engine is healthy, but this key may not use it.
    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/text-to-speech/elevenlabs:mockvoice",
            Some(&secret),
            json!({"text": "Hello"}),
        ),
    )
    .await;
    let code = error_code(response, StatusCode::SERVICE_UNAVAILABLE).await;
    assert_eq!(code, "ENGINE_NOT_AVAILABLE");

    // The admin key is unaffected.
    let response = send(
        &app,
        json_request(
            "POST",
            "/v1/text-to-speech/elevenlabs:mockvoice",
            Some(ADMIN_SECRET),
            json!({"text": "Hello"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn catalog_is_cached_until_invalidated() {
    let (app, server) = app_with_mock().await;

    for _ in 0..3 {
        let response = send(&app, get("/v1/voices", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let listing_calls = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/v1/voices")
        .count();
    // One build serves every request until invalidation.
    assert_eq!(listing_calls, 1);
}
