use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn config_for(server: &MockServer) -> HostedConfig {
    HostedConfig {
        base_url: format!("{}/v1", server.uri()),
        model: "embed-test".to_string(),
        batch_size: 2,
        api_key_env: "TEST_KEY".to_string(),
        input_type: Some("passage".to_string()),
    }
}

fn client_for(server: &MockServer) -> HostedClient {
    HostedClient::new(&config_for(server), "secret-key")
        .expect("Failed to create client")
        .with_retry_backoff(Duration::from_millis(1))
}

/// Replies with `[text length]` per input, listing items in reverse order
fn reversed_embeddings(request: &Request) -> ResponseTemplate {
    let body: serde_json::Value =
        serde_json::from_slice(&request.body).expect("request body is json");
    let inputs = body["input"].as_array().expect("input is an array");
    let data: Vec<serde_json::Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, text)| {
            let len = text.as_str().expect("input is text").len();
            json!({ "object": "embedding", "index": i, "embedding": [len as f32] })
        })
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "object": "list", "data": data }))
}

#[test]
fn endpoint_is_joined_onto_base_url() {
    let config = HostedConfig {
        base_url: "https://api.example.com/v1".to_string(),
        ..HostedConfig::default()
    };
    let client = HostedClient::new(&config, "key").expect("Failed to create client");
    assert_eq!(client.endpoint().as_str(), "https://api.example.com/v1/embeddings");
}

#[test]
fn empty_api_key_is_rejected() {
    let result = HostedClient::new(&HostedConfig::default(), "  ");
    assert!(matches!(
        result,
        Err(IndexError::Config(ConfigError::MissingApiKey))
    ));
}

#[test]
fn debug_output_hides_api_key() {
    let client =
        HostedClient::new(&HostedConfig::default(), "very-secret").expect("Failed to create client");
    let rendered = format!("{client:?}");
    assert!(!rendered.contains("very-secret"));
    assert!(rendered.contains("nvidia/nv-embedqa-e5-v5"));
}

#[tokio::test]
async fn embed_sends_bearer_key_and_reorders_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer secret-key"))
        .and(body_partial_json(json!({
            "model": "embed-test",
            "encoding_format": "float",
            "input_type": "passage"
        })))
        .respond_with(reversed_embeddings)
        .expect(2)
        .mount(&server)
        .await;

    let texts: Vec<String> = ["one", "three", "seven"]
        .iter()
        .map(ToString::to_string)
        .collect();
    let vectors = client_for(&server)
        .embed(&texts)
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors, vec![vec![3.0], vec![5.0], vec![5.0]]);
}

#[tokio::test]
async fn rate_limit_surfaces_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached", "type": "requests" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server).embed(&["text".to_string()]).await;

    match result {
        Err(IndexError::EmbeddingService { status, message }) => {
            assert_eq!(status, Some(429));
            assert_eq!(message, "Rate limit reached");
        }
        other => panic!("expected EmbeddingService error, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_indices_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 0, "embedding": [0.1] },
                { "index": 0, "embedding": [0.2] }
            ]
        })))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .embed(&["a".to_string(), "b".to_string()])
        .await;

    assert!(matches!(result, Err(IndexError::EmbeddingService { .. })));
}

#[test]
fn order_by_index_sorts_items() {
    let data = vec![
        EmbeddingData {
            index: 1,
            embedding: vec![1.0],
        },
        EmbeddingData {
            index: 0,
            embedding: vec![0.0],
        },
    ];
    let ordered = order_by_index(data, 2).expect("indices are complete");
    assert_eq!(ordered, vec![vec![0.0], vec![1.0]]);
}

#[test]
fn order_by_index_rejects_gaps() {
    let data = vec![
        EmbeddingData {
            index: 0,
            embedding: vec![0.0],
        },
        EmbeddingData {
            index: 2,
            embedding: vec![2.0],
        },
    ];
    assert!(order_by_index(data, 2).is_err());
}
