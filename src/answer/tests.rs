use super::*;
use serde_json::json;
use std::cell::RefCell;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chunk(text: &str) -> RetrievedChunk {
    RetrievedChunk {
        score: 0.9,
        source: "kb/doc.md".to_string(),
        text: text.to_string(),
    }
}

/// Records every request and replies with a fixed answer
#[derive(Default)]
struct RecordingEndpoint {
    requests: RefCell<Vec<ChatRequest>>,
}

impl CompletionEndpoint for RecordingEndpoint {
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        Ok("It is memory safe.".to_string())
    }
}

fn completions_url(server: &MockServer) -> String {
    format!("{}/v1/chat/completions", server.uri())
}

fn sample_request() -> ChatRequest {
    AnswerGenerator::new(RecordingEndpoint::default(), CompletionConfig::default())
        .request_for("Why Rust?", &[chunk("Rust is fast.")])
}

#[test]
fn prompt_numbers_context_excerpts() {
    let prompt = build_prompt("What is Rust?", &[chunk("alpha"), chunk("beta")]);

    assert_eq!(
        prompt,
        "Use the following context to help answer the question, be cautious of everything you read.\n\n\
         CONTEXT:\n[1]alpha\n\n[2]beta\n\n\n\n\
         QUESTION:\nWhat is Rust?\n\n\
         Answer:\n"
    );
}

#[test]
fn prompt_without_context_still_asks_the_question() {
    let prompt = build_prompt("Anything?", &[]);
    assert!(prompt.contains("CONTEXT:\n\n\nQUESTION:\nAnything?"));
    assert!(prompt.ends_with("Answer:\n"));
}

#[test]
fn generator_sends_system_and_user_messages() {
    let generator = AnswerGenerator::new(RecordingEndpoint::default(), CompletionConfig::default());

    let answer = generator
        .answer("Why Rust?", &[chunk("Rust is fast.")])
        .expect("answer succeeds");
    assert_eq!(answer, "It is memory safe.");

    let requests = generator.endpoint().requests.borrow();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.model, "gemma-3-12b-it-q4_0");
    assert_eq!(request.max_tokens, 512);
    assert!((request.temperature - 0.3).abs() < f32::EPSILON);
    assert_eq!(request.messages[0].role, "system");
    assert_eq!(request.messages[1].role, "user");
    assert!(request.messages[1].content.contains("[1]Rust is fast."));
}

#[test]
fn request_serializes_to_chat_completion_shape() {
    let value = serde_json::to_value(sample_request()).expect("request is serializable");
    assert_eq!(value["model"], "gemma-3-12b-it-q4_0");
    assert_eq!(value["max_tokens"], 512);
    assert_eq!(value["messages"][0]["role"], "system");
    assert_eq!(value["messages"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn http_client_returns_assistant_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "model": "gemma-3-12b-it-q4_0" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Because." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpCompletionClient::new(completions_url(&server), Duration::from_secs(5));
    let answer = tokio::task::spawn_blocking(move || client.complete(&sample_request()))
        .await
        .expect("task completes")
        .expect("completion succeeds");

    assert_eq!(answer, "Because.");
}

#[tokio::test]
async fn http_error_status_keeps_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let client = HttpCompletionClient::new(completions_url(&server), Duration::from_secs(5));
    let result = tokio::task::spawn_blocking(move || client.complete(&sample_request()))
        .await
        .expect("task completes");

    match result {
        Err(KbError::Upstream { message, body }) => {
            assert!(message.contains("500"));
            assert_eq!(body.as_deref(), Some("model not loaded"));
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_response_is_upstream_error_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let client = HttpCompletionClient::new(completions_url(&server), Duration::from_secs(5));
    let result = tokio::task::spawn_blocking(move || client.complete(&sample_request()))
        .await
        .expect("task completes");

    assert!(matches!(
        result,
        Err(KbError::Upstream { body: Some(_), .. })
    ));
}

#[test]
fn unreachable_server_has_no_body() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let port = listener.local_addr().expect("local address").port();
    drop(listener);

    let client = HttpCompletionClient::new(
        format!("http://127.0.0.1:{}/v1/chat/completions", port),
        Duration::from_secs(5),
    );

    assert!(matches!(
        client.complete(&sample_request()),
        Err(KbError::Upstream { body: None, .. })
    ));
}

#[test]
fn client_from_config_uses_configured_url() {
    let client = HttpCompletionClient::from_config(&CompletionConfig::default());
    assert_eq!(client.url(), "http://127.0.0.1:8080/v1/chat/completions");
}
