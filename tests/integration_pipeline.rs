#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use std::fs;
use std::path::Path;

use kb_rag::answer::{AnswerGenerator, ChatRequest, CompletionEndpoint, HttpCompletionClient};
use kb_rag::commands::run_query_loop;
use kb_rag::config::{Config, OllamaConfig, RetrievalConfig};
use kb_rag::embeddings::{Embedder, EmbeddingModel, OllamaClient};
use kb_rag::indexer::Indexer;
use kb_rag::parser::FileParser;
use kb_rag::retrieval::Retriever;
use kb_rag::store::{KnowledgeBase, consistency_report};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const DIMENSION: usize = 64;

/// Bag-of-words vector with one bucket per hashed lowercase word
fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(5381_u64, |h, b| h.wrapping_mul(33) ^ u64::from(b));
        vector[(hash % DIMENSION as u64) as usize] += 1.0;
    }
    if vector.iter().all(|v| *v == 0.0) {
        vector[0] = 1.0;
    }
    vector
}

struct BagOfWords;

impl EmbeddingModel for BagOfWords {
    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Answers by quoting the first numbered context excerpt
struct EchoEndpoint;

impl CompletionEndpoint for EchoEndpoint {
    fn complete(&self, request: &ChatRequest) -> kb_rag::Result<String> {
        let prompt = &request.messages[1].content;
        let first_excerpt = prompt
            .lines()
            .find(|line| line.starts_with("[1]"))
            .unwrap_or("nothing");
        Ok(format!("Based on {}", first_excerpt))
    }
}

fn write_knowledge(base_dir: &Path) {
    let kb = base_dir.join("kb");
    fs::create_dir_all(kb.join("recipes")).expect("create knowledge dir");
    fs::write(
        kb.join("rust.md"),
        "# Ownership\n\nEach value in Rust has an owner. When the owner goes out of scope the value is dropped.",
    )
    .expect("write markdown");
    fs::write(
        kb.join("recipes").join("bread.html"),
        "<html><head><style>p { color: red }</style></head>\
         <body><h1>Bread</h1><p>Knead the dough and let it rise overnight.</p></body></html>",
    )
    .expect("write html");
    fs::write(
        kb.join("notes.txt"),
        "Tomatoes grow best with plenty of sun and regular watering.",
    )
    .expect("write text");
}

fn test_config(base_dir: &Path) -> Config {
    Config {
        base_dir: base_dir.to_path_buf(),
        retrieval: RetrievalConfig {
            top_k: 5,
            min_score: 0.1,
        },
        ..Config::default()
    }
}

#[test]
fn ingest_then_ask() {
    let temp_dir = TempDir::new().expect("create temp dir");
    write_knowledge(temp_dir.path());
    let config = test_config(temp_dir.path());
    let embedder = Embedder::new(BagOfWords);

    let report = Indexer::from_config(&config, FileParser, &embedder)
        .expect("create indexer")
        .run()
        .expect("ingestion succeeds");
    assert_eq!(report.new_files, 3);
    assert!(report.failures.is_empty());

    let status = consistency_report(&config.store_paths());
    assert!(status.is_consistent);
    assert_eq!(status.seen_files, Some(3));
    assert_eq!(status.dimension, Some(DIMENSION));

    let knowledge_base = KnowledgeBase::open(&config.store_paths())
        .expect("open knowledge base")
        .expect("knowledge base exists");
    assert!(
        knowledge_base
            .metadata()
            .iter()
            .all(|record| !record.text.contains("color: red")),
        "style content must not be indexed"
    );

    let retriever = Retriever::new(Some(&knowledge_base), &embedder);
    let results = retriever
        .retrieve("How long should the dough rise?", 1, 0.1)
        .expect("retrieval succeeds");
    assert_eq!(results.len(), 1);
    assert!(results[0].source.ends_with("bread.html"));

    let generator = AnswerGenerator::new(EchoEndpoint, config.completion.clone());
    let mut output = Vec::new();
    run_query_loop(
        "Who owns a value in Rust?\nquit\n".as_bytes(),
        &mut output,
        &retriever,
        &generator,
        &config.retrieval,
    )
    .expect("query loop succeeds");

    let output = String::from_utf8(output).expect("output is UTF-8");
    assert!(output.contains("rust.md"));
    assert!(output.contains("--- Answer ---\nBased on [1]"));
    assert!(output.ends_with("Goodbye!\n"));
}

#[test]
fn rerun_adds_only_new_files() {
    let temp_dir = TempDir::new().expect("create temp dir");
    write_knowledge(temp_dir.path());
    let config = test_config(temp_dir.path());
    let embedder = Embedder::new(BagOfWords);
    let indexer = Indexer::from_config(&config, FileParser, &embedder).expect("create indexer");

    let first = indexer.run().expect("first run");
    let size_after_first = first.index_size.expect("index updated");

    fs::write(
        temp_dir.path().join("kb").join("later.txt"),
        "Added after the first ingestion run.",
    )
    .expect("write new file");

    let second = indexer.run().expect("second run");
    assert_eq!(second.files_discovered, 4);
    assert_eq!(second.new_files, 1);
    assert_eq!(
        second.index_size,
        Some(size_after_first + second.chunks_created)
    );

    let third = indexer.run().expect("third run");
    assert!(third.no_op);
}

fn embed_responder(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).expect("request body is JSON");
    let embeddings: Vec<Vec<f32>> = body["input"]
        .as_array()
        .map(|inputs| {
            inputs
                .iter()
                .map(|input| bag_of_words(input.as_str().unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();
    ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
}

#[tokio::test]
async fn http_backends_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(embed_responder)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Plenty of sun." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("create temp dir");
    write_knowledge(temp_dir.path());
    let mut config = test_config(temp_dir.path());
    let address = server.address();
    config.ollama = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        batch_size: 2,
        ..OllamaConfig::default()
    };
    config.completion.url = format!("{}/v1/chat/completions", server.uri());

    let output = tokio::task::spawn_blocking(move || {
        let client = OllamaClient::new(&config.ollama).expect("create client");
        let embedder = Embedder::new(client);

        Indexer::from_config(&config, FileParser, &embedder)
            .expect("create indexer")
            .run()
            .expect("ingestion succeeds");

        let knowledge_base = KnowledgeBase::open(&config.store_paths())
            .expect("open knowledge base")
            .expect("knowledge base exists");
        let retriever = Retriever::new(Some(&knowledge_base), &embedder);
        let generator = AnswerGenerator::new(
            HttpCompletionClient::from_config(&config.completion),
            config.completion.clone(),
        );

        let mut output = Vec::new();
        run_query_loop(
            "What do tomatoes need to grow?\nexit\n".as_bytes(),
            &mut output,
            &retriever,
            &generator,
            &config.retrieval,
        )
        .expect("query loop succeeds");
        String::from_utf8(output).expect("output is UTF-8")
    })
    .await
    .expect("blocking task completes");

    assert!(output.contains("notes.txt"));
    assert!(output.contains("--- Answer ---\nPlenty of sun.\n"));
}
