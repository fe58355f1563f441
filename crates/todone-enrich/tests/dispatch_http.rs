//! Dispatcher driving the real HTTP client against a mock completions server.

use std::sync::Arc;

use serde_json::json;
use todone_core::{CancelSignal, EnrichmentUnit, LlmConfig, TodoneError};
use todone_enrich::{Dispatcher, LlmClient};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> serde_json::Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

fn unit(line: u32, text: &str) -> EnrichmentUnit {
    EnrichmentUnit {
        repo_name: "svc".into(),
        file: "server.go".into(),
        line_number: line,
        match_text: text.into(),
        context_lines: vec!["func main() {".into(), text.into(), "}".into()],
    }
}

#[tokio::test]
async fn mixed_answers_become_items_and_failures() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Line: 2"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Line: 3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"title":"t","description":"d","effortMinutes":5,"priority":1,"extra":true}"#,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"title":"Read port from env","description":"Use PORT","effortMinutes":20,"priority":1}"#,
        )))
        .mount(&server)
        .await;

    let client = LlmClient::new(&LlmConfig {
        api_key: Some("k".into()),
        base_url: Some(server.uri()),
        ..LlmConfig::default()
    })
    .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(client), "instructions", 2);

    let units = vec![
        unit(1, "// TODO read port"),
        unit(2, "// TODO add auth"),
        unit(3, "// TODO metrics"),
        unit(4, "// TODO graceful shutdown"),
    ];
    let outcome = dispatcher.dispatch(units, &CancelSignal::never()).await;

    assert_eq!(outcome.items.len(), 2);
    assert!(outcome.items.iter().all(|i| i.title == "Read port from env"));
    assert_eq!(outcome.items[0].effort_minutes, 20);

    let failures: Vec<_> = outcome.errors.iter().collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].location, "svc/server.go:2");
    assert!(matches!(*failures[0].source, TodoneError::Llm(_)));
    assert!(failures[0].to_string().contains("429"));
    assert_eq!(failures[1].location, "svc/server.go:3");
    assert!(matches!(*failures[1].source, TodoneError::Schema(_)));
}

#[tokio::test]
async fn unreachable_server_fails_every_unit() {
    let client = LlmClient::new(&LlmConfig {
        base_url: Some("http://127.0.0.1:9".into()),
        timeout_secs: 5,
        ..LlmConfig::default()
    })
    .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(client), "instructions", 4);

    let outcome = dispatcher
        .dispatch(vec![unit(1, "a"), unit(2, "b"), unit(3, "c")], &CancelSignal::never())
        .await;
    assert!(outcome.items.is_empty());
    assert_eq!(outcome.errors.len(), 3);
    assert!(outcome
        .errors
        .iter()
        .all(|e| matches!(*e.source, TodoneError::Llm(_))));
}
