//! OpenAI actions and model discovery against a local mock server.

use std::collections::BTreeMap;
use std::sync::Arc;

use conduit_core::{
    ActionConfiguration, Authentication, DatasourceConfiguration, ErrorKind, ExecuteActionDto,
    REDACTED, TriggerRequest,
};
use conduit_openai::{OpenAiPlugin, PLUGIN_NAME};
use conduit_plugin::testing::MockHttpServer;
use conduit_plugin::{ActionDispatcher, PluginConnection, PluginRegistry, SharedConfig};
use serde_json::json;

const MODELS: &str = r#"{"object":"list","data":[
    {"id":"text-embedding-3-small","object":"model"},
    {"id":"gpt-4o-mini","object":"model"},
    {"id":"gpt-4o-realtime-preview","object":"model"},
    {"object":"model"},
    {"id":"gpt-4o","object":"model"},
    {"id":"whisper-1","object":"model"}
]}"#;

fn dispatcher() -> ActionDispatcher {
    let mut registry = PluginRegistry::new();
    registry
        .register(Arc::new(OpenAiPlugin::new()))
        .expect("plugin name is free");
    ActionDispatcher::new(registry, SharedConfig::default()).expect("client should build")
}

fn datasource(server: &MockHttpServer, key: &str) -> DatasourceConfiguration {
    DatasourceConfiguration::new(server.base_url())
        .with_id("openai-1")
        .with_authentication(Authentication::bearer(key))
}

fn chat_action() -> ActionConfiguration {
    ActionConfiguration::default()
        .with_form_data("command", json!("CHAT"))
        .with_form_data(
            "chat",
            json!({
                "model": "{{Input.model}}",
                "messages": [{"role": "user", "content": "{{Input.prompt}}"}],
                "maxTokens": "16",
            }),
        )
}

fn chat_dto() -> ExecuteActionDto {
    ExecuteActionDto::new("ask")
        .with_param("Input.model", json!("gpt-4o-mini"))
        .with_param("Input.prompt", json!("hello"))
}

fn labels(entries: &[BTreeMap<String, String>]) -> Vec<&str> {
    entries.iter().map(|e| e["label"].as_str()).collect()
}

#[tokio::test]
async fn chat_completion_round_trip() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-live");
    let handle = tokio::spawn(server.respond_once(
        200,
        r#"{"id":"chatcmpl-1","choices":[{"message":{"role":"assistant","content":"hi"}}]}"#,
    ));

    let result = dispatcher()
        .execute(PLUGIN_NAME, &chat_dto(), &ds, &chat_action())
        .await;

    assert!(result.is_execution_success());
    assert_eq!(
        result.body().unwrap()["choices"][0]["message"]["content"],
        json!("hi")
    );

    let request = handle.await.unwrap();
    assert!(request.starts_with("POST /v1/chat/completions HTTP/1.1"));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-live"));
    let body = request.split("\r\n\r\n").nth(1).unwrap();
    let sent: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(
        sent,
        json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "hello"}],
            "max_tokens": 16,
        })
    );

    let audit = result.request().unwrap();
    let auth = audit
        .headers
        .iter()
        .find(|h| h.key.eq_ignore_ascii_case("authorization"))
        .unwrap();
    assert_eq!(auth.value, REDACTED);
}

#[tokio::test]
async fn rejected_key_is_an_authentication_error() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-wrong");
    let handle = tokio::spawn(server.respond_once(
        401,
        r#"{"error":{"code":"invalid_api_key"}}"#,
    ));

    let result = dispatcher()
        .execute(PLUGIN_NAME, &chat_dto(), &ds, &chat_action())
        .await;

    assert_eq!(result.error_kind(), Some(ErrorKind::AuthenticationError));
    assert_eq!(result.status_code().http(), Some(401));
    handle.await.unwrap();
}

#[tokio::test]
async fn caller_connection_without_key_is_refused() {
    let server = MockHttpServer::start().await;
    let ds = DatasourceConfiguration::new(server.base_url());
    let connection = PluginConnection::new(reqwest::Client::new(), None);
    let d = dispatcher();

    let result = d
        .execute_with_connection(PLUGIN_NAME, &connection, &chat_dto(), &ds, &chat_action())
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::AuthenticationError));
    assert!(result.request().is_none());

    let err = d
        .trigger_with_connection(
            PLUGIN_NAME,
            &connection,
            &ds,
            &TriggerRequest::new("CHAT_MODELS"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationError);
}

#[tokio::test]
async fn missing_key_fails_without_io() {
    let ds = DatasourceConfiguration::new("http://127.0.0.1:9");
    let result = dispatcher()
        .execute(PLUGIN_NAME, &chat_dto(), &ds, &chat_action())
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::AuthenticationError));
    assert!(result.request().is_none());
}

#[tokio::test]
async fn missing_model_fails_without_io() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-live");
    let action = ActionConfiguration::default().with_form_data(
        "chat",
        json!({"messages": [{"role": "user", "content": "hello"}]}),
    );

    let result = dispatcher()
        .execute(PLUGIN_NAME, &ExecuteActionDto::default(), &ds, &action)
        .await;
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidConfiguration));
}

#[tokio::test]
async fn embeddings_request() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-live");
    let handle = tokio::spawn(server.respond_once(200, r#"{"data":[{"embedding":[0.1,0.2]}]}"#));

    let action = ActionConfiguration::default().with_form_data(
        "embeddings",
        json!({"model": "text-embedding-3-small", "input": "hello"}),
    );
    let result = dispatcher()
        .execute(PLUGIN_NAME, &ExecuteActionDto::default(), &ds, &action)
        .await;

    assert!(result.is_execution_success());
    let request = handle.await.unwrap();
    assert!(request.starts_with("POST /v1/embeddings HTTP/1.1"));
}

#[tokio::test]
async fn chat_models_are_filtered_and_sorted() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-live");
    let handle = tokio::spawn(server.respond_once(200, MODELS));

    let result = dispatcher()
        .trigger(PLUGIN_NAME, &ds, &TriggerRequest::new("CHAT_MODELS"))
        .await
        .unwrap();

    assert_eq!(labels(&result.trigger), ["gpt-4o", "gpt-4o-mini"]);
    assert_eq!(result.trigger[0]["value"], "gpt-4o");
    assert!(handle.await.unwrap().starts_with("GET /v1/models HTTP/1.1"));
}

#[tokio::test]
async fn embedding_models_are_discovered() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-live");
    let handle = tokio::spawn(server.respond_once(200, MODELS));

    let result = dispatcher()
        .trigger(PLUGIN_NAME, &ds, &TriggerRequest::new("EMBEDDING_MODELS"))
        .await
        .unwrap();

    assert_eq!(labels(&result.trigger), ["text-embedding-3-small"]);
    handle.await.unwrap();
}

#[tokio::test]
async fn discovery_without_data_is_a_structure_error() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-live");
    let handle = tokio::spawn(server.respond_once(200, r#"{"object":"list"}"#));

    let err = dispatcher()
        .trigger(PLUGIN_NAME, &ds, &TriggerRequest::new("CHAT_MODELS"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructureError);
    handle.await.unwrap();
}

#[tokio::test]
async fn datasource_test_lists_models() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-live");
    let handle = tokio::spawn(server.respond_once(200, MODELS));

    let result = dispatcher().test_datasource(PLUGIN_NAME, &ds).await;
    assert!(result.is_success());
    assert!(handle.await.unwrap().starts_with("GET /v1/models HTTP/1.1"));
}

#[tokio::test]
async fn datasource_test_reports_bad_key() {
    let server = MockHttpServer::start().await;
    let ds = datasource(&server, "sk-wrong");
    let handle = tokio::spawn(server.respond_once(401, r#"{"error":"bad key"}"#));

    let result = dispatcher().test_datasource(PLUGIN_NAME, &ds).await;
    assert!(
        result
            .invalids
            .contains("Authentication failed with status 401. Check the API key.")
    );
    handle.await.unwrap();
}
