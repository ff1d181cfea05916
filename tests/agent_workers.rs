//! End-to-end worker tests: token lifecycle plus template rendering against
//! a mock Infisical service, writing real files.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use infisical_agent::api::{ApiClient, ApiConfig, SecretSource};
use infisical_agent::config::{ExecuteConfig, Template, TemplateOptions, UniversalAuthConfig};
use infisical_agent::leases::LeaseRegistry;
use infisical_agent::services::{TemplateWorker, TokenManager};
use infisical_agent::template::TemplateRenderer;
use serde_json::json;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn inline_template(destination: &std::path::Path, polling_interval: &str) -> Template {
    let body = r#"{{#each (secret "proj" "prod" "/")}}{{name}}={{value}}{{/each}}"#;
    Template {
        source_path: None,
        base64_template_content: Some(base64::engine::general_purpose::STANDARD.encode(body)),
        destination_path: destination.to_string_lossy().into_owned(),
        config: TemplateOptions {
            polling_interval: Some(polling_interval.to_string()),
            execute: ExecuteConfig::default(),
        },
    }
}

async fn mock_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/auth/universal-auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "st.issued",
            "expiresIn": 7200,
            "accessTokenMaxTTL": 86400,
        })))
        .mount(server)
        .await;
}

async fn mock_secrets(server: &MockServer, etag: &str, value: &str) {
    Mock::given(method("GET"))
        .and(path("/v3/secrets/raw"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", etag)
                .set_body_json(json!({
                    "secrets": [{"secretKey": "DB_HOST", "secretValue": value}]
                })),
        )
        .mount(server)
        .await;
}

async fn wait_for_content(path: &std::path::Path, expected: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(content) = std::fs::read_to_string(path) {
            if content == expected {
                return;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {} to contain {:?}",
            path.display(),
            expected
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_renders_and_tracks_rotation() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    mock_secrets(&server, "A", "first.internal").await;

    let dir = tempfile::tempdir().unwrap();
    let id_path = dir.path().join("client-id");
    let secret_path = dir.path().join("client-secret");
    std::fs::write(&id_path, "machine-1").unwrap();
    std::fs::write(&secret_path, "hunter2").unwrap();
    let destination = dir.path().join("out.env");

    let api = ApiClient::new(ApiConfig { base_url: server.uri(), timeout: 5 }).unwrap();
    let leases = Arc::new(LeaseRegistry::new());
    let renderer = Arc::new(TemplateRenderer::new(
        Arc::new(api.clone()) as Arc<dyn SecretSource>,
        Arc::clone(&leases),
    ));
    let tokens = Arc::new(TokenManager::new(
        api,
        UniversalAuthConfig {
            client_id_path: id_path.to_string_lossy().into_owned(),
            client_secret_path: secret_path.to_string_lossy().into_owned(),
            remove_client_secret_on_read: false,
        },
        false,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    {
        let manager = Arc::clone(&tokens);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { manager.run(rx).await });
    }

    let worker = TemplateWorker::new(
        0,
        inline_template(&destination, "100ms"),
        renderer,
        leases,
        Arc::clone(&tokens),
        Arc::clone(&shutdown_tx),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    wait_for_content(&destination, "DB_HOST=first.internal").await;

    // Rotate the secret: new fingerprint, new value.
    server.reset().await;
    mock_secrets(&server, "B", "second.internal").await;
    wait_for_content(&destination, "DB_HOST=second.internal").await;

    // Shutdown stops the worker promptly.
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), worker_handle)
        .await
        .expect("worker must stop on shutdown")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_polling_interval_signals_shutdown() {
    let server = MockServer::start().await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out.env");

    let api = ApiClient::new(ApiConfig { base_url: server.uri(), timeout: 5 }).unwrap();
    let leases = Arc::new(LeaseRegistry::new());
    let renderer = Arc::new(TemplateRenderer::new(
        Arc::new(api.clone()) as Arc<dyn SecretSource>,
        Arc::clone(&leases),
    ));
    let tokens = Arc::new(TokenManager::new(api, UniversalAuthConfig::default(), false));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let worker = TemplateWorker::new(
        0,
        inline_template(&destination, "not-a-duration"),
        renderer,
        leases,
        tokens,
        Arc::clone(&shutdown_tx),
    );
    tokio::spawn(worker.run(shutdown_rx.clone()));

    // The malformed interval brings the whole agent down.
    tokio::time::timeout(Duration::from_secs(5), shutdown_rx.changed())
        .await
        .expect("shutdown must be signalled")
        .unwrap();
    assert!(*shutdown_rx.borrow());
}
