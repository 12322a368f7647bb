//! `DarClient` over real HTTP against a mock DAR server.

use dar_client::{
    AddressCategory, CategorySelection, DarClient, DarClientConfig, DarError, HttpTransport,
    LookupOptions, RetryPolicy, TransportError,
};
use httpmock::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use uuid::Uuid;

fn config_for(base_url: &str) -> DarClientConfig {
    DarClientConfig {
        allow_insecure_http: true,
        retry: None,
        ..DarClientConfig::with_base_url(base_url)
    }
}

fn open_client(server: &MockServer) -> DarClient {
    let client = DarClient::new(config_for(&server.base_url())).unwrap();
    client.open().unwrap();
    client
}

fn record(id: Uuid) -> serde_json::Value {
    json!({"id": id.to_string(), "betegnelse": "Testvej 1, 8000 Aarhus C"})
}

#[derive(Clone, Default)]
struct WarningCapture {
    warnings: Arc<Mutex<Vec<String>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if *event.metadata().level() == tracing::Level::WARN {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.warnings.lock().unwrap().push(visitor.0);
        }
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

#[tokio::test]
async fn health_check_ok() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/autocomplete");
        then.status(200).json_body(json!([]));
    });

    let client = open_client(&server);
    assert!(client.health_check(Duration::from_secs(5)).await.unwrap());
    mock.assert();
}

#[tokio::test]
async fn health_check_server_error_is_unreachable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/autocomplete");
        then.status(500);
    });

    let client = open_client(&server);
    assert!(!client.health_check(Duration::from_secs(5)).await.unwrap());
}

#[tokio::test]
async fn health_check_other_success_status_is_unreachable() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/autocomplete");
        then.status(204);
    });

    let client = open_client(&server);
    assert!(!client.health_check(Duration::from_secs(5)).await.unwrap());
    mock.assert();
}

#[tokio::test]
async fn health_check_timeout_is_unreachable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/autocomplete");
        then.status(200).delay(Duration::from_millis(500));
    });

    let client = open_client(&server);
    assert!(!client.health_check(Duration::from_millis(50)).await.unwrap());
}

#[tokio::test]
async fn health_check_connection_refused_is_unreachable() {
    let client = DarClient::new(config_for("http://127.0.0.1:1")).unwrap();
    client.open().unwrap();
    assert!(!client.health_check(Duration::from_secs(2)).await.unwrap());
}

#[tokio::test]
async fn health_check_without_session_is_config_error() {
    let server = MockServer::start();
    let client = DarClient::new(config_for(&server.base_url())).unwrap();

    let err = client.health_check(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, DarError::SessionNotOpen));

    client.open().unwrap();
    client.close();
    let err = client.health_check(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, DarError::SessionNotOpen));
}

#[tokio::test]
async fn double_open_warns_and_keeps_session() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/autocomplete");
        then.status(200);
    });

    let capture = WarningCapture::default();
    let warnings = capture.warnings.clone();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture));

    let config = config_for(&server.base_url());
    let transport = Arc::new(HttpTransport::new(
        config.validate().unwrap(),
        config.http_config(),
    ));
    let client = DarClient::with_transport(config, transport.clone());

    client.open().unwrap();
    assert_eq!(transport.session_generation(), Some(1));
    client.open().unwrap();
    assert_eq!(transport.session_generation(), Some(1));
    assert!(client.health_check(Duration::from_secs(5)).await.unwrap());
    mock.assert();

    client.close();
    client.close();
    assert_eq!(transport.session_generation(), None);

    let captured = warnings.lock().unwrap().clone();
    assert!(
        captured.iter().any(|w| w.contains("open called with existing session")),
        "missing open warning: {captured:?}"
    );
    assert!(
        captured.iter().any(|w| w.contains("close called without session")),
        "missing close warning: {captured:?}"
    );
}

#[tokio::test]
async fn reopen_after_close_starts_new_session() {
    let server = MockServer::start();
    let config = config_for(&server.base_url());
    let transport = Arc::new(HttpTransport::new(
        config.validate().unwrap(),
        config.http_config(),
    ));
    let client = DarClient::with_transport(config, transport.clone());

    client.open().unwrap();
    client.close();
    client.open().unwrap();
    assert_eq!(transport.session_generation(), Some(2));
}

#[tokio::test]
async fn resolve_many_falls_back_to_historic_addresses() {
    let server = MockServer::start();
    let a = Uuid::from_u128(0xA);

    let current = server.mock(|when, then| {
        when.method(GET)
            .path("/adresser")
            .query_param("id", a.to_string())
            .query_param("struktur", "mini")
            .query_param("noformat", "1");
        then.status(200).json_body(json!([]));
    });
    let access = server.mock(|when, then| {
        when.method(GET).path("/adgangsadresser");
        then.status(200).json_body(json!([]));
    });
    let historic = server.mock(|when, then| {
        when.method(GET).path("/historik/adresser");
        then.status(200).json_body(json!([record(a)]));
    });
    let historic_access = server.mock(|when, then| {
        when.method(GET).path("/historik/adgangsadresser");
        then.status(200).json_body(json!([]));
    });

    let client = open_client(&server);
    let resolution = client
        .resolve_many(&HashSet::from([a]), &LookupOptions::default())
        .await
        .unwrap();

    assert_eq!(resolution.found.len(), 1);
    assert_eq!(resolution.found[&a].id(), Some(a));
    assert!(resolution.missing.is_empty());
    current.assert_calls(1);
    access.assert_calls(1);
    historic.assert_calls(1);
    historic_access.assert_calls(0);
}

#[tokio::test]
async fn resolve_many_chunks_requests() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/adresser");
        then.status(200).json_body(json!([]));
    });

    let client = open_client(&server);
    let ids: HashSet<Uuid> = (1..=5).map(Uuid::from_u128).collect();
    let options = LookupOptions::default()
        .categories(AddressCategory::Address)
        .chunk_size(2);
    let resolution = client.resolve_many(&ids, &options).await.unwrap();

    assert_eq!(resolution.missing, ids);
    mock.assert_calls(3);
}

#[tokio::test]
async fn batch_not_found_is_an_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/adresser");
        then.status(404);
    });

    let client = open_client(&server);
    let err = client
        .fetch_category(
            &HashSet::from([Uuid::from_u128(1)]),
            AddressCategory::Address,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DarError::BatchFetch {
            category: AddressCategory::Address,
            source: TransportError::NotFound { .. },
        }
    ));
}

#[tokio::test]
async fn batch_server_error_retried_then_fails() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/adresser");
        then.status(503);
    });

    let config = DarClientConfig {
        retry: Some(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        }),
        ..config_for(&server.base_url())
    };
    let client = DarClient::new(config).unwrap();
    client.open().unwrap();

    let err = client
        .fetch_category(
            &HashSet::from([Uuid::from_u128(1)]),
            AddressCategory::Address,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DarError::BatchFetch { .. }));
    mock.assert_calls(3);
}

#[tokio::test]
async fn resolve_one_skips_categories_answering_404() {
    let server = MockServer::start();
    let x = Uuid::from_u128(0xB);

    let miss = server.mock(|when, then| {
        when.method(GET).path(format!("/adresser/{x}"));
        then.status(404);
    });
    let hit = server.mock(|when, then| {
        when.method(GET)
            .path(format!("/adgangsadresser/{x}"))
            .query_param("struktur", "mini");
        then.status(200).json_body(record(x));
    });

    let client = open_client(&server);
    let found = client
        .resolve_one(x, &CategorySelection::Default)
        .await
        .unwrap();

    assert_eq!(found.id(), Some(x));
    miss.assert_calls(1);
    hit.assert_calls(1);
}

#[tokio::test]
async fn resolve_one_absent_everywhere() {
    let server = MockServer::start();
    let x = Uuid::from_u128(0xC);
    let mocks: Vec<_> = AddressCategory::ALL
        .iter()
        .map(|category| {
            server.mock(|when, then| {
                when.method(GET)
                    .path(format!("/{}/{x}", category.path_segment()));
                then.status(404);
            })
        })
        .collect();

    let client = open_client(&server);
    let err = client
        .resolve_one(x, &CategorySelection::Default)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DarError::NotFound { id, ref categories } if id == x && categories.len() == 4
    ));
    for mock in &mocks {
        mock.assert_calls(1);
    }
}

#[tokio::test]
async fn single_lookup_server_error_aborts() {
    let server = MockServer::start();
    let x = Uuid::from_u128(0xD);
    server.mock(|when, then| {
        when.method(GET).path(format!("/adresser/{x}"));
        then.status(500).body("boom");
    });
    let next = server.mock(|when, then| {
        when.method(GET).path(format!("/adgangsadresser/{x}"));
        then.status(200).json_body(record(x));
    });

    let client = open_client(&server);
    let err = client
        .resolve_one(x, &CategorySelection::Default)
        .await
        .unwrap_err();

    assert!(matches!(err, DarError::Transport(TransportError::Http(_))));
    next.assert_calls(0);
}

#[tokio::test]
async fn shed_load_rejects_requests_beyond_the_limit() {
    let server = MockServer::start();
    let x = Uuid::from_u128(0xE);
    let y = Uuid::from_u128(0xF);
    let mocks: Vec<_> = [x, y]
        .iter()
        .map(|id| {
            server.mock(|when, then| {
                when.method(GET).path(format!("/adresser/{id}"));
                then.status(200)
                    .json_body(record(*id))
                    .delay(Duration::from_millis(300));
            })
        })
        .collect();

    let config = DarClientConfig {
        max_connections: 1,
        shed_load: true,
        ..config_for(&server.base_url())
    };
    let client = DarClient::new(config).unwrap();
    client.open().unwrap();

    let (first, second) = tokio::join!(
        client.fetch_one(x, AddressCategory::Address),
        client.fetch_one(y, AddressCategory::Address),
    );
    let outcomes = [first, second];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(DarError::Transport(TransportError::Http(
            dar_http::HttpError::Overloaded
        )))
    )));
    assert_eq!(mocks.iter().map(|m| m.calls()).sum::<usize>(), 1);
}
