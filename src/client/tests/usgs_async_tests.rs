// src/client/tests/usgs_async_tests.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::USGS_URL;
use crate::client::{AsyncUsgsClient, EventQuery, HttpResponse};
use crate::config::ClientConfig;
use crate::error::ErrorKind;
use crate::resilience::ErrorHandler;
use crate::test_utils::{catalog_body, network_error, test_client_config, ScriptedTransport};

fn open(config: ClientConfig, transport: &Arc<ScriptedTransport>) -> AsyncUsgsClient {
    AsyncUsgsClient::open_with_transport(config, transport.clone(), None).unwrap()
}

#[tokio::test]
async fn test_async_retries_transient_failures() {
    let transport = Arc::new(ScriptedTransport::new([
        network_error(),
        network_error(),
        Ok(HttpResponse::ok(catalog_body(3, 0))),
    ]));
    let client = open(test_client_config(USGS_URL), &transport);

    let catalog = client.get_events(&EventQuery::new()).await.unwrap();

    assert_eq!(catalog.len(), 3);
    assert_eq!(transport.calls(), 3);
    client.close();
}

#[tokio::test]
async fn test_async_count() {
    let transport = Arc::new(ScriptedTransport::ok(r#"{"count": 7}"#));
    let client = open(test_client_config(USGS_URL), &transport);
    assert_eq!(client.count_events(&EventQuery::new()).await.unwrap(), 7);
}

#[tokio::test]
async fn test_closed_session_rejects_requests() {
    let transport = Arc::new(ScriptedTransport::ok(catalog_body(1, 0)));
    let client = open(test_client_config(USGS_URL), &transport);

    client.close();
    client.close();
    assert!(client.is_closed());

    let err = client.get_events(&EventQuery::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClientClosed);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_close_aborts_in_flight_request() {
    let transport = Arc::new(ScriptedTransport::ok(catalog_body(1, 0)).with_delay(Duration::from_secs(5)));
    let client = open(test_client_config(USGS_URL), &transport);

    let query = EventQuery::new();
    let start = Instant::now();
    let (result, ()) = tokio::join!(client.get_events(&query), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.close();
    });

    assert_eq!(result.unwrap_err().kind, ErrorKind::ClientClosed);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_close_interrupts_backoff() {
    let transport = Arc::new(ScriptedTransport::always(network_error()));
    let config = ClientConfig {
        backoff_unit: Duration::from_secs(10),
        ..test_client_config(USGS_URL)
    };
    let client = open(config, &transport);

    let query = EventQuery::new();
    let start = Instant::now();
    let (result, ()) = tokio::join!(client.get_events(&query), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.close();
    });

    assert_eq!(result.unwrap_err().kind, ErrorKind::ClientClosed);
    assert_eq!(transport.calls(), 1);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_concurrent_callers_share_the_throttle() {
    let transport = Arc::new(ScriptedTransport::ok(catalog_body(1, 0)));
    let config = ClientConfig {
        rate_limit_interval: Duration::from_millis(50),
        ..test_client_config(USGS_URL)
    };
    let client = open(config, &transport);

    let (q1, q2, q3) = (
        EventQuery::new().with_limit(1),
        EventQuery::new().with_limit(2),
        EventQuery::new().with_limit(3),
    );
    let start = Instant::now();
    let (a, b, c) = tokio::join!(client.get_events(&q1), client.get_events(&q2), client.get_events(&q3));

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(transport.calls(), 3);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_async_data_quality_is_final() {
    let transport = Arc::new(ScriptedTransport::ok(catalog_body(2, 3)));
    let client = open(test_client_config(USGS_URL), &transport);

    let err = client.get_events(&EventQuery::new()).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::DataQuality);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_closed_session_errors_are_reported() {
    let handler = Arc::new(ErrorHandler::default());
    let transport = Arc::new(ScriptedTransport::ok(catalog_body(1, 0)).with_delay(Duration::from_secs(5)));
    let client = open(test_client_config(USGS_URL), &transport).with_error_handler(Arc::clone(&handler));

    let query = EventQuery::new();
    let (result, ()) = tokio::join!(client.get_events(&query), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.close();
    });
    assert_eq!(result.unwrap_err().kind, ErrorKind::ClientClosed);

    let err = client.count_events(&query).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClientClosed);

    let summary = handler.summary();
    assert_eq!(summary.total_errors, 2);
    assert_eq!(summary.counts_by_kind.get("ClientClosedError"), Some(&2));
    assert!(summary
        .most_recent_errors
        .iter()
        .all(|r| r.context.get("service").map(String::as_str) == Some("usgs")));
}

#[tokio::test]
async fn test_async_rejected_query_is_reported() {
    let handler = Arc::new(ErrorHandler::default());
    let transport = Arc::new(ScriptedTransport::ok(catalog_body(1, 0)));
    let client = open(test_client_config(USGS_URL), &transport).with_error_handler(Arc::clone(&handler));

    let query = EventQuery::new().magnitude(Some(6.0), Some(3.0));
    assert_eq!(client.get_events(&query).await.unwrap_err().kind, ErrorKind::NonRetryable);
    let err = client.get_significant_events(u32::MAX, 6.0).await.unwrap_err();
    assert_eq!(err.error_code.as_deref(), Some("INVALID_QUERY"));

    assert_eq!(handler.summary().counts_by_kind.get("NonRetryableError"), Some(&2));
    assert_eq!(transport.calls(), 0);
}
