// src/test_utils.rs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::client::{query_string, AsyncHttpTransport, HttpResponse, HttpTransport, QueryParams};
use super::config::ClientConfig;
use super::error::{Result, SeismicError};

/// 2023-11-14T22:13:20Z, safely in the past
pub const PAST_TIME_MS: i64 = 1_700_000_000_000;

/// Fake transport that plays back a script of responses
///
/// Responses are consumed in order; once the script runs dry the last one
/// repeats. Routed responses take precedence; a route matches when its pattern
/// is a substring of `url?k=v&k=v`, and the first matching route wins.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse>>>,
    last: Mutex<Option<Result<HttpResponse>>>,
    routes: Mutex<Vec<(String, Result<HttpResponse>)>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, QueryParams)>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Result<HttpResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn always(response: Result<HttpResponse>) -> Self {
        Self::new([response])
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::always(Ok(HttpResponse::ok(body)))
    }

    /// Every async call sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer every request whose URL and query contain `pattern`
    pub fn route(self, pattern: &str, response: Result<HttpResponse>) -> Self {
        self.routes.lock().unwrap().push((pattern.to_string(), response));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, QueryParams)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_params(&self) -> Option<QueryParams> {
        self.requests.lock().unwrap().last().map(|(_, params)| params.clone())
    }

    fn respond(&self, url: &str, params: &QueryParams) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((url.to_string(), params.clone()));

        let full = format!("{}?{}", url, query_string(params));
        let routes = self.routes.lock().unwrap();
        if let Some((_, response)) = routes.iter().find(|(pattern, _)| full.contains(pattern.as_str())) {
            return response.clone();
        }
        drop(routes);

        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = Some(next);
        }
        last.clone()
            .unwrap_or_else(|| Err(SeismicError::non_retryable("No scripted response")))
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse> {
        self.respond(url, params)
    }
}

#[async_trait]
impl AsyncHttpTransport for ScriptedTransport {
    async fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.respond(url, params)
    }
}

/// Client settings for tests: no throttle, millisecond backoff, no disk cache
pub fn test_client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
        max_retries: 2,
        rate_limit_interval: Duration::ZERO,
        cache_dir: None,
        cache_duration: Duration::from_secs(300),
        backoff_unit: Duration::from_millis(1),
        user_agent: "seismic-data-tests".to_string(),
        circuit_breaker: None,
    }
}

pub fn network_error() -> Result<HttpResponse> {
    Err(SeismicError::network("Connection reset by peer"))
}

/// One GeoJSON earthquake feature as served by the USGS event service
pub fn quake_feature(id: &str, lon: f64, lat: f64, depth: f64, mag: f64, time_ms: i64) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "geometry": {
            "type": "Point",
            "coordinates": [lon, lat, depth]
        },
        "properties": {
            "mag": mag,
            "time": time_ms,
            "place": format!("10 km N of {}", id),
            "magType": "ml"
        }
    })
}

/// FeatureCollection with `valid` good events followed by `invalid` events at latitude 120
pub fn catalog(valid: usize, invalid: usize) -> Value {
    let mut features = Vec::with_capacity(valid + invalid);
    for i in 0..valid {
        let offset = i as f64 * 0.1;
        features.push(quake_feature(
            &format!("ok{}", i),
            -118.0 + offset,
            34.0 + offset,
            10.0,
            2.5 + offset,
            PAST_TIME_MS + i as i64 * 60_000,
        ));
    }
    for i in 0..invalid {
        features.push(quake_feature(&format!("bad{}", i), 10.0, 120.0, 10.0, 3.0, PAST_TIME_MS));
    }
    json!({
        "type": "FeatureCollection",
        "metadata": {
            "generated": PAST_TIME_MS,
            "url": "https://example.test/query",
            "title": "Test catalog",
            "status": 200,
            "count": valid + invalid
        },
        "features": features
    })
}

pub fn catalog_body(valid: usize, invalid: usize) -> String {
    catalog(valid, invalid).to_string()
}
