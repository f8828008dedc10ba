// src/client/usgs_async.rs

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;

use super::fetcher::{open_cache, AsyncFetcher};
use super::query::{EventQuery, QueryParams};
use super::usgs::{
    catalog_params, parse_catalog, parse_count, parse_object, recent_query_at, significant_query_at,
    EventCatalog, COUNT_ENDPOINT, QUERY_ENDPOINT, SERVICE,
};
use super::{AsyncHttp, AsyncHttpTransport};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::resilience::{CircuitBreaker, ErrorHandler};
use crate::storage::CacheStore;
use crate::validation::CatalogValidator;

/// Session-scoped async client for the USGS FDSN event service
///
/// The session is open from construction until [`close`](Self::close). Every
/// request of the session shares one connection pool and one throttle, so
/// concurrent tasks calling the same client still leave one interval apart.
#[derive(Debug)]
pub struct AsyncUsgsClient {
    fetcher: AsyncFetcher,
    validator: CatalogValidator,
}

impl AsyncUsgsClient {
    pub fn open(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(AsyncHttp::new(config.timeout, &config.user_agent)?);
        let cache = open_cache(&config)?;
        Self::open_with_transport(config, transport, cache)
    }

    pub fn open_with_transport(
        config: ClientConfig,
        transport: Arc<dyn AsyncHttpTransport>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        let fetcher = AsyncFetcher::new(SERVICE, &config, transport, cache)?;
        info!("Async USGS session opened");
        Ok(Self {
            fetcher,
            validator: CatalogValidator::default(),
        })
    }

    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.fetcher = self.fetcher.with_error_handler(handler);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.fetcher = self.fetcher.with_circuit_breaker(breaker);
        self
    }

    pub fn with_validator(mut self, validator: CatalogValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.fetcher.circuit_breaker()
    }

    pub fn is_closed(&self) -> bool {
        self.fetcher.is_closed()
    }

    /// Release the session; in-flight calls fail with `ClientClosed`
    pub fn close(&self) {
        self.fetcher.close();
    }

    pub async fn fetch(&self, endpoint: &str, params: &QueryParams) -> Result<Map<String, Value>> {
        let validator = &self.validator;
        self.fetcher
            .fetch_with(endpoint, params, &|body: &str| parse_object(endpoint, params, body, validator))
            .await
    }

    pub async fn fetch_text(&self, endpoint: &str, params: &QueryParams) -> Result<String> {
        self.fetcher
            .fetch_with(endpoint, params, &|body: &str| Ok(body.to_string()))
            .await
    }

    pub async fn get_events_raw(&self, query: &EventQuery) -> Result<Map<String, Value>> {
        let params = self.fetcher.checked(QUERY_ENDPOINT, catalog_params(query))?;
        self.fetch(QUERY_ENDPOINT, &params).await
    }

    pub async fn get_events_text(&self, query: &EventQuery) -> Result<String> {
        let params = self.fetcher.checked(QUERY_ENDPOINT, query.to_params())?;
        self.fetch_text(QUERY_ENDPOINT, &params).await
    }

    pub async fn get_events(&self, query: &EventQuery) -> Result<EventCatalog> {
        let params = self.fetcher.checked(QUERY_ENDPOINT, catalog_params(query))?;
        let validator = &self.validator;
        let catalog = self
            .fetcher
            .fetch_with(QUERY_ENDPOINT, &params, &|body: &str| parse_catalog(body, validator))
            .await?;
        info!("Retrieved {} earthquake events", catalog.len());
        Ok(catalog)
    }

    pub async fn get_recent_events(&self, hours: u32, min_magnitude: f64) -> Result<EventCatalog> {
        let query = self
            .fetcher
            .checked(QUERY_ENDPOINT, recent_query_at(Utc::now(), hours, min_magnitude))?;
        self.get_events(&query).await
    }

    pub async fn get_significant_events(&self, days: u32, min_magnitude: f64) -> Result<EventCatalog> {
        let query = self
            .fetcher
            .checked(QUERY_ENDPOINT, significant_query_at(Utc::now(), days, min_magnitude))?;
        self.get_events(&query).await
    }

    pub async fn count_events(&self, query: &EventQuery) -> Result<u64> {
        let params = self.fetcher.checked(COUNT_ENDPOINT, query.to_count_params())?;
        self.fetcher.fetch_with(COUNT_ENDPOINT, &params, &parse_count).await
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.fetcher.clear_cache()
    }
}
