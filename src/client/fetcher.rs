// src/client/fetcher.rs
//! Cache-aware, rate-limited, resilient GET engines shared by every client.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{check_status, join_url, query_string, AsyncHttpTransport, HttpTransport, QueryParams};
use crate::config::ClientConfig;
use crate::error::{Result, SeismicError};
use crate::rate_limit::RateLimiter;
use crate::resilience::{context, CircuitBreaker, ErrorHandler, ResilientCall, RetryPolicy};
use crate::storage::{cache_key, CacheEntry, CacheStore, DiskCache};
use crate::{cache_op, remote_fetch};

/// Parser applied to a raw body, both fresh and cached
pub type ParseFn<'a, T> = &'a (dyn Fn(&str) -> Result<T> + Sync);

/// Disk cache under the configured directory, or none when caching is off
pub fn open_cache(config: &ClientConfig) -> Result<Option<Arc<dyn CacheStore>>> {
    match &config.cache_dir {
        Some(dir) => {
            let cache: Arc<dyn CacheStore> = Arc::new(DiskCache::new(dir)?);
            Ok(Some(cache))
        }
        None => Ok(None),
    }
}

#[derive(Debug)]
struct FetchCore {
    service: String,
    base_url: String,
    cache: Option<Arc<dyn CacheStore>>,
    cache_duration: Duration,
    limiter: RateLimiter,
    call: ResilientCall,
}

impl FetchCore {
    fn new(service: &str, config: &ClientConfig, cache: Option<Arc<dyn CacheStore>>) -> Result<Self> {
        config.validate()?;
        let policy = RetryPolicy::client_backoff(config.max_retries, config.backoff_unit);
        let mut call = ResilientCall::new(format!("{}_fetch", service), policy);
        if let Some(breaker) = &config.circuit_breaker {
            call = call.with_circuit_breaker(Arc::new(CircuitBreaker::new(
                format!("{}_api", service),
                breaker.clone(),
            )));
        }
        info!(
            service,
            base_url = %config.base_url,
            cached = cache.is_some(),
            "Client initialized: max_retries={}, rate_limit={:?}",
            config.max_retries,
            config.rate_limit_interval
        );
        Ok(Self {
            service: service.to_string(),
            base_url: config.base_url.clone(),
            cache,
            cache_duration: config.cache_duration,
            limiter: RateLimiter::new(config.rate_limit_interval),
            call,
        })
    }

    fn context(&self, endpoint: &str, params: &QueryParams) -> BTreeMap<String, String> {
        context([
            ("service", self.service.clone()),
            ("endpoint", endpoint.to_string()),
            ("params", query_string(params)),
        ])
    }

    /// Report a failure to build request parameters, then pass the result on
    fn checked<T>(&self, endpoint: &str, result: Result<T>) -> Result<T> {
        let context = context([("service", self.service.clone()), ("endpoint", endpoint.to_string())]);
        self.call.settle(context, result)
    }

    /// Fresh cached value; unreadable or unparsable entries count as a miss
    fn cached<T>(&self, key: &str, parse: ParseFn<'_, T>) -> Option<T> {
        let cache = self.cache.as_ref()?;
        let entry = match cache.get_fresh(key, self.cache_duration) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        };
        cache_op!("get", key, entry.is_some());
        let entry = entry?;
        match parse(&entry.payload) {
            Ok(value) => {
                debug!(service = %self.service, "Using cached data for {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Ignoring unusable cache entry {}: {}", key, e);
                None
            }
        }
    }

    fn remember(&self, key: &str, body: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        match cache.store(&CacheEntry::new(key, body)) {
            Ok(()) => cache_op!("set", key, false),
            // A failed write only costs a future refetch
            Err(e) => warn!("Failed to cache response {}: {}", key, e),
        }
    }

    fn clear_cache(&self) -> Result<usize> {
        match &self.cache {
            Some(cache) => {
                let removed = cache.clear()?;
                info!(service = %self.service, "Cleared {} cached responses", removed);
                Ok(removed)
            }
            None => Ok(0),
        }
    }
}

/// Blocking fetch engine; waits block the calling thread
#[derive(Debug)]
pub struct BlockingFetcher {
    core: FetchCore,
    transport: Arc<dyn HttpTransport>,
}

impl BlockingFetcher {
    pub fn new(
        service: &str,
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        Ok(Self {
            core: FetchCore::new(service, config, cache)?,
            transport,
        })
    }

    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.core.call = self.core.call.with_error_handler(handler);
        self
    }

    /// Share one breaker between every client of the same remote dependency
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.core.call = self.core.call.with_circuit_breaker(breaker);
        self
    }

    pub fn service(&self) -> &str {
        &self.core.service
    }

    pub fn base_url(&self) -> &str {
        &self.core.base_url
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.core.call.circuit_breaker()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.core.limiter
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.core.clear_cache()
    }

    /// Pass through locally built request parameters; an error is reported
    /// to the error handler before it propagates
    pub fn checked<T>(&self, endpoint: &str, result: Result<T>) -> Result<T> {
        self.core.checked(endpoint, result)
    }

    /// GET `endpoint`, parse the body, and cache it once it parsed
    pub fn fetch_with<T>(&self, endpoint: &str, params: &QueryParams, parse: ParseFn<'_, T>) -> Result<T> {
        let key = cache_key(endpoint, params);
        if let Some(value) = self.core.cached(&key, parse) {
            return Ok(value);
        }

        let url = join_url(&self.core.base_url, endpoint);
        let mut attempt = 0u32;
        let (body, value) = self.core.call.run(self.core.context(endpoint, params), || {
            attempt += 1;
            self.core.limiter.acquire_blocking();
            remote_fetch!(self.core.service, endpoint, attempt, query_string(params));
            let response = self.transport.get(&url, params)?;
            let body = check_status(response, &url)?;
            let value = parse(&body)?;
            Ok((body, value))
        })?;

        self.core.remember(&key, &body);
        info!(service = %self.core.service, "Fetched {} successfully", endpoint);
        Ok(value)
    }
}

/// Non-blocking fetch engine bound to one session
///
/// Closing the session cancels every in-flight call, wherever it is waiting.
#[derive(Debug)]
pub struct AsyncFetcher {
    core: FetchCore,
    transport: Arc<dyn AsyncHttpTransport>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl AsyncFetcher {
    pub fn new(
        service: &str,
        config: &ClientConfig,
        transport: Arc<dyn AsyncHttpTransport>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        Ok(Self {
            core: FetchCore::new(service, config, cache)?,
            transport,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.core.call = self.core.call.with_error_handler(handler);
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.core.call = self.core.call.with_circuit_breaker(breaker);
        self
    }

    pub fn service(&self) -> &str {
        &self.core.service
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.core.call.circuit_breaker()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.core.limiter
    }

    pub fn clear_cache(&self) -> Result<usize> {
        self.core.clear_cache()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the session; only the first call has an effect
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(service = %self.core.service, "Session already closed");
            return;
        }
        self.cancel.cancel();
        info!(service = %self.core.service, "Session closed");
    }

    pub fn checked<T>(&self, endpoint: &str, result: Result<T>) -> Result<T> {
        self.core.checked(endpoint, result)
    }

    fn closed<T>(&self, endpoint: &str, params: &QueryParams) -> Result<T> {
        let err = SeismicError::client_closed(format!("{} client session is closed", self.core.service))
            .with_detail("service", &self.core.service);
        self.core.call.settle(self.core.context(endpoint, params), Err(err))
    }

    pub async fn fetch_with<T>(&self, endpoint: &str, params: &QueryParams, parse: ParseFn<'_, T>) -> Result<T> {
        if self.is_closed() {
            return self.closed(endpoint, params);
        }
        let key = cache_key(endpoint, params);
        if let Some(value) = self.core.cached(&key, parse) {
            return Ok(value);
        }

        let url = join_url(&self.core.base_url, endpoint);
        let core = &self.core;
        let transport = &self.transport;
        let url_ref = url.as_str();
        let mut attempt = 0u32;
        let call = core.call.run_async(core.context(endpoint, params), move || {
            attempt += 1;
            let attempt = attempt;
            async move {
                core.limiter.acquire().await;
                remote_fetch!(core.service, endpoint, attempt, query_string(params));
                let response = transport.get(url_ref, params).await?;
                let body = check_status(response, url_ref)?;
                let value = parse(&body)?;
                Ok((body, value))
            }
        });

        let (body, value) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(service = %core.service, "Request to {} aborted: session closed", endpoint);
                return self.closed(endpoint, params);
            }
            result = call => result?,
        };

        core.remember(&key, &body);
        info!(service = %core.service, "Fetched {} successfully", endpoint);
        Ok(value)
    }
}
