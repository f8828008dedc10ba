use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::error_handler::ErrorHandler;
use crate::resilience::retry::{retry_async, retry_blocking, RetryPolicy};

/// Explicit composition of retry, circuit breaking, and error reporting
///
/// ```plaintext
/// ┌────────┐   ┌──────────────┐   ┌─────────────────┐   ┌───────────┐
/// │ caller │──►│ retry policy │──►│ circuit breaker │──►│ operation │
/// └────────┘   └──────────────┘   └─────────────────┘   └───────────┘
///                     │
///                     ▼ final error
///              ┌───────────────┐
///              │ error handler │
///              └───────────────┘
/// ```
///
/// The breaker guards every individual attempt. An open breaker yields a
/// terminal error, so the retry loop stops at once instead of hammering it.
#[derive(Debug, Clone)]
pub struct ResilientCall {
    name: String,
    policy: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
    error_handler: Option<Arc<ErrorHandler>>,
}

impl ResilientCall {
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            breaker: None,
            error_handler: None,
        }
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub fn error_handler(&self) -> Option<&Arc<ErrorHandler>> {
        self.error_handler.as_ref()
    }

    /// Run a blocking operation; `context` is attached to a reported failure
    pub fn run<T, F>(&self, context: BTreeMap<String, String>, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let result = retry_blocking(&self.policy, &self.name, || match &self.breaker {
            Some(breaker) => breaker.protect(&mut operation),
            None => operation(),
        });
        self.report(&result, context);
        result
    }

    /// Run an async operation with the same semantics as [`run`](Self::run)
    pub async fn run_async<T, F, Fut>(&self, context: BTreeMap<String, String>, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = &self.breaker;
        let result = retry_async(&self.policy, &self.name, || {
            let attempt = operation();
            async move {
                match breaker {
                    Some(breaker) => breaker.protect_async(|| attempt).await,
                    None => attempt.await,
                }
            }
        })
        .await;
        self.report(&result, context);
        result
    }

    /// Pass through a result produced without running the operation, such as
    /// a rejected request, reporting it like any other final error
    pub fn settle<T>(&self, context: BTreeMap<String, String>, result: Result<T>) -> Result<T> {
        self.report(&result, context);
        result
    }

    fn report<T>(&self, result: &Result<T>, mut context: BTreeMap<String, String>) {
        if let (Err(err), Some(handler)) = (result, &self.error_handler) {
            context.entry("operation".to_string()).or_insert_with(|| self.name.clone());
            debug!(operation = %self.name, "Reporting propagated error to error handler");
            handler.report(err, context);
        }
    }
}
