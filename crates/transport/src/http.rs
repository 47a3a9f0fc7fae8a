//! HTTP transport over a pooled `reqwest` client
//!
//! Handles:
//! - envelope encoding and POST to the configured RPC endpoint
//! - per-call deadline enforcement
//! - HTTP status failures (status code plus truncated body excerpt)
//! - decoding of the response envelope into a result or a mapped error
//!
//! The pool lives behind an async `RwLock`: each call holds a shared guard for
//! the whole exchange and `close` takes the exclusive guard, so closing waits
//! for in-flight calls and releases the pool once.

use crate::config::TransportConfig;
use crate::transport::Transport;
use async_trait::async_trait;
use remtx_core::{Error, Result};
use remtx_wire::{decode_response, encode_request, Request, RequestId};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Maximum number of characters of a failing response body kept in the error
pub const BODY_EXCERPT_CHARS: usize = 200;

/// JSON-RPC transport over HTTP POST
pub struct HttpTransport {
    config: TransportConfig,
    endpoint: String,
    pool: RwLock<Option<reqwest::Client>>,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Build the transport and acquire its connection pool
    ///
    /// # Errors
    /// `Configuration` when the config is invalid, `Connection` when the HTTP
    /// client cannot be built.
    pub fn new(config: TransportConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle_ms) = config.pool_idle_timeout_ms {
            builder = builder.pool_idle_timeout(Duration::from_millis(idle_ms));
        }
        let client = builder
            .build()
            .map_err(|e| Error::connection_caused_by("failed to build HTTP client", e))?;

        let endpoint = config.endpoint();
        debug!(target: "remtx::transport", endpoint = %endpoint, "Connection pool acquired");

        Ok(Self {
            config,
            endpoint,
            pool: RwLock::new(Some(client)),
            closed: AtomicBool::new(false),
        })
    }

    /// Configuration this transport was built from
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Full URL calls are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST the body and return the raw response bytes of a success status
    async fn exchange(&self, client: &reqwest::Client, body: Vec<u8>, started: Instant) -> Result<Vec<u8>> {
        let response = client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e, started))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(e, started))?;

        if !status.is_success() {
            let excerpt = body_excerpt(&bytes);
            warn!(
                target: "remtx::transport",
                status = status.as_u16(),
                body = %excerpt,
                "Remote answered with failure status"
            );
            return Err(Error::http_status(status.as_u16(), &excerpt));
        }

        Ok(bytes.to_vec())
    }

    fn classify(&self, e: reqwest::Error, started: Instant) -> Error {
        if e.is_timeout() {
            Error::timeout(format!("request to {}", self.endpoint), started.elapsed())
        } else {
            Error::connection_caused_by(format!("request to {} failed", self.endpoint), e)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        id: Option<RequestId>,
    ) -> Result<Value> {
        let request = Request::call(service, method, args, id);
        let target = request.target();
        let body = encode_request(&request)?;

        let guard = self.pool.read().await;
        let client = match guard.as_ref() {
            Some(client) => client,
            None => return Err(Error::connection("transport is closed")),
        };

        debug!(target: "remtx::transport", call = %target, id = %request.id, "Sending call");

        let deadline = self.config.timeout();
        let started = Instant::now();
        let bytes = match tokio::time::timeout(deadline, self.exchange(client, body, started)).await {
            Ok(result) => result?,
            Err(_) => {
                let elapsed = started.elapsed();
                warn!(
                    target: "remtx::transport",
                    call = %target,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Call exceeded deadline"
                );
                return Err(Error::timeout(
                    format!("{} exceeded the {:?} deadline", target, deadline),
                    elapsed,
                ));
            }
        };
        drop(guard);

        let response = decode_response(&bytes)?;
        if response.id.as_ref() != Some(&request.id) {
            warn!(
                target: "remtx::transport",
                call = %target,
                sent = %request.id,
                received = ?response.id,
                "Response id does not match request id"
            );
        }
        response.into_result()
    }

    async fn health_check(&self) -> bool {
        let service = self.config.health_service.clone();
        let method = self.config.health_method.clone();
        match self.call(&service, &method, Vec::new(), None).await {
            Ok(_) => true,
            Err(e) => {
                debug!(target: "remtx::transport", error = %e, "Health check failed");
                false
            }
        }
    }

    async fn close(&self) {
        let mut guard = self.pool.write().await;
        if let Some(client) = guard.take() {
            drop(client);
            self.closed.store(true, Ordering::SeqCst);
            info!(target: "remtx::transport", endpoint = %self.endpoint, "Connection pool released");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn body_excerpt(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(BODY_EXCERPT_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use remtx_core::ErrorKind;

    #[test]
    fn excerpt_is_truncated() {
        let long = "x".repeat(1000);
        assert_eq!(body_excerpt(long.as_bytes()).len(), BODY_EXCERPT_CHARS);
        assert_eq!(body_excerpt(b"short"), "short");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = HttpTransport::new(TransportConfig::new("")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = HttpTransport::new(TransportConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(!transport.is_closed());

        transport.close().await;
        assert!(transport.is_closed());
        transport.close().await;
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn call_after_close_fails_without_network() {
        let transport = HttpTransport::new(TransportConfig::new("http://127.0.0.1:9")).unwrap();
        transport.close().await;

        let err = transport
            .call("common", "version", vec![], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("closed"));
        assert!(!transport.health_check().await);
    }
}
