//! Scriptable in-memory transport

use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use remtx_core::{Error, Result};
use remtx_wire::RequestId;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

type Handler = dyn Fn(&RecordedCall) -> Result<Value> + Send + Sync;
type FailureFactory = dyn Fn() -> Error + Send + Sync;

/// One call as the stub received it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// 1-based position among all calls the stub received
    pub number: usize,
    /// Remote service
    pub service: String,
    /// Remote method
    pub method: String,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Caller-supplied request id
    pub id: Option<RequestId>,
}

/// Transport double that records every call and answers through a handler
///
/// Failures can be injected by call number. Close follows the same contract
/// as the real transport: it waits for in-flight calls and releases once.
pub struct StubTransport {
    handler: Box<Handler>,
    failures: Vec<(usize, Box<FailureFactory>)>,
    latency: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    open: RwLock<bool>,
    closed: AtomicBool,
    releases: AtomicUsize,
}

impl StubTransport {
    /// Stub answering every call through `handler`
    pub fn new(handler: impl Fn(&RecordedCall) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            failures: Vec::new(),
            latency: None,
            calls: Mutex::new(Vec::new()),
            open: RwLock::new(true),
            closed: AtomicBool::new(false),
            releases: AtomicUsize::new(0),
        }
    }

    /// Stub answering every call with the same value
    pub fn returning(value: Value) -> Self {
        Self::new(move |_| Ok(value.clone()))
    }

    /// Make call number `number` (1-based) fail with the error `make` builds
    pub fn fail_on_call(mut self, number: usize, make: impl Fn() -> Error + Send + Sync + 'static) -> Self {
        self.failures.push((number, Box::new(make)));
        self
    }

    /// Delay every answer, to widen interleavings in concurrent tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls received
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of times the pool was released
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        id: Option<RequestId>,
    ) -> Result<Value> {
        let open = self.open.read().await;
        if !*open {
            return Err(Error::connection("transport is closed"));
        }

        let call = {
            let mut calls = self.calls.lock();
            let call = RecordedCall {
                number: calls.len() + 1,
                service: service.to_string(),
                method: method.to_string(),
                args,
                id,
            };
            calls.push(call.clone());
            call
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.failures.iter().find(|(n, _)| *n == call.number) {
            Some((_, make)) => Err(make()),
            None => (self.handler)(&call),
        };
        drop(open);
        result
    }

    async fn close(&self) {
        let mut open = self.open.write().await;
        if *open {
            *open = false;
            self.closed.store(true, Ordering::SeqCst);
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
