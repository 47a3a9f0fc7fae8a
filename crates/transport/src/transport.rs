//! The call primitive every higher layer goes through

use async_trait::async_trait;
use remtx_core::Result;
use remtx_wire::RequestId;
use serde_json::Value;

/// Service and method used by the default liveness probe
pub const DEFAULT_HEALTH_TARGET: (&str, &str) = ("common", "version");

/// Request/response access to the remote service
///
/// Implementations own their connection resources and must be safe for many
/// concurrent calls. No retries happen at this level.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one call and return its `result` payload unchanged
    ///
    /// # Errors
    /// - `Connection` when the exchange fails or the server answers with a
    ///   failure HTTP status
    /// - `Timeout` when the configured deadline passes
    /// - the mapped remote error when the response carries an `error`
    async fn call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        id: Option<RequestId>,
    ) -> Result<Value>;

    /// Best-effort liveness probe; never returns an error
    async fn health_check(&self) -> bool {
        let (service, method) = DEFAULT_HEALTH_TARGET;
        match self.call(service, method, Vec::new(), None).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(target: "remtx::transport", error = %e, "Health check failed");
                false
            }
        }
    }

    /// Release the connection pool
    ///
    /// Waits for in-flight calls. Calling it again is a no-op.
    async fn close(&self);

    /// Whether `close` has completed
    fn is_closed(&self) -> bool;
}
