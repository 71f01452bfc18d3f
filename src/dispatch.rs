//! Dispatch router: name-based forwarding with uniform result envelopes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind};
use crate::protocol::{Envelope, ExecuteRequest, OperationSpec};
use crate::registry::CapabilityRegistry;
use crate::transport::{Endpoint, ServiceTransport};

/// Routes operation calls to the owning service.
///
/// Every dispatch is independent; results are never cached.
#[derive(Clone)]
pub struct DispatchRouter {
    registry: Arc<RwLock<CapabilityRegistry>>,
    transport: Arc<dyn ServiceTransport>,
    timeout: Duration,
    stats: Arc<RwLock<HashMap<Endpoint, ServiceStats>>>,
}

impl DispatchRouter {
    /// Create a router over a registry and transport.
    pub fn new(
        registry: CapabilityRegistry,
        transport: Arc<dyn ServiceTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            transport,
            timeout,
            stats: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Shared handle to the registry.
    pub fn registry(&self) -> Arc<RwLock<CapabilityRegistry>> {
        self.registry.clone()
    }

    /// Discover one more endpoint through this router's transport.
    pub async fn discover(&self, endpoint: &Endpoint) -> crate::Result<()> {
        let mut registry = self.registry.write().await;
        registry
            .discover(self.transport.as_ref(), endpoint)
            .await
            .map(|_| ())
    }

    /// Operations currently routable.
    pub async fn operations(&self) -> Vec<OperationSpec> {
        self.registry.read().await.operations()
    }

    /// Dispatch an operation by name.
    pub async fn dispatch(&self, operation: &str, arguments: Map<String, Value>) -> Envelope {
        let endpoint = match self.registry.read().await.resolve(operation) {
            Ok(endpoint) => endpoint.clone(),
            Err(e) => {
                warn!(operation, "no service declares operation");
                return Envelope::failure(e.kind(), e.to_string());
            }
        };

        debug!(operation, %endpoint, "dispatching");
        let request = ExecuteRequest::new(operation, arguments);
        let start = Instant::now();

        let result = match tokio::time::timeout(
            self.timeout,
            self.transport.execute(&endpoint, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Unreachable(format!(
                "{} did not answer within {:?}",
                endpoint, self.timeout
            ))),
        };

        match result {
            Ok(envelope) => {
                self.record_success(&endpoint, start.elapsed()).await;
                envelope
            }
            Err(e) => {
                warn!(operation, %endpoint, error = %e, "dispatch failed");
                self.record_failure(&endpoint).await;
                let kind = match e.kind() {
                    ErrorKind::Malformed => ErrorKind::Malformed,
                    _ => ErrorKind::Unreachable,
                };
                Envelope::failure(kind, e.to_string())
            }
        }
    }

    async fn record_success(&self, endpoint: &Endpoint, latency: Duration) {
        let mut stats = self.stats.write().await;
        stats.entry(endpoint.clone()).or_default().record_success(latency);
    }

    async fn record_failure(&self, endpoint: &Endpoint) {
        let mut stats = self.stats.write().await;
        stats.entry(endpoint.clone()).or_default().record_failure();
    }

    /// Per-service call statistics.
    pub async fn stats(&self) -> HashMap<Endpoint, ServiceStats> {
        self.stats.read().await.clone()
    }
}

/// Call statistics for one service.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    /// Calls that reached the service.
    pub successful_requests: u64,
    /// Calls lost to transport failures or timeouts.
    pub failed_requests: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Moving average of round-trip latency.
    pub avg_latency: Option<Duration>,
}

impl ServiceStats {
    /// Total dispatched calls.
    pub fn total_requests(&self) -> u64 {
        self.successful_requests + self.failed_requests
    }

    fn record_success(&mut self, latency: Duration) {
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        // Exponential moving average
        self.avg_latency = Some(match self.avg_latency {
            Some(avg) => Duration::from_micros(
                (avg.as_micros() as f64 * 0.9 + latency.as_micros() as f64 * 0.1) as u64,
            ),
            None => latency,
        });
    }

    fn record_failure(&mut self) {
        self.failed_requests += 1;
        self.consecutive_failures += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    use crate::protocol::CapabilityManifest;
    use crate::service::hotel_service;
    use crate::transport::LocalTransport;

    /// Transport that never answers.
    struct Stalled;

    #[async_trait::async_trait]
    impl ServiceTransport for Stalled {
        async fn discover(&self, _endpoint: &Endpoint) -> crate::Result<CapabilityManifest> {
            Ok(hotel_service().manifest())
        }

        async fn execute(
            &self,
            _endpoint: &Endpoint,
            _request: &ExecuteRequest,
        ) -> crate::Result<Envelope> {
            std::future::pending().await
        }
    }

    async fn local_router() -> DispatchRouter {
        let transport = Arc::new(
            LocalTransport::new().mount("local://hotels", Arc::new(hotel_service())),
        );
        let registry =
            CapabilityRegistry::discover_all(transport.as_ref(), &["local://hotels".into()]).await;
        DispatchRouter::new(registry, transport, Duration::from_secs(5))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_owner() {
        let router = local_router().await;
        let envelope = router
            .dispatch("get_hotel_details", args(json!({"hotel_id": "3"})))
            .await;
        assert!(envelope.success);
        assert_eq!(envelope.result.unwrap()["name"], "Grand Hyatt");

        let stats = router.stats().await;
        assert_eq!(stats[&Endpoint::new("local://hotels")].successful_requests, 1);
    }

    #[tokio::test]
    async fn test_unknown_operation_makes_no_call() {
        let router = local_router().await;
        let envelope = router.dispatch("book_train", Map::new()).await;
        assert_eq!(envelope.error_kind, Some(ErrorKind::UnknownOperation));
        assert!(!envelope.is_retriable());
        assert!(router.stats().await.is_empty());
    }

    #[tokio::test]
    async fn test_service_errors_pass_through() {
        let router = local_router().await;
        let envelope = router
            .dispatch("get_booking_status", args(json!({"booking_id": "BK1"})))
            .await;
        assert_eq!(envelope.error_kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retriable_unreachable() {
        let transport: Arc<dyn ServiceTransport> = Arc::new(Stalled);
        let mut registry = CapabilityRegistry::new();
        assert_ok!(registry.discover(transport.as_ref(), &"http://slow".into()).await);
        let router = DispatchRouter::new(registry, transport, Duration::from_secs(2));

        let envelope = router.dispatch("search_hotels", Map::new()).await;
        assert_eq!(envelope.error_kind, Some(ErrorKind::Unreachable));
        assert!(envelope.is_retriable());

        let stats = router.stats().await;
        assert_eq!(stats[&Endpoint::new("http://slow")].consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_late_discovery_makes_operation_routable() {
        let transport = Arc::new(
            LocalTransport::new().mount("local://hotels", Arc::new(hotel_service())),
        );
        let router = DispatchRouter::new(
            CapabilityRegistry::new(),
            transport,
            Duration::from_secs(5),
        );

        let before = router.dispatch("search_hotels", Map::new()).await;
        assert_eq!(before.error_kind, Some(ErrorKind::UnknownOperation));

        assert_ok!(router.discover(&"local://hotels".into()).await);
        let after = router.dispatch("search_hotels", Map::new()).await;
        assert!(after.success);
    }
}
