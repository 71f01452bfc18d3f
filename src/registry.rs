//! Capability registry: discovered manifests and operation routing.
//!
//! Routes are built in the order services are registered. When two
//! manifests declare the same operation name, the first registration keeps
//! the name and later declarations are ignored (and logged).

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::protocol::{CapabilityManifest, OperationSpec, ServiceStatus};
use crate::transport::{Endpoint, ServiceTransport};

/// A configured service as seen by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredService {
    /// Where the service lives.
    pub endpoint: Endpoint,
    /// Manifest from the last successful discovery.
    pub manifest: Option<CapabilityManifest>,
    /// Online if discovery succeeded.
    pub status: ServiceStatus,
    /// Why discovery failed, if it did.
    pub last_error: Option<String>,
}

/// Registry of discovered services and the operations they own.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    /// Services in registration order.
    services: Vec<RegisteredService>,
    /// Operation name -> index into `services`.
    routes: HashMap<String, usize>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover every endpoint, in order. Failures mark the service
    /// offline and never abort.
    pub async fn discover_all(
        transport: &dyn ServiceTransport,
        endpoints: &[Endpoint],
    ) -> Self {
        let mut registry = Self::new();
        for endpoint in endpoints {
            // Failure is recorded on the entry; keep going.
            let _ = registry.discover(transport, endpoint).await;
        }
        registry
    }

    /// Discover a single endpoint and register its manifest.
    pub async fn discover(
        &mut self,
        transport: &dyn ServiceTransport,
        endpoint: &Endpoint,
    ) -> Result<CapabilityManifest> {
        match transport.discover(endpoint).await {
            Ok(manifest) => {
                info!(
                    %endpoint,
                    agent = %manifest.agent_name,
                    protocol = %manifest.protocol,
                    tools = manifest.tools.len(),
                    "discovered service"
                );
                self.register(endpoint.clone(), manifest.clone());
                Ok(manifest)
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "discovery failed; service marked offline");
                self.mark_offline(endpoint.clone(), e.to_string());
                Err(e)
            }
        }
    }

    /// Register a manifest for an endpoint.
    ///
    /// Routes previously owned by the endpoint are rebuilt from the new
    /// manifest. A manifest reporting itself offline contributes no routes.
    pub fn register(&mut self, endpoint: Endpoint, manifest: CapabilityManifest) {
        let index = self.slot(endpoint);
        self.routes.retain(|_, owner| *owner != index);

        if manifest.status == ServiceStatus::Online {
            for tool in &manifest.tools {
                match self.routes.get(&tool.name) {
                    Some(&owner) if owner != index => {
                        warn!(
                            operation = %tool.name,
                            kept = %self.services[owner].endpoint,
                            ignored = %self.services[index].endpoint,
                            "operation declared by two services; first registration wins"
                        );
                    }
                    Some(_) => {}
                    None => {
                        self.routes.insert(tool.name.clone(), index);
                    }
                }
            }
        } else {
            warn!(
                endpoint = %self.services[index].endpoint,
                "service reports itself offline; operations not routed"
            );
        }

        let entry = &mut self.services[index];
        entry.status = manifest.status;
        entry.manifest = Some(manifest);
        entry.last_error = None;
    }

    /// Record a failed discovery. The service's operations stop routing.
    pub fn mark_offline(&mut self, endpoint: Endpoint, reason: impl Into<String>) {
        let index = self.slot(endpoint);
        self.routes.retain(|_, owner| *owner != index);
        let entry = &mut self.services[index];
        entry.status = ServiceStatus::Offline;
        entry.last_error = Some(reason.into());
    }

    fn slot(&mut self, endpoint: Endpoint) -> usize {
        if let Some(i) = self.services.iter().position(|s| s.endpoint == endpoint) {
            return i;
        }
        self.services.push(RegisteredService {
            endpoint,
            manifest: None,
            status: ServiceStatus::Offline,
            last_error: None,
        });
        self.services.len() - 1
    }

    /// Endpoint owning an operation.
    pub fn resolve(&self, operation: &str) -> Result<&Endpoint> {
        self.routes
            .get(operation)
            .map(|&i| &self.services[i].endpoint)
            .ok_or_else(|| Error::UnknownOperation(operation.to_string()))
    }

    /// Union of routable operations, in registration order.
    pub fn operations(&self) -> Vec<OperationSpec> {
        self.services
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == ServiceStatus::Online)
            .filter_map(|(i, s)| s.manifest.as_ref().map(|m| (i, m)))
            .flat_map(|(i, m)| {
                m.tools
                    .iter()
                    .filter(move |t| self.routes.get(&t.name) == Some(&i))
                    .cloned()
            })
            .collect()
    }

    /// All configured services.
    pub fn services(&self) -> &[RegisteredService] {
        &self.services
    }

    /// Services currently online.
    pub fn online(&self) -> impl Iterator<Item = &RegisteredService> {
        self.services
            .iter()
            .filter(|s| s.status == ServiceStatus::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::ErrorKind;
    use crate::protocol::PROTOCOL;
    use crate::service::{flight_service, hotel_service};
    use crate::transport::LocalTransport;

    fn manifest(name: &str, tools: &[&str]) -> CapabilityManifest {
        CapabilityManifest {
            agent_name: name.into(),
            version: "1.0".into(),
            tools: tools
                .iter()
                .map(|t| OperationSpec::new(*t, format!("{} op", t)))
                .collect(),
            status: ServiceStatus::Online,
            protocol: PROTOCOL.into(),
        }
    }

    #[test]
    fn test_resolve_before_and_after_registration() {
        let mut registry = CapabilityRegistry::new();
        let err = registry.resolve("search_x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOperation);

        registry.register("http://x".into(), manifest("X", &["search_x"]));
        assert_eq!(registry.resolve("search_x").unwrap().as_str(), "http://x");
    }

    #[test]
    fn test_first_registered_wins_on_collision() {
        let mut registry = CapabilityRegistry::new();
        registry.register("http://a".into(), manifest("A", &["search", "book_a"]));
        registry.register("http://b".into(), manifest("B", &["search", "book_b"]));

        assert_eq!(registry.resolve("search").unwrap().as_str(), "http://a");
        assert_eq!(registry.resolve("book_b").unwrap().as_str(), "http://b");

        let names: Vec<_> = registry.operations().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["search", "book_a", "book_b"]);
    }

    #[test]
    fn test_offline_manifest_is_not_routable() {
        let mut registry = CapabilityRegistry::new();
        let mut down = manifest("Down", &["search_x"]);
        down.status = ServiceStatus::Offline;
        registry.register("http://down".into(), down);

        assert_eq!(registry.online().count(), 0);
        let err = registry.resolve("search_x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOperation);
        assert!(registry.operations().is_empty());

        // A later online service may claim the name.
        registry.register("http://up".into(), manifest("Up", &["search_x"]));
        assert_eq!(registry.resolve("search_x").unwrap().as_str(), "http://up");
    }

    #[test]
    fn test_rediscovery_replaces_routes() {
        let mut registry = CapabilityRegistry::new();
        registry.register("http://a".into(), manifest("A", &["search", "legacy"]));
        registry.register("http://a".into(), manifest("A", &["search", "book"]));

        assert!(registry.resolve("legacy").is_err());
        assert_eq!(registry.resolve("book").unwrap().as_str(), "http://a");
        let names: Vec<_> = registry.operations().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["search", "book"]);

        registry.mark_offline("http://a".into(), "connection refused");
        assert!(registry.resolve("search").is_err());
        assert!(registry.operations().is_empty());
    }

    #[tokio::test]
    async fn test_discover_all_tolerates_offline_services() {
        let transport = LocalTransport::new()
            .mount("local://hotels", Arc::new(hotel_service()))
            .mount("local://flights", Arc::new(flight_service()));
        let endpoints: Vec<Endpoint> = vec![
            "local://hotels".into(),
            "local://trains".into(),
            "local://flights".into(),
        ];

        let registry = CapabilityRegistry::discover_all(&transport, &endpoints).await;

        assert_eq!(registry.services().len(), 3);
        assert_eq!(registry.online().count(), 2);
        assert_eq!(registry.services()[1].status, ServiceStatus::Offline);
        assert!(registry.services()[1].last_error.is_some());
        assert_eq!(registry.operations().len(), 10);
        assert_eq!(
            registry.resolve("book_flight").unwrap().as_str(),
            "local://flights"
        );
        assert_eq!(
            registry.resolve("create_booking").unwrap().as_str(),
            "local://hotels"
        );
    }
}
