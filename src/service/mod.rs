//! Resource services: a catalog of operations over one inventory store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result};
use crate::inventory::InventoryStore;
use crate::protocol::{
    CapabilityManifest, Envelope, HealthStatus, OperationSpec, ServiceStatus, PROTOCOL,
};

pub mod flights;
pub mod hotels;
pub mod operations;

pub use flights::flight_service;
pub use hotels::hotel_service;

/// Source of "today" used for date validation.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Operation trait for implementing service operations.
#[async_trait::async_trait]
pub trait Operation: Send + Sync {
    /// Get the operation declaration.
    fn spec(&self) -> OperationSpec;

    /// Execute the operation with already validated arguments.
    async fn execute(&self, arguments: Map<String, Value>, context: &OperationContext)
        -> Result<Value>;
}

/// Context passed to operations during execution.
pub struct OperationContext {
    /// The owning service's inventory.
    pub store: Arc<InventoryStore>,
    /// Current date for past-date checks.
    pub today: NaiveDate,
}

/// A resource service owning one inventory store.
pub struct ResourceService {
    name: String,
    version: String,
    store: Arc<InventoryStore>,
    /// Operations in manifest order.
    operations: Vec<(OperationSpec, Arc<dyn Operation>)>,
    index: HashMap<String, usize>,
    clock: Clock,
}

impl ResourceService {
    /// Create a service with no operations.
    pub fn new(name: impl Into<String>, version: impl Into<String>, store: InventoryStore) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            store: Arc::new(store),
            operations: Vec::new(),
            index: HashMap::new(),
            clock: Arc::new(|| Local::now().date_naive()),
        }
    }

    /// Replace the clock used for date validation.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Register an operation. A later registration replaces an earlier one
    /// with the same name in place.
    pub fn register(&mut self, operation: Arc<dyn Operation>) {
        let spec = operation.spec();
        match self.index.get(&spec.name) {
            Some(&i) => self.operations[i] = (spec, operation),
            None => {
                self.index.insert(spec.name.clone(), self.operations.len());
                self.operations.push((spec, operation));
            }
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_operation(mut self, operation: impl Operation + 'static) -> Self {
        self.register(Arc::new(operation));
        self
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owned inventory.
    pub fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    /// Capability manifest. Pure; no side effects.
    pub fn manifest(&self) -> CapabilityManifest {
        CapabilityManifest {
            agent_name: self.name.clone(),
            version: self.version.clone(),
            tools: self.operations.iter().map(|(spec, _)| spec.clone()).collect(),
            status: ServiceStatus::Online,
            protocol: PROTOCOL.into(),
        }
    }

    /// Health check.
    pub fn health(&self) -> HealthStatus {
        HealthStatus::healthy(&self.name)
    }

    /// Execute an operation by name.
    ///
    /// Never fails: every outcome is folded into an [`Envelope`].
    pub async fn execute(&self, name: &str, arguments: Map<String, Value>) -> Envelope {
        let Some(&i) = self.index.get(name) else {
            warn!(service = %self.name, tool = name, "unknown operation");
            return Envelope::failure(
                ErrorKind::UnknownOperation,
                format!("unknown operation: {}", name),
            );
        };
        let (spec, operation) = &self.operations[i];

        debug!(service = %self.name, tool = name, ?arguments, "executing");

        let result = match spec.parameters.validate(&arguments) {
            Ok(()) => {
                let context = OperationContext {
                    store: self.store.clone(),
                    today: (self.clock)(),
                };
                operation.execute(arguments, &context).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => info!(service = %self.name, tool = name, "operation succeeded"),
            Err(e) => info!(service = %self.name, tool = name, error = %e, "operation failed"),
        }

        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{CatalogItem, ReservationRequest};
    use crate::protocol::ParameterType;
    use serde_json::json;

    struct Echo;

    #[async_trait::async_trait]
    impl Operation for Echo {
        fn spec(&self) -> OperationSpec {
            OperationSpec::new("echo", "Echo the item")
                .required("item_id", ParameterType::String, "Item")
        }

        async fn execute(
            &self,
            arguments: Map<String, Value>,
            context: &OperationContext,
        ) -> Result<Value> {
            let id = operations::string_arg(&arguments, "item_id")?;
            let item = context.store.item(&id).await?;
            Ok(json!({ "name": item.name }))
        }
    }

    fn service() -> ResourceService {
        let store = InventoryStore::new(
            "E",
            1,
            vec![CatalogItem::new("x", "Xanadu", "Nowhere", 10, 2)],
        );
        ResourceService::new("EchoAgent", "1.0", store).with_operation(Echo)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_manifest_lists_operations_in_order() {
        let manifest = service().manifest();
        assert_eq!(manifest.agent_name, "EchoAgent");
        assert_eq!(manifest.status, ServiceStatus::Online);
        assert_eq!(manifest.protocol, PROTOCOL);
        let names: Vec<_> = manifest.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo"]);
    }

    #[tokio::test]
    async fn test_execute_wraps_success_and_errors() {
        let service = service();

        let ok = service.execute("echo", args(json!({"item_id": "x"}))).await;
        assert!(ok.success);
        assert_eq!(ok.result.unwrap()["name"], "Xanadu");

        let missing = service.execute("echo", args(json!({"item_id": "nope"}))).await;
        assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));

        let unknown = service.execute("launch", Map::new()).await;
        assert_eq!(unknown.error_kind, Some(ErrorKind::UnknownOperation));
    }

    #[tokio::test]
    async fn test_validation_never_reaches_store() {
        let service = service();
        let envelope = service.execute("echo", Map::new()).await;
        assert_eq!(envelope.error_kind, Some(ErrorKind::ValidationError));

        // Store untouched: the item still reserves its full capacity.
        let r = service
            .store()
            .reserve(ReservationRequest::new("x", 2, "Ada"))
            .await;
        assert!(r.is_ok());
    }
}
