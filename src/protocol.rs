//! A2A wire protocol definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, ErrorKind};

/// Protocol identifier advertised in every manifest.
pub const PROTOCOL: &str = "a2a-json/1";

/// JSON type of an operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParameterType {
    /// Check whether a JSON value conforms to this type.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Parameter type.
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Human description.
    #[serde(default)]
    pub description: String,
}

/// JSON-Schema shaped parameter declaration of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Always "object".
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    /// Declared parameters by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySpec>,
    /// Names of required parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".into()
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    /// Validate call arguments against this schema.
    ///
    /// Missing (or null) required parameters, undeclared parameters and
    /// type mismatches all fail with [`Error::Validation`].
    pub fn validate(&self, arguments: &Map<String, Value>) -> crate::Result<()> {
        for name in &self.required {
            match arguments.get(name) {
                None | Some(Value::Null) => {
                    return Err(Error::Validation(format!(
                        "missing required parameter '{}'",
                        name
                    )));
                }
                Some(_) => {}
            }
        }

        for (name, value) in arguments {
            let Some(prop) = self.properties.get(name) else {
                return Err(Error::Validation(format!("unexpected parameter '{}'", name)));
            };
            if value.is_null() {
                continue;
            }
            if !prop.param_type.accepts(value) {
                return Err(Error::Validation(format!(
                    "parameter '{}' must be of type {:?}",
                    name, prop.param_type
                )));
            }
        }

        Ok(())
    }
}

/// Declaration of one callable operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Operation name, unique within its manifest.
    pub name: String,
    /// Human description.
    pub description: String,
    /// Parameter schema.
    #[serde(default)]
    pub parameters: ParameterSchema,
}

impl OperationSpec {
    /// Start a new operation declaration.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::default(),
        }
    }

    /// Declare an optional parameter.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.properties.insert(
            name.into(),
            PropertySpec {
                param_type,
                description: description.into(),
            },
        );
        self
    }

    /// Declare a required parameter.
    pub fn required(
        mut self,
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.parameters.required.push(name.clone());
        self.optional(name, param_type, description)
    }
}

/// Liveness status of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Offline,
}

/// Capabilities published by a resource service at discovery time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    /// Service name.
    pub agent_name: String,
    /// Service version.
    pub version: String,
    /// Declared operations, in declaration order.
    pub tools: Vec<OperationSpec>,
    /// Liveness status.
    pub status: ServiceStatus,
    /// Protocol identifier.
    #[serde(default)]
    pub protocol: String,
}

/// Execute call body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Operation to run.
    pub tool_name: String,
    /// Named arguments.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ExecuteRequest {
    /// Create an execute request.
    pub fn new(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Uniform result envelope returned by services and the dispatch router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the call succeeded.
    pub success: bool,
    /// Result (on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error classification (on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Error message (on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Create a success envelope.
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error_kind: None,
            error: None,
        }
    }

    /// Create a failure envelope.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error_kind: Some(kind),
            error: Some(message.into()),
        }
    }

    /// Whether resubmitting the call may succeed.
    pub fn is_retriable(&self) -> bool {
        self.error_kind.is_some_and(ErrorKind::is_retriable)
    }
}

impl From<crate::Result<Value>> for Envelope {
    fn from(result: crate::Result<Value>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::failure(e.kind(), e.to_string()),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always "healthy" when the service answers.
    pub status: String,
    /// Service name.
    pub agent: String,
}

impl HealthStatus {
    /// Healthy status for the named service.
    pub fn healthy(agent: impl Into<String>) -> Self {
        Self {
            status: "healthy".into(),
            agent: agent.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn booking_spec() -> OperationSpec {
        OperationSpec::new("create_booking", "Create a booking")
            .required("hotel_id", ParameterType::String, "Hotel")
            .required("num_guests", ParameterType::Integer, "Guests")
            .optional("note", ParameterType::String, "Free text")
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_schema_serializes_as_json_schema() {
        let value = serde_json::to_value(booking_spec()).unwrap();
        assert_eq!(value["parameters"]["type"], "object");
        assert_eq!(value["parameters"]["properties"]["num_guests"]["type"], "integer");
        assert_eq!(value["parameters"]["required"], json!(["hotel_id", "num_guests"]));
    }

    #[test]
    fn test_validate_missing_required() {
        let spec = booking_spec();
        let err = spec
            .parameters
            .validate(&args(json!({"hotel_id": "1"})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("num_guests"));

        let err = spec
            .parameters
            .validate(&args(json!({"hotel_id": null, "num_guests": 2})))
            .unwrap_err();
        assert!(err.to_string().contains("hotel_id"));
    }

    #[test]
    fn test_validate_types_and_unknown_params() {
        let spec = booking_spec();
        assert!(spec
            .parameters
            .validate(&args(json!({"hotel_id": "1", "num_guests": 2})))
            .is_ok());
        assert!(spec
            .parameters
            .validate(&args(json!({"hotel_id": "1", "num_guests": "two"})))
            .is_err());
        assert!(spec
            .parameters
            .validate(&args(json!({"hotel_id": "1", "num_guests": 2.5})))
            .is_err());
        assert!(spec
            .parameters
            .validate(&args(json!({"hotel_id": "1", "num_guests": 2, "pets": true})))
            .is_err());
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = serde_json::to_value(Envelope::success(json!({"count": 0}))).unwrap();
        assert_eq!(ok, json!({"success": true, "result": {"count": 0}}));

        let err: Envelope = Err(Error::Unreachable("connection refused".into())).into();
        assert!(!err.success);
        assert!(err.is_retriable());
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error_kind"], "Unreachable");
        assert!(value["error"].as_str().unwrap().contains("connection refused"));
    }
}
