//! Oracle backed by an OpenAI-compatible chat completions API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{Decision, DecisionOracle};
use crate::config::OracleConfig;
use crate::conversation::{ConversationState, ToolCall, Turn};
use crate::error::{Error, Result};
use crate::protocol::OperationSpec;

/// Chat completions client that offers the discovered operations as tools.
pub struct OpenAiOracle {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    default_year: i32,
}

impl OpenAiOracle {
    /// Create an oracle. The API key is read from `config.api_key_env`.
    pub fn new(config: &OracleConfig, default_year: i32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("oracle client: {}", e)))?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            default_year,
        })
    }

    fn request(&self, state: &ConversationState, operations: &[OperationSpec]) -> ChatRequest {
        let mut messages = vec![json!({
            "role": "system",
            "content": system_prompt(self.default_year),
        })];
        messages.extend(state.turns().iter().map(message));

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: operations.iter().map(tool).collect(),
            temperature: self.temperature,
        }
    }
}

fn system_prompt(default_year: i32) -> String {
    format!(
        "You are a helpful travel assistant that can search for and book hotels and flights \
         through the tools provided.\n\
         \n\
         - Search before booking, and use the ids returned by searches.\n\
         - Confirm the guest or passenger name and email before making a booking.\n\
         - Write every date as YYYY-MM-DD. If the user gives a date without a year, use {}.\n\
         - When a tool reports an error, explain it to the user and suggest an alternative.\n\
         - When the user asks about a trip, consider suggesting both flights and hotels.",
        default_year
    )
}

fn message(turn: &Turn) -> Value {
    match turn {
        Turn::User { text } => json!({"role": "user", "content": text}),
        Turn::AssistantCalls { text, calls } => json!({
            "role": "assistant",
            "content": text,
            "tool_calls": calls
                .iter()
                .map(|call| json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.operation,
                        "arguments": Value::Object(call.arguments.clone()).to_string(),
                    },
                }))
                .collect::<Vec<_>>(),
        }),
        Turn::ToolResult {
            call_id, envelope, ..
        } => json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": serde_json::to_string(envelope).unwrap_or_default(),
        }),
        Turn::AssistantFinal { text } => json!({"role": "assistant", "content": text}),
    }
}

fn tool(spec: &OperationSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        },
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    /// Servers send either nothing or `null` when no tools are called.
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn decision(response: ChatResponse) -> Result<Decision> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| Error::Oracle("response has no choices".into()))?;

    let calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            Ok(ToolCall {
                // Missing ids are filled in by the orchestrator.
                id: call.id.unwrap_or_default(),
                arguments: arguments(&call.function.name, &call.function.arguments)?,
                operation: call.function.name,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let text = message.content.filter(|text| !text.trim().is_empty());
    if calls.is_empty() && text.is_none() {
        return Err(Error::Oracle("response has neither text nor tool calls".into()));
    }
    Ok(Decision { text, calls })
}

fn arguments(operation: &str, raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(Error::Oracle(format!(
            "arguments for {} are not an object: {}",
            operation, other
        ))),
        Err(e) => Err(Error::Oracle(format!("arguments for {}: {}", operation, e))),
    }
}

#[async_trait::async_trait]
impl DecisionOracle for OpenAiOracle {
    async fn decide(
        &self,
        state: &ConversationState,
        operations: &[OperationSpec],
    ) -> Result<Decision> {
        let body = self.request(state, operations);
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "requesting decision"
        );

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Oracle(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Oracle(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Oracle(format!("undecodable response: {}", e)))?;
        decision(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, ParameterType};

    fn oracle() -> OpenAiOracle {
        let config = OracleConfig {
            api_key_env: "ITINERARY_TEST_UNSET_KEY".into(),
            ..OracleConfig::default()
        };
        OpenAiOracle::new(&config, 2031, Duration::from_secs(5)).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn parse(value: Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_carries_year_turns_and_tools() {
        let mut state = ConversationState::new();
        state.push_user("hotels in Chicago on 12-20?");
        let call = ToolCall::new("search_hotels", args(json!({"location": "Chicago"})));
        state.push_calls(None, vec![call.clone()]);
        state.push_tool_result(&call, Envelope::success(json!({"count": 2})));
        state.push_final("Two hotels.");

        let ops = vec![OperationSpec::new("search_hotels", "Search hotels").required(
            "location",
            ParameterType::String,
            "City",
        )];
        let request = oracle().request(&state, &ops);

        assert_eq!(request.messages.len(), 5);
        assert!(request.messages[0]["content"].as_str().unwrap().contains("2031"));
        assert_eq!(request.messages[2]["tool_calls"][0]["id"], call.id.as_str());
        assert_eq!(
            request.messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"location":"Chicago"}"#
        );
        assert_eq!(request.messages[3]["role"], "tool");
        assert_eq!(request.messages[3]["tool_call_id"], call.id.as_str());

        let function = &request.tools[0]["function"];
        assert_eq!(function["name"], "search_hotels");
        assert_eq!(function["parameters"]["type"], "object");
        assert_eq!(function["parameters"]["required"][0], "location");
    }

    #[test]
    fn test_url_joins_base() {
        let config = OracleConfig {
            base_url: "http://localhost:11434/v1/".into(),
            ..OracleConfig::default()
        };
        let oracle = OpenAiOracle::new(&config, 2031, Duration::from_secs(5)).unwrap();
        assert_eq!(oracle.url, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_tool_calls_become_decision() {
        let decision = decision(parse(json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {
                         "name": "search_hotels",
                         "arguments": "{\"location\":\"Chicago\"}"
                     }},
                    {"type": "function",
                     "function": {"name": "search_flights", "arguments": ""}}
                ]
            }}]
        })))
        .unwrap();

        assert!(!decision.is_final());
        assert_eq!(decision.calls[0].id, "call_1");
        assert_eq!(decision.calls[0].arguments["location"], "Chicago");
        assert!(decision.calls[1].id.is_empty());
        assert!(decision.calls[1].arguments.is_empty());
    }

    #[test]
    fn test_text_only_is_final() {
        let decision = decision(parse(json!({
            "choices": [{"message": {"content": "Have a good trip!"}}]
        })))
        .unwrap();
        assert!(decision.is_final());
        assert_eq!(decision.text.as_deref(), Some("Have a good trip!"));
    }

    #[test]
    fn test_null_tool_calls_is_final_answer() {
        let raw = r#"{"choices":[{"message":{
            "role":"assistant","content":"Hi there","tool_calls":null
        }}]}"#;
        let decision = decision(serde_json::from_str(raw).unwrap()).unwrap();
        assert!(decision.is_final());
        assert_eq!(decision.text.as_deref(), Some("Hi there"));
    }

    #[test]
    fn test_malformed_decisions_are_oracle_errors() {
        assert!(decision(parse(json!({"choices": []}))).is_err());
        assert!(decision(parse(json!({"choices": [{"message": {"content": ""}}]}))).is_err());
        let bad_args = parse(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "c", "function": {"name": "search_hotels", "arguments": "[1,2]"}}
            ]}}]
        }));
        assert!(matches!(decision(bad_args), Err(Error::Oracle(_))));
    }
}
