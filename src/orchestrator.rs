//! Conversation orchestrator: a bounded decide/dispatch loop per user input.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::conversation::{ConversationState, ToolCall};
use crate::dispatch::{DispatchRouter, ServiceStats};
use crate::error::{Error, Result};
use crate::oracle::{Decision, DecisionOracle};
use crate::registry::{CapabilityRegistry, RegisteredService};
use crate::transport::{Endpoint, ServiceTransport};

/// Shown to the user when the round limit is reached.
pub const EXHAUSTED_MESSAGE: &str = "I was unable to complete this request. \
    Please try rephrasing it or breaking it into smaller steps.";

/// Where the orchestrator is within a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Idle.
    AwaitingUserInput,
    /// Waiting on the oracle; `round` counts from 1.
    AwaitingOracleDecision { round: usize },
    /// Dispatching the calls of one decision.
    ExecutingTools,
    /// Appending the final answer.
    Responding,
}

/// Drives one conversation against the oracle and the resource services.
pub struct ConversationOrchestrator {
    router: DispatchRouter,
    oracle: Arc<dyn DecisionOracle>,
    state: ConversationState,
    phase: Phase,
    config: OrchestratorConfig,
}

impl ConversationOrchestrator {
    /// Create an orchestrator over an existing router.
    pub fn new(
        router: DispatchRouter,
        oracle: Arc<dyn DecisionOracle>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            router,
            oracle,
            state: ConversationState::new(),
            phase: Phase::AwaitingUserInput,
            config,
        }
    }

    /// Discover the configured endpoints and build an orchestrator over them.
    ///
    /// Unreachable services are recorded as offline; their operations are
    /// simply not offered.
    pub async fn connect(
        transport: Arc<dyn ServiceTransport>,
        oracle: Arc<dyn DecisionOracle>,
        config: OrchestratorConfig,
    ) -> Self {
        let registry =
            CapabilityRegistry::discover_all(transport.as_ref(), &config.endpoints).await;
        info!(
            configured = config.endpoints.len(),
            online = registry.online().count(),
            operations = registry.operations().len(),
            "orchestrator ready"
        );
        let router = DispatchRouter::new(registry, transport, config.request_timeout());
        Self::new(router, oracle, config)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Conversation so far.
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// The dispatch router.
    pub fn router(&self) -> &DispatchRouter {
        &self.router
    }

    /// Answer one user input.
    pub async fn respond(&mut self, input: impl Into<String>) -> Result<String> {
        self.respond_with_cancel(input, &CancellationToken::new()).await
    }

    /// Answer one user input, giving up between rounds once `cancel` fires.
    ///
    /// On oracle failure or cancellation the conversation is restored to
    /// what it was before `input`. On exhaustion the partial progress is
    /// kept and a final "unable to complete" turn is appended.
    pub async fn respond_with_cancel(
        &mut self,
        input: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mark = self.state.len();
        self.state.push_user(input);
        let operations = self.router.operations().await;

        for round in 1..=self.config.max_rounds {
            if cancel.is_cancelled() {
                return Err(self.abandon(mark, Error::Cancelled));
            }

            self.phase = Phase::AwaitingOracleDecision { round };
            debug!(round, turns = self.state.len(), "awaiting decision");
            let decision = tokio::select! {
                _ = cancel.cancelled() => Err(Error::Cancelled),
                decision = tokio::time::timeout(
                    self.config.oracle_timeout(),
                    self.oracle.decide(&self.state, &operations),
                ) => match decision {
                    Ok(decision) => decision,
                    Err(_) => Err(Error::Oracle(format!(
                        "no decision within {:?}",
                        self.config.oracle_timeout()
                    ))),
                },
            };

            let Decision { text, calls } = match decision {
                Ok(decision) => decision,
                Err(e) => return Err(self.abandon(mark, e)),
            };

            if calls.is_empty() {
                self.phase = Phase::Responding;
                let text = text.unwrap_or_default();
                self.state.push_final(text.clone());
                self.phase = Phase::AwaitingUserInput;
                info!(rounds = round, "request answered");
                return Ok(text);
            }

            let calls: Vec<ToolCall> = calls.into_iter().map(with_id).collect();
            self.phase = Phase::ExecutingTools;
            info!(
                round,
                calls = ?calls.iter().map(|c| c.operation.as_str()).collect::<Vec<_>>(),
                "executing tools"
            );
            self.state.push_calls(text, calls.clone());

            let envelopes = join_all(
                calls
                    .iter()
                    .map(|call| self.router.dispatch(&call.operation, call.arguments.clone())),
            )
            .await;

            if cancel.is_cancelled() {
                return Err(self.abandon(mark, Error::Cancelled));
            }
            for (call, envelope) in calls.iter().zip(envelopes) {
                self.state.push_tool_result(call, envelope);
            }
        }

        warn!(rounds = self.config.max_rounds, "round limit reached");
        self.phase = Phase::Responding;
        self.state.push_final(EXHAUSTED_MESSAGE);
        self.phase = Phase::AwaitingUserInput;
        Err(Error::OrchestrationExhausted {
            rounds: self.config.max_rounds,
        })
    }

    fn abandon(&mut self, mark: usize, error: Error) -> Error {
        warn!(error = %error, "request abandoned; conversation rolled back");
        self.state.rollback(mark);
        self.phase = Phase::AwaitingUserInput;
        error
    }

    /// Snapshot for display.
    pub async fn status(&self) -> OrchestratorStatus {
        let registry = self.router.registry();
        let services = registry.read().await.services().to_vec();
        OrchestratorStatus {
            services,
            stats: self.router.stats().await,
            turns: self.state.len(),
            phase: self.phase,
        }
    }
}

fn with_id(mut call: ToolCall) -> ToolCall {
    if call.id.is_empty() {
        call.id = format!("call_{}", Uuid::new_v4().simple());
    }
    call
}

/// Orchestrator status.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    /// Configured services and their discovery state.
    pub services: Vec<RegisteredService>,
    /// Dispatch statistics per service.
    pub stats: HashMap<Endpoint, ServiceStats>,
    /// Turns in the conversation.
    pub turns: usize,
    /// Current phase.
    pub phase: Phase,
}
