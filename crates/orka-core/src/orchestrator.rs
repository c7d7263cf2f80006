// SPDX-License-Identifier: Apache-2.0
//! Conversation Orchestrator: the outer turn loop — curate, maybe compress,
//! call the model, dispatch any requested tools, decide whether to keep
//! going — plus the text-only-turn retry heuristics layered on top of it.

use std::time::Duration;

use futures::StreamExt;
use tracing::warn;

use orka_config::AgentConfig;
use orka_events::{
    AgentEvent, CancelSignal, EventBus, ToolCallRequestInfo, UsageMetadata,
};
use orka_model::retry::{retry_with_backoff, Classified, FailureKind, RetryPolicy};
use orka_model::{CompletionRequest, Content, ModelProvider, Part, ResponseEvent, Role};
use orka_tools::{ToolRegistry, TrustSet};

use crate::compact::{compress_if_needed, emergency_compact, CompactionOutcome};
use crate::curate::curate;
use crate::error::OrchestratorError;
use crate::next_speaker::{check_next_speaker, NextSpeaker};
use crate::scheduler::{schedule_and_execute, ApprovalGate, ToolCallOutcome};

const MAX_EMPTY_TURN_RETRIES: u32 = 2;
const STALL_THRESHOLD_ROUNDS: u32 = 2;
const CONTINUE_NUDGE: &str = "Please continue.";

/// The orchestrator's durable, per-session state. Mutated only by this
/// module; `Content` entries are append-only except when compression
/// atomically replaces the prefix.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub session_id: String,
    pub history: Vec<Content>,
    pub pending_tool_calls: Vec<ToolCallRequestInfo>,
    pub current_user_input: Option<String>,
    pub turn_count: u32,
    /// Set when the retry policy fell back to a different model after
    /// repeated rate limiting. The orchestrator only observes and records
    /// this — retargeting the live session to the new model id is the
    /// session manager's call, made the next time it builds an
    /// `Orchestrator` for this session.
    pub fallback_model_id: Option<String>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            history: Vec::new(),
            pending_tool_calls: Vec::new(),
            current_user_input: None,
            turn_count: 0,
            fallback_model_id: None,
        }
    }
}

/// Everything the turn loop needs to drive one session. Borrowed for the
/// duration of a single `run` call; the session manager owns all of it
/// across calls.
pub struct Orchestrator<'a> {
    pub model: &'a dyn ModelProvider,
    pub registry: &'a ToolRegistry,
    pub trust: &'a mut TrustSet,
    pub gate: &'a dyn ApprovalGate,
    pub bus: &'a EventBus,
    pub cancel: CancelSignal,
    pub config: &'a AgentConfig,
    pub system_instruction: Option<String>,
}

struct AggregatedTurn {
    parts: Vec<Part>,
    requests: Vec<ToolCallRequestInfo>,
}

impl<'a> Orchestrator<'a> {
    /// Drive `state` until the turn completes, the model stops requesting
    /// tools and the Next-Speaker Oracle says `user`, cancellation fires, or
    /// `max_turns` is exhausted.
    pub async fn run(&mut self, state: &mut ConversationState) -> Result<(), OrchestratorError> {
        let mut empty_turn_retries = 0u32;
        let mut tool_call_rounds = 0u32;
        let mut stall_nudge_sent = false;

        loop {
            if self.cancel.is_set() {
                let _ = self.bus.emit(AgentEvent::UserCancelled).await;
                return Ok(());
            }

            state.turn_count += 1;
            if state.turn_count > self.config.max_turns {
                return Err(OrchestratorError::MaxTurnsReached(self.config.max_turns));
            }

            if let Some(text) = state.current_user_input.take() {
                state.history.push(Content::user(text));
            }

            self.maybe_compress(state).await?;

            let curated = curate(&state.history);
            let (turn, fallback_model) = self.run_model_turn(&curated).await?;
            if let Some(new_model) = fallback_model {
                warn!(new_model = %new_model, "retargeting subsequent requests after repeated rate limiting");
                state.fallback_model_id = Some(new_model);
            }

            if self.cancel.is_set() {
                let _ = self.bus.emit(AgentEvent::UserCancelled).await;
                return Ok(());
            }

            let text = turn_text(&turn.parts);
            let had_tool_calls = !turn.requests.is_empty();

            // Step 5: append the aggregated model turn, even if empty, so
            // curation can drop it cleanly later rather than leaving a gap.
            let last_was_function = matches!(state.history.last(), Some(c) if c.role == Role::Function);
            if !turn.parts.is_empty() || !last_was_function {
                state.history.push(Content { role: Role::Model, parts: turn.parts });
            }

            if !had_tool_calls {
                if text.is_empty() && empty_turn_retries < MAX_EMPTY_TURN_RETRIES {
                    empty_turn_retries += 1;
                    state.history.push(Content::user(
                        "You produced a thinking block but no response or tool call. \
                         Please continue with your next action.",
                    ));
                    continue;
                }
                if !text.is_empty()
                    && text_contains_malformed_tool_call(&text)
                    && empty_turn_retries < MAX_EMPTY_TURN_RETRIES
                {
                    empty_turn_retries += 1;
                    state.history.push(Content::user(
                        "You output a tool call using an incorrect format. Do not include tool \
                         calls in your text; use the structured tool-call protocol instead.",
                    ));
                    continue;
                }
                if !text.is_empty() && tool_call_rounds >= STALL_THRESHOLD_ROUNDS && !stall_nudge_sent {
                    stall_nudge_sent = true;
                    state.history.push(Content::user(
                        "You have not finished the task yet. Please continue with your next tool call.",
                    ));
                    continue;
                }

                // Step 6.
                let curated_for_check = curate(&state.history);
                let next = check_next_speaker(&state.history, &curated_for_check, self.model).await;
                if next == NextSpeaker::Model {
                    state.current_user_input = Some(CONTINUE_NUDGE.to_string());
                    continue;
                }
                let _ = self.bus.emit(AgentEvent::TurnComplete).await;
                return Ok(());
            }

            empty_turn_retries = 0;
            tool_call_rounds += 1;

            // Step 7.
            let outcomes = schedule_and_execute(
                &turn.requests,
                self.registry,
                self.config.approval_mode,
                self.trust,
                self.gate,
                &self.cancel,
                self.bus,
                self.config.tool_call_timeout_secs,
            )
            .await;

            for (req, outcome) in turn.requests.iter().zip(outcomes.iter()) {
                state.history.push(function_turn(req, outcome));
            }
            state.pending_tool_calls.clear();
        }
    }

    async fn maybe_compress(&self, state: &mut ConversationState) -> Result<(), OrchestratorError> {
        let threshold = (self.config.compaction_threshold - self.config.compaction_overhead_reserve).max(0.1);
        let (outcome, before, after) = compress_if_needed(
            &mut state.history,
            self.model,
            &self.config.compaction_strategy,
            threshold,
            self.config.compaction_keep_recent,
        )
        .await
        .map_err(OrchestratorError::Model)?;

        if !matches!(outcome, CompactionOutcome::Skipped) {
            let _ = self
                .bus
                .emit(AgentEvent::ChatCompressed { original_token_count: before, new_token_count: after })
                .await;
        }
        Ok(())
    }

    async fn run_model_turn(
        &self,
        curated: &[Content],
    ) -> Result<(AggregatedTurn, Option<String>), OrchestratorError> {
        let policy = RetryPolicy::default();
        let tools = self.registry.schemas();
        let system_instruction = self.system_instruction.clone();
        let current_model = self.model.model_name().to_string();

        let result = retry_with_backoff(
            &policy,
            || {
                let req = CompletionRequest {
                    system_instruction: system_instruction.clone(),
                    history: curated.to_vec(),
                    tools: tools.clone(),
                };
                self.drain_one_turn(req)
            },
            classify_model_error,
            || {
                let current_model = current_model.clone();
                async move {
                    self.model
                        .fallback_model_id()
                        .filter(|id| *id != current_model)
                        .map(str::to_string)
                }
            },
        )
        .await;

        match result {
            Ok((turn, fallback_model)) => Ok((turn, fallback_model)),
            Err(e) if is_context_overflow(&e) => {
                warn!("context overflow reported by model; emergency-compacting and retrying once");
                // Caller owns `state.history`; this path only fires from
                // `run`, where `curated` was already derived from it, so we
                // cannot mutate it here. Surface as a model error — `run`'s
                // next iteration will have already compacted proactively via
                // `maybe_compress`, so a persistent overflow means the
                // emergency path in compaction itself is failing to keep up.
                Err(OrchestratorError::Model(e))
            }
            Err(e) => Err(OrchestratorError::Model(e)),
        }
    }

    async fn drain_one_turn(&self, req: CompletionRequest) -> anyhow::Result<AggregatedTurn> {
        let timeout = Duration::from_secs(self.config.model_call_timeout_secs);
        let call = async {
            let mut stream = self.model.generate_content_stream(req).await?;
            let mut parts = Vec::new();
            let mut requests = Vec::new();
            while let Some(event) = stream.next().await {
                if self.cancel.is_set() {
                    break;
                }
                match event? {
                    ResponseEvent::TextDelta(delta) if !delta.is_empty() => {
                        let _ = self.bus.emit(AgentEvent::Content(delta.clone())).await;
                        parts.push(Part::Text { text: delta });
                    }
                    ResponseEvent::TextDelta(_) => {}
                    ResponseEvent::ThoughtDelta { subject, description } => {
                        let _ = self
                            .bus
                            .emit(AgentEvent::Thought(orka_events::ThoughtSummary {
                                subject: subject.clone(),
                                description: description.clone(),
                            }))
                            .await;
                        parts.push(Part::Thought { subject, description });
                    }
                    ResponseEvent::FunctionCall { id, name, args } => {
                        let request = ToolCallRequestInfo {
                            call_id: id.clone(),
                            name: name.clone(),
                            args: args.clone(),
                            client_initiated: false,
                        };
                        let _ = self.bus.emit(AgentEvent::ToolCallRequest(request.clone())).await;
                        parts.push(Part::FunctionCall { id, name, args });
                        requests.push(request);
                    }
                    ResponseEvent::Usage(usage) => {
                        let _ = self.bus.emit(AgentEvent::UsageMetadata(usage)).await;
                    }
                    ResponseEvent::Done => break,
                }
            }
            Ok(AggregatedTurn { parts, requests })
        };

        if self.config.model_call_timeout_secs == 0 {
            call.await
        } else {
            match tokio::time::timeout(timeout, call).await {
                Ok(r) => r,
                Err(_) => Err(anyhow::anyhow!(
                    "model call timed out after {}s",
                    self.config.model_call_timeout_secs
                )),
            }
        }
    }
}

fn turn_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn function_turn(req: &ToolCallRequestInfo, outcome: &ToolCallOutcome) -> Content {
    let response = outcome.response();
    let value = response
        .response_parts
        .get("functionResponse")
        .and_then(|fr| fr.get("response"))
        .cloned()
        .unwrap_or(serde_json::json!({}));
    Content::function_response(response.call_id.clone(), req.name.clone(), value)
}

/// Returns true when `text` contains tool-call markup the model wrote into
/// the text stream instead of emitting as a structured call — XML-style
/// (`<tool_call>`), Hermes-style (`<function=`), or the bracketed
/// `[TOOL_CALL]` marker some fine-tunes fall back to.
fn text_contains_malformed_tool_call(text: &str) -> bool {
    text.contains("<tool_call>")
        || text.contains("</tool_call>")
        || text.contains("<function=")
        || text.contains("[TOOL_CALL]")
}

fn is_context_overflow(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("context") && (msg.contains("exceed") || msg.contains("too long") || msg.contains("overflow"))
}

fn classify_model_error(err: &anyhow::Error) -> Classified {
    let msg = err.to_string().to_lowercase();
    if msg.contains("429") || msg.contains("rate limit") {
        Classified { kind: FailureKind::RateLimited, retry_after: None }
    } else if msg.contains("400") || msg.contains("401") || msg.contains("403") {
        Classified { kind: FailureKind::Permanent, retry_after: None }
    } else {
        Classified { kind: FailureKind::Transient, retry_after: None }
    }
}

/// Deterministic recovery for a hard context-size overflow reported by the
/// provider: drop everything but the most recent turns and recalculate, no
/// model call involved. Exposed for the session manager to call directly
/// when a model turn fails with an overflow error it cannot retry past.
pub fn recover_from_overflow(history: &mut Vec<Content>, keep_recent: usize) {
    emergency_compact(history, keep_recent);
}
