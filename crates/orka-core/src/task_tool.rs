// SPDX-License-Identifier: Apache-2.0
//! The `task` tool: spawns a nested orchestrator to complete a focused
//! sub-task and returns its final text output, bounded to a fixed nesting
//! depth so a model can't recurse indefinitely.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use orka_config::AgentConfig;
use orka_events::{CancelSignal, EventBus};
use orka_model::ModelProvider;
use orka_tools::{LiveOutputCb, OutputCategory, Tool, ToolRegistry, ToolResult, TrustSet};

use crate::orchestrator::{ConversationState, Orchestrator};
use crate::scheduler::ApprovalGate;

const MAX_DEPTH: usize = 3;

pub struct TaskTool {
    model: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    config: Arc<AgentConfig>,
    gate: Arc<dyn ApprovalGate>,
    depth: Arc<AtomicUsize>,
}

impl TaskTool {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
        config: Arc<AgentConfig>,
        gate: Arc<dyn ApprovalGate>,
        depth: Arc<AtomicUsize>,
    ) -> Self {
        Self { model, registry, config, gate, depth }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Spawn a sub-agent to complete a focused task and return its final text output. \
         Useful for delegating an isolated sub-task that would otherwise clutter the main \
         conversation. The sub-agent has access to the same tool registry. Maximum nesting \
         depth is 3."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The task description for the sub-agent"
                },
                "max_turns": {
                    "type": "integer",
                    "description": "Maximum turn-loop iterations for the sub-agent (default: from config)"
                }
            },
            "required": ["prompt"]
        })
    }

    fn validate_params(&self, args: &Value) -> Option<String> {
        match args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) if !p.trim().is_empty() => None,
            _ => Some("missing or empty 'prompt'".to_string()),
        }
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(
        &self,
        args: &Value,
        cancel: CancelSignal,
        _live_output: Option<LiveOutputCb>,
    ) -> Result<ToolResult, String> {
        let prompt = args
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'prompt'".to_string())?
            .to_string();

        let current_depth = self.depth.load(Ordering::Relaxed);
        if current_depth >= MAX_DEPTH {
            return Err(format!("maximum sub-agent depth ({MAX_DEPTH}) reached"));
        }

        self.depth.fetch_add(1, Ordering::Relaxed);
        let result = self.run_sub_agent(prompt, args, cancel).await;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        result
    }
}

impl TaskTool {
    async fn run_sub_agent(
        &self,
        prompt: String,
        args: &Value,
        cancel: CancelSignal,
    ) -> Result<ToolResult, String> {
        let mut sub_config = (*self.config).clone();
        if let Some(max_turns) = args.get("max_turns").and_then(|v| v.as_u64()) {
            sub_config.max_turns = max_turns as u32;
        }

        let mut trust = TrustSet::new();
        let (bus, mut rx) = EventBus::new();
        let mut orch = Orchestrator {
            model: self.model.as_ref(),
            registry: self.registry.as_ref(),
            trust: &mut trust,
            gate: self.gate.as_ref(),
            bus: &bus,
            cancel,
            config: &sub_config,
            system_instruction: None,
        };

        let mut state = ConversationState::new(uuid::Uuid::new_v4().to_string());
        state.current_user_input = Some(prompt);

        let run_result = orch.run(&mut state).await;
        drop(orch);
        drop(bus);

        let mut output = String::new();
        while let Ok(event) = rx.try_recv() {
            if let orka_events::AgentEvent::Content(delta) = event {
                output.push_str(&delta);
            }
        }

        match run_result {
            Ok(()) => {
                if output.is_empty() {
                    Ok(ToolResult::text("(sub-agent produced no text output)"))
                } else {
                    Ok(ToolResult::text(output))
                }
            }
            Err(e) => Err(format!("sub-agent error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orka_config::{ApprovalMode, CompactionStrategy};
    use orka_events::{ConfirmationDetails, ConfirmationOutcome, ToolCallRequestInfo};
    use orka_model::ScriptedMockProvider;

    struct AlwaysApprove;
    #[async_trait]
    impl ApprovalGate for AlwaysApprove {
        async fn confirm(&self, _: &ToolCallRequestInfo, _: &ConfirmationDetails) -> ConfirmationOutcome {
            ConfirmationOutcome::Approve
        }
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            approval_mode: ApprovalMode::Yolo,
            max_turns: 5,
            compaction_threshold: 0.85,
            compaction_keep_recent: 6,
            compaction_strategy: CompactionStrategy::Narrative,
            tool_result_token_cap: 4000,
            compaction_overhead_reserve: 0.10,
            system_prompt: None,
            model_call_timeout_secs: 30,
            tool_call_timeout_secs: 30,
        }
    }

    fn tool() -> TaskTool {
        TaskTool::new(
            Arc::new(ScriptedMockProvider::always_text("sub-agent result text")),
            Arc::new(ToolRegistry::new()),
            Arc::new(test_config()),
            Arc::new(AlwaysApprove),
            Arc::new(AtomicUsize::new(0)),
        )
    }

    #[tokio::test]
    async fn runs_a_sub_agent_and_returns_its_text() {
        let t = tool();
        let result = t
            .execute(&json!({"prompt": "summarize the repo"}), CancelSignal::new(), None)
            .await
            .unwrap();
        assert!(result.display_result.contains("sub-agent result text"));
    }

    #[tokio::test]
    async fn missing_prompt_is_rejected_by_validation() {
        let t = tool();
        assert!(t.validate_params(&json!({})).is_some());
    }

    #[tokio::test]
    async fn depth_limit_is_enforced() {
        let t = tool();
        t.depth.store(MAX_DEPTH, Ordering::Relaxed);
        let result = t.execute(&json!({"prompt": "go"}), CancelSignal::new(), None).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("maximum sub-agent depth"));
    }

    #[tokio::test]
    async fn depth_counter_is_restored_after_completion() {
        let t = tool();
        t.execute(&json!({"prompt": "go"}), CancelSignal::new(), None).await.unwrap();
        assert_eq!(t.depth.load(Ordering::Relaxed), 0);
    }
}
