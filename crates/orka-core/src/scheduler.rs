// SPDX-License-Identifier: Apache-2.0
//! Tool Scheduler: validates, gates, and executes the tool calls a model
//! turn requested, driving each through
//! `validating -> {error | scheduled | awaiting_approval} -> ... ->
//! {success | error | cancelled}`.
//!
//! Calls that need confirmation suspend on an [`ApprovalGate`] rather than
//! blocking the whole batch — the caller decides how that confirmation is
//! actually collected (a CLI prompt, a round trip to a front-end, ...).
//! Everything already scheduled or trusted runs concurrently once the
//! approval phase settles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;

use orka_config::ApprovalMode;
use orka_events::{
    AgentEvent, CancelSignal, ConfirmationDetails, ConfirmationOutcome, EventBus,
    ToolCallRequestInfo, ToolCallResponseInfo,
};
use orka_tools::{Tool, ToolRegistry, TrustSet};

/// How a suspended call's confirmation is actually collected. The session
/// manager supplies the real implementation (wired to the front-end); tests
/// use a canned one.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn confirm(
        &self,
        request: &ToolCallRequestInfo,
        details: &ConfirmationDetails,
    ) -> ConfirmationOutcome;
}

/// Terminal outcome for one requested call, in request order.
#[derive(Debug, Clone)]
pub enum ToolCallOutcome {
    Success(ToolCallResponseInfo),
    Error(ToolCallResponseInfo),
    Cancelled(ToolCallResponseInfo),
}

impl ToolCallOutcome {
    pub fn response(&self) -> &ToolCallResponseInfo {
        match self {
            ToolCallOutcome::Success(r) | ToolCallOutcome::Error(r) | ToolCallOutcome::Cancelled(r) => r,
        }
    }
}

fn error_response(call_id: &str, name: &str, message: String) -> ToolCallResponseInfo {
    ToolCallResponseInfo {
        call_id: call_id.to_string(),
        response_parts: function_response_value(call_id, name, serde_json::json!({"error": message})),
        display_result: message.clone(),
        error: Some(message),
    }
}

fn cancelled_response(call_id: &str, name: &str) -> ToolCallResponseInfo {
    let message = "User cancelled tool call.".to_string();
    ToolCallResponseInfo {
        call_id: call_id.to_string(),
        response_parts: function_response_value(call_id, name, serde_json::json!({"error": message})),
        display_result: message.clone(),
        error: Some(message),
    }
}

fn function_response_value(call_id: &str, name: &str, response: Value) -> Value {
    serde_json::json!({
        "functionResponse": { "id": call_id, "name": name, "response": response }
    })
}

enum Gated {
    Scheduled(ToolCallRequestInfo, Arc<dyn Tool>),
    Settled(ToolCallOutcome),
}

/// Run `requests` through validation, approval, and (for everything that
/// survives) concurrent execution, returning one outcome per request in the
/// original order.
#[allow(clippy::too_many_arguments)]
pub async fn schedule_and_execute(
    requests: &[ToolCallRequestInfo],
    registry: &ToolRegistry,
    approval_mode: ApprovalMode,
    trust: &mut TrustSet,
    gate: &dyn ApprovalGate,
    cancel: &CancelSignal,
    bus: &EventBus,
    call_timeout_secs: u64,
) -> Vec<ToolCallOutcome> {
    let mut gated = Vec::with_capacity(requests.len());
    for req in requests {
        gated.push(validate_and_gate(req, registry, approval_mode, trust, gate, cancel, bus).await);
    }

    let mut to_execute: Vec<(usize, ToolCallRequestInfo, Arc<dyn Tool>)> = Vec::new();
    let mut outcomes: Vec<Option<ToolCallOutcome>> = Vec::with_capacity(gated.len());
    for (idx, g) in gated.into_iter().enumerate() {
        match g {
            Gated::Scheduled(req, tool) => {
                to_execute.push((idx, req, tool));
                outcomes.push(None);
            }
            Gated::Settled(outcome) => outcomes.push(Some(outcome)),
        }
    }

    let executions = to_execute.into_iter().map(|(idx, req, tool)| {
        let cancel = cancel.clone();
        async move {
            let outcome = execute_one(&req, tool.as_ref(), cancel, call_timeout_secs).await;
            (idx, outcome)
        }
    });

    for (idx, outcome) in join_all(executions).await {
        let _ = bus
            .emit(AgentEvent::ToolCallResponse(outcome.response().clone()))
            .await;
        outcomes[idx] = Some(outcome);
    }

    outcomes.into_iter().map(|o| o.expect("every index is filled exactly once")).collect()
}

async fn validate_and_gate(
    req: &ToolCallRequestInfo,
    registry: &ToolRegistry,
    approval_mode: ApprovalMode,
    trust: &mut TrustSet,
    gate: &dyn ApprovalGate,
    cancel: &CancelSignal,
    bus: &EventBus,
) -> Gated {
    let Some(tool) = registry.get(&req.name) else {
        return Gated::Settled(ToolCallOutcome::Error(error_response(
            &req.call_id,
            &req.name,
            format!("tool '{}' not found in registry", req.name),
        )));
    };

    if cancel.is_set() {
        return Gated::Settled(ToolCallOutcome::Cancelled(cancelled_response(&req.call_id, &req.name)));
    }

    if let Some(reason) = tool.validate_params(&req.args) {
        return Gated::Settled(ToolCallOutcome::Error(error_response(&req.call_id, &req.name, reason)));
    }

    if approval_mode == ApprovalMode::Yolo {
        return Gated::Scheduled(req.clone(), tool);
    }

    let Some(details) = tool.should_confirm(&req.args) else {
        return Gated::Scheduled(req.clone(), tool);
    };

    if trust.is_trusted(&req.name, &req.name) {
        return Gated::Scheduled(req.clone(), tool);
    }

    let _ = bus
        .emit(AgentEvent::ToolCallConfirmation { request: req.clone(), details: details.clone() })
        .await;

    match gate.confirm(req, &details).await {
        ConfirmationOutcome::Approve => Gated::Scheduled(req.clone(), tool),
        ConfirmationOutcome::ModifyWithEditor(args) => {
            let mut req = req.clone();
            req.args = args;
            Gated::Scheduled(req, tool)
        }
        ConfirmationOutcome::Cancel => {
            Gated::Settled(ToolCallOutcome::Cancelled(cancelled_response(&req.call_id, &req.name)))
        }
    }
}

async fn execute_one(
    req: &ToolCallRequestInfo,
    tool: &dyn Tool,
    cancel: CancelSignal,
    timeout_secs: u64,
) -> ToolCallOutcome {
    if cancel.is_set() {
        return ToolCallOutcome::Cancelled(cancelled_response(&req.call_id, &req.name));
    }

    let call = tool.execute(&req.args, cancel.clone(), None);
    let result = if timeout_secs == 0 {
        call.await
    } else {
        match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
            Ok(r) => r,
            Err(_) => {
                return ToolCallOutcome::Error(error_response(
                    &req.call_id,
                    &req.name,
                    format!("tool call timed out after {timeout_secs}s"),
                ));
            }
        }
    };

    match result {
        Ok(tool_result) => {
            let response = ToolCallResponseInfo {
                call_id: req.call_id.clone(),
                response_parts: function_response_value(
                    &req.call_id,
                    &req.name,
                    tool_result.llm_content,
                ),
                display_result: tool_result.display_result,
                error: None,
            };
            ToolCallOutcome::Success(response)
        }
        Err(message) => ToolCallOutcome::Error(error_response(&req.call_id, &req.name, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orka_tools::{LiveOutputCb, Tool, ToolResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool;
    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes args"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            args: &Value,
            _cancel: CancelSignal,
            _live_output: Option<LiveOutputCb>,
        ) -> Result<ToolResult, String> {
            Ok(ToolResult::text(format!("echo:{args}")))
        }
    }

    struct ConfirmTool;
    #[async_trait]
    impl Tool for ConfirmTool {
        fn name(&self) -> &str {
            "needs_confirm"
        }
        fn description(&self) -> &str {
            "always asks"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn should_confirm(&self, _args: &Value) -> Option<ConfirmationDetails> {
            Some(ConfirmationDetails::Exec { command: "run".into() })
        }
        async fn execute(
            &self,
            args: &Value,
            _cancel: CancelSignal,
            _live_output: Option<LiveOutputCb>,
        ) -> Result<ToolResult, String> {
            Ok(ToolResult::text(format!("ran:{args}")))
        }
    }

    struct FailingTool;
    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            _args: &Value,
            _cancel: CancelSignal,
            _live_output: Option<LiveOutputCb>,
        ) -> Result<ToolResult, String> {
            Err("boom failed".to_string())
        }
    }

    struct SlowTool;
    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            _args: &Value,
            _cancel: CancelSignal,
            _live_output: Option<LiveOutputCb>,
        ) -> Result<ToolResult, String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolResult::text("too late"))
        }
    }

    struct ApproveGate;
    #[async_trait]
    impl ApprovalGate for ApproveGate {
        async fn confirm(&self, _: &ToolCallRequestInfo, _: &ConfirmationDetails) -> ConfirmationOutcome {
            ConfirmationOutcome::Approve
        }
    }

    struct DenyGate;
    #[async_trait]
    impl ApprovalGate for DenyGate {
        async fn confirm(&self, _: &ToolCallRequestInfo, _: &ConfirmationDetails) -> ConfirmationOutcome {
            ConfirmationOutcome::Cancel
        }
    }

    struct ModifyGate(Value);
    #[async_trait]
    impl ApprovalGate for ModifyGate {
        async fn confirm(&self, _: &ToolCallRequestInfo, _: &ConfirmationDetails) -> ConfirmationOutcome {
            ConfirmationOutcome::ModifyWithEditor(self.0.clone())
        }
    }

    struct CountingGate(AtomicUsize);
    #[async_trait]
    impl ApprovalGate for CountingGate {
        async fn confirm(&self, _: &ToolCallRequestInfo, _: &ConfirmationDetails) -> ConfirmationOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            ConfirmationOutcome::Approve
        }
    }

    fn req(name: &str, id: &str) -> ToolCallRequestInfo {
        ToolCallRequestInfo {
            call_id: id.to_string(),
            name: name.to_string(),
            args: serde_json::json!({}),
            client_initiated: false,
        }
    }

    fn registry_with(tools: Vec<Box<dyn Tool>>) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        for t in tools {
            reg.register_arc(Arc::from(t));
        }
        reg
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_outcome() {
        let reg = ToolRegistry::new();
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("nope", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &ApproveGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Error(_)));
    }

    #[tokio::test]
    async fn tool_with_no_confirmation_runs_immediately() {
        let reg = registry_with(vec![Box::new(EchoTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("echo", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &DenyGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Success(_)));
    }

    #[tokio::test]
    async fn yolo_mode_skips_confirmation_entirely() {
        let reg = registry_with(vec![Box::new(ConfirmTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("needs_confirm", "c1")],
            &reg,
            ApprovalMode::Yolo,
            &mut trust,
            &DenyGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Success(_)));
    }

    #[tokio::test]
    async fn approved_confirmation_runs_the_tool() {
        let reg = registry_with(vec![Box::new(ConfirmTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("needs_confirm", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &ApproveGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Success(_)));
    }

    #[tokio::test]
    async fn modify_with_editor_substitutes_args_before_execution() {
        let reg = registry_with(vec![Box::new(ConfirmTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let gate = ModifyGate(serde_json::json!({"edited": true}));
        let outcomes = schedule_and_execute(
            &[req("needs_confirm", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &gate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        match &outcomes[0] {
            ToolCallOutcome::Success(r) => {
                assert!(r.display_result.contains("edited"));
            }
            _ => panic!("expected Success outcome"),
        }
    }

    #[tokio::test]
    async fn denied_confirmation_cancels_without_running() {
        let reg = registry_with(vec![Box::new(ConfirmTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("needs_confirm", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &DenyGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Cancelled(_)));
    }

    #[tokio::test]
    async fn trusted_tool_skips_the_gate() {
        let reg = registry_with(vec![Box::new(ConfirmTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        trust.trust_tool("needs_confirm", "needs_confirm");
        let gate = CountingGate(AtomicUsize::new(0));
        let outcomes = schedule_and_execute(
            &[req("needs_confirm", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &gate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Success(_)));
        assert_eq!(gate.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn already_cancelled_session_settles_without_running() {
        let reg = registry_with(vec![Box::new(EchoTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let cancel = CancelSignal::new();
        cancel.set();
        let outcomes = schedule_and_execute(
            &[req("echo", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &ApproveGate,
            &cancel,
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Cancelled(_)));
    }

    #[tokio::test]
    async fn tool_execution_error_is_surfaced() {
        let reg = registry_with(vec![Box::new(FailingTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("boom", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &ApproveGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        match &outcomes[0] {
            ToolCallOutcome::Error(r) => assert!(r.error.as_deref().unwrap().contains("boom failed")),
            _ => panic!("expected Error outcome"),
        }
    }

    #[tokio::test]
    async fn timeout_surfaces_as_error() {
        let reg = registry_with(vec![Box::new(SlowTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("slow", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &ApproveGate,
            &CancelSignal::new(),
            &bus,
            1,
        )
        .await;
        match &outcomes[0] {
            ToolCallOutcome::Error(r) => assert!(r.error.as_deref().unwrap().contains("timed out")),
            _ => panic!("expected Error outcome"),
        }
    }

    #[tokio::test]
    async fn multiple_calls_run_concurrently_and_preserve_order() {
        let reg = registry_with(vec![Box::new(EchoTool), Box::new(FailingTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let outcomes = schedule_and_execute(
            &[req("echo", "c1"), req("boom", "c2"), req("echo", "c3")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &ApproveGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], ToolCallOutcome::Success(_)));
        assert!(matches!(outcomes[1], ToolCallOutcome::Error(_)));
        assert!(matches!(outcomes[2], ToolCallOutcome::Success(_)));
        assert_eq!(outcomes[0].response().call_id, "c1");
        assert_eq!(outcomes[1].response().call_id, "c2");
        assert_eq!(outcomes[2].response().call_id, "c3");
    }

    #[tokio::test]
    async fn invalid_params_short_circuits_before_confirmation() {
        struct PickyTool;
        #[async_trait]
        impl Tool for PickyTool {
            fn name(&self) -> &str {
                "picky"
            }
            fn description(&self) -> &str {
                "rejects empty args"
            }
            fn schema(&self) -> Value {
                serde_json::json!({"type": "object"})
            }
            fn validate_params(&self, args: &Value) -> Option<String> {
                if args.as_object().map(|o| o.is_empty()).unwrap_or(true) {
                    Some("missing required field".to_string())
                } else {
                    None
                }
            }
            fn should_confirm(&self, _args: &Value) -> Option<ConfirmationDetails> {
                Some(ConfirmationDetails::Exec { command: "run".into() })
            }
            async fn execute(
                &self,
                _args: &Value,
                _cancel: CancelSignal,
                _live_output: Option<LiveOutputCb>,
            ) -> Result<ToolResult, String> {
                Ok(ToolResult::text("ran"))
            }
        }

        let reg = registry_with(vec![Box::new(PickyTool)]);
        let (bus, _rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let gate = CountingGate(AtomicUsize::new(0));
        let outcomes = schedule_and_execute(
            &[req("picky", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &gate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;
        assert!(matches!(outcomes[0], ToolCallOutcome::Error(_)));
        assert_eq!(gate.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confirmation_event_is_emitted_on_the_bus() {
        let reg = registry_with(vec![Box::new(ConfirmTool)]);
        let (bus, mut rx) = EventBus::new();
        let mut trust = TrustSet::new();
        let _ = schedule_and_execute(
            &[req("needs_confirm", "c1")],
            &reg,
            ApprovalMode::Default,
            &mut trust,
            &ApproveGate,
            &CancelSignal::new(),
            &bus,
            30,
        )
        .await;

        let mut saw_confirmation = false;
        let mut saw_response = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AgentEvent::ToolCallConfirmation { .. } => saw_confirmation = true,
                AgentEvent::ToolCallResponse(_) => saw_response = true,
                _ => {}
            }
        }
        assert!(saw_confirmation);
        assert!(saw_response);
    }
}
