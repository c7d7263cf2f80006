// SPDX-License-Identifier: Apache-2.0
//! Owns one [`Orchestrator`]-backed conversation per session id and routes
//! inbound client messages to it, the way a thin server process would: each
//! `user_input` starts (or resumes) a turn on a background task, each
//! `tool_confirmation_response` answers a suspended confirmation, and
//! `cancel` sets the turn's cancellation latch.

use std::collections::HashMap;
use std::sync::Arc;

use orka_config::AgentConfig;
use orka_core::{ConversationState, Orchestrator};
use orka_events::{AgentEvent, CancelSignal, EventBus};
use orka_model::{Content, ModelProvider};
use orka_tools::{ToolRegistry, TrustSet};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

use crate::confirmation::{ChannelApprovalGate, PendingConfirmations};
use crate::message::ClientMessage;

struct Session {
    state: Mutex<ConversationState>,
    trust: Mutex<TrustSet>,
    cancel: Mutex<CancelSignal>,
    pending: Arc<PendingConfirmations>,
    bus: Arc<EventBus>,
    turn: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Owns every active session for one running core process.
pub struct SessionManager {
    model: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    config: Arc<AgentConfig>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(model: Arc<dyn ModelProvider>, registry: Arc<ToolRegistry>, config: Arc<AgentConfig>) -> Self {
        Self { model, registry, config, sessions: Mutex::new(HashMap::new()) }
    }

    /// Start a new session and return its id plus the primary event
    /// receiver the caller should drain (the core → client envelope).
    pub async fn create_session(&self) -> (String, mpsc::Receiver<AgentEvent>) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (bus, rx) = EventBus::new();
        let session = Arc::new(Session {
            state: Mutex::new(ConversationState::new(session_id.clone())),
            trust: Mutex::new(TrustSet::new()),
            cancel: Mutex::new(CancelSignal::new()),
            pending: Arc::new(PendingConfirmations::new()),
            bus: Arc::new(bus),
            turn: Mutex::new(None),
        });
        self.sessions.lock().await.insert(session_id.clone(), session);
        (session_id, rx)
    }

    /// Append turns to a session's history before its first user turn runs
    /// — used to seed the environment preamble (date/OS/cwd/folder
    /// listing) once per chat, ahead of any real user input.
    pub async fn seed_history(&self, session_id: &str, turns: Vec<Content>) {
        if let Some(session) = self.sessions.lock().await.get(session_id) {
            session.state.lock().await.history.extend(turns);
        }
    }

    /// Attach a passive subscriber to a live session's event stream.
    pub async fn subscribe(&self, session_id: &str) -> Option<mpsc::Receiver<AgentEvent>> {
        let session = self.sessions.lock().await.get(session_id)?.clone();
        Some(session.bus.subscribe().await)
    }

    pub async fn end_session(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().await.remove(session_id) {
            session.cancel.lock().await.set();
            if let Some(handle) = session.turn.lock().await.take() {
                handle.abort();
            }
        }
    }

    /// Route one client message to its session.
    pub async fn handle_message(&self, session_id: &str, message: ClientMessage) {
        let session = {
            let sessions = self.sessions.lock().await;
            match sessions.get(session_id) {
                Some(s) => s.clone(),
                None => {
                    warn!(session_id, "message for unknown session");
                    return;
                }
            }
        };

        match message {
            ClientMessage::UserInput { value } => self.start_turn(session, value).await,
            ClientMessage::ToolConfirmationResponse { call_id, outcome, modified_args } => {
                session
                    .pending
                    .resolve(&call_id, outcome.into_confirmation_outcome(modified_args))
                    .await;
            }
            ClientMessage::Cancel => {
                session.cancel.lock().await.set();
            }
        }
    }

    async fn start_turn(&self, session: Arc<Session>, input: String) {
        // Cancellation has no reset, so every turn gets its own latch.
        let cancel = CancelSignal::new();
        *session.cancel.lock().await = cancel.clone();

        if let Some(previous) = session.turn.lock().await.take() {
            previous.abort();
        }

        let model = self.model.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let gate = ChannelApprovalGate::new(session.pending.clone(), cancel.clone());
            let mut trust = session.trust.lock().await;
            let mut state = session.state.lock().await;
            state.current_user_input = Some(input);

            let mut orch = Orchestrator {
                model: model.as_ref(),
                registry: registry.as_ref(),
                trust: &mut *trust,
                gate: &gate,
                bus: session.bus.as_ref(),
                cancel,
                config: &config,
                system_instruction: config.system_prompt.clone(),
            };

            if let Err(e) = orch.run(&mut state).await {
                error!(error = %e, "turn ended in error");
                let _ = session.bus.emit(AgentEvent::Error { message: e.to_string(), status: None }).await;
            }
        });

        *session.turn.lock().await = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orka_config::{ApprovalMode, CompactionStrategy};
    use orka_events::{ConfirmationDetails, ConfirmationOutcome, ToolCallRequestInfo};
    use orka_model::{ResponseEvent, ScriptedMockProvider};
    use orka_tools::{LiveOutputCb, Tool, ToolResult};
    use serde_json::{json, Value};
    use tokio::time::{sleep, Duration};

    struct AlwaysApprove;
    #[async_trait]
    impl orka_core::ApprovalGate for AlwaysApprove {
        async fn confirm(&self, _: &ToolCallRequestInfo, _: &ConfirmationDetails) -> ConfirmationOutcome {
            ConfirmationOutcome::Approve
        }
    }

    struct EchoTool;
    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            args: &Value,
            _cancel: CancelSignal,
            _live_output: Option<LiveOutputCb>,
        ) -> Result<ToolResult, String> {
            Ok(ToolResult::text(format!("{args}")))
        }
    }

    fn test_config() -> Arc<AgentConfig> {
        Arc::new(AgentConfig {
            approval_mode: ApprovalMode::Yolo,
            max_turns: 10,
            compaction_threshold: 0.85,
            compaction_keep_recent: 6,
            compaction_strategy: CompactionStrategy::Narrative,
            tool_result_token_cap: 4000,
            compaction_overhead_reserve: 0.10,
            system_prompt: None,
            model_call_timeout_secs: 30,
            tool_call_timeout_secs: 30,
        })
    }

    async fn drain(rx: &mut mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn user_input_runs_a_turn_to_completion() {
        let model = Arc::new(ScriptedMockProvider::always_text("hello there"));
        let registry = Arc::new(ToolRegistry::new());
        let manager = SessionManager::new(model, registry, test_config());

        let (session_id, mut rx) = manager.create_session().await;
        manager
            .handle_message(&session_id, ClientMessage::UserInput { value: "hi".into() })
            .await;

        // Poll briefly for the background turn to finish.
        let mut saw_complete = false;
        for _ in 0..50 {
            if drain(&mut rx).await.iter().any(|e| matches!(e, AgentEvent::TurnComplete)) {
                saw_complete = true;
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(saw_complete, "expected turnComplete within the poll window");
    }

    #[tokio::test]
    async fn tool_confirmation_response_unblocks_a_suspended_call() {
        let model = Arc::new(ScriptedMockProvider::call_then_text(
            "c1",
            "echo",
            json!({"value": "x"}),
            "done",
        ));
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let mut config = (*test_config()).clone();
        config.approval_mode = ApprovalMode::Default;
        let manager = SessionManager::new(model, Arc::new(registry), Arc::new(config));

        let (session_id, mut rx) = manager.create_session().await;
        manager
            .handle_message(&session_id, ClientMessage::UserInput { value: "echo x".into() })
            .await;

        let mut saw_confirmation = false;
        for _ in 0..50 {
            if drain(&mut rx).await.iter().any(|e| matches!(e, AgentEvent::ToolCallConfirmation { .. })) {
                saw_confirmation = true;
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(saw_confirmation, "expected a confirmation request for the echo call");

        manager
            .handle_message(
                &session_id,
                ClientMessage::ToolConfirmationResponse {
                    call_id: "c1".into(),
                    outcome: crate::message::ClientOutcome::Approve,
                    modified_args: None,
                },
            )
            .await;

        let mut saw_complete = false;
        for _ in 0..50 {
            if drain(&mut rx).await.iter().any(|e| matches!(e, AgentEvent::TurnComplete)) {
                saw_complete = true;
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn cancel_message_stops_the_running_turn() {
        let model = Arc::new(ScriptedMockProvider::new(vec![vec![
            ResponseEvent::TextDelta("partial".into()),
            ResponseEvent::Done,
        ]]));
        let registry = Arc::new(ToolRegistry::new());
        let manager = SessionManager::new(model, registry, test_config());

        let (session_id, mut rx) = manager.create_session().await;
        manager
            .handle_message(&session_id, ClientMessage::UserInput { value: "go".into() })
            .await;
        manager.handle_message(&session_id, ClientMessage::Cancel).await;

        let mut saw_terminal = false;
        for _ in 0..50 {
            let events = drain(&mut rx).await;
            if events.iter().any(|e| matches!(e, AgentEvent::TurnComplete | AgentEvent::UserCancelled)) {
                saw_terminal = true;
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(saw_terminal);
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_ignored() {
        let model = Arc::new(ScriptedMockProvider::always_text("x"));
        let registry = Arc::new(ToolRegistry::new());
        let manager = SessionManager::new(model, registry, test_config());
        manager
            .handle_message("does-not-exist", ClientMessage::Cancel)
            .await;
    }

    #[tokio::test]
    async fn seeded_history_appears_before_the_first_user_turn() {
        let model = Arc::new(ScriptedMockProvider::always_text("hi"));
        let registry = Arc::new(ToolRegistry::new());
        let manager = SessionManager::new(model, registry, test_config());
        let (session_id, mut rx) = manager.create_session().await;

        manager
            .seed_history(&session_id, vec![orka_model::Content::user("preamble"), orka_model::Content::model_text("ack")])
            .await;
        manager
            .handle_message(&session_id, ClientMessage::UserInput { value: "hi".into() })
            .await;

        let mut saw_complete = false;
        for _ in 0..50 {
            if drain(&mut rx).await.iter().any(|e| matches!(e, AgentEvent::TurnComplete)) {
                saw_complete = true;
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(saw_complete);
    }

    #[tokio::test]
    async fn ending_a_session_removes_it_from_the_table() {
        let model = Arc::new(ScriptedMockProvider::always_text("x"));
        let registry = Arc::new(ToolRegistry::new());
        let manager = SessionManager::new(model, registry, test_config());
        let (session_id, _rx) = manager.create_session().await;
        manager.end_session(&session_id).await;
        assert!(manager.subscribe(&session_id).await.is_none());
    }
}
