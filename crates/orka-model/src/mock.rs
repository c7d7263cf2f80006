// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use orka_events::UsageMetadata;

use crate::{provider::ResponseStream, CompletionRequest, Content, ResponseEvent, Role};

/// Deterministic mock provider. Echoes the last user turn back as the
/// model's reply.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn generate_content_stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .history
            .iter()
            .rev()
            .find(|c| c.role == Role::User)
            .and_then(Content::as_text)
            .unwrap_or_else(|| "[no input]".to_string());

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Usage(UsageMetadata {
                prompt_token_count: 10,
                candidates_token_count: 10,
                total_token_count: 20,
                api_time_ms: Some(0),
            })),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted mock provider. Each call to `generate_content_stream` pops
/// the next response script from the front of the queue — this lets tests
/// specify exact event sequences, including tool calls, without network
/// access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Vec<ResponseEvent>>>>,
    name: String,
    /// The last request seen by this provider, for test inspection.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
    fallback_model: Option<String>,
    remaining_rate_limit_errors: Arc<Mutex<u32>>,
}

impl ScriptedMockProvider {
    /// Build a provider from a list of response scripts. The outer `Vec` is
    /// the ordered list of calls; the inner `Vec` is the sequence of
    /// [`ResponseEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            name: "scripted-mock".into(),
            last_request: Arc::new(Mutex::new(None)),
            fallback_model: None,
            remaining_rate_limit_errors: Arc::new(Mutex::new(0)),
        }
    }

    /// Advertise `model_id` as this provider's rate-limit fallback, for
    /// tests exercising the retry policy's fallback hook.
    pub fn with_fallback_model(mut self, model_id: impl Into<String>) -> Self {
        self.fallback_model = Some(model_id.into());
        self
    }

    /// Make the first `n` calls fail with a simulated 429 before scripts
    /// resume, for exercising the retry policy's rate-limit path.
    pub fn with_leading_rate_limit_errors(self, n: u32) -> Self {
        *self.remaining_rate_limit_errors.lock().unwrap() = n;
        self
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self::new(vec![vec![
            ResponseEvent::TextDelta(r),
            ResponseEvent::Usage(UsageMetadata {
                prompt_token_count: 5,
                candidates_token_count: 5,
                total_token_count: 10,
                api_time_ms: Some(0),
            }),
            ResponseEvent::Done,
        ]])
    }

    /// Convenience: provider that returns a function call followed by a text reply.
    pub fn call_then_text(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                ResponseEvent::FunctionCall { id: call_id.into(), name: tool_name.into(), args },
                ResponseEvent::Done,
            ],
            vec![ResponseEvent::TextDelta(final_text.into()), ResponseEvent::Done],
        ])
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        &self.name
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    fn fallback_model_id(&self) -> Option<&str> {
        self.fallback_model.as_deref()
    }

    async fn generate_content_stream(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        *self.last_request.lock().unwrap() = Some(req);
        {
            let mut remaining = self.remaining_rate_limit_errors.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("simulated 429 rate limit");
            }
        }
        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![ResponseEvent::TextDelta("[no more scripts]".into()), ResponseEvent::Done]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<ResponseEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}
