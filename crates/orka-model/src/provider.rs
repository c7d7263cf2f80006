// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{catalog, CompletionRequest, Content, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// A model backend capable of generating content, counting tokens against
/// its own tokenizer, and (optionally) embedding text.
///
/// Concrete wire-format implementations (HTTP/gRPC to a specific vendor)
/// live outside this crate; `orka-model` only names the capability.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn generate_content_stream(
        &self,
        req: CompletionRequest,
    ) -> anyhow::Result<ResponseStream>;

    /// Count tokens `content` would consume against this model, without
    /// generating anything.
    ///
    /// The default falls back to the same heuristic
    /// [`Content::approx_tokens`] uses; providers with a real tokenizer or
    /// a `countTokens` endpoint should override this for accuracy.
    async fn count_tokens(&self, content: &[Content]) -> anyhow::Result<u32> {
        Ok(content.iter().map(Content::approx_tokens).sum::<usize>() as u32)
    }

    /// Embed `text` into a vector representation.
    ///
    /// Not every provider exposes an embedding endpoint; the default
    /// rejects the call rather than silently returning a meaningless
    /// all-zero vector.
    async fn embed_content(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("{} does not support content embedding", self.name())
    }

    /// Context window for this model, in tokens. Defaults to the shared
    /// token-limit table; override when a provider can probe the live
    /// value (e.g. a local server reporting its loaded context size).
    fn context_window(&self) -> u32 {
        catalog::token_limit(self.model_name())
    }

    /// Cheaper/faster sibling model to retarget to after repeated
    /// rate-limiting, if this provider has one. `None` by default — the
    /// retry policy treats that as "no fallback available".
    fn fallback_model_id(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Stub;

    #[async_trait]
    impl ModelProvider for Stub {
        fn name(&self) -> &str {
            "stub"
        }
        fn model_name(&self) -> &str {
            "unknown-model-xyz"
        }
        async fn generate_content_stream(
            &self,
            _req: CompletionRequest,
        ) -> anyhow::Result<ResponseStream> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn default_count_tokens_uses_approx_heuristic() {
        let p = Stub;
        let content = vec![Content::user("12345678")];
        let n = p.count_tokens(&content).await.unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn default_embed_content_errors() {
        let p = Stub;
        assert!(p.embed_content("hi").await.is_err());
    }

    #[test]
    fn default_context_window_falls_back_to_catalog_default() {
        let p = Stub;
        assert_eq!(p.context_window(), catalog::DEFAULT_TOKEN_LIMIT);
    }
}
