//! The LLM collaborator interface consumed by an agent's "think" step and
//! by the capability object handed to invoked artifact code. The provider
//! itself is an external collaborator; this crate only names the shape of
//! the call and meters it.

use async_trait::async_trait;
use kernel_core::KernelResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Scrip cost, debited from the caller via [`kernel_ledger::Ledger::burn`].
    pub cost: u64,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> KernelResult<LlmResponse>;
}

/// Deterministic stand-in used by tests and by deployments with no
/// configured provider. Echoes the prompt back and charges nothing.
pub struct EchoLlmProvider;

#[async_trait]
impl LlmProvider for EchoLlmProvider {
    async fn complete(&self, request: LlmRequest) -> KernelResult<LlmResponse> {
        Ok(LlmResponse {
            text: request.prompt,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_provider_returns_the_prompt_free_of_charge() {
        let response = EchoLlmProvider
            .complete(LlmRequest {
                prompt: "hello".into(),
                model: "test-model".into(),
                max_tokens: 16,
            })
            .await
            .unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(response.cost, 0);
    }
}
