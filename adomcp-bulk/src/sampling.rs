//! LLM sampling collaborator consumed by AI-assisted bulk actions.

use async_trait::async_trait;
use std::time::Duration;

/// One sampling request sent to the LLM collaborator.
#[derive(Debug, Clone)]
pub struct SamplingRequest {
    /// System prompt framing the task.
    pub system_prompt: String,
    /// User-turn prompt carrying the item's context.
    pub user_prompt: String,
    /// Maximum tokens the model may generate.
    pub max_tokens: u32,
    /// Deadline for the call.
    pub timeout: Duration,
}

/// Supplies LLM completions for AI-assisted actions (enhance-descriptions,
/// assign-story-points, analyze). Absent in deployments with no model
/// access configured, in which case those actions fail with `AI_UNAVAILABLE`.
#[async_trait]
pub trait LlmSamplingChannel: Send + Sync {
    /// Sends one sampling request and returns the raw model reply text.
    async fn sample(&self, request: SamplingRequest) -> Result<String, String>;
}

/// A typed per-item decision parsed from an AI-assisted action's reply.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AiDecision {
    /// Model-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Action-specific payload (new description, story point estimate, analysis text).
    #[serde(flatten)]
    pub payload: serde_json::Value,
}
