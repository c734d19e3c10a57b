use cmap_core::error::AppError;
use serde::{Deserialize, Serialize};

/// Invocation mode for the generative model.
///
/// `Stateful` lets the runtime reuse incremental decode state between calls;
/// `Stateless` forces a plain single-shot invocation. The orchestrator retries
/// a failed `Stateful` call exactly once as `Stateless` before falling back to
/// the template tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Stateful,
    Stateless,
}

pub trait Llm: Send + Sync {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        mode: GenerationMode,
    ) -> Result<String, AppError>;
}

pub mod ollama_llm;
