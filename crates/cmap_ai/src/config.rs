use std::time::Duration;

use cmap_core::error::AppError;
use serde::{Deserialize, Serialize};

/// Per-process pipeline configuration. Validated once at pipeline
/// construction; a bad budget here is a startup fault, never a per-request
/// condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ollama model used for query embeddings (384 dims).
    pub embed_model: String,
    /// Ollama model used for answer generation.
    pub response_model: String,
    /// Name of the provisioned vector index in storage.
    pub index_name: String,
    /// Fixed embedding dimension shared by index and queries.
    pub vector_dims: u32,
    /// Result limit for both retrieval tiers.
    pub top_k: u32,
    /// Optional minimum cosine similarity for vector hits.
    pub relevance_floor: Option<f32>,
    /// Evidence context budget, in characters.
    pub max_context_chars: usize,
    /// Smallest excerpt worth keeping when truncating a candidate.
    pub min_excerpt_chars: usize,
    /// Hard bound on the evidence portion of the model prompt.
    pub max_prompt_chars: usize,
    /// Maximum tokens the generative model may produce.
    pub max_output_tokens: u32,
    /// Per-source web fetch timeout.
    pub web_source_timeout: Duration,
    /// Ceiling for the whole web-supplement stage.
    pub web_fetch_ceiling: Duration,
    /// Minimum spacing between requests to the same external host.
    pub min_host_spacing: Duration,
    /// Outer deadline for one request.
    pub request_deadline: Duration,
    /// Base URL of the local model runtime.
    pub ollama_base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embed_model: "all-minilm".to_string(),
            response_model: "phi3".to_string(),
            index_name: "vector_index".to_string(),
            vector_dims: 384,
            top_k: 5,
            relevance_floor: None,
            max_context_chars: 6_000,
            min_excerpt_chars: 80,
            max_prompt_chars: 8_000,
            max_output_tokens: 500,
            web_source_timeout: Duration::from_secs(5),
            web_fetch_ceiling: Duration::from_secs(8),
            min_host_spacing: Duration::from_millis(500),
            request_deadline: Duration::from_secs(25),
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.vector_dims == 0 {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Vector dimension must be positive",
            ));
        }
        if self.top_k == 0 {
            return Err(AppError::new("CONFIG_INVALID", "top_k must be positive"));
        }
        if self.max_context_chars == 0 {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Context budget must be positive",
            ));
        }
        if self.min_excerpt_chars == 0 || self.min_excerpt_chars > self.max_context_chars {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Minimum excerpt size must be positive and fit the context budget",
            )
            .with_details(format!(
                "min_excerpt_chars={}; max_context_chars={}",
                self.min_excerpt_chars, self.max_context_chars
            )));
        }
        if self.max_prompt_chars == 0 {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Prompt budget must be positive",
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "Output token limit must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_budget_is_a_config_fault() {
        let cfg = PipelineConfig {
            max_context_chars: 0,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().code, "CONFIG_INVALID");
    }

    #[test]
    fn excerpt_floor_must_fit_budget() {
        let cfg = PipelineConfig {
            max_context_chars: 40,
            min_excerpt_chars: 80,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().code, "CONFIG_INVALID");
    }
}
