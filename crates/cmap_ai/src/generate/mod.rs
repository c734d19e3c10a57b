use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PipelineConfig;
use crate::context::{EvidenceContext, EvidenceItem};
use crate::llm::{GenerationMode, Llm};

pub mod prompts;

/// Fixed answer when no tier produced any evidence. A valid, successful
/// answer from the caller's perspective, not an error.
pub const INSUFFICIENT_INFORMATION: &str = "I don't have enough information to answer that. \
Please try a different question about a crisis or disaster event.";

/// How many evidence blocks the template tier stitches together.
const TEMPLATE_BLOCKS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTier {
    Model,
    Template,
}

impl GenerationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTier::Model => "model",
            GenerationTier::Template => "template",
        }
    }
}

/// Generated text plus which tier produced it and how many leading context
/// blocks the answer is actually grounded on. Citations must cover exactly
/// those blocks, never ones that were dropped from the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub text: String,
    pub tier: GenerationTier,
    pub cited_blocks: usize,
}

/// Generation state machine: MODEL (stateful, then one stateless retry) →
/// TEMPLATE. The template path cannot fail, so neither can this function.
///
/// Model invocations are serialized through `gate`: at most one inference
/// runs at a time on memory-constrained hardware, while retrieval and web
/// fetches stay fully concurrent across requests.
pub fn generate_answer(
    llm: &dyn Llm,
    gate: &Mutex<()>,
    config: &PipelineConfig,
    query: &str,
    context: &EvidenceContext,
) -> GenerationOutcome {
    if context.is_empty() {
        return template_answer(query, context);
    }

    let evidence = prompts::render_evidence(context, config.max_prompt_chars);
    let prompt = prompts::answer_prompt(query, &evidence.text);

    let _slot = match gate.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };

    match llm.generate(
        &config.response_model,
        &prompt,
        config.max_output_tokens,
        GenerationMode::Stateful,
    ) {
        Ok(text) => {
            return GenerationOutcome {
                text,
                tier: GenerationTier::Model,
                cited_blocks: evidence.blocks_used,
            }
        }
        Err(e) => {
            warn!(error = %e, "stateful generation failed; retrying stateless");
        }
    }

    match llm.generate(
        &config.response_model,
        &prompt,
        config.max_output_tokens,
        GenerationMode::Stateless,
    ) {
        Ok(text) => GenerationOutcome {
            text,
            tier: GenerationTier::Model,
            cited_blocks: evidence.blocks_used,
        },
        Err(e) => {
            warn!(error = %e, "stateless retry failed; falling back to template answer");
            template_answer(query, context)
        }
    }
}

/// Deterministic extractive fallback: stitch the highest-relevance evidence
/// blocks into a readable summary with no model call. Never fails.
pub fn template_answer(query: &str, context: &EvidenceContext) -> GenerationOutcome {
    if context.is_empty() {
        return GenerationOutcome {
            text: INSUFFICIENT_INFORMATION.to_string(),
            tier: GenerationTier::Template,
            cited_blocks: 0,
        };
    }

    let used = context.blocks.len().min(TEMPLATE_BLOCKS);
    let mut out = format!("**Information about {query}**\n\n");
    for block in context.blocks.iter().take(used) {
        match &block.item {
            EvidenceItem::Database(hit) => {
                out.push_str(&format!("**{}**\n", hit.title));
                if !hit.date.trim().is_empty() {
                    out.push_str(&format!("Date: {}\n", hit.date));
                }
                if !hit.location.trim().is_empty() {
                    out.push_str(&format!("Location: {}\n", hit.location));
                }
                out.push_str(&block.excerpt);
            }
            EvidenceItem::Web(snippet) => {
                out.push_str(&format!("**{}** ({})\n", snippet.title, snippet.source));
                out.push_str(&block.excerpt);
            }
        }
        out.push_str("\n\n");
    }

    GenerationOutcome {
        text: out.trim_end().to_string(),
        tier: GenerationTier::Template,
        cited_blocks: used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvidenceBlock;
    use crate::retrieve::{RetrievalHit, RetrievalTier};

    fn context_with_one_hit() -> EvidenceContext {
        EvidenceContext {
            blocks: vec![EvidenceBlock {
                item: EvidenceItem::Database(RetrievalHit {
                    record_id: "r1".to_string(),
                    title: "1883 eruption of Krakatoa".to_string(),
                    summary: String::new(),
                    text: "Massive volcanic eruption in the Sunda Strait.".to_string(),
                    location: "Indonesia".to_string(),
                    date: "1883-08-27".to_string(),
                    source: "EM-DAT".to_string(),
                    score: 0.91,
                    tier: RetrievalTier::Vector,
                }),
                excerpt: "Massive volcanic eruption in the Sunda Strait.".to_string(),
            }],
        }
    }

    #[test]
    fn template_answer_includes_top_evidence() {
        let out = template_answer("Krakatoa eruption", &context_with_one_hit());
        assert_eq!(out.tier, GenerationTier::Template);
        assert_eq!(out.cited_blocks, 1);
        assert!(out.text.contains("Information about Krakatoa eruption"));
        assert!(out.text.contains("Sunda Strait"));
        assert!(out.text.contains("1883-08-27"));
    }

    #[test]
    fn template_answer_without_evidence_is_the_fixed_message() {
        let out = template_answer("xyzzy", &EvidenceContext::default());
        assert_eq!(out.text, INSUFFICIENT_INFORMATION);
        assert_eq!(out.tier, GenerationTier::Template);
        assert_eq!(out.cited_blocks, 0);
    }
}
