use std::sync::Mutex;
use std::time::Instant;

use cmap_core::error::AppError;
use cmap_core::rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::attribute::{citations, Citation};
use crate::config::PipelineConfig;
use crate::context::assemble;
use crate::embed::{embed_query, Embedder};
use crate::generate::{generate_answer, template_answer, GenerationOutcome};
use crate::llm::Llm;
use crate::retrieve::{keyword_hits, vector_hits, RetrievalHit, RetrievalTier};
use crate::scrape::{SupplementFetch, WebSnippet};

/// The full answer for one query. Tier labels expose which strategies
/// actually produced the response, so degradation is observable without
/// being an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub query: String,
    pub response: String,
    pub sources: Vec<Citation>,
    /// "model" or "template".
    pub generation_tier: String,
    /// "vector", "keyword", or "none".
    pub retrieval_tier: String,
}

/// One-query orchestrator: embed, retrieve (vector then keyword), fetch web
/// supplements concurrently, assemble bounded evidence, generate with
/// fallback, attribute sources.
///
/// Holds the single storage connection, so `answer` takes `&mut self`. The
/// inference gate is a caller-owned handle: every pipeline in the process
/// must be constructed with the same gate, which is what serializes model
/// calls across concurrent requests.
pub struct AnswerPipeline<'a> {
    config: PipelineConfig,
    conn: Connection,
    embedder: &'a dyn Embedder,
    llm: &'a dyn Llm,
    fetcher: &'a dyn SupplementFetch,
    inference_gate: &'a Mutex<()>,
}

impl<'a> AnswerPipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        conn: Connection,
        embedder: &'a dyn Embedder,
        llm: &'a dyn Llm,
        fetcher: &'a dyn SupplementFetch,
        inference_gate: &'a Mutex<()>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            config,
            conn,
            embedder,
            llm,
            fetcher,
            inference_gate,
        })
    }

    /// Answer one query. Only QUERY_INVALID escapes as an error; every
    /// downstream failure degrades to a lower tier instead.
    pub fn answer(&mut self, query: &str) -> Result<AnswerResult, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::new("QUERY_INVALID", "Query must not be blank"));
        }
        let deadline = Instant::now() + self.config.request_deadline;

        // Web supplements run concurrently with embedding + retrieval; the
        // fetcher is infallible by contract.
        let (hits, tier, snippets) = std::thread::scope(|s| {
            let fetcher = self.fetcher;
            let web = s.spawn(move || fetcher.fetch(query, deadline));
            let (hits, tier) = self.retrieve(query);
            let snippets: Vec<WebSnippet> = match web.join() {
                Ok(snippets) => snippets,
                Err(_) => {
                    warn!("web supplement thread panicked; continuing without snippets");
                    Vec::new()
                }
            };
            (hits, tier, snippets)
        });

        let context = assemble(
            &hits,
            &snippets,
            self.config.max_context_chars,
            self.config.min_excerpt_chars,
        );
        debug!(
            blocks = context.blocks.len(),
            chars = context.total_chars(),
            tier = tier_label(tier),
            "evidence assembled"
        );

        // Past the deadline there is no budget left for a model call.
        let outcome: GenerationOutcome = if Instant::now() >= deadline {
            warn!("request deadline reached before generation; using template answer");
            template_answer(query, &context)
        } else {
            generate_answer(self.llm, self.inference_gate, &self.config, query, &context)
        };

        // Sources cover exactly the blocks the generator used; blocks that
        // were dropped from the prompt are never cited.
        let sources = citations(&context.blocks[..outcome.cited_blocks]);

        Ok(AnswerResult {
            query: query.to_string(),
            response: outcome.text,
            sources,
            generation_tier: outcome.tier.as_str().to_string(),
            retrieval_tier: if context.blocks.iter().any(|b| b.item.is_database()) {
                tier_label(tier).to_string()
            } else {
                "none".to_string()
            },
        })
    }

    /// Vector tier first; any embedding or vector failure, or an empty vector
    /// result, falls through to the keyword tier. A keyword failure yields no
    /// hits rather than an error.
    fn retrieve(&self, query: &str) -> (Vec<RetrievalHit>, Option<RetrievalTier>) {
        let vector_result = embed_query(
            self.embedder,
            &self.config.embed_model,
            query,
            self.config.vector_dims,
        )
        .and_then(|vec| {
            vector_hits(
                &self.conn,
                &self.config.index_name,
                &vec,
                self.config.top_k,
                self.config.relevance_floor,
            )
        });

        match vector_result {
            Ok(hits) if !hits.is_empty() => return (hits, Some(RetrievalTier::Vector)),
            Ok(_) => debug!("vector tier returned no hits; trying keyword tier"),
            Err(e) => warn!(error = %e, "vector tier failed; trying keyword tier"),
        }

        match keyword_hits(&self.conn, query, self.config.top_k) {
            Ok(hits) if !hits.is_empty() => (hits, Some(RetrievalTier::Keyword)),
            Ok(_) => (Vec::new(), None),
            Err(e) => {
                warn!(error = %e, "keyword tier failed; continuing without database hits");
                (Vec::new(), None)
            }
        }
    }
}

fn tier_label(tier: Option<RetrievalTier>) -> &'static str {
    match tier {
        Some(t) => t.as_str(),
        None => "none",
    }
}
