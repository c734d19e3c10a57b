use cmap_core::error::AppError;
use cmap_core::repo;
use cmap_core::rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Which retrieval strategy produced a hit. Provenance is part of the
/// externally visible result, so callers can observe degradation without
/// ever seeing an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalTier {
    Vector,
    Keyword,
}

impl RetrievalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalTier::Vector => "vector",
            RetrievalTier::Keyword => "keyword",
        }
    }
}

/// One database-derived evidence candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub record_id: String,
    pub title: String,
    pub summary: String,
    pub text: String,
    pub location: String,
    pub date: String,
    pub source: String,
    pub score: f32,
    pub tier: RetrievalTier,
}

fn hit_from_scored(scored: repo::ScoredRecord, tier: RetrievalTier) -> RetrievalHit {
    RetrievalHit {
        record_id: scored.record.id,
        title: scored.record.title,
        summary: scored.record.summary,
        text: scored.record.text,
        location: scored.record.location,
        date: scored.record.date,
        source: scored.record.source,
        score: scored.score,
        tier,
    }
}

/// Vector tier: cosine kNN over the provisioned index, descending score.
/// Propagates RETRIEVAL_FAILED so the orchestrator can fall back.
pub fn vector_hits(
    conn: &Connection,
    index_name: &str,
    query_vec: &[f32],
    k: u32,
    floor: Option<f32>,
) -> Result<Vec<RetrievalHit>, AppError> {
    let hits = repo::vector_search(conn, index_name, query_vec, k, floor)?;
    Ok(hits
        .into_iter()
        .map(|s| hit_from_scored(s, RetrievalTier::Vector))
        .collect())
}

/// Keyword tier: lexical term-overlap fallback. Never requires an embedding.
pub fn keyword_hits(conn: &Connection, query: &str, k: u32) -> Result<Vec<RetrievalHit>, AppError> {
    let hits = repo::keyword_search(conn, query, k)?;
    Ok(hits
        .into_iter()
        .map(|s| hit_from_scored(s, RetrievalTier::Keyword))
        .collect())
}
