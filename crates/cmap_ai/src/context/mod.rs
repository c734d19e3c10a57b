use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::retrieve::RetrievalHit;
use crate::scrape::WebSnippet;

/// Evidence candidate: a stored crisis record or a live web snippet,
/// unified behind explicit accessors instead of duck-typed field probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EvidenceItem {
    Database(RetrievalHit),
    Web(WebSnippet),
}

impl EvidenceItem {
    pub fn text(&self) -> &str {
        match self {
            EvidenceItem::Database(hit) => {
                if hit.text.trim().is_empty() {
                    &hit.summary
                } else {
                    &hit.text
                }
            }
            EvidenceItem::Web(snippet) => &snippet.content,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            EvidenceItem::Database(hit) => &hit.title,
            EvidenceItem::Web(snippet) => &snippet.title,
        }
    }

    pub fn source_label(&self) -> &str {
        match self {
            EvidenceItem::Database(hit) => &hit.source,
            EvidenceItem::Web(snippet) => &snippet.source,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            EvidenceItem::Database(_) => None,
            EvidenceItem::Web(snippet) => snippet.url.as_deref(),
        }
    }

    /// Relevance used for cross-candidate ordering inside one tier. Web
    /// snippets carry no score; they keep fetch order.
    pub fn relevance(&self) -> f32 {
        match self {
            EvidenceItem::Database(hit) => hit.score,
            EvidenceItem::Web(_) => 0.0,
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, EvidenceItem::Database(_))
    }
}

/// One admitted evidence block: the item plus the budgeted excerpt of its
/// text that actually enters the prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceBlock {
    pub item: EvidenceItem,
    pub excerpt: String,
}

/// Bounded, deduplicated evidence for one request.
///
/// Invariants: excerpt sizes sum to at most the configured budget; no two
/// blocks share a normalized text fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvidenceContext {
    pub blocks: Vec<EvidenceBlock>,
}

impl EvidenceContext {
    /// The explicit no-evidence marker: both retrieval tiers and the web
    /// fetch produced nothing usable.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.blocks.iter().map(|b| b.excerpt.len()).sum()
    }
}

/// Merge retrieval hits and web snippets into one bounded context.
///
/// Policy (deterministic, documented): database hits always precede web
/// snippets; hits keep their retrieval score order, snippets keep fetch
/// order. On a fingerprint collision the earlier (higher-tier) candidate
/// wins. A candidate that would overflow the budget is truncated at a word
/// boundary; if less than `min_excerpt` chars remain it is skipped instead.
pub fn assemble(
    hits: &[RetrievalHit],
    snippets: &[WebSnippet],
    max_chars: usize,
    min_excerpt: usize,
) -> EvidenceContext {
    let mut candidates: Vec<EvidenceItem> = Vec::with_capacity(hits.len() + snippets.len());
    candidates.extend(hits.iter().cloned().map(EvidenceItem::Database));
    candidates.extend(snippets.iter().cloned().map(EvidenceItem::Web));

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut blocks: Vec<EvidenceBlock> = Vec::new();
    let mut used = 0usize;

    for item in candidates {
        let text = collapse_whitespace(item.text());
        if text.is_empty() {
            continue;
        }
        if !seen.insert(fingerprint(&text)) {
            continue;
        }

        let remaining = max_chars.saturating_sub(used);
        if remaining == 0 {
            break;
        }
        let excerpt = if text.len() <= remaining {
            text
        } else if remaining >= min_excerpt {
            truncate_at_word(&text, remaining)
        } else {
            // Not even a minimal viable excerpt fits.
            continue;
        };

        used += excerpt.len();
        blocks.push(EvidenceBlock { item, excerpt });
    }

    EvidenceContext { blocks }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_ws = true;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_ws {
                out.push(' ');
            }
            last_ws = true;
        } else {
            out.push(c);
            last_ws = false;
        }
    }
    out.trim_end().to_string()
}

/// Case-folded fingerprint of normalized text, for exact-duplicate dropping.
fn fingerprint(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.to_lowercase().as_bytes());
    hex::encode(digest)
}

/// Truncate to at most `limit` bytes without splitting a word when feasible.
fn truncate_at_word(text: &str, limit: usize) -> String {
    debug_assert!(limit > 0 && limit < text.len());
    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let slice = &text[..cut];
    match slice.rfind(' ') {
        // Keep the mid-word cut only when there is no space to back up to.
        Some(pos) if pos > 0 => slice[..pos].to_string(),
        _ => slice.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieve::RetrievalTier;

    fn hit(id: &str, text: &str, score: f32) -> RetrievalHit {
        RetrievalHit {
            record_id: id.to_string(),
            title: format!("title-{id}"),
            summary: String::new(),
            text: text.to_string(),
            location: String::new(),
            date: String::new(),
            source: "EM-DAT".to_string(),
            score,
            tier: RetrievalTier::Vector,
        }
    }

    fn snippet(title: &str, content: &str) -> WebSnippet {
        WebSnippet {
            title: title.to_string(),
            source: "Wikipedia".to_string(),
            url: Some(format!("https://en.wikipedia.org/wiki/{title}")),
            content: content.to_string(),
            date_accessed: "2026-02-10T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn database_hits_precede_web_snippets() {
        let ctx = assemble(
            &[hit("r1", "first record", 0.9)],
            &[snippet("w1", "web content")],
            1_000,
            10,
        );
        assert_eq!(ctx.blocks.len(), 2);
        assert!(ctx.blocks[0].item.is_database());
        assert!(!ctx.blocks[1].item.is_database());
    }

    #[test]
    fn exact_duplicates_keep_the_database_copy() {
        let ctx = assemble(
            &[hit("r1", "The  Krakatoa eruption of 1883.", 0.9)],
            &[snippet("w1", "the krakatoa ERUPTION of 1883.")],
            1_000,
            10,
        );
        assert_eq!(ctx.blocks.len(), 1);
        assert!(ctx.blocks[0].item.is_database());
    }

    #[test]
    fn budget_is_never_exceeded() {
        let ctx = assemble(
            &[hit("r1", &"word ".repeat(100), 0.9), hit("r2", &"more ".repeat(100), 0.8)],
            &[snippet("w1", &"web ".repeat(100))],
            120,
            10,
        );
        assert!(ctx.total_chars() <= 120);
        assert!(!ctx.is_empty());
    }

    #[test]
    fn oversize_single_candidate_is_truncated_not_dropped() {
        let long = "alpha beta gamma delta ".repeat(50);
        let ctx = assemble(&[hit("r1", &long, 0.9)], &[], 100, 10);
        assert_eq!(ctx.blocks.len(), 1);
        assert!(ctx.blocks[0].excerpt.len() <= 100);
        // Word boundary: the excerpt never ends mid-word.
        assert!(!ctx.blocks[0].excerpt.ends_with(' '));
        assert!(long.replace(char::is_whitespace, " ").starts_with(&ctx.blocks[0].excerpt));
    }

    #[test]
    fn candidate_below_minimal_excerpt_is_skipped() {
        let ctx = assemble(
            &[hit("r1", &"a".repeat(95), 0.9), hit("r2", &"b".repeat(95), 0.8)],
            &[],
            100,
            20,
        );
        // Only 5 chars remain after r1; r2 is skipped rather than mangled.
        assert_eq!(ctx.blocks.len(), 1);
    }

    #[test]
    fn empty_inputs_yield_the_no_evidence_marker() {
        let ctx = assemble(&[], &[], 1_000, 10);
        assert!(ctx.is_empty());
    }
}
