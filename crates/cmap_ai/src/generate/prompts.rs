use crate::context::EvidenceContext;

/// Evidence rendered for the model prompt, plus how many leading context
/// blocks actually made it in. Attribution must only cite blocks the model
/// saw, so callers need the count, not just the text.
pub struct RenderedEvidence {
    pub text: String,
    pub blocks_used: usize,
}

/// Render the evidence blocks for the model prompt, bounded to `max_chars`.
/// Whole blocks are dropped from the tail rather than cut mid-block.
pub fn render_evidence(context: &EvidenceContext, max_chars: usize) -> RenderedEvidence {
    let mut out = String::new();
    let mut blocks_used = 0;
    for (i, block) in context.blocks.iter().enumerate() {
        let mut entry = format!("Event {}:\nTitle: {}\n", i + 1, block.item.title());
        match &block.item {
            crate::context::EvidenceItem::Database(hit) => {
                if !hit.location.trim().is_empty() {
                    entry.push_str(&format!("Location: {}\n", hit.location));
                }
                if !hit.date.trim().is_empty() {
                    entry.push_str(&format!("Date: {}\n", hit.date));
                }
            }
            crate::context::EvidenceItem::Web(snippet) => {
                entry.push_str(&format!("Source: {}\n", snippet.source));
            }
        }
        entry.push_str(&block.excerpt);
        entry.push_str("\n\n");

        if out.len() + entry.len() > max_chars {
            break;
        }
        out.push_str(&entry);
        blocks_used += 1;
    }
    RenderedEvidence {
        text: out.trim_end().to_string(),
        blocks_used,
    }
}

pub fn answer_prompt(query: &str, evidence: &str) -> String {
    format!(
        r#"I need information about: {query}

Please provide a clear, comprehensive answer based only on the following information:

{evidence}

Summarize the most important points and focus specifically on answering the query. Make your response well-structured, factual, and concise. Use proper capitalization for sentences and ensure the text is professionally formatted.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EvidenceBlock, EvidenceItem};
    use crate::scrape::WebSnippet;

    fn web_block(title: &str, excerpt: &str) -> EvidenceBlock {
        EvidenceBlock {
            item: EvidenceItem::Web(WebSnippet {
                title: title.to_string(),
                source: "Wikipedia".to_string(),
                url: None,
                content: excerpt.to_string(),
                date_accessed: String::new(),
            }),
            excerpt: excerpt.to_string(),
        }
    }

    #[test]
    fn render_drops_whole_blocks_past_the_bound() {
        let ctx = EvidenceContext {
            blocks: vec![web_block("a", &"x".repeat(100)), web_block("b", &"y".repeat(100))],
        };
        let rendered = render_evidence(&ctx, 160);
        assert!(rendered.text.contains("Event 1:"));
        assert!(!rendered.text.contains("Event 2:"));
        assert!(rendered.text.len() <= 160);
        assert_eq!(rendered.blocks_used, 1);
    }

    #[test]
    fn render_counts_every_block_when_all_fit() {
        let ctx = EvidenceContext {
            blocks: vec![web_block("a", "first"), web_block("b", "second")],
        };
        assert_eq!(render_evidence(&ctx, 1_000).blocks_used, 2);
    }

    #[test]
    fn prompt_contains_query_and_evidence() {
        let prompt = answer_prompt("Krakatoa eruption", "Event 1: ...");
        assert!(prompt.contains("Krakatoa eruption"));
        assert!(prompt.contains("Event 1: ..."));
    }
}
