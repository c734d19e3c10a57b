use serde::{Deserialize, Serialize};

use crate::context::EvidenceBlock;

/// One attributed source in an answer. Database records have no URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
}

/// Derive the citation list from the evidence blocks the generator actually
/// used (callers pass the cited prefix, not the whole context). One citation
/// per distinct origin, in first-appearance order; the dedup key is the URL
/// when present, otherwise (title, source).
pub fn citations(blocks: &[EvidenceBlock]) -> Vec<Citation> {
    let mut out: Vec<Citation> = Vec::new();
    for block in blocks {
        let candidate = Citation {
            title: block.item.title().to_string(),
            source: block.item.source_label().to_string(),
            url: block.item.url().map(|u| u.to_string()),
        };
        let duplicate = out.iter().any(|c| match (&c.url, &candidate.url) {
            (Some(a), Some(b)) => a == b,
            _ => c.title == candidate.title && c.source == candidate.source,
        });
        if !duplicate {
            out.push(candidate);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvidenceItem;
    use crate::retrieve::{RetrievalHit, RetrievalTier};
    use crate::scrape::WebSnippet;

    fn db_block(id: &str, title: &str) -> EvidenceBlock {
        EvidenceBlock {
            item: EvidenceItem::Database(RetrievalHit {
                record_id: id.to_string(),
                title: title.to_string(),
                summary: String::new(),
                text: "body".to_string(),
                location: String::new(),
                date: String::new(),
                source: "EM-DAT".to_string(),
                score: 0.9,
                tier: RetrievalTier::Vector,
            }),
            excerpt: "body".to_string(),
        }
    }

    fn web_block(title: &str, url: &str) -> EvidenceBlock {
        EvidenceBlock {
            item: EvidenceItem::Web(WebSnippet {
                title: title.to_string(),
                source: "Wikipedia".to_string(),
                url: Some(url.to_string()),
                content: "content".to_string(),
                date_accessed: String::new(),
            }),
            excerpt: "content".to_string(),
        }
    }

    #[test]
    fn citations_preserve_first_appearance_order() {
        let blocks = vec![
            db_block("r1", "Krakatoa"),
            web_block("Krakatoa", "https://en.wikipedia.org/wiki/Krakatoa"),
        ];
        let cites = citations(&blocks);
        assert_eq!(cites.len(), 2);
        assert_eq!(cites[0].source, "EM-DAT");
        assert_eq!(cites[1].source, "Wikipedia");
    }

    #[test]
    fn duplicate_urls_collapse_to_one_citation() {
        let blocks = vec![
            web_block("Krakatoa", "https://en.wikipedia.org/wiki/Krakatoa"),
            web_block("Krakatoa (volcano)", "https://en.wikipedia.org/wiki/Krakatoa"),
        ];
        assert_eq!(citations(&blocks).len(), 1);
    }

    #[test]
    fn same_title_and_source_without_url_collapses() {
        let blocks = vec![db_block("r1", "Krakatoa"), db_block("r2", "Krakatoa")];
        assert_eq!(citations(&blocks).len(), 1);
    }

    #[test]
    fn a_cited_prefix_excludes_later_blocks() {
        let blocks = vec![
            db_block("r1", "Krakatoa"),
            web_block("Tambora", "https://en.wikipedia.org/wiki/Tambora"),
        ];
        let cites = citations(&blocks[..1]);
        assert_eq!(cites.len(), 1);
        assert_eq!(cites[0].title, "Krakatoa");
    }
}
