use std::time::Duration;

use cmap_core::error::AppError;

use super::{clean_content, now_rfc3339, WebSnippet, WebSource};

/// ReliefWeb reports API: humanitarian situation reports matching the query.
pub(crate) struct ReliefWeb;

const HOST: &str = "api.reliefweb.int";

/// Bound on the excerpt taken from a report body.
const MAX_BODY_CHARS: usize = 1_200;

impl WebSource for ReliefWeb {
    fn label(&self) -> &'static str {
        "ReliefWeb"
    }

    fn host(&self) -> &'static str {
        HOST
    }

    fn fetch(&self, terms: &str, timeout: Duration) -> Result<Vec<WebSnippet>, AppError> {
        let body: serde_json::Value = ureq::get(&format!("https://{HOST}/v1/reports"))
            .query("appname", "crisismap")
            .query("query[value]", terms)
            .query("query[operator]", "OR")
            .query("fields[include][]", "title")
            .query("fields[include][]", "body")
            .query("fields[include][]", "url")
            .query("limit", "2")
            .timeout(timeout)
            .call()
            .map_err(|e| {
                AppError::new("SCRAPE_FAILED", "ReliefWeb request failed")
                    .with_details(e.to_string())
                    .with_retryable(true)
            })?
            .into_json()
            .map_err(|e| {
                AppError::new("SCRAPE_FAILED", "Failed to decode ReliefWeb response")
                    .with_details(e.to_string())
            })?;

        let mut out = Vec::new();
        let data = body.get("data").and_then(|v| v.as_array());
        for item in data.into_iter().flatten() {
            let fields = match item.get("fields") {
                Some(f) => f,
                None => continue,
            };
            let title = fields
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let report_body = fields
                .get("body")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if title.is_empty() || report_body.trim().is_empty() {
                continue;
            }
            let url = fields
                .get("url")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            out.push(WebSnippet {
                title,
                source: self.label().to_string(),
                url,
                content: body_excerpt(report_body),
                date_accessed: now_rfc3339(),
            });
        }
        Ok(out)
    }
}

/// Clean a report body and bound it to `MAX_BODY_CHARS`. Report bodies are
/// routinely non-ASCII, so the cut backs up to a char boundary before the
/// word-boundary trim.
fn body_excerpt(body: &str) -> String {
    let mut content = clean_content(body);
    if content.len() > MAX_BODY_CHARS {
        let mut cut = MAX_BODY_CHARS;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content.truncate(cut);
        // Do not cut a word in half.
        if let Some(pos) = content.rfind(' ') {
            content.truncate(pos);
        }
        content.push_str("...");
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_pass_through_cleaned() {
        assert_eq!(
            body_excerpt("Flooding[1] reported  in the region."),
            "Flooding reported in the region."
        );
    }

    #[test]
    fn long_bodies_truncate_at_a_word_boundary() {
        let excerpt = body_excerpt(&"word ".repeat(400));
        assert!(excerpt.len() <= MAX_BODY_CHARS + 3);
        assert!(excerpt.ends_with("..."));
        assert!(!excerpt.trim_end_matches("...").ends_with(|c: char| c.is_whitespace()));
    }

    #[test]
    fn multibyte_text_straddling_the_bound_does_not_split_a_char() {
        // Byte 1200 lands inside the first multibyte char.
        let body = format!("{}日本の火山噴火による被害", "x".repeat(1199));
        let excerpt = body_excerpt(&body);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.len() <= MAX_BODY_CHARS + 3);
    }
}
