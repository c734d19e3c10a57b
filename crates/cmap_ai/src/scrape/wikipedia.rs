use std::time::Duration;

use cmap_core::error::AppError;

use super::{clean_content, now_rfc3339, WebSnippet, WebSource};

/// Wikipedia: opensearch for the best-matching page, then the REST summary
/// endpoint for its extract. Both calls return JSON, no HTML parsing.
pub(crate) struct Wikipedia;

const HOST: &str = "en.wikipedia.org";

impl WebSource for Wikipedia {
    fn label(&self) -> &'static str {
        "Wikipedia"
    }

    fn host(&self) -> &'static str {
        HOST
    }

    fn fetch(&self, terms: &str, timeout: Duration) -> Result<Vec<WebSnippet>, AppError> {
        let search: serde_json::Value = ureq::get(&format!("https://{HOST}/w/api.php"))
            .query("action", "opensearch")
            .query("search", terms)
            .query("limit", "1")
            .query("namespace", "0")
            .query("format", "json")
            .timeout(timeout)
            .call()
            .map_err(|e| {
                AppError::new("SCRAPE_FAILED", "Wikipedia opensearch request failed")
                    .with_details(e.to_string())
                    .with_retryable(true)
            })?
            .into_json()
            .map_err(|e| {
                AppError::new("SCRAPE_FAILED", "Failed to decode Wikipedia opensearch response")
                    .with_details(e.to_string())
            })?;

        // Opensearch shape: [query, [titles], [descriptions], [urls]].
        let title = search
            .get(1)
            .and_then(|v| v.get(0))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let url = search
            .get(3)
            .and_then(|v| v.get(0))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        if title.is_empty() {
            return Ok(Vec::new());
        }

        let summary: serde_json::Value =
            ureq::get(&format!("https://{HOST}/api/rest_v1/page/summary/{}", encode_title(&title)))
                .timeout(timeout)
                .call()
                .map_err(|e| {
                    AppError::new("SCRAPE_FAILED", "Wikipedia summary request failed")
                        .with_details(format!("title={title}; err={e}"))
                        .with_retryable(true)
                })?
                .into_json()
                .map_err(|e| {
                    AppError::new("SCRAPE_FAILED", "Failed to decode Wikipedia summary response")
                        .with_details(format!("title={title}; err={e}"))
                })?;

        let extract = summary
            .get("extract")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if extract.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![WebSnippet {
            title,
            source: self.label().to_string(),
            url,
            content: clean_content(extract),
            date_accessed: now_rfc3339(),
        }])
    }
}

/// Page titles use underscores for spaces; other reserved characters are
/// percent-encoded conservatively.
fn encode_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            ' ' => out.push('_'),
            c if c.is_ascii_alphanumeric() || "-_.~()".contains(c) => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).as_bytes() {
                    out.push_str(&format!("%{b:02X}"));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_encoded_for_the_summary_endpoint() {
        assert_eq!(encode_title("1883 eruption of Krakatoa"), "1883_eruption_of_Krakatoa");
        assert_eq!(encode_title("Mount St. Helens"), "Mount_St._Helens");
        assert_eq!(encode_title("a/b"), "a%2Fb");
    }
}
