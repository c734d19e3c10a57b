use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use cmap_core::error::AppError;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::PipelineConfig;

pub mod reliefweb;
pub mod wikipedia;

/// Supplementary evidence fetched live from an allow-listed external source.
/// Fetched fresh per request; never cached across requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebSnippet {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
    pub content: String,
    pub date_accessed: String,
}

/// The pipeline's seam for web supplements. Infallible by contract: a fetch
/// that finds nothing returns an empty vec, it never errors the request.
pub trait SupplementFetch: Send + Sync {
    fn fetch(&self, query: &str, deadline: Instant) -> Vec<WebSnippet>;
}

/// One allow-listed external source.
pub(crate) trait WebSource: Send + Sync {
    fn label(&self) -> &'static str;
    fn host(&self) -> &'static str;
    fn fetch(&self, terms: &str, timeout: Duration) -> Result<Vec<WebSnippet>, AppError>;
}

/// Process-local outbound spacing per external host. Scraping etiquette,
/// not a correctness mechanism.
pub struct RateLimiter {
    spacing: Duration,
    last: Mutex<BTreeMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(BTreeMap::new()),
        }
    }

    /// Block until `host` may be contacted again. Returns false when the
    /// required wait would cross `deadline`; the caller then skips the host
    /// without consuming its slot.
    pub fn acquire(&self, host: &str, deadline: Instant) -> bool {
        let wait = {
            let guard = match self.last.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            match guard.get(host) {
                Some(prev) => (*prev + self.spacing).saturating_duration_since(Instant::now()),
                None => Duration::ZERO,
            }
        };

        if Instant::now() + wait >= deadline {
            return false;
        }
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }

        let mut guard = match self.last.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(host.to_string(), Instant::now());
        true
    }
}

/// Fetches short disaster-related snippets from the fixed allow-list of
/// authoritative sources. Per-source failures are logged and swallowed; the
/// pipeline proceeds with whatever subset succeeded.
pub struct WebSupplementFetcher {
    sources: Vec<Box<dyn WebSource>>,
    limiter: RateLimiter,
    source_timeout: Duration,
    ceiling: Duration,
    max_snippets: usize,
}

impl WebSupplementFetcher {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            sources: vec![
                Box::new(wikipedia::Wikipedia),
                Box::new(reliefweb::ReliefWeb),
            ],
            limiter: RateLimiter::new(config.min_host_spacing),
            source_timeout: config.web_source_timeout,
            ceiling: config.web_fetch_ceiling,
            max_snippets: 3,
        }
    }
}

impl SupplementFetch for WebSupplementFetcher {
    fn fetch(&self, query: &str, deadline: Instant) -> Vec<WebSnippet> {
        let stage_deadline = std::cmp::min(deadline, Instant::now() + self.ceiling);
        let terms = prepare_search_terms(query);
        let mut out: Vec<WebSnippet> = Vec::new();

        for source in &self.sources {
            if out.len() >= self.max_snippets {
                break;
            }
            let remaining = stage_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(source = source.label(), "web supplement ceiling reached");
                break;
            }
            if !self.limiter.acquire(source.host(), stage_deadline) {
                debug!(
                    host = source.host(),
                    "skipping host: rate-limit wait would cross the deadline"
                );
                continue;
            }
            let timeout = std::cmp::min(self.source_timeout, remaining);
            match source.fetch(&terms, timeout) {
                Ok(snippets) => {
                    for s in snippets {
                        if s.content.trim().is_empty() {
                            continue;
                        }
                        out.push(s);
                    }
                }
                Err(e) => {
                    // Swallowed on purpose: a dead source must never fail the request.
                    warn!(source = source.label(), error = %e, "web supplement fetch failed");
                }
            }
        }

        out.truncate(self.max_snippets);
        out
    }
}

/// Enrich the raw query with disaster keywords by category, mirroring how
/// the curated sources tag their content.
pub(crate) fn prepare_search_terms(query: &str) -> String {
    let q = query.trim().to_lowercase();
    let suffix = if ["volcano", "eruption", "volcanic"].iter().any(|t| q.contains(t)) {
        "volcanic eruption disaster casualties"
    } else if ["earthquake", "seismic"].iter().any(|t| q.contains(t)) {
        "earthquake magnitude disaster casualties"
    } else if ["tsunami", "tidal wave"].iter().any(|t| q.contains(t)) {
        "tsunami disaster casualties"
    } else if ["hurricane", "cyclone", "typhoon"].iter().any(|t| q.contains(t)) {
        "hurricane cyclone disaster casualties"
    } else if ["flood", "flooding"].iter().any(|t| q.contains(t)) {
        "flood disaster casualties"
    } else if ["wildfire", "fire"].iter().any(|t| q.contains(t)) {
        "wildfire disaster casualties"
    } else {
        "natural disaster casualties"
    };
    format!("{q} {suffix}")
}

/// Strip `[n]` reference markers and collapse runs of whitespace.
pub(crate) fn clean_content(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '[' {
            // Drop a bracketed run of digits ("[12]"); keep anything else.
            let mut digits = String::new();
            let mut consumed = false;
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() {
                    digits.push(next);
                    chars.next();
                } else if next == ']' && !digits.is_empty() {
                    chars.next();
                    consumed = true;
                    break;
                } else {
                    break;
                }
            }
            if !consumed {
                cleaned.push('[');
                cleaned.push_str(&digits);
            }
            continue;
        }
        cleaned.push(c);
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut last_ws = true;
    for c in cleaned.chars() {
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
    out.trim().to_string()
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_are_enriched_by_category() {
        assert!(prepare_search_terms("Krakatoa eruption").contains("volcanic eruption"));
        assert!(prepare_search_terms("2004 tsunami").contains("tsunami disaster"));
        assert!(prepare_search_terms("something else").contains("natural disaster"));
    }

    #[test]
    fn clean_content_strips_references_and_collapses_whitespace() {
        let raw = "The eruption[1] killed\n\n thousands.[23]  More   text [not a ref].";
        assert_eq!(
            clean_content(raw),
            "The eruption killed thousands. More text [not a ref]."
        );
    }

    #[test]
    fn rate_limiter_enforces_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let deadline = Instant::now() + Duration::from_secs(2);

        let start = Instant::now();
        assert!(limiter.acquire("example.org", deadline));
        assert!(limiter.acquire("example.org", deadline));
        assert!(start.elapsed() >= Duration::from_millis(50));

        // A different host is not delayed by the first.
        let other = Instant::now();
        assert!(limiter.acquire("other.org", deadline));
        assert!(other.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn rate_limiter_refuses_waits_past_the_deadline() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(limiter.acquire("example.org", deadline));
        assert!(!limiter.acquire("example.org", deadline));
    }
}
