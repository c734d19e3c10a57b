use cmap_core::error::AppError;

/// Client for the local Ollama runtime. Strictly limited to `127.0.0.1`:
/// model traffic never leaves the machine.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let valid = if base_url == "http://127.0.0.1" {
            true
        } else if let Some(port) = base_url.strip_prefix("http://127.0.0.1:") {
            // Reject suffixed hosts ("127.0.0.1.evil.com"), paths, and bad ports.
            matches!(port.parse::<u16>(), Ok(p) if p > 0)
        } else {
            false
        };

        if !valid {
            return Err(AppError::new(
                "MODEL_REMOTE_NOT_ALLOWED",
                "Model runtime base URL must be localhost (127.0.0.1)",
            )
            .with_details(format!("base_url={base_url}")));
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url)
            .timeout(std::time::Duration::from_millis(800))
            .call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new("MODEL_UNHEALTHY", "Model runtime health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(AppError::new(
                "MODEL_UNREACHABLE",
                "Failed to reach model runtime on 127.0.0.1",
            )
            .with_details(e.to_string())
            .with_retryable(true)),
        }
    }
}
