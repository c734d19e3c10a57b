use cmap_core::error::AppError;

/// Maps text to a fixed-dimension vector. Deterministic for a given model
/// version.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;
}

pub mod ollama_embed;

/// Embed a query for the vector tier: rejects blank input up front and
/// enforces the index dimension on the way out.
pub fn embed_query(
    embedder: &dyn Embedder,
    model: &str,
    query: &str,
    expected_dims: u32,
) -> Result<Vec<f32>, AppError> {
    let q = query.trim();
    if q.is_empty() {
        return Err(AppError::new(
            "EMBEDDINGS_FAILED",
            "Cannot embed an empty query",
        ));
    }
    let v = embedder.embed(model, q)?;
    if v.len() as u32 != expected_dims {
        return Err(AppError::new(
            "EMBEDDINGS_FAILED",
            "Query embedding dims do not match index dims",
        )
        .with_details(format!("expected={}; got={}", expected_dims, v.len())));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder(Vec<f32>);

    impl Embedder for FixedEmbedder {
        fn embed(&self, _model: &str, _input: &str) -> Result<Vec<f32>, AppError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn blank_query_fails_before_the_model_call() {
        let err = embed_query(&FixedEmbedder(vec![1.0]), "m", "   ", 1).unwrap_err();
        assert_eq!(err.code, "EMBEDDINGS_FAILED");
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let err = embed_query(&FixedEmbedder(vec![1.0, 2.0]), "m", "quake", 3).unwrap_err();
        assert_eq!(err.code, "EMBEDDINGS_FAILED");
        assert!(embed_query(&FixedEmbedder(vec![1.0, 2.0]), "m", "quake", 2).is_ok());
    }
}
