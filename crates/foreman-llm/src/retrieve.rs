use async_trait::async_trait;
use foreman_core::ForemanResult;

/// Retrieval-augmented context lookup.
///
/// Implementations return up to `k` text snippets relevant to the query.
/// Retrieval failures degrade the calling prompt, never the operation.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Returns up to `k` snippets relevant to `query`.
    async fn retrieve(&self, query: &str, k: usize) -> ForemanResult<Vec<String>>;
}

/// Retriever that always returns nothing. The default wiring.
pub struct NullRetriever;

#[async_trait]
impl ContextRetriever for NullRetriever {
    async fn retrieve(&self, _query: &str, _k: usize) -> ForemanResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_retriever_returns_empty() {
        let snippets = NullRetriever.retrieve("anything", 5).await.unwrap();
        assert!(snippets.is_empty());
    }
}
