//! Interface to the external service that turns a product URL into fields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionTier {
    /// Heuristic page scrape, returns quickly.
    Fast,
    /// Slower model-backed pass over the full page.
    Deep,
}

/// Best-effort product fields. Any of them may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub image_url: Option<String>,
}

impl ExtractedContent {
    /// Drops blank fields so they never overwrite real values.
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            title: keep(self.title),
            description: keep(self.description),
            price: keep(self.price),
            image_url: keep(self.image_url),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.image_url.is_none()
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("extractor returned unusable output: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(
        &self,
        url: &str,
        tier: ExtractionTier,
    ) -> Result<ExtractedContent, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizing_drops_blank_fields() {
        let content = ExtractedContent {
            title: Some("  Lamp ".to_string()),
            description: Some("   ".to_string()),
            price: None,
            image_url: Some(String::new()),
        }
        .normalized();

        assert_eq!(content.title.as_deref(), Some("Lamp"));
        assert!(content.description.is_none());
        assert!(content.image_url.is_none());
        assert!(!content.is_empty());
    }
}
