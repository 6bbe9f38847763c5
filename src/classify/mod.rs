//! Optional news classification.
//!
//! A [`Classifier`] tags news items with relevance, category, severity and a
//! short reason. The runner treats any failure here as "zero results"; with
//! no classifier configured the news path is skipped.

pub mod fulltext;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Locality;
use crate::sources::NewsItem;

pub use fulltext::ArticleFetcher;
pub use openai::OpenAiClassifier;

/// A news item plus the classifier's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    #[serde(flatten)]
    pub item: NewsItem,
    pub relevant: bool,
    pub category: String,
    pub reason: String,
    /// 1 = info, 2 = watch, 3 = warning.
    pub severity: u8,
}

#[derive(Debug, Clone)]
pub struct ClassifyRequest<'a> {
    pub location_id: &'a str,
    pub geo_terms: &'a [String],
    pub locality: &'a Locality,
    pub items: &'a [NewsItem],
    pub max_items: usize,
    pub max_chars: usize,
}

impl ClassifyRequest<'_> {
    /// The slice actually sent: at most `max_items`, never fewer than one.
    pub fn batch(&self) -> &[NewsItem] {
        let n = self.max_items.max(1).min(self.items.len());
        &self.items[..n]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifyMeta {
    pub used: bool,
    pub model: Option<String>,
    pub input: usize,
    pub kept: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyOutcome {
    /// Items the classifier marked relevant.
    pub items: Vec<ClassifiedItem>,
    pub meta: ClassifyMeta,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;
    async fn classify(&self, req: &ClassifyRequest<'_>) -> Result<ClassifyOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_is_bounded_but_never_empty() {
        let items = vec![NewsItem::default(); 3];
        let locality = Locality::default();
        let req = ClassifyRequest {
            location_id: "home",
            geo_terms: &[],
            locality: &locality,
            items: &items,
            max_items: 2,
            max_chars: 100,
        };
        assert_eq!(req.batch().len(), 2);

        let zero = ClassifyRequest { max_items: 0, ..req };
        assert_eq!(zero.batch().len(), 1);
        let empty = ClassifyRequest { items: &[], ..zero };
        assert!(empty.batch().is_empty());
    }
}
