use super::{MutationFeed, PageSession};
use async_trait::async_trait;
use scraper::{Html, Selector};

/// A captured, non-interactive document.
///
/// Clicks never land and no mutations are ever observed, so any UI-gated
/// data is only visible if it was already rendered when the page was
/// captured.
#[derive(Debug, Clone)]
pub struct SnapshotPage {
    html: String,
    url: Option<String>,
}

impl SnapshotPage {
    pub fn new(html: impl Into<String>, url: Option<String>) -> Self {
        Self {
            html: html.into(),
            url: url.filter(|u| !u.trim().is_empty()),
        }
    }
}

#[async_trait]
impl PageSession for SnapshotPage {
    async fn location(&self) -> Option<String> {
        self.url.clone()
    }

    async fn snapshot(&self) -> Option<String> {
        Some(self.html.clone())
    }

    async fn exists(&self, selector: &str) -> bool {
        let Ok(parsed) = Selector::parse(selector) else {
            return false;
        };
        Html::parse_document(&self.html)
            .select(&parsed)
            .next()
            .is_some()
    }

    async fn click(&self, _selector: &str) -> bool {
        false
    }

    async fn observe(&self, _selector: &str) -> MutationFeed {
        MutationFeed::closed()
    }
}
