pub mod fields;
pub mod snapshot;
pub mod webdriver;

#[cfg(test)]
pub mod testing;

pub use fields::FieldExtractor;
pub use snapshot::SnapshotPage;
pub use webdriver::WebDriverPage;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("webdriver request failed: {0}")]
    Request(String),
    #[error("webdriver returned an error: {0}")]
    Driver(String),
    #[error("invalid page url: {0}")]
    InvalidUrl(String),
}

/// Notification that something under an observed subtree changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation;

/// Live subscription to DOM mutations. Dropping it disconnects the observer.
pub struct MutationFeed {
    rx: mpsc::UnboundedReceiver<Mutation>,
}

impl MutationFeed {
    pub fn new(rx: mpsc::UnboundedReceiver<Mutation>) -> Self {
        Self { rx }
    }

    /// A feed that never delivers anything.
    pub fn closed() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self { rx }
    }

    /// Next mutation, or `None` once the page side has gone away.
    pub async fn next(&mut self) -> Option<Mutation> {
        self.rx.recv().await
    }

    pub fn disconnect(mut self) {
        self.rx.close();
    }
}

/// The host document the extractor runs against.
///
/// Everything the pipeline needs from a page goes through these calls, so
/// the same reconciliation logic drives a captured snapshot, a live
/// WebDriver session or a scripted test double.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Current document URL, when known.
    async fn location(&self) -> Option<String>;

    /// Serialized markup of the whole document.
    async fn snapshot(&self) -> Option<String>;

    async fn exists(&self, selector: &str) -> bool;

    /// Click the first element matching `selector`. Returns `false` when no
    /// element matched or the page is not interactive.
    async fn click(&self, selector: &str) -> bool;

    /// Subscribe to mutations under the first element matching `selector`.
    async fn observe(&self, selector: &str) -> MutationFeed;
}
