use super::{Mutation, MutationFeed, PageSession};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;

/// Interactive page double.
///
/// Clicking a registered selector swaps in new markup. Tests push markup
/// changes through [`ScriptedPage::mutate`], which also notifies any live
/// observer.
pub struct ScriptedPage {
    url: Option<String>,
    html: Mutex<String>,
    on_click: Mutex<Vec<(String, String)>>,
    clicks: Mutex<Vec<String>>,
    snapshots: AtomicU32,
    observer: Mutex<Option<mpsc::UnboundedSender<Mutation>>>,
}

impl ScriptedPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            url: None,
            html: Mutex::new(html.into()),
            on_click: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
            snapshots: AtomicU32::new(0),
            observer: Mutex::new(None),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    /// Replace the document with `html` the first time `selector` is clicked.
    pub fn on_click(self, selector: &str, html: impl Into<String>) -> Self {
        self.on_click
            .lock()
            .unwrap()
            .push((selector.to_string(), html.into()));
        self
    }

    /// Replace the document and notify the observer, if one is attached.
    pub fn mutate(&self, html: impl Into<String>) {
        *self.html.lock().unwrap() = html.into();
        if let Some(tx) = self.observer.lock().unwrap().as_ref() {
            let _ = tx.send(Mutation);
        }
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn snapshot_count(&self) -> u32 {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn is_observed(&self) -> bool {
        self.observer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn matches(&self, selector: &str) -> bool {
        let Ok(parsed) = Selector::parse(selector) else {
            return false;
        };
        let html = self.html.lock().unwrap().clone();
        Html::parse_document(&html).select(&parsed).next().is_some()
    }
}

#[async_trait]
impl PageSession for ScriptedPage {
    async fn location(&self) -> Option<String> {
        self.url.clone()
    }

    async fn snapshot(&self) -> Option<String> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        Some(self.html.lock().unwrap().clone())
    }

    async fn exists(&self, selector: &str) -> bool {
        self.matches(selector)
    }

    async fn click(&self, selector: &str) -> bool {
        self.clicks.lock().unwrap().push(selector.to_string());
        if !self.matches(selector) {
            return false;
        }
        let swap = {
            let mut handlers = self.on_click.lock().unwrap();
            handlers
                .iter()
                .position(|(target, _)| target == selector)
                .map(|idx| handlers.remove(idx).1)
        };
        if let Some(next) = swap {
            self.mutate(next);
        }
        true
    }

    async fn observe(&self, selector: &str) -> MutationFeed {
        if !self.matches(selector) {
            return MutationFeed::closed();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.observer.lock().unwrap() = Some(tx);
        MutationFeed::new(rx)
    }
}
