use super::{Mutation, MutationFeed, PageError, PageSession};
use crate::http::build_client;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{Duration, sleep},
};
use tracing::{debug, warn};

const OBSERVE_POLL_INTERVAL: Duration = Duration::from_millis(150);

const EXISTS_SCRIPT: &str = "return document.querySelector(arguments[0]) !== null;";
const CLICK_SCRIPT: &str = r#"
    const el = document.querySelector(arguments[0]);
    if (!el) { return false; }
    el.click();
    return true;
"#;
const SNAPSHOT_SCRIPT: &str =
    "return document.documentElement ? document.documentElement.outerHTML : '';";
const SUBTREE_SCRIPT: &str = r#"
    const el = document.querySelector(arguments[0]);
    return el ? el.outerHTML : '';
"#;

/// A live browser tab driven over the W3C WebDriver protocol.
///
/// The session is created on [`WebDriverPage::open`] and must be released
/// with [`WebDriverPage::close`].
#[derive(Clone)]
pub struct WebDriverPage {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    endpoint: String,
    session_id: String,
}

impl WebDriverPage {
    pub async fn open(endpoint: &str, url: &str) -> Result<Self, PageError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| PageError::InvalidUrl(url.into()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PageError::InvalidUrl(url.into()));
        }

        let http = build_client();
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--headless=new", "--disable-gpu", "--window-size=1366,900"]
                    }
                }
            }
        });
        let created = post_json(&http, &format!("{endpoint}/session"), &capabilities).await?;
        let session_id = created
            .pointer("/value/sessionId")
            .or_else(|| created.get("sessionId"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PageError::Driver("missing sessionId".into()))?;

        let page = Self {
            inner: Arc::new(Inner {
                http,
                endpoint,
                session_id,
            }),
        };
        if let Err(err) = page.navigate(parsed.as_str()).await {
            page.close().await;
            return Err(err);
        }
        debug!(target = "sellerscope.page", session = %page.inner.session_id, url = %parsed, "webdriver_session_ready");
        Ok(page)
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let target = format!(
            "{}/session/{}/url",
            self.inner.endpoint, self.inner.session_id
        );
        post_json(&self.inner.http, &target, &json!({ "url": url })).await?;
        Ok(())
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value, PageError> {
        self.inner.execute(script, args).await
    }

    pub async fn close(&self) {
        let target = format!("{}/session/{}", self.inner.endpoint, self.inner.session_id);
        if let Err(err) = self.inner.http.delete(target).send().await {
            warn!(target = "sellerscope.page", session = %self.inner.session_id, error = %err, "webdriver_delete_failed");
        }
    }
}

impl Inner {
    async fn execute(&self, script: &str, args: Value) -> Result<Value, PageError> {
        let target = format!(
            "{}/session/{}/execute/sync",
            self.endpoint, self.session_id
        );
        let body = post_json(&self.http, &target, &json!({ "script": script, "args": args })).await?;
        Ok(body.get("value").cloned().unwrap_or(Value::Null))
    }
}

async fn post_json(http: &Client, url: &str, body: &Value) -> Result<Value, PageError> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|err| PageError::Request(err.to_string()))?;
    let status = response.status();
    let value: Value = response
        .json()
        .await
        .map_err(|err| PageError::Request(err.to_string()))?;
    if let Some(err) = value.pointer("/value/error").and_then(Value::as_str) {
        let message = value
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown webdriver error");
        return Err(PageError::Driver(format!("{err}: {message}")));
    }
    if !status.is_success() {
        return Err(PageError::Driver(format!("HTTP {}", status.as_u16())));
    }
    Ok(value)
}

#[async_trait]
impl PageSession for WebDriverPage {
    async fn location(&self) -> Option<String> {
        self.execute("return window.location.href || '';", json!([]))
            .await
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|v| !v.is_empty())
    }

    async fn snapshot(&self) -> Option<String> {
        match self.execute(SNAPSHOT_SCRIPT, json!([])).await {
            Ok(value) => value
                .as_str()
                .map(str::to_string)
                .filter(|v| !v.is_empty()),
            Err(err) => {
                warn!(target = "sellerscope.page", error = %err, "webdriver_snapshot_failed");
                None
            }
        }
    }

    async fn exists(&self, selector: &str) -> bool {
        self.execute(EXISTS_SCRIPT, json!([selector]))
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn click(&self, selector: &str) -> bool {
        self.execute(CLICK_SCRIPT, json!([selector]))
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// WebDriver has no push channel for DOM mutations, so the subtree's
    /// markup is polled and every change is reported as one mutation.
    async fn observe(&self, selector: &str) -> MutationFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        let selector = selector.to_string();
        tokio::spawn(async move {
            let mut last: Option<String> = None;
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = sleep(OBSERVE_POLL_INTERVAL) => {}
                }
                let current = match inner.execute(SUBTREE_SCRIPT, json!([selector])).await {
                    Ok(value) => value.as_str().unwrap_or_default().to_string(),
                    Err(_) => break,
                };
                if last.as_ref().is_some_and(|prev| *prev != current) && tx.send(Mutation).is_err() {
                    break;
                }
                last = Some(current);
            }
        });
        MutationFeed::new(rx)
    }
}
