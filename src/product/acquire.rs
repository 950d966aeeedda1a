use super::models::RawPayload;
use crate::cache::TtlCache;
use crate::page::PageSession;
use crate::retry::with_retry;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, info, warn};

pub const PAYLOAD_SELECTOR: &str = "script#__NEXT_DATA__";
const DATA_POINTER: &str = "/props/pageProps/initialData/data";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AcquireError {
    #[error("page snapshot unavailable")]
    NoSnapshot,
    #[error("embedded data container not found")]
    ContainerMissing,
    #[error("embedded data is not valid json: {0}")]
    Malformed(String),
    #[error("embedded data has no product object")]
    MissingProduct,
    #[error("product object carries no identity")]
    MissingIdentity,
}

/// Outcome of one acquisition cycle. `Unavailable` means "no data this
/// cycle", not a failure of the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Available {
        payload: RawPayload,
        attempts: u32,
        cached: bool,
    },
    Unavailable {
        attempts: u32,
        reason: AcquireError,
    },
}

pub struct Acquirer {
    cache: Arc<TtlCache<String, RawPayload>>,
}

impl Acquirer {
    pub fn new(cache: Arc<TtlCache<String, RawPayload>>) -> Self {
        Self { cache }
    }

    /// Locate and parse the embedded payload, retrying up to `max_retries`
    /// times after the first attempt with `retry_delay` between attempts.
    ///
    /// When the page URL carries an item id that is still cached, the page is
    /// not read at all.
    pub async fn acquire(
        &self,
        session: &dyn PageSession,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Acquisition {
        let url_identity = session
            .location()
            .await
            .as_deref()
            .and_then(product_id_from_url);
        if let Some(id) = url_identity.as_ref()
            && let Some(payload) = self.cache.get(id)
        {
            debug!(target = "sellerscope.acquire", product_id = %id, "raw_cache_hit");
            return Acquisition::Available {
                payload,
                attempts: 0,
                cached: true,
            };
        }

        let result = with_retry(
            |attempt| async move {
                let outcome = match session.snapshot().await {
                    Some(html) => parse_payload(&html),
                    None => Err(AcquireError::NoSnapshot),
                };
                if let Err(err) = &outcome {
                    debug!(target = "sellerscope.acquire", attempt, error = %err, "payload_attempt_failed");
                }
                outcome.map(|payload| (payload, attempt))
            },
            max_retries.saturating_add(1),
            retry_delay,
        )
        .await;

        match result {
            Ok((payload, attempts)) => {
                self.cache.set(payload.product_id.clone(), payload.clone());
                info!(target = "sellerscope.acquire", product_id = %payload.product_id, attempts, "payload_acquired");
                Acquisition::Available {
                    payload,
                    attempts,
                    cached: false,
                }
            }
            Err(exhausted) => {
                warn!(target = "sellerscope.acquire", attempts = exhausted.attempts, error = %exhausted.last_error, "payload_unavailable");
                Acquisition::Unavailable {
                    attempts: exhausted.attempts,
                    reason: exhausted.last_error,
                }
            }
        }
    }
}

/// Pull the product data object out of a page's embedded script.
pub fn parse_payload(html: &str) -> Result<RawPayload, AcquireError> {
    let text = {
        let document = Html::parse_document(html);
        let selector =
            Selector::parse(PAYLOAD_SELECTOR).map_err(|_| AcquireError::ContainerMissing)?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .ok_or(AcquireError::ContainerMissing)?
    };

    let root: Value =
        serde_json::from_str(text.trim()).map_err(|err| AcquireError::Malformed(err.to_string()))?;
    let data = root
        .pointer(DATA_POINTER)
        .filter(|data| data.get("product").is_some_and(Value::is_object))
        .cloned()
        .ok_or(AcquireError::MissingProduct)?;

    let product_id = ["/product/usItemId", "/product/id"]
        .iter()
        .find_map(|ptr| match data.pointer(ptr) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or(AcquireError::MissingIdentity)?;

    Ok(RawPayload { product_id, data })
}

/// Item id from a product page URL of the form `/ip/<slug>/<id>` or
/// `/ip/<id>`.
pub fn product_id_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    segments.find(|s| *s == "ip")?;
    let last = segments.last()?;
    let decoded = urlencoding::decode(last).ok()?;
    let id = decoded.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{Value, json};

    pub fn page_with(data: Value) -> String {
        let next_data = json!({ "props": { "pageProps": { "initialData": { "data": data } } } });
        format!(
            "<html><head><script id=\"__NEXT_DATA__\" type=\"application/json\">{next_data}</script></head><body></body></html>"
        )
    }
}
