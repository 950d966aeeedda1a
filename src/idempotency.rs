use crate::models::ExtractionResponse;
use redis::AsyncCommands;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

const KEY_PREFIX: &str = "sellerscope:idem:";

/// Replays the response of an earlier request that carried the same
/// `Idempotency-Key`. Redis is used when configured, otherwise an
/// in-process map with the same TTL.
#[derive(Clone)]
pub struct IdempotencyStore {
    redis: Option<redis::Client>,
    local: Arc<Mutex<HashMap<String, (Instant, ExtractionResponse)>>>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(redis: Option<redis::Client>, ttl: Duration) -> Self {
        Self {
            redis,
            local: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn from_env() -> Self {
        let redis = std::env::var("REDIS_URL")
            .ok()
            .and_then(|u| redis::Client::open(u).ok());
        let ttl = std::env::var("IDEMPOTENCY_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(86_400);
        Self::new(redis, Duration::from_secs(ttl))
    }

    pub async fn get(&self, org_id: &str, key: &str) -> Option<ExtractionResponse> {
        let scoped = scoped_key(org_id, key);
        if let Some(client) = &self.redis {
            return redis_get(client, &scoped).await;
        }
        let mut guard = self.local.lock().await;
        match guard.get(&scoped) {
            Some((stored_at, resp)) if stored_at.elapsed() < self.ttl => Some(resp.clone()),
            Some(_) => {
                guard.remove(&scoped);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, org_id: &str, key: &str, response: &ExtractionResponse) {
        let scoped = scoped_key(org_id, key);
        if let Some(client) = &self.redis {
            redis_set(client, &scoped, response, self.ttl.as_secs()).await;
            return;
        }
        let mut guard = self.local.lock().await;
        let ttl = self.ttl;
        guard.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        guard.insert(scoped, (Instant::now(), response.clone()));
    }
}

fn scoped_key(org_id: &str, key: &str) -> String {
    format!("{KEY_PREFIX}{org_id}:{key}")
}

async fn redis_get(client: &redis::Client, key: &str) -> Option<ExtractionResponse> {
    let mut conn = match client.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(err) => {
            debug!(target = "sellerscope.idempotency", error = %err, "redis_unavailable");
            return None;
        }
    };
    let s: Option<String> = conn.get(key).await.ok();
    s.and_then(|v| serde_json::from_str(&v).ok())
}

async fn redis_set(client: &redis::Client, key: &str, value: &ExtractionResponse, ttl_secs: u64) {
    if let Ok(mut conn) = client.get_multiplexed_async_connection().await
        && let Ok(json) = serde_json::to_string(value)
    {
        let _: Result<(), _> = conn.set_ex(key, json, ttl_secs).await;
    }
}
