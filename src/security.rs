use crate::models::ApiError;
use crate::rate_limit::RateLimiter;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode, header::HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, env, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const API_KEY_HEADER: &str = "X-Sellerscope-Key";

#[derive(Clone)]
pub struct AuthState {
    records: Arc<HashMap<String, OrgRecord>>,
    limits: Arc<OrgLimits>,
}

#[derive(Clone, Debug)]
pub struct AuthContext {
    pub org_id: String,
    pub api_key_id: String,
}

#[derive(Clone)]
struct OrgRecord {
    org_id: String,
    api_key_id: String,
}

impl AuthState {
    pub fn from_env() -> Self {
        let records = parse_keys(&env::var("API_KEYS").unwrap_or_default());
        let max = env::var("API_RATE_LIMIT_MAX")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(60);
        let window = env::var("API_RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(60);
        Self::new(records, max, Duration::from_secs(window))
    }

    fn new(records: HashMap<String, OrgRecord>, max: usize, window: Duration) -> Self {
        Self {
            records: Arc::new(records),
            limits: Arc::new(OrgLimits {
                max,
                window,
                limiters: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn authenticate(&self, presented: &str) -> Option<AuthContext> {
        self.records.get(presented).map(|record| AuthContext {
            org_id: record.org_id.clone(),
            api_key_id: record.api_key_id.clone(),
        })
    }
}

/// One sliding window per organisation.
struct OrgLimits {
    max: usize,
    window: Duration,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl OrgLimits {
    async fn admit(&self, org_id: &str) -> Result<RateStatus, RateStatus> {
        let limiter = {
            let mut guard = self.limiters.lock().await;
            guard
                .entry(org_id.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(self.max, self.window)))
                .clone()
        };
        let admitted = limiter.try_acquire();
        let status = RateStatus {
            limit: limiter.max(),
            remaining: limiter.remaining(),
            retry_after: limiter.retry_after(),
        };
        if admitted { Ok(status) } else { Err(status) }
    }
}

#[derive(Debug, Clone)]
struct RateStatus {
    limit: usize,
    remaining: usize,
    retry_after: Duration,
}

impl RateStatus {
    fn apply_headers(&self, headers: &mut http::HeaderMap, denied: bool) {
        let reset = self.retry_after.as_secs_f64().ceil() as u64;
        headers.insert("X-RateLimit-Limit", header_number(self.limit as u64));
        headers.insert("X-RateLimit-Remaining", header_number(self.remaining as u64));
        headers.insert("X-RateLimit-Reset", header_number(reset));
        if denied {
            headers.insert(http::header::RETRY_AFTER, header_number(reset.max(1)));
        }
    }
}

fn header_number(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

pub async fn require_api_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_api_key(request.headers()) else {
        return Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "missing_api_key",
            "Provide X-Sellerscope-Key or Bearer token",
        ));
    };

    let Some(context) = state.authenticate(&presented) else {
        return Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_api_key",
            "Key not recognized",
        ));
    };

    match state.limits.admit(&context.org_id).await {
        Ok(status) => {
            request.extensions_mut().insert(context);
            let mut response = next.run(request).await;
            status.apply_headers(response.headers_mut(), false);
            Ok(response)
        }
        Err(status) => {
            warn!(target = "sellerscope.api", org_id = %context.org_id, "api_rate_limited");
            let mut response =
                error_response(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "Too many requests");
            status.apply_headers(response.headers_mut(), true);
            Ok(response)
        }
    }
}

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (status, Json(payload)).into_response()
}

/// `org:key` pairs separated by commas. An empty or fully malformed list
/// falls back to the local development key.
fn parse_keys(raw: &str) -> HashMap<String, OrgRecord> {
    let mut entries = HashMap::new();
    for (idx, token) in raw.split(',').enumerate() {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ':');
        let org_id = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let key = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (org_id, key) {
            (Some(org), Some(secret)) => {
                entries.insert(
                    secret.to_string(),
                    OrgRecord {
                        org_id: org.to_string(),
                        api_key_id: format!("key-{:02}", idx + 1),
                    },
                );
            }
            _ => warn!(target = "sellerscope.api", "ignored malformed API_KEYS entry"),
        }
    }

    if entries.is_empty() {
        warn!(
            target = "sellerscope.api",
            "API_KEYS produced no keys; falling back to dev credentials"
        );
        entries.insert(
            "dev-key".to_string(),
            OrgRecord {
                org_id: "dev-org".to_string(),
                api_key_id: "key-01".to_string(),
            },
        );
    } else {
        info!(target = "sellerscope.api", key_count = entries.len(), "loaded API keys");
    }
    entries
}
