use crate::assemble::ExtractionRecord;
use crate::sellers::{FulfillmentClass, SellerOffer, SkippedStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// One page to extract. Exactly one of `html` or `url` drives the run; when
/// both are present the captured `html` wins and `url` only supplies the
/// page location.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractRequest {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionResponse {
    pub extraction_id: String,
    pub status: ExtractionStatus,
    pub record: Option<ExtractionRecord>,
    pub unavailable_reason: Option<String>,
    #[serde(default)]
    pub skipped_strategies: Vec<SkippedStrategy>,
    pub stages: Vec<StageReport>,
}

/// `Unavailable` is a normal outcome: the page carried no usable product
/// data after every retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Complete,
    Unavailable,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeRequest {
    /// The object found at `props.pageProps.initialData.data`.
    pub data: Value,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyRequest {
    pub brand: String,
    pub offers: Vec<SellerOffer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyResponse {
    pub offers: Vec<SellerOffer>,
    pub classes: Vec<FulfillmentClass>,
}
