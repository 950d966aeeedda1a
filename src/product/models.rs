use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// The embedded page data for one product, as found on the page.
///
/// `data` is the object that carries `product`, and optionally `idml` and
/// `reviews`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawPayload {
    pub product_id: String,
    pub data: Value,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub model: String,
    pub upc: String,
    pub current_price: f64,
    pub price_display: Option<String>,
    pub dimensions: Dimensions,
    pub main_category: String,
    pub category_path: Vec<String>,
    pub images: Vec<String>,
    pub badges: Vec<String>,
    pub reviews: ReviewSummary,
    pub inventory: Inventory,
    pub primary_offer: PrimaryOffer,
}

/// Physical attributes in inches and pounds. Unresolved values stay at `0`.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub weight: f64,
    pub size_source: Option<AttributeSource>,
    pub weight_source: Option<AttributeSource>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    Highlights,
    Specifications,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub count: u64,
    pub recent_count: u64,
    pub average_rating: f64,
    pub submission_times: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStock {
    pub channel: String,
    pub available_quantity: u64,
}

/// Per-channel availability plus the offer counts the seller total derives
/// from. Totals are always computed from these fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub channels: Vec<ChannelStock>,
    pub additional_offer_count: u32,
    pub buy_box_suppressed: bool,
}

impl Inventory {
    pub fn total_stock(&self) -> u64 {
        self.channels
            .iter()
            .fold(0u64, |total, c| total.saturating_add(c.available_quantity))
    }

    pub fn total_sellers(&self) -> u32 {
        if self.buy_box_suppressed {
            self.additional_offer_count
        } else {
            self.additional_offer_count.saturating_add(1)
        }
    }
}

/// The buy-box offer as described by the page data itself.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryOffer {
    pub seller_name: Option<String>,
    pub seller_id: Option<String>,
    pub fulfillment_type: Option<String>,
    pub is_pro_seller: bool,
    pub arrival_estimate: Option<String>,
}
