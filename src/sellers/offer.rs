use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

pub const UNKNOWN_SELLER: &str = "Unknown Seller";
pub const PRICE_UNAVAILABLE: &str = "N/A";
pub const ARRIVAL_UNKNOWN: &str = "N/A";

// "walmart" must end on a word boundary so seller names that merely start
// with it stay third-party.
static PLATFORM_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:(?:fulfilled|shipped) by walmart|walmart fulfillment services)\b")
        .expect("platform fulfillment pattern")
});

/// Who ships an offer and under whose logistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FulfillmentClass {
    /// Sold by the storefront itself.
    #[serde(rename = "WMT")]
    Wmt,
    BrandFulfilled,
    BrandSelfFulfilled,
    BrandUnknown,
    PlatformFulfilled,
    SelfFulfilled,
    #[default]
    Unknown,
}

/// Fulfillment indicators observed for one offer. Both may be false when
/// the source said nothing either way.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentSignals {
    pub platform_fulfilled: bool,
    pub seller_fulfilled: bool,
}

impl FulfillmentSignals {
    /// Interpret a page or API fulfillment type code.
    pub fn from_fulfillment_type(code: Option<&str>) -> Self {
        let code = code.map(|c| c.trim().to_uppercase()).unwrap_or_default();
        match code.as_str() {
            "FC" | "WFS" | "WALMART_FULFILLED" => Self {
                platform_fulfilled: true,
                seller_fulfilled: false,
            },
            "SELLER" | "MARKETPLACE" | "SELLER_FULFILLED" => Self {
                platform_fulfilled: false,
                seller_fulfilled: true,
            },
            _ => Self::default(),
        }
    }

    /// Interpret free text shown next to an offer, e.g. "Sold and shipped by
    /// Acme" or "Fulfilled by Walmart".
    pub fn from_text(text: &str) -> Self {
        let platform_fulfilled = PLATFORM_TEXT.is_match(text);
        let seller_fulfilled = !platform_fulfilled && text.to_lowercase().contains("sold and shipped by");
        Self {
            platform_fulfilled,
            seller_fulfilled,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SellerOffer {
    #[serde(default = "unknown_seller")]
    pub seller_name: String,
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default = "unavailable")]
    pub price: String,
    #[serde(default)]
    pub fulfillment_class: FulfillmentClass,
    #[serde(default)]
    pub is_pro_seller: bool,
    #[serde(default = "unavailable")]
    pub arrival_estimate: String,
    #[serde(default)]
    pub signals: FulfillmentSignals,
}

fn unknown_seller() -> String {
    UNKNOWN_SELLER.to_string()
}

fn unavailable() -> String {
    PRICE_UNAVAILABLE.to_string()
}

impl SellerOffer {
    /// Build an unclassified offer, filling sentinels for missing parts.
    pub fn new(seller_name: Option<String>, price: Option<String>) -> Self {
        Self {
            seller_name: non_blank(seller_name).unwrap_or_else(|| UNKNOWN_SELLER.to_string()),
            seller_id: None,
            price: non_blank(price).unwrap_or_else(|| PRICE_UNAVAILABLE.to_string()),
            fulfillment_class: FulfillmentClass::Unknown,
            is_pro_seller: false,
            arrival_estimate: ARRIVAL_UNKNOWN.to_string(),
            signals: FulfillmentSignals::default(),
        }
    }

    /// The last-resort offer when nothing at all could be resolved.
    pub fn unknown() -> Self {
        Self::new(None, None)
    }

    pub fn with_seller_id(mut self, seller_id: Option<String>) -> Self {
        self.seller_id = non_blank(seller_id);
        self
    }

    pub fn with_arrival(mut self, arrival: Option<String>) -> Self {
        if let Some(arrival) = non_blank(arrival) {
            self.arrival_estimate = arrival;
        }
        self
    }

    pub fn with_signals(mut self, signals: FulfillmentSignals) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_pro_seller(mut self, is_pro_seller: bool) -> Self {
        self.is_pro_seller = is_pro_seller;
        self
    }

    pub fn has_known_seller(&self) -> bool {
        self.seller_name != UNKNOWN_SELLER
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `$12.34` for a positive amount, otherwise nothing.
pub fn format_price(amount: f64) -> Option<String> {
    (amount.is_finite() && amount > 0.0).then(|| format!("${amount:.2}"))
}
