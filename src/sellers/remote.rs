use super::offer::{FulfillmentSignals, SellerOffer, format_price};
use crate::config::OFFERS_ENDPOINT;
use crate::http::build_client;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("unexpected response shape: {0}")]
    Parse(String),
    #[error("no in-stock offers returned")]
    Empty,
}

/// Variables sent with the all-offers query.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfferQuery {
    pub id: String,
    pub selected: bool,
    pub channel: String,
    pub page_type: String,
}

impl OfferQuery {
    pub fn new(product_id: &str, channel: &str, page_type: &str) -> Self {
        Self {
            id: product_id.to_string(),
            selected: true,
            channel: channel.to_string(),
            page_type: page_type.to_string(),
        }
    }
}

/// One entry of `allOffers` as the service returns it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteOffer {
    pub seller_id: Option<String>,
    pub seller_name: Option<String>,
    pub seller_display_name: Option<String>,
    pub price_info: RemotePriceInfo,
    pub availability_status: Option<String>,
    pub fulfillment_type: Option<String>,
    pub wfs_enabled: Option<bool>,
    pub pro_seller: Option<bool>,
    pub shipping_option: Option<RemoteShipping>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RemotePriceInfo {
    pub current_price: Option<RemotePrice>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RemotePrice {
    pub price: Option<f64>,
    pub price_string: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteShipping {
    pub delivery_date: Option<String>,
    pub arrival_date: Option<String>,
}

impl RemoteOffer {
    pub fn is_in_stock(&self) -> bool {
        self.availability_status.as_deref() == Some("IN_STOCK")
    }

    pub fn into_seller_offer(self) -> SellerOffer {
        let price = self.price_info.current_price.and_then(|p| {
            p.price_string
                .filter(|s| !s.trim().is_empty())
                .or_else(|| p.price.and_then(format_price))
        });
        let mut signals = FulfillmentSignals::from_fulfillment_type(self.fulfillment_type.as_deref());
        if self.wfs_enabled == Some(true) {
            signals = FulfillmentSignals {
                platform_fulfilled: true,
                seller_fulfilled: false,
            };
        }
        let arrival = self
            .shipping_option
            .and_then(|s| s.delivery_date.or(s.arrival_date));

        SellerOffer::new(self.seller_display_name.or(self.seller_name), price)
            .with_seller_id(self.seller_id)
            .with_signals(signals)
            .with_pro_seller(self.pro_seller.unwrap_or(false))
            .with_arrival(arrival)
    }
}

/// A source of the full offer list for a product.
#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<RemoteOffer>, RemoteError>;
}

/// The storefront's GraphQL all-offers endpoint.
pub struct GraphQlOfferSource {
    http: Client,
    endpoint: String,
}

impl GraphQlOfferSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: build_client(),
            endpoint: endpoint.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(OFFERS_ENDPOINT.as_str())
    }
}

#[async_trait]
impl OfferSource for GraphQlOfferSource {
    async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<RemoteOffer>, RemoteError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-o-gql-query", "query GetAllSellerOffers")
            .json(&json!({ "variables": query }))
            .send()
            .await
            .map_err(|err| RemoteError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status().as_u16()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| RemoteError::Parse(err.to_string()))?;
        parse_offers_response(body)
    }
}

/// Read `data.product.allOffers` out of a response body. Entries that do
/// not fit the offer shape are dropped one by one.
pub fn parse_offers_response(body: Value) -> Result<Vec<RemoteOffer>, RemoteError> {
    let items = match body.pointer("/data/product/allOffers") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => {
            let message = body
                .pointer("/errors/0/message")
                .and_then(Value::as_str)
                .unwrap_or("missing data.product.allOffers");
            return Err(RemoteError::Parse(message.to_string()));
        }
        Some(other) => return Err(RemoteError::Parse(format!("allOffers is {other}"))),
    };
    Ok(items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match RemoteOffer::deserialize(item) {
            Ok(offer) => Some(offer),
            Err(err) => {
                warn!(target = "sellerscope.sellers", index, error = %err, "remote_offer_dropped");
                None
            }
        })
        .collect())
}
