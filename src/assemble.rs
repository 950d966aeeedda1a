use crate::product::ProductRecord;
use crate::product::models::ChannelStock;
use crate::sellers::{SellerOffer, SellerResolution, Strategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The finished, read-only result for one product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub product: ProductRecord,
    pub inventory: InventorySummary,
    pub sellers: Vec<SellerOffer>,
    pub seller_strategy: Strategy,
    pub fee_inputs: FeeInputs,
    pub assembled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_stock: u64,
    pub total_sellers: u32,
    pub channels: Vec<ChannelStock>,
}

/// What a downstream fee calculator needs and nothing more.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeInputs {
    pub weight: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub current_price: f64,
    pub category: String,
}

impl FeeInputs {
    pub fn from_product(product: &ProductRecord) -> Self {
        Self {
            weight: product.dimensions.weight,
            length: product.dimensions.length,
            width: product.dimensions.width,
            height: product.dimensions.height,
            current_price: product.current_price,
            category: product.main_category.clone(),
        }
    }
}

pub fn assemble(product: ProductRecord, resolution: SellerResolution) -> ExtractionRecord {
    assemble_at(product, resolution, Utc::now())
}

pub fn assemble_at(
    product: ProductRecord,
    resolution: SellerResolution,
    now: DateTime<Utc>,
) -> ExtractionRecord {
    let inventory = InventorySummary {
        total_stock: product.inventory.total_stock(),
        total_sellers: product.inventory.total_sellers(),
        channels: product.inventory.channels.clone(),
    };
    let sellers = if resolution.offers.is_empty() {
        vec![SellerOffer::unknown()]
    } else {
        resolution.offers
    };
    ExtractionRecord {
        fee_inputs: FeeInputs::from_product(&product),
        inventory,
        sellers,
        seller_strategy: resolution.strategy,
        assembled_at: now,
        product,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::models::RawPayload;
    use crate::product::normalize::normalize_as_of;
    use serde_json::json;

    fn product() -> ProductRecord {
        let raw = RawPayload {
            product_id: "77".into(),
            data: json!({
                "product": {
                    "usItemId": "77",
                    "name": "Desk Lamp",
                    "brand": "Lumo",
                    "priceInfo": { "currentPrice": { "price": 24.99 } },
                    "category": { "path": [{ "name": "Home" }, { "name": "Lighting" }] },
                    "fulfillmentOptions": [
                        { "type": "SHIPPING", "availableQuantity": 7 },
                        { "type": "PICKUP", "availableQuantity": 2 }
                    ],
                    "additionalOfferCount": 2
                },
                "idml": { "productHighlights": [
                    { "name": "Dimensions", "value": "10 x 5 x 18 in" },
                    { "name": "Weight", "value": "32 oz" }
                ] }
            }),
        };
        normalize_as_of(&raw, Utc::now(), 30)
    }

    #[test]
    fn merges_product_inventory_and_fee_inputs() {
        let resolution = SellerResolution {
            offers: vec![SellerOffer::new(Some("Lumo".into()), Some("$24.99".into()))],
            strategy: Strategy::RemoteQuery,
            skipped: vec![],
        };
        let record = assemble(product(), resolution);

        assert_eq!(record.inventory.total_stock, 9);
        assert_eq!(record.inventory.total_sellers, 3);
        assert_eq!(record.sellers.len(), 1);
        assert_eq!(record.seller_strategy, Strategy::RemoteQuery);
        assert_eq!(
            record.fee_inputs,
            FeeInputs {
                weight: 2.0,
                length: 10.0,
                width: 5.0,
                height: 18.0,
                current_price: 24.99,
                category: "Home".into(),
            }
        );
    }

    #[test]
    fn never_emits_an_empty_seller_list() {
        let resolution = SellerResolution {
            offers: vec![],
            strategy: Strategy::DomSingle,
            skipped: vec![],
        };
        let record = assemble(product(), resolution);
        assert_eq!(record.sellers, vec![SellerOffer::unknown()]);
    }

    #[test]
    fn serializes_camel_case() {
        let resolution = SellerResolution {
            offers: vec![SellerOffer::unknown()],
            strategy: Strategy::DomSingle,
            skipped: vec![],
        };
        let value = serde_json::to_value(assemble(product(), resolution)).unwrap();
        assert_eq!(value["sellerStrategy"], "dom_single");
        assert_eq!(value["feeInputs"]["currentPrice"], 24.99);
        assert_eq!(value["sellers"][0]["sellerName"], "Unknown Seller");
    }
}
