//! Where seller data lives in the product page markup.
//!
//! Every list is ordered: the first entry is the current layout, later
//! entries cover older or A/B variants.

use crate::page::FieldExtractor;
use once_cell::sync::Lazy;

/// The "compare all sellers" side panel.
pub const PANEL: &str = "[data-testid='all-sellers-panel'], .all-sellers-panel, [data-automation-id='all-sellers-panel']";

pub const PANEL_TRIGGER: &str = "[data-testid='compare-sellers-button'], button[aria-label='Compare all sellers'], .more-seller-options button";

pub const PANEL_CLOSE: &str = "[data-testid='all-sellers-panel'] button[aria-label='Close'], .all-sellers-panel .close-button";

pub const PANEL_ROOTS: &[&str] = &[
    "[data-testid='all-sellers-panel']",
    ".all-sellers-panel",
    "[data-automation-id='all-sellers-panel']",
];

pub const OFFER_ROWS: &[&str] = &[
    "[data-testid='allSellersOfferLine']",
    ".all-sellers-offer-line",
    "[data-automation-id='offer-line']",
];

pub const PRO_SELLER_BADGE: &[&str] = &[
    "[data-testid='pro-seller-badge']",
    ".pro-seller-badge",
];

pub static ROW_SELLER_NAME: Lazy<FieldExtractor> = Lazy::new(|| {
    FieldExtractor::text(&[
        "[data-testid='seller-name']",
        ".seller-name",
        "[data-automation-id='seller-name']",
        "a[href*='/seller/']",
    ])
});

pub static ROW_PRICE: Lazy<FieldExtractor> = Lazy::new(|| {
    FieldExtractor::text(&[
        "[data-testid='offer-price']",
        "[itemprop='price']",
        ".offer-price",
        "[data-automation-id='price']",
    ])
    .or_attr("[itemprop='price']", "content")
});

pub static ROW_ARRIVAL: Lazy<FieldExtractor> = Lazy::new(|| {
    FieldExtractor::text(&[
        "[data-testid='fulfillment-shipping-text']",
        ".fulfillment-shipping-text",
        "[data-automation-id='delivery-date']",
        ".delivery-date",
    ])
});

/// Seller attribution shown next to the buy box on single-seller pages.
pub static BUY_BOX_SELLER: Lazy<FieldExtractor> = Lazy::new(|| {
    FieldExtractor::text(&[
        "[data-testid='product-seller-info'] a",
        "a[data-testid='seller-name-link']",
        "[data-automation-id='seller-name']",
    ])
});
