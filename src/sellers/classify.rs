use super::offer::{FulfillmentClass, SellerOffer};

/// Assigns a [`FulfillmentClass`] to each offer.
///
/// Rules are evaluated top to bottom and the first match wins:
///
/// 1. seller is the storefront itself → `Wmt`
/// 2. brand match and platform-fulfilled → `BrandFulfilled`
/// 3. brand match and sold-and-shipped-by-seller → `BrandSelfFulfilled`
/// 4. brand match, no indicator → `BrandUnknown`
/// 5. platform-fulfilled → `PlatformFulfilled`
/// 6. sold-and-shipped-by-seller → `SelfFulfilled`
/// 7. otherwise `Unknown`
#[derive(Debug, Clone)]
pub struct Classifier {
    storefront: String,
}

impl Classifier {
    pub fn new(storefront: impl Into<String>) -> Self {
        Self {
            storefront: storefront.into().trim().to_lowercase(),
        }
    }

    pub fn classify(&self, offer: &SellerOffer, brand: &str) -> FulfillmentClass {
        let seller = offer.seller_name.trim();
        if !self.storefront.is_empty() && seller.to_lowercase() == self.storefront {
            return FulfillmentClass::Wmt;
        }

        let signals = offer.signals;
        let brand_match = offer.has_known_seller() && brand_matches(brand, seller);
        match (brand_match, signals.platform_fulfilled, signals.seller_fulfilled) {
            (true, true, _) => FulfillmentClass::BrandFulfilled,
            (true, false, true) => FulfillmentClass::BrandSelfFulfilled,
            (true, false, false) => FulfillmentClass::BrandUnknown,
            (false, true, _) => FulfillmentClass::PlatformFulfilled,
            (false, false, true) => FulfillmentClass::SelfFulfilled,
            (false, false, false) => FulfillmentClass::Unknown,
        }
    }

    pub fn classify_all(&self, offers: Vec<SellerOffer>, brand: &str) -> Vec<SellerOffer> {
        offers
            .into_iter()
            .map(|mut offer| {
                offer.fulfillment_class = self.classify(&offer, brand);
                offer
            })
            .collect()
    }
}

/// Case-insensitive whole-word containment in either direction.
pub fn brand_matches(brand: &str, seller: &str) -> bool {
    let brand = brand.trim().to_lowercase();
    let seller = seller.trim().to_lowercase();
    if brand.is_empty() || seller.is_empty() {
        return false;
    }
    contains_word(&seller, &brand) || contains_word(&brand, &seller)
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
