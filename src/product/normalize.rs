use super::measurements::{parse_dimension_triple, parse_weight_pounds, round_two};
use super::models::{
    AttributeSource, ChannelStock, Dimensions, Inventory, PrimaryOffer, ProductRecord, RawPayload,
    ReviewSummary,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;

const PRO_SELLER_BADGE: &str = "PRO_SELLER";

/// Map a raw payload into a [`ProductRecord`] using the current time for the
/// recent-review window.
pub fn normalize(raw: &RawPayload, recent_review_days: i64) -> ProductRecord {
    normalize_as_of(raw, Utc::now(), recent_review_days)
}

/// Pure mapping from raw page data to the canonical record.
///
/// Never fails: a missing field becomes an empty string, zero or an empty
/// list. Physical attributes are resolved from `idml.productHighlights`
/// first and `idml.specifications` second; the first source that produces a
/// full `L x W x H` triple supplies all three sides.
pub fn normalize_as_of(raw: &RawPayload, now: DateTime<Utc>, recent_review_days: i64) -> ProductRecord {
    let data = &raw.data;
    let product = data.get("product").unwrap_or(&Value::Null);

    let product_id = str_at(product, "/usItemId")
        .or_else(|| str_at(product, "/id"))
        .unwrap_or_else(|| raw.product_id.clone());

    let category_path: Vec<String> = array_at(product, "/category/path")
        .iter()
        .filter_map(|node| node.get("name").and_then(Value::as_str))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let mut images: Vec<String> = array_at(product, "/imageInfo/allImages")
        .iter()
        .filter_map(|img| img.get("url").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    if images.is_empty()
        && let Some(thumb) = str_at(product, "/imageInfo/thumbnailUrl")
    {
        images.push(thumb);
    }

    let badge_keys: Vec<&str> = array_at(product, "/badges/flags")
        .iter()
        .filter_map(|flag| flag.get("key").and_then(Value::as_str))
        .collect();

    ProductRecord {
        product_id,
        name: str_at(product, "/name").unwrap_or_default(),
        brand: str_at(product, "/brand").unwrap_or_default(),
        model: str_at(product, "/model").unwrap_or_default(),
        upc: str_at(product, "/upc").unwrap_or_default(),
        current_price: f64_at(product, "/priceInfo/currentPrice/price").unwrap_or(0.0),
        price_display: str_at(product, "/priceInfo/currentPrice/priceString"),
        dimensions: resolve_dimensions(data),
        main_category: category_path.first().cloned().unwrap_or_default(),
        category_path,
        images,
        badges: collect_badges(product),
        reviews: summarize_reviews(data, product, now, recent_review_days),
        inventory: Inventory {
            channels: array_at(product, "/fulfillmentOptions")
                .iter()
                .map(|opt| ChannelStock {
                    channel: str_at(opt, "/type").unwrap_or_else(|| "UNKNOWN".into()),
                    available_quantity: quantity_at(opt, "/availableQuantity"),
                })
                .collect(),
            additional_offer_count: quantity_at(product, "/additionalOfferCount")
                .try_into()
                .unwrap_or(u32::MAX),
            buy_box_suppressed: product
                .pointer("/buyBoxSuppression")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        primary_offer: PrimaryOffer {
            seller_name: str_at(product, "/sellerDisplayName")
                .or_else(|| str_at(product, "/sellerName")),
            seller_id: str_at(product, "/sellerId"),
            fulfillment_type: str_at(product, "/fulfillmentType"),
            is_pro_seller: badge_keys.contains(&PRO_SELLER_BADGE),
            arrival_estimate: array_at(product, "/fulfillmentOptions")
                .iter()
                .find_map(|opt| str_at(opt, "/deliveryDate").or_else(|| str_at(opt, "/arrivalDate"))),
        },
    }
}

fn resolve_dimensions(data: &Value) -> Dimensions {
    let sources = [
        (AttributeSource::Highlights, array_at(data, "/idml/productHighlights")),
        (AttributeSource::Specifications, array_at(data, "/idml/specifications")),
    ];
    let mut dims = Dimensions::default();

    for (source, entries) in &sources {
        let triple = named_values(entries, "dimension").find_map(parse_dimension_triple);
        if let Some([length, width, height]) = triple {
            dims.length = length;
            dims.width = width;
            dims.height = height;
            dims.size_source = Some(*source);
            break;
        }
    }

    for (source, entries) in &sources {
        if let Some(weight) = named_values(entries, "weight").find_map(parse_weight_pounds) {
            dims.weight = weight;
            dims.weight_source = Some(*source);
            break;
        }
    }

    dims
}

/// Values of `{name, value}` entries whose name mentions `needle`.
fn named_values<'a>(entries: &'a [Value], needle: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    entries.iter().filter_map(move |entry| {
        let name = entry.get("name").and_then(Value::as_str)?;
        if !name.to_lowercase().contains(needle) {
            return None;
        }
        entry.get("value").and_then(Value::as_str)
    })
}

fn collect_badges(product: &Value) -> Vec<String> {
    let flags = array_at(product, "/badges/flags")
        .iter()
        .filter_map(|flag| flag.get("text").and_then(Value::as_str));
    let grouped = array_at(product, "/badges/groups")
        .iter()
        .flat_map(|group| array_at(group, "/members").iter())
        .filter_map(|member| member.get("text").and_then(Value::as_str));

    let mut badges: Vec<String> = Vec::new();
    for text in flags.chain(grouped) {
        let text = text.trim();
        if !text.is_empty() && !badges.iter().any(|b| b == text) {
            badges.push(text.to_string());
        }
    }
    badges
}

fn summarize_reviews(data: &Value, product: &Value, now: DateTime<Utc>, recent_days: i64) -> ReviewSummary {
    let submission_times: Vec<DateTime<Utc>> = array_at(data, "/reviews/customerReviews")
        .iter()
        .filter_map(|review| review.get("reviewSubmissionTime").and_then(Value::as_str))
        .filter_map(parse_review_time)
        .collect();
    let cutoff = now - Duration::days(recent_days);
    let recent_count = submission_times
        .iter()
        .filter(|ts| **ts >= cutoff && **ts <= now)
        .count() as u64;

    ReviewSummary {
        count: data
            .pointer("/reviews/totalReviewCount")
            .or_else(|| product.pointer("/numberOfReviews"))
            .map(quantity_of)
            .unwrap_or(0),
        recent_count,
        average_rating: f64_at(data, "/reviews/averageOverallRating")
            .or_else(|| f64_at(product, "/averageRating"))
            .map(round_two)
            .unwrap_or(0.0),
        submission_times,
    }
}

fn parse_review_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Non-empty trimmed string; numbers are rendered so numeric ids still read.
fn str_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn f64_at(value: &Value, pointer: &str) -> Option<f64> {
    let parsed = match value.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0)
}

fn quantity_at(value: &Value, pointer: &str) -> u64 {
    value.pointer(pointer).map(quantity_of).unwrap_or(0)
}

/// Counts clamp at zero; fractional or textual counts are truncated.
fn quantity_of(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}
