pub mod classify;
pub mod offer;
pub mod panel;
pub mod remote;
pub mod selectors;

pub use classify::Classifier;
pub use offer::{FulfillmentClass, FulfillmentSignals, SellerOffer};
pub use remote::{GraphQlOfferSource, OfferQuery, OfferSource, RemoteError};

use crate::cache::TtlCache;
use crate::config::ExtractorConfig;
use crate::page::PageSession;
use crate::product::ProductRecord;
use crate::rate_limit::RateLimiter;
use offer::format_price;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which tier produced the final seller list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RemoteQuery,
    RemoteCache,
    DomMulti,
    DomSingle,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RemoteQuery => "remote_query",
            Strategy::RemoteCache => "remote_cache",
            Strategy::DomMulti => "dom_multi",
            Strategy::DomSingle => "dom_single",
        }
    }
}

/// A tier that was tried and passed over, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkippedStrategy {
    pub strategy: Strategy,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SellerResolution {
    pub offers: Vec<SellerOffer>,
    pub strategy: Strategy,
    pub skipped: Vec<SkippedStrategy>,
}

#[derive(Debug, Error)]
enum RemoteSkip {
    #[error("no offer source configured")]
    NotConfigured,
    #[error("rate limited")]
    RateLimited,
    #[error(transparent)]
    Failed(#[from] RemoteError),
}

#[derive(Debug, Clone, Copy)]
enum State {
    StrategySelect,
    RemoteQuery,
    DomMulti,
    DomSingle,
}

/// Resolves the competing sellers for a product.
///
/// Single-seller products go straight to the page heuristic. Everything
/// else tries the remote offer query, then the seller panel, then the
/// heuristic, stopping at the first tier that yields offers. Every result is
/// classified and the list is never empty.
pub struct SellerResolver {
    config: Arc<ExtractorConfig>,
    cache: Arc<TtlCache<String, Vec<SellerOffer>>>,
    limiter: Arc<RateLimiter>,
    source: Option<Arc<dyn OfferSource>>,
    classifier: Classifier,
}

impl SellerResolver {
    pub fn new(config: Arc<ExtractorConfig>, source: Option<Arc<dyn OfferSource>>) -> Self {
        let cache = Arc::new(TtlCache::new(config.seller_cache_ttl));
        let limiter = Arc::new(RateLimiter::new(
            config.offers_rate_limit_max,
            config.offers_rate_limit_window,
        ));
        Self::with_shared(config, cache, limiter, source)
    }

    pub fn with_shared(
        config: Arc<ExtractorConfig>,
        cache: Arc<TtlCache<String, Vec<SellerOffer>>>,
        limiter: Arc<RateLimiter>,
        source: Option<Arc<dyn OfferSource>>,
    ) -> Self {
        let classifier = Classifier::new(config.storefront_name.clone());
        Self {
            config,
            cache,
            limiter,
            source,
            classifier,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub async fn resolve(&self, session: &dyn PageSession, product: &ProductRecord) -> SellerResolution {
        let mut skipped = Vec::new();
        let mut state = State::StrategySelect;

        let (offers, strategy) = loop {
            debug!(target = "sellerscope.sellers", state = ?state, product_id = %product.product_id, "reconcile_state");
            state = match state {
                State::StrategySelect => {
                    if product.inventory.total_sellers() == 1 {
                        State::DomSingle
                    } else {
                        State::RemoteQuery
                    }
                }
                State::RemoteQuery => match self.query_remote(product).await {
                    Ok(found) => break found,
                    Err(skip) => {
                        warn!(target = "sellerscope.sellers", product_id = %product.product_id, reason = %skip, "remote_query_skipped");
                        skipped.push(SkippedStrategy {
                            strategy: Strategy::RemoteQuery,
                            reason: skip.to_string(),
                        });
                        State::DomMulti
                    }
                },
                State::DomMulti => {
                    let watch = panel::scrape_panel(session, &self.config).await;
                    if !watch.offers.is_empty() {
                        break (watch.offers, Strategy::DomMulti);
                    }
                    skipped.push(SkippedStrategy {
                        strategy: Strategy::DomMulti,
                        reason: if watch.timed_out {
                            "panel timed out with no rows".into()
                        } else {
                            "panel yielded no rows".into()
                        },
                    });
                    State::DomSingle
                }
                State::DomSingle => break (vec![self.single_offer(session, product).await], Strategy::DomSingle),
            };
        };

        let mut offers = self.classifier.classify_all(offers, &product.brand);
        if offers.is_empty() {
            offers = self.classifier.classify_all(vec![SellerOffer::unknown()], &product.brand);
        }
        info!(
            target = "sellerscope.sellers",
            product_id = %product.product_id,
            strategy = ?strategy,
            sellers = offers.len(),
            "sellers_resolved"
        );
        SellerResolution {
            offers,
            strategy,
            skipped,
        }
    }

    /// Cache, then limiter, then network. Only a non-empty in-stock list
    /// counts as success, and only success is cached.
    async fn query_remote(&self, product: &ProductRecord) -> Result<(Vec<SellerOffer>, Strategy), RemoteSkip> {
        if let Some(cached) = self.cache.get(&product.product_id) {
            return Ok((cached, Strategy::RemoteCache));
        }
        let source = self.source.as_ref().ok_or(RemoteSkip::NotConfigured)?;
        if !self.limiter.can_proceed() {
            return Err(RemoteSkip::RateLimited);
        }
        self.limiter.record();

        let query = OfferQuery::new(
            &product.product_id,
            &self.config.offers_channel,
            &self.config.offers_page_type,
        );
        let offers: Vec<SellerOffer> = source
            .fetch_offers(&query)
            .await?
            .into_iter()
            .filter(|offer| offer.is_in_stock())
            .map(|offer| offer.into_seller_offer())
            .collect();
        if offers.is_empty() {
            return Err(RemoteError::Empty.into());
        }
        self.cache.set(product.product_id.clone(), offers.clone());
        Ok((offers, Strategy::RemoteQuery))
    }

    /// The buy-box offer, from the record first and the page second.
    async fn single_offer(&self, session: &dyn PageSession, product: &ProductRecord) -> SellerOffer {
        let primary = &product.primary_offer;
        let seller_name = match primary.seller_name.clone() {
            Some(name) => Some(name),
            None => session
                .snapshot()
                .await
                .and_then(|html| selectors::BUY_BOX_SELLER.extract_document(&Html::parse_document(&html))),
        };
        let price = product
            .price_display
            .clone()
            .or_else(|| format_price(product.current_price));

        SellerOffer::new(seller_name, price)
            .with_seller_id(primary.seller_id.clone())
            .with_signals(FulfillmentSignals::from_fulfillment_type(
                primary.fulfillment_type.as_deref(),
            ))
            .with_pro_seller(primary.is_pro_seller)
            .with_arrival(primary.arrival_estimate.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::panel::fixtures::{closed_page, panel_page};
    use super::remote::RemoteOffer;
    use super::*;
    use crate::page::SnapshotPage;
    use crate::page::testing::ScriptedPage;
    use crate::product::models::{Inventory, PrimaryOffer};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::{Duration, Instant, advance};

    struct FakeSource {
        calls: AtomicU32,
        queries: Mutex<Vec<OfferQuery>>,
        offers: Vec<RemoteOffer>,
    }

    impl FakeSource {
        fn with(offers: Vec<RemoteOffer>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                queries: Mutex::new(Vec::new()),
                offers,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OfferSource for FakeSource {
        async fn fetch_offers(&self, query: &OfferQuery) -> Result<Vec<RemoteOffer>, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.offers.clone())
        }
    }

    fn remote_offer(name: &str, status: &str) -> RemoteOffer {
        serde_json::from_value(json!({
            "sellerName": name,
            "availabilityStatus": status,
            "fulfillmentType": "SELLER",
            "priceInfo": { "currentPrice": { "price": 12.0 } }
        }))
        .unwrap()
    }

    fn product(id: &str, additional_offers: u32) -> ProductRecord {
        ProductRecord {
            product_id: id.into(),
            name: "Cordless Drill".into(),
            brand: "Acme".into(),
            model: "D20".into(),
            upc: "012345678905".into(),
            current_price: 0.0,
            price_display: None,
            dimensions: Default::default(),
            main_category: "Tools".into(),
            category_path: vec!["Tools".into()],
            images: vec![],
            badges: vec![],
            reviews: Default::default(),
            inventory: Inventory {
                channels: vec![],
                additional_offer_count: additional_offers,
                buy_box_suppressed: false,
            },
            primary_offer: PrimaryOffer::default(),
        }
    }

    fn config() -> Arc<ExtractorConfig> {
        Arc::new(ExtractorConfig::default())
    }

    fn resolver_with(source: Option<Arc<dyn OfferSource>>, limit: usize) -> SellerResolver {
        let config = config();
        let cache = Arc::new(TtlCache::new(config.seller_cache_ttl));
        let limiter = Arc::new(RateLimiter::new(limit, config.offers_rate_limit_window));
        SellerResolver::with_shared(config, cache, limiter, source)
    }

    #[tokio::test(start_paused = true)]
    async fn single_seller_skips_remote_and_panel() {
        let source = FakeSource::with(vec![remote_offer("X", "IN_STOCK")]);
        let resolver = resolver_with(Some(source.clone()), 5);
        let mut record = product("1", 0);
        record.primary_offer = PrimaryOffer {
            seller_name: Some("Walmart.com".into()),
            fulfillment_type: Some("FC".into()),
            ..Default::default()
        };
        record.price_display = Some("$49.00".into());
        let page = ScriptedPage::new(closed_page());

        let resolution = resolver.resolve(&page, &record).await;
        assert_eq!(resolution.strategy, Strategy::DomSingle);
        assert_eq!(resolution.offers.len(), 1);
        assert_eq!(resolution.offers[0].fulfillment_class, FulfillmentClass::Wmt);
        assert_eq!(resolution.offers[0].price, "$49.00");
        assert_eq!(source.calls(), 0);
        assert!(page.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_remote_falls_through_to_panel() {
        let source = FakeSource::with(vec![remote_offer("X", "IN_STOCK")]);
        let resolver = resolver_with(Some(source.clone()), 1);
        assert!(resolver.limiter.try_acquire());

        let page = ScriptedPage::new(closed_page()).on_click(
            selectors::PANEL_TRIGGER,
            panel_page(&[
                ("Walmart.com", "$20.00", ""),
                ("Gadget Hub", "$19.00", ""),
                ("Budget Deals", "$18.50", ""),
            ]),
        );
        let resolution = resolver.resolve(&page, &product("2", 2)).await;

        assert_eq!(source.calls(), 0);
        assert_eq!(resolution.strategy, Strategy::DomMulti);
        assert_eq!(resolution.skipped[0].reason, "rate limited");
        let classes: Vec<_> = resolution.offers.iter().map(|o| o.fulfillment_class).collect();
        assert_eq!(
            classes,
            vec![FulfillmentClass::Wmt, FulfillmentClass::Unknown, FulfillmentClass::Unknown]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_panel_times_out_into_single_seller_sentinels() {
        let resolver = resolver_with(None, 5);
        let page = ScriptedPage::new(closed_page()).on_click(selectors::PANEL_TRIGGER, panel_page(&[]));

        let started = Instant::now();
        let resolution = resolver.resolve(&page, &product("3", 3)).await;

        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(resolution.strategy, Strategy::DomSingle);
        assert_eq!(resolution.offers.len(), 1);
        let offer = &resolution.offers[0];
        assert_eq!(offer.seller_name, offer::UNKNOWN_SELLER);
        assert_eq!(offer.price, offer::PRICE_UNAVAILABLE);
        assert_eq!(offer.fulfillment_class, FulfillmentClass::Unknown);
        let tiers: Vec<_> = resolution.skipped.iter().map(|s| s.strategy).collect();
        assert_eq!(tiers, vec![Strategy::RemoteQuery, Strategy::DomMulti]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_offers_are_filtered_cached_and_refetched_after_ttl() {
        let source = FakeSource::with(vec![
            remote_offer("Acme", "IN_STOCK"),
            remote_offer("Gadget Hub", "IN_STOCK"),
            remote_offer("Sold Out Co", "OUT_OF_STOCK"),
        ]);
        let resolver = resolver_with(Some(source.clone()), 5);
        let page = SnapshotPage::new("<html></html>", None);
        let record = product("4", 2);

        let first = resolver.resolve(&page, &record).await;
        assert_eq!(first.strategy, Strategy::RemoteQuery);
        assert_eq!(first.offers.len(), 2);
        assert_eq!(first.offers[0].fulfillment_class, FulfillmentClass::BrandSelfFulfilled);
        assert_eq!(first.offers[1].fulfillment_class, FulfillmentClass::SelfFulfilled);

        let second = resolver.resolve(&page, &record).await;
        assert_eq!(second.strategy, Strategy::RemoteCache);
        assert_eq!(second.offers, first.offers);
        assert_eq!(source.calls(), 1);

        advance(config().seller_cache_ttl).await;
        resolver.resolve(&page, &record).await;
        assert_eq!(source.calls(), 2);

        let query = source.queries.lock().unwrap()[0].clone();
        assert_eq!(query, OfferQuery::new("4", "WWW", "ItemPageGlobal"));
    }

    #[tokio::test(start_paused = true)]
    async fn limiter_caps_network_calls_within_window() {
        let source = FakeSource::with(vec![remote_offer("Gadget Hub", "IN_STOCK")]);
        let resolver = resolver_with(Some(source.clone()), 2);
        let page = SnapshotPage::new("<html></html>", None);

        for id in ["10", "11", "12"] {
            resolver.resolve(&page, &product(id, 4)).await;
        }
        assert_eq!(source.calls(), 2);

        advance(config().offers_rate_limit_window).await;
        let resolution = resolver.resolve(&page, &product("13", 4)).await;
        assert_eq!(resolution.strategy, Strategy::RemoteQuery);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_leaves_limiter_untouched() {
        let source = FakeSource::with(vec![remote_offer("Gadget Hub", "IN_STOCK")]);
        let resolver = resolver_with(Some(source.clone()), 1);
        let page = SnapshotPage::new("<html></html>", None);
        let record = product("4", 2);

        let first = resolver.resolve(&page, &record).await;
        assert_eq!(first.strategy, Strategy::RemoteQuery);
        assert_eq!(resolver.limiter.remaining(), 0);
        let before = resolver.limiter.can_proceed();

        let second = resolver.resolve(&page, &record).await;
        assert_eq!(second.strategy, Strategy::RemoteCache);
        assert!(second.skipped.is_empty());
        assert_eq!(resolver.limiter.remaining(), 0);
        assert_eq!(resolver.limiter.can_proceed(), before);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_remote_list_is_not_cached() {
        let source = FakeSource::with(vec![remote_offer("Gone", "OUT_OF_STOCK")]);
        let resolver = resolver_with(Some(source.clone()), 5);
        let page = SnapshotPage::new("<html></html>", None);
        let record = product("20", 2);

        let resolution = resolver.resolve(&page, &record).await;
        assert_eq!(resolution.strategy, Strategy::DomSingle);
        resolver.resolve(&page, &record).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_seller_reads_buy_box_from_page() {
        let resolver = resolver_with(None, 5);
        let page = SnapshotPage::new(
            "<html><body><div data-testid=\"product-seller-info\"><a href=\"/seller/9\">Acme Store</a></div></body></html>",
            None,
        );
        let mut record = product("30", 0);
        record.current_price = 15.0;

        let resolution = resolver.resolve(&page, &record).await;
        let offer = &resolution.offers[0];
        assert_eq!(offer.seller_name, "Acme Store");
        assert_eq!(offer.price, "$15.00");
        assert_eq!(offer.fulfillment_class, FulfillmentClass::BrandUnknown);
    }
}
