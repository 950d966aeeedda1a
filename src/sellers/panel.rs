use super::offer::{FulfillmentSignals, SellerOffer};
use super::selectors::{
    OFFER_ROWS, PANEL, PANEL_CLOSE, PANEL_ROOTS, PANEL_TRIGGER, PRO_SELLER_BADGE, ROW_ARRIVAL,
    ROW_PRICE, ROW_SELLER_NAME,
};
use crate::config::ExtractorConfig;
use crate::page::fields::{collapse_whitespace, select_all, select_first};
use crate::page::{Mutation, PageSession};
use scraper::Html;
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOpen {
    AlreadyOpen,
    Triggered,
    TriggerMissing,
}

/// What the observed panel produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelWatch {
    pub offers: Vec<SellerOffer>,
    pub extractions: u32,
    pub timed_out: bool,
}

/// Open the panel, wait for it and read its rows under the debounce and
/// hard-timeout timers. The panel is closed again before returning.
pub async fn scrape_panel(session: &dyn PageSession, config: &ExtractorConfig) -> PanelWatch {
    let opened = open_panel(session).await;
    if opened == PanelOpen::TriggerMissing {
        debug!(target = "sellerscope.panel", "panel_trigger_missing");
        return PanelWatch {
            offers: Vec::new(),
            extractions: 0,
            timed_out: false,
        };
    }

    if !wait_for_panel(session, config.panel_poll_attempts, config.panel_poll_interval).await {
        warn!(target = "sellerscope.panel", attempts = config.panel_poll_attempts, "panel_never_appeared");
        return PanelWatch {
            offers: Vec::new(),
            extractions: 0,
            timed_out: false,
        };
    }

    let watch = watch_panel(session, config.panel_debounce, config.panel_hard_timeout).await;
    close_panel(session).await;
    info!(
        target = "sellerscope.panel",
        rows = watch.offers.len(),
        extractions = watch.extractions,
        timed_out = watch.timed_out,
        "panel_scraped"
    );
    watch
}

/// Click the panel trigger unless the panel is already showing.
pub async fn open_panel(session: &dyn PageSession) -> PanelOpen {
    if session.exists(PANEL).await {
        return PanelOpen::AlreadyOpen;
    }
    if session.click(PANEL_TRIGGER).await {
        PanelOpen::Triggered
    } else {
        PanelOpen::TriggerMissing
    }
}

/// Poll for the panel up to `attempts` times, `interval` apart.
pub async fn wait_for_panel(session: &dyn PageSession, attempts: u32, interval: Duration) -> bool {
    for attempt in 0..attempts.max(1) {
        if session.exists(PANEL).await {
            return true;
        }
        if attempt + 1 < attempts {
            sleep(interval).await;
        }
    }
    false
}

enum Tick {
    HardTimeout,
    Mutated(Option<Mutation>),
    Quiet,
}

/// Watch the panel until a quiet-period extraction finds rows or the hard
/// timeout forces a final read.
///
/// The debounce timer is armed on attach and re-armed by every mutation, so
/// a burst collapses into one extraction of the latest markup. When both
/// timers are due together the hard timeout wins.
pub async fn watch_panel(
    session: &dyn PageSession,
    debounce: Duration,
    hard_timeout: Duration,
) -> PanelWatch {
    let mut feed = session.observe(PANEL).await;
    let mut feed_open = true;

    let hard = sleep(hard_timeout);
    tokio::pin!(hard);
    let quiet = sleep(debounce);
    tokio::pin!(quiet);
    let mut quiet_armed = true;
    let mut extractions = 0;

    loop {
        let tick = tokio::select! {
            biased;
            _ = &mut hard => Tick::HardTimeout,
            mutation = feed.next(), if feed_open => Tick::Mutated(mutation),
            _ = &mut quiet, if quiet_armed => Tick::Quiet,
        };

        match tick {
            Tick::HardTimeout => {
                extractions += 1;
                let offers = read_rows(session).await;
                feed.disconnect();
                warn!(target = "sellerscope.panel", rows = offers.len(), "panel_hard_timeout");
                return PanelWatch {
                    offers,
                    extractions,
                    timed_out: true,
                };
            }
            Tick::Mutated(Some(_)) => {
                quiet.as_mut().reset(Instant::now() + debounce);
                quiet_armed = true;
            }
            Tick::Mutated(None) => feed_open = false,
            Tick::Quiet => {
                quiet_armed = false;
                extractions += 1;
                let offers = read_rows(session).await;
                debug!(target = "sellerscope.panel", rows = offers.len(), extractions, "panel_extracted");
                if !offers.is_empty() {
                    feed.disconnect();
                    return PanelWatch {
                        offers,
                        extractions,
                        timed_out: false,
                    };
                }
            }
        }
    }
}

pub async fn close_panel(session: &dyn PageSession) {
    if session.exists(PANEL_CLOSE).await {
        session.click(PANEL_CLOSE).await;
    }
}

async fn read_rows(session: &dyn PageSession) -> Vec<SellerOffer> {
    match session.snapshot().await {
        Some(html) => extract_rows(&html),
        None => Vec::new(),
    }
}

/// One offer per row inside the panel. Markup outside the panel is ignored.
pub fn extract_rows(html: &str) -> Vec<SellerOffer> {
    let document = Html::parse_document(html);
    let Some(panel) = select_first(document.root_element(), PANEL_ROOTS) else {
        return Vec::new();
    };

    select_all(panel, OFFER_ROWS)
        .into_iter()
        .map(|row| {
            let row_text = collapse_whitespace(&row.text().collect::<String>());
            let pro_badge = select_first(row, PRO_SELLER_BADGE).is_some()
                || row_text.to_lowercase().contains("pro seller");
            SellerOffer::new(ROW_SELLER_NAME.extract(row), ROW_PRICE.extract(row))
                .with_arrival(ROW_ARRIVAL.extract(row))
                .with_signals(FulfillmentSignals::from_text(&row_text))
                .with_pro_seller(pro_badge)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A product page with the seller panel rendered and the given rows.
    pub fn panel_page(rows: &[(&str, &str, &str)]) -> String {
        let rows: String = rows
            .iter()
            .map(|(name, price, note)| {
                format!(
                    "<div data-testid=\"allSellersOfferLine\"><span data-testid=\"seller-name\">{name}</span>\
                     <span data-testid=\"offer-price\">{price}</span><p>{note}</p></div>"
                )
            })
            .collect();
        format!(
            "<html><body><button data-testid=\"compare-sellers-button\">Compare all sellers</button>\
             <section data-testid=\"all-sellers-panel\"><button aria-label=\"Close\">x</button>{rows}</section></body></html>"
        )
    }

    pub fn closed_page() -> String {
        "<html><body><button data-testid=\"compare-sellers-button\">Compare all sellers</button></body></html>"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{closed_page, panel_page};
    use super::*;
    use crate::page::testing::ScriptedPage;
    use std::sync::Arc;

    const DEBOUNCE: Duration = Duration::from_millis(300);
    const HARD: Duration = Duration::from_millis(5000);

    #[test]
    fn extracts_rows_with_fallback_fields() {
        let html = r#"<html><body>
            <div class="all-sellers-offer-line">ignored, outside the panel</div>
            <section class="all-sellers-panel">
              <div class="all-sellers-offer-line">
                <a href="/seller/101">Acme Direct</a>
                <span itemprop="price" content="$24.00"></span>
                <span class="delivery-date">Arrives Tue</span>
                <p>Sold by Acme Direct Fulfilled by Walmart</p>
                <span class="pro-seller-badge">Pro</span>
              </div>
              <div class="all-sellers-offer-line">
                <span class="seller-name">Gadget   Hub</span>
                <span class="offer-price">$22.10</span>
                <p>Sold and shipped by Gadget Hub</p>
              </div>
            </section></body></html>"#;
        let offers = extract_rows(html);
        assert_eq!(offers.len(), 2);

        assert_eq!(offers[0].seller_name, "Acme Direct");
        assert_eq!(offers[0].price, "$24.00");
        assert_eq!(offers[0].arrival_estimate, "Arrives Tue");
        assert!(offers[0].signals.platform_fulfilled);
        assert!(offers[0].is_pro_seller);

        assert_eq!(offers[1].seller_name, "Gadget Hub");
        assert!(offers[1].signals.seller_fulfilled);
        assert_eq!(offers[1].arrival_estimate, "N/A");
    }

    #[test]
    fn no_panel_means_no_rows() {
        assert!(extract_rows(&closed_page()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn open_is_idempotent() {
        let page = ScriptedPage::new(panel_page(&[("A", "$1", "")]));
        assert_eq!(open_panel(&page).await, PanelOpen::AlreadyOpen);
        assert!(page.clicks().is_empty());

        let page = ScriptedPage::new(closed_page()).on_click(PANEL_TRIGGER, panel_page(&[]));
        assert_eq!(open_panel(&page).await, PanelOpen::Triggered);
        assert_eq!(open_panel(&page).await, PanelOpen::AlreadyOpen);
        assert_eq!(page.clicks(), vec![PANEL_TRIGGER.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_is_bounded() {
        let page = ScriptedPage::new("<html><body></body></html>");
        let started = Instant::now();
        assert!(!wait_for_panel(&page, 4, Duration::from_millis(250)).await);
        assert_eq!(started.elapsed(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_mutations_yields_one_extraction_of_final_state() {
        let page = Arc::new(ScriptedPage::new(panel_page(&[])));
        let driver = {
            let page = page.clone();
            tokio::spawn(async move {
                for n in 1..=4 {
                    sleep(Duration::from_millis(50)).await;
                    let rows: Vec<(String, &str, &str)> =
                        (0..n).map(|i| (format!("Seller {i}"), "$9.99", "")).collect();
                    let borrowed: Vec<(&str, &str, &str)> =
                        rows.iter().map(|(a, b, c)| (a.as_str(), *b, *c)).collect();
                    page.mutate(panel_page(&borrowed));
                }
            })
        };

        let started = Instant::now();
        let watch = watch_panel(page.as_ref(), DEBOUNCE, HARD).await;
        driver.await.unwrap();

        assert_eq!(watch.extractions, 1);
        assert!(!watch.timed_out);
        assert_eq!(watch.offers.len(), 4);
        assert_eq!(watch.offers[3].seller_name, "Seller 3");
        assert_eq!(page.snapshot_count(), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(200) + DEBOUNCE);
        assert!(!page.is_observed());
    }

    #[tokio::test(start_paused = true)]
    async fn settled_panel_is_read_after_one_quiet_period() {
        let page = ScriptedPage::new(panel_page(&[("Walmart.com", "$10.00", "")]));
        let started = Instant::now();
        let watch = watch_panel(&page, DEBOUNCE, HARD).await;
        assert_eq!(watch.offers.len(), 1);
        assert_eq!(started.elapsed(), DEBOUNCE);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_timeout_bounds_endless_mutation() {
        let page = Arc::new(ScriptedPage::new(panel_page(&[])));
        let driver = {
            let page = page.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    sleep(Duration::from_millis(100)).await;
                    page.mutate(panel_page(&[("Churn Co", "$5.00", "")]));
                }
            })
        };

        let started = Instant::now();
        let watch = watch_panel(page.as_ref(), DEBOUNCE, HARD).await;
        assert!(watch.timed_out);
        assert_eq!(watch.extractions, 1);
        assert_eq!(watch.offers.len(), 1);
        assert_eq!(started.elapsed(), HARD);
        assert!(!page.is_observed());
        driver.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn scrape_closes_the_panel() {
        let page = ScriptedPage::new(closed_page())
            .on_click(PANEL_TRIGGER, panel_page(&[("Gadget Hub", "$3.00", "")]));
        let watch = scrape_panel(&page, &ExtractorConfig::default()).await;
        assert_eq!(watch.offers.len(), 1);
        assert_eq!(
            page.clicks(),
            vec![PANEL_TRIGGER.to_string(), PANEL_CLOSE.to_string()]
        );
    }
}
