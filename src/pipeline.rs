use crate::assemble::ExtractionRecord;
use crate::cache::TtlCache;
use crate::config::{ExtractorConfig, WEBDRIVER_URL};
use crate::models::{
    ClassifyRequest, ClassifyResponse, ExtractRequest, ExtractionResponse, ExtractionStatus,
    NormalizeRequest, StageReport,
};
use crate::page::{PageSession, SnapshotPage, WebDriverPage};
use crate::product::{Acquirer, Acquisition, ProductRecord, RawPayload};
use crate::sellers::{GraphQlOfferSource, OfferSource, SellerResolver};
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<ExtractorConfig>,
    acquirer: Arc<Acquirer>,
    sellers: Arc<SellerResolver>,
    webdriver_url: Option<String>,
}

impl Pipeline {
    pub fn new(
        config: ExtractorConfig,
        offers: Option<Arc<dyn OfferSource>>,
        webdriver_url: Option<String>,
    ) -> Self {
        let config = Arc::new(config);
        let raw_cache = Arc::new(TtlCache::new(config.raw_cache_ttl));
        Self {
            acquirer: Arc::new(Acquirer::new(raw_cache)),
            sellers: Arc::new(SellerResolver::new(config.clone(), offers)),
            config,
            webdriver_url,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            ExtractorConfig::from_env(),
            Some(Arc::new(GraphQlOfferSource::from_env())),
            WEBDRIVER_URL.clone(),
        )
    }

    /// Open the page the request describes, run it, and release the page.
    pub async fn run_request(&self, request: ExtractRequest) -> Result<ExtractionResponse, PipelineError> {
        let html = request.html.filter(|h| !h.trim().is_empty());
        let url = request.url.filter(|u| !u.trim().is_empty());

        match (html, url) {
            (Some(html), url) => self.run(&SnapshotPage::new(html, url)).await,
            (None, Some(url)) => {
                let endpoint = self.webdriver_url.as_deref().ok_or_else(|| {
                    PipelineError::invalid_input("open_page", "url extraction requires WEBDRIVER_URL")
                })?;
                let page = WebDriverPage::open(endpoint, &url)
                    .await
                    .map_err(|err| PipelineError::internal("open_page", err.to_string()))?;
                let result = self.run(&page).await;
                page.close().await;
                result
            }
            (None, None) => Err(PipelineError::invalid_input("open_page", "html or url is required")),
        }
    }

    /// acquire → normalize → reconcile → assemble against one page.
    pub async fn run(&self, session: &dyn PageSession) -> Result<ExtractionResponse, PipelineError> {
        let extraction_id = Uuid::new_v4().to_string();
        let mut stages = Vec::new();

        let acquisition = self
            .capture_stage(
                "acquire",
                &mut stages,
                stages::acquire(&self.acquirer, session, &self.config),
            )
            .await?;
        let payload = match acquisition {
            Acquisition::Available { payload, .. } => payload,
            Acquisition::Unavailable { reason, attempts } => {
                warn!(target = "sellerscope.pipeline", extraction_id = %extraction_id, attempts, reason = %reason, "extraction_unavailable");
                return Ok(ExtractionResponse {
                    extraction_id,
                    status: ExtractionStatus::Unavailable,
                    record: None,
                    unavailable_reason: Some(reason.to_string()),
                    skipped_strategies: Vec::new(),
                    stages,
                });
            }
        };

        let product = self
            .capture_stage(
                "normalize",
                &mut stages,
                stages::normalize(&payload, self.config.recent_review_days),
            )
            .await?;

        let resolution = self
            .capture_stage(
                "reconcile",
                &mut stages,
                stages::reconcile(&self.sellers, session, &product),
            )
            .await?;
        let skipped_strategies = resolution.skipped.clone();

        let record: ExtractionRecord = self
            .capture_stage("assemble", &mut stages, stages::assemble(product, resolution))
            .await?;

        info!(
            target = "sellerscope.pipeline",
            extraction_id = %extraction_id,
            product_id = %record.product.product_id,
            sellers = record.sellers.len(),
            "extraction_complete"
        );
        Ok(ExtractionResponse {
            extraction_id,
            status: ExtractionStatus::Complete,
            record: Some(record),
            unavailable_reason: None,
            skipped_strategies,
            stages,
        })
    }

    pub fn stage_normalize(&self, request: NormalizeRequest) -> Result<ProductRecord, PipelineError> {
        if !request.data.get("product").is_some_and(Value::is_object) {
            return Err(PipelineError::invalid_input("normalize", "data.product must be an object"));
        }
        let raw = RawPayload {
            product_id: request.product_id.unwrap_or_default(),
            data: request.data,
        };
        Ok(crate::product::normalize(&raw, self.config.recent_review_days))
    }

    pub fn stage_classify(&self, request: ClassifyRequest) -> ClassifyResponse {
        let offers = self
            .sellers
            .classifier()
            .classify_all(request.offers, &request.brand);
        let classes = offers.iter().map(|o| o.fulfillment_class).collect();
        ClassifyResponse { offers, classes }
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

pub mod stages {
    use super::{PipelineError, StageOutcome};
    use crate::assemble::{self, ExtractionRecord};
    use crate::config::ExtractorConfig;
    use crate::page::PageSession;
    use crate::product::{Acquirer, Acquisition, ProductRecord, RawPayload, normalize as normalize_payload};
    use crate::sellers::{SellerResolution, SellerResolver};
    use serde_json::json;

    pub async fn acquire(
        acquirer: &Acquirer,
        session: &dyn PageSession,
        config: &ExtractorConfig,
    ) -> Result<StageOutcome<Acquisition>, PipelineError> {
        let acquisition = acquirer
            .acquire(session, config.acquire_max_retries, config.acquire_retry_delay)
            .await;
        let output = match &acquisition {
            Acquisition::Available {
                payload,
                attempts,
                cached,
            } => json!({
                "available": true,
                "product_id": payload.product_id,
                "attempts": attempts,
                "cached": cached,
            }),
            Acquisition::Unavailable { attempts, reason } => json!({
                "available": false,
                "attempts": attempts,
                "reason": reason.to_string(),
            }),
        };
        Ok(StageOutcome::new(acquisition, output))
    }

    pub async fn normalize(
        payload: &RawPayload,
        recent_review_days: i64,
    ) -> Result<StageOutcome<ProductRecord>, PipelineError> {
        let product = normalize_payload(payload, recent_review_days);
        let output = json!({
            "product_id": product.product_id,
            "name": product.name,
            "brand": product.brand,
            "total_stock": product.inventory.total_stock(),
            "total_sellers": product.inventory.total_sellers(),
            "size_source": product.dimensions.size_source,
            "weight_source": product.dimensions.weight_source,
        });
        Ok(StageOutcome::new(product, output))
    }

    pub async fn reconcile(
        resolver: &SellerResolver,
        session: &dyn PageSession,
        product: &ProductRecord,
    ) -> Result<StageOutcome<SellerResolution>, PipelineError> {
        let resolution = resolver.resolve(session, product).await;
        crate::metrics::seller_strategy(resolution.strategy.as_str(), resolution.offers.len());
        let output = json!({
            "strategy": resolution.strategy,
            "sellers": resolution.offers.len(),
            "skipped": resolution.skipped,
        });
        Ok(StageOutcome::new(resolution, output))
    }

    pub async fn assemble(
        product: ProductRecord,
        resolution: SellerResolution,
    ) -> Result<StageOutcome<ExtractionRecord>, PipelineError> {
        let record = assemble::assemble(product, resolution);
        let output = json!({
            "total_stock": record.inventory.total_stock,
            "total_sellers": record.inventory.total_sellers,
            "sellers": record.sellers.len(),
        });
        Ok(StageOutcome::new(record, output))
    }
}
