use tracing::trace;

// Metric events go out as trace records; the Prometheus endpoint renders
// whatever recorder is installed.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "sellerscope.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "sellerscope.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn seller_strategy(strategy: &'static str, sellers: usize) {
    trace!(
        target = "sellerscope.metrics",
        strategy = strategy,
        sellers = sellers as u64,
        "seller_strategy_inc"
    );
}
