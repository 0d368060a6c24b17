//! Observability hooks of the router: structured logs and prometheus
//! counters registered in the shared `observe` registry.

use crate::SwapKind;

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "sor")]
struct Metrics {
    /// Iterative computations that stopped at their iteration cap.
    #[metric(labels("computation"))]
    non_convergence: prometheus::IntCounterVec,

    /// Computed routes by outcome.
    #[metric(labels("outcome"))]
    routes: prometheus::IntCounterVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry())
            .expect("unexpected error getting metrics instance")
    }
}

#[derive(Clone, Copy, Debug, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Computation {
    StableInvariant,
    StableBalance,
    NumericalDerivative,
    PriceEqualization,
}

/// An iterative computation hit its cap. The last iterate is used anyway.
pub fn non_convergence(computation: Computation, iterations: usize) {
    tracing::debug!(?computation, iterations, "stopped without converging");
    Metrics::get()
        .non_convergence
        .with_label_values(&[computation.into()])
        .inc();
}

pub fn route_found(kind: SwapKind, paths: usize, swaps: usize) {
    tracing::debug!(?kind, paths, swaps, "found route");
    Metrics::get().routes.with_label_values(&["found"]).inc();
}

pub fn insufficient_liquidity(kind: SwapKind, candidates: usize) {
    tracing::debug!(?kind, candidates, "insufficient liquidity for the requested amount");
    Metrics::get()
        .routes
        .with_label_values(&["insufficient_liquidity"])
        .inc();
}
