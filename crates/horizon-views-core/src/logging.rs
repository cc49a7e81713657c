//! Logging facilities for Horizon Views.
//!
//! Horizon Views uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("horizon_views=debug")
//!         .init();
//! }
//! ```
//!
//! The [`targets`] module lists the target of every subsystem so that
//! directives can select, say, only currency traffic.

/// Span names used throughout Horizon Views for tracing.
pub mod span_names {
    /// Full structural rebuild of a projection.
    pub const REBUILD: &str = "horizon_views::rebuild";
    /// Coalesced refresh at the end of a deferred scope.
    pub const DEFERRED_REFRESH: &str = "horizon_views::deferred_refresh";
    /// Regrouping of a projection.
    pub const REGROUP: &str = "horizon_views::regroup";
}

/// Target names for log filtering.
pub mod targets {
    /// Core primitives target.
    pub const CORE: &str = "horizon_views_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_views_core::signal";
    /// Projection maintenance (source changes, refreshes).
    pub const PROJECTION: &str = "horizon_views::projection";
    /// Currency moves and listener traffic.
    pub const CURRENCY: &str = "horizon_views::currency";
    /// Add/edit transactions.
    pub const EDITING: &str = "horizon_views::editing";
    /// Group tree maintenance.
    pub const GROUPING: &str = "horizon_views::grouping";
    /// Source adapters.
    pub const SOURCE: &str = "horizon_views::source";
    /// Default-view registry.
    pub const REGISTRY: &str = "horizon_views::registry";
    /// Performance spans.
    pub const PERF: &str = "horizon_views::perf";
}

/// A performance tracing span that records its duration when dropped.
///
/// ```
/// use horizon_views_core::logging::{PerfSpan, span_names};
///
/// {
///     let _span = PerfSpan::new(span_names::REBUILD);
///     // work being measured
/// }
/// ```
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "horizon_views::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
