//! Telemetry metric name constants.
//!
//! Centralised metric names for shellcache operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `shellcache_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `strategy`: routing policy applied: "network_first" or "cache_first"
//! - `source`: where the response came from: "network", "cache",
//!   "fallback" or "error"
//! - `status`: outcome: "ok" or "error"

/// Total intercepted fetches answered by the controller.
///
/// Labels: `strategy`, `source`.
pub const FETCH_TOTAL: &str = "shellcache_fetch_total";

/// Total cache lookups that found an entry.
///
/// Labels: `strategy`.
pub const CACHE_HITS_TOTAL: &str = "shellcache_cache_hits_total";

/// Total cache lookups that found nothing.
///
/// Labels: `strategy`.
pub const CACHE_MISSES_TOTAL: &str = "shellcache_cache_misses_total";

/// Total generation installs.
///
/// Labels: `status` ("ok" | "error").
pub const INSTALL_TOTAL: &str = "shellcache_install_total";

/// Total stale cache stores deleted on activation.
pub const STALE_CACHES_DELETED_TOTAL: &str = "shellcache_stale_caches_deleted_total";

pub(crate) const NETWORK_FIRST: &str = "network_first";
pub(crate) const CACHE_FIRST: &str = "cache_first";
