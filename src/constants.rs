//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for FlowGuard.
//!
//! All magic numbers used by the rule model and the traffic shaping
//! controllers are defined here with their purpose and usage context.

// ============================================================================
// Rule Defaults
// ============================================================================

/// `limit_app` value meaning "any caller, aggregated".
pub const LIMIT_APP_DEFAULT: &str = "default";

/// `limit_app` value meaning "any caller not named by another rule of the same resource".
pub const LIMIT_APP_OTHER: &str = "other";

/// Default warm-up duration in seconds for warm-up control behaviors.
pub const DEFAULT_WARM_UP_PERIOD_SEC: u32 = 10;

/// Default maximum virtual-queue wait in milliseconds for rate limiter behaviors.
///
/// A request whose computed wait exceeds this is rejected instead of delayed.
pub const DEFAULT_MAX_QUEUEING_TIME_MS: u32 = 500;

// ============================================================================
// Traffic Shaping Constants
// ============================================================================

/// Default cold factor of the warm-up token bucket.
///
/// A cold system admits `count / cold_factor` requests per second and
/// relaxes towards `count` over the warm-up period.
pub const DEFAULT_COLD_FACTOR: u32 = 3;

/// Minimum cold factor. A factor of 1 would make the warning zone empty.
pub const MIN_COLD_FACTOR: u32 = 2;

/// Default upper bound in milliseconds for borrowing a future window
/// on behalf of a prioritized request.
pub const DEFAULT_OCCUPY_TIMEOUT_MS: u32 = 500;

/// Default length of one statistic interval in milliseconds.
pub const DEFAULT_STAT_INTERVAL_MS: u32 = 1000;

// ============================================================================
// Cluster Constants
// ============================================================================

/// Default number of buckets in a cluster flow window.
pub const DEFAULT_CLUSTER_SAMPLE_COUNT: u32 = 10;

/// Default length of a cluster flow window in milliseconds.
pub const DEFAULT_CLUSTER_WINDOW_INTERVAL_MS: u32 = 1000;

// ============================================================================
// Time Units
// ============================================================================

/// Microseconds per second.
pub const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Microseconds per millisecond.
pub const MICROS_PER_MILLI: i64 = 1_000;

/// Milliseconds per second.
pub const MILLIS_PER_SEC: u64 = 1_000;
