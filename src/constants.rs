//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Partitioning constants
pub mod partition {
    /// Default per-unit weight budget (token proxy a single synthesis
    /// call may directly consume)
    pub const DEFAULT_BUDGET: u64 = 60_000;

    /// Minimum unit size as a fraction of the budget; splits that would
    /// push a child below this floor are rejected to prevent infinite
    /// fragmentation
    pub const MIN_UNIT_FRACTION: f64 = 0.125;

    /// Penalty per group beyond the ideal group count when scoring a
    /// candidate split
    pub const GRANULARITY_PENALTY: u64 = 64;
}

/// Documentation agent constants
pub mod agent {
    /// Aggregate weight above which a node with children delegates
    /// instead of synthesizing directly
    pub const DEFAULT_SYNTHESIS_THRESHOLD: u64 = 60_000;

    /// Maximum transient-failure retries per node
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Child overviews included in a parent synthesis prompt are trimmed
    /// to this many characters each
    pub const CHILD_OVERVIEW_MAX_CHARS: usize = 2_000;
}

/// Pipeline constants
pub mod pipeline {
    /// Global cap on concurrent model calls (admission control),
    /// independent of tree shape
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;
}

/// Model invocation constants
pub mod model {
    /// Default timeout for a single generation call (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
}
