//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::media::CompressionOptions;
use crate::models::ConflictPolicy;

/// Hosting-platform free-tier daily read ceiling.
pub const DEFAULT_DAILY_READ_LIMIT: u64 = 50_000;
/// Hosting-platform free-tier daily write ceiling.
pub const DEFAULT_DAILY_WRITE_LIMIT: u64 = 20_000;
/// Attachments at or under this original size are inline-encoded.
pub const DEFAULT_INLINE_THRESHOLD_BYTES: u64 = 500_000;

/// Daily operation ceilings imposed by the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Maximum read units per calendar day
    pub daily_reads: u64,
    /// Maximum write units per calendar day
    pub daily_writes: u64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            daily_reads: DEFAULT_DAILY_READ_LIMIT,
            daily_writes: DEFAULT_DAILY_WRITE_LIMIT,
        }
    }
}

/// Configuration for the sync and media core.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Daily operation ceilings
    pub quota: QuotaLimits,
    /// Conflict resolution policy
    pub conflict_policy: ConflictPolicy,
    /// Attachment compression settings
    pub compression: CompressionOptions,
    /// Original-size ceiling for inline attachment encoding
    pub inline_threshold_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quota: QuotaLimits::default(),
            conflict_policy: ConflictPolicy::default(),
            compression: CompressionOptions::default(),
            inline_threshold_bytes: DEFAULT_INLINE_THRESHOLD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform_free_tier() {
        let config = EngineConfig::default();
        assert_eq!(config.quota.daily_reads, 50_000);
        assert_eq!(config.quota.daily_writes, 20_000);
        assert_eq!(config.conflict_policy, ConflictPolicy::Server);
    }
}
