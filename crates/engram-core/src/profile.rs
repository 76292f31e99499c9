// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use engram_config::{BatchSizes, MemoryConfig, WorkloadProfile};

/// Budget percentage above which a warning is logged regardless of profile.
pub const BUDGET_WARN_PERCENT: u8 = 60;

/// Resolved compression tuning for one session.
///
/// Presets trade hot-tier size against compression batch size.  The force
/// threshold is the point where compression becomes mandatory; it defaults
/// to the stricter 70% on every preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionProfile {
    pub workload: WorkloadProfile,
    pub max_l1_messages: usize,
    pub min_l1_messages: usize,
    /// Above this budget percentage the warning batch size applies
    pub warning_threshold_percent: u8,
    /// Above this budget percentage the critical batch size applies
    /// (aggressive compression)
    pub critical_threshold_percent: u8,
    /// Above this budget percentage compression is forced even when L1 is
    /// under its message bound
    pub force_threshold_percent: u8,
    pub batch_sizes: BatchSizes,
    /// L2 summaries beyond this bound evict their oldest portion to swap
    pub max_l2_tokens: usize,
}

impl CompressionProfile {
    /// Chat-style sessions: larger hot tier, small batches.
    pub fn conversational() -> Self {
        Self {
            workload: WorkloadProfile::Conversational,
            max_l1_messages: 12,
            min_l1_messages: 6,
            warning_threshold_percent: 70,
            critical_threshold_percent: 85,
            force_threshold_percent: 70,
            batch_sizes: BatchSizes {
                normal: 4,
                warning: 6,
                critical: 8,
            },
            max_l2_tokens: 2000,
        }
    }

    /// Tool-heavy workloads: smaller hot tier, larger batches.
    pub fn data_intensive() -> Self {
        Self {
            workload: WorkloadProfile::DataIntensive,
            max_l1_messages: 8,
            min_l1_messages: 4,
            warning_threshold_percent: 60,
            critical_threshold_percent: 80,
            force_threshold_percent: 70,
            batch_sizes: BatchSizes {
                normal: 6,
                warning: 8,
                critical: 12,
            },
            max_l2_tokens: 3000,
        }
    }

    /// The default middle ground.
    pub fn balanced() -> Self {
        Self {
            workload: WorkloadProfile::Balanced,
            max_l1_messages: 10,
            min_l1_messages: 5,
            warning_threshold_percent: 70,
            critical_threshold_percent: 85,
            force_threshold_percent: 70,
            batch_sizes: BatchSizes {
                normal: 4,
                warning: 6,
                critical: 10,
            },
            max_l2_tokens: 2000,
        }
    }

    pub fn preset(workload: WorkloadProfile) -> Self {
        match workload {
            WorkloadProfile::Conversational => Self::conversational(),
            WorkloadProfile::DataIntensive => Self::data_intensive(),
            WorkloadProfile::Balanced => Self::balanced(),
        }
    }

    /// Preset named by the config, with any explicitly-set knobs overriding
    /// the preset values.
    pub fn from_config(config: &MemoryConfig) -> Self {
        let mut p = Self::preset(config.workload_profile);
        if let Some(v) = config.max_l1_messages {
            p.max_l1_messages = v;
        }
        if let Some(v) = config.min_l1_messages {
            p.min_l1_messages = v;
        }
        if let Some(v) = config.warning_threshold_percent {
            p.warning_threshold_percent = v;
        }
        if let Some(v) = config.critical_threshold_percent {
            p.critical_threshold_percent = v;
        }
        if let Some(v) = config.batch_sizes {
            p.batch_sizes = v;
        }
        if let Some(v) = config.max_l2_tokens {
            p.max_l2_tokens = v;
        }
        p
    }

    /// Batch size for the given budget pressure.
    pub fn batch_size_for(&self, budget_pct: f64) -> usize {
        if budget_pct > self.critical_threshold_percent as f64 {
            self.batch_sizes.critical
        } else if budget_pct > self.warning_threshold_percent as f64 {
            self.batch_sizes.warning
        } else {
            self.batch_sizes.normal
        }
    }
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self::balanced()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversational_preset_matches_contract() {
        let p = CompressionProfile::conversational();
        assert_eq!(p.max_l1_messages, 12);
        assert_eq!(p.min_l1_messages, 6);
        assert_eq!(p.warning_threshold_percent, 70);
        assert_eq!(p.critical_threshold_percent, 85);
        assert_eq!(p.batch_sizes.normal, 4);
        assert_eq!(p.batch_sizes.warning, 6);
        assert_eq!(p.batch_sizes.critical, 8);
    }

    #[test]
    fn data_intensive_has_smaller_l1_and_larger_batches() {
        let d = CompressionProfile::data_intensive();
        let c = CompressionProfile::conversational();
        assert!(d.max_l1_messages < c.max_l1_messages);
        assert!(d.batch_sizes.normal > c.batch_sizes.normal);
    }

    #[test]
    fn every_preset_forces_at_seventy_percent() {
        for p in [
            CompressionProfile::conversational(),
            CompressionProfile::data_intensive(),
            CompressionProfile::balanced(),
        ] {
            assert_eq!(p.force_threshold_percent, 70);
        }
    }

    #[test]
    fn default_is_balanced() {
        assert_eq!(
            CompressionProfile::default().workload,
            WorkloadProfile::Balanced
        );
    }

    #[test]
    fn config_overrides_preset_fields() {
        let config = MemoryConfig {
            workload_profile: WorkloadProfile::Conversational,
            max_l1_messages: Some(20),
            min_l1_messages: None,
            warning_threshold_percent: None,
            critical_threshold_percent: Some(90),
            batch_sizes: None,
            max_l2_tokens: None,
        };
        let p = CompressionProfile::from_config(&config);
        assert_eq!(p.max_l1_messages, 20);
        assert_eq!(p.min_l1_messages, 6, "unset fields keep the preset value");
        assert_eq!(p.critical_threshold_percent, 90);
    }

    #[test]
    fn batch_size_escalates_with_pressure() {
        let p = CompressionProfile::conversational();
        assert_eq!(p.batch_size_for(50.0), 4);
        assert_eq!(p.batch_size_for(75.0), 6);
        assert_eq!(p.batch_size_for(90.0), 8);
    }

    #[test]
    fn batch_size_at_exact_threshold_stays_lower() {
        let p = CompressionProfile::conversational();
        assert_eq!(p.batch_size_for(70.0), 4);
        assert_eq!(p.batch_size_for(85.0), 6);
    }
}
