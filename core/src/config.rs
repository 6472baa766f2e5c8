//! Core configuration
//!
//! The behavioural knobs of the orchestration core. Defaults match the
//! shop-floor policy in production; deployments override individual fields.

use serde::{Deserialize, Serialize};

use crate::core::units::Grams;

/// Tunable parameters for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Share of the MO's allocated RM that must be represented by batches
    /// before a process execution may complete, in percent (default 90).
    pub process_completion_rm_threshold_pct: u8,

    /// Remaining-RM floor below which no further coil batch may be created
    /// (strictly-greater check), in grams. Default 50 (0.050 kg).
    pub coil_remaining_threshold_g: Grams,

    /// Remaining-strip floor below which no further sheet batch may be
    /// created (strictly-greater check). Default 1.
    pub sheet_remaining_threshold_strips: i64,

    /// Absolute tolerance for the OK + scrap + rework = input completion
    /// arithmetic, in grams. Default 10 (0.010 kg).
    pub completion_tolerance_g: Grams,

    /// Minimum length of a trimmed MO stop reason. Default 10.
    pub min_stop_reason_len: usize,

    /// When true, a batch start aborts if its RM lock fails. The default
    /// (false) logs a warning and lets the batch proceed, leaving the
    /// reconciliation to auditors.
    pub strict_batch_lock: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            process_completion_rm_threshold_pct: 90,
            coil_remaining_threshold_g: 50,
            sheet_remaining_threshold_strips: 1,
            completion_tolerance_g: 10,
            min_stop_reason_len: 10,
            strict_batch_lock: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = CoreConfig::default();
        assert_eq!(config.process_completion_rm_threshold_pct, 90);
        assert_eq!(config.coil_remaining_threshold_g, 50);
        assert_eq!(config.completion_tolerance_g, 10);
        assert!(!config.strict_batch_lock);
    }
}
