//! Batch completions, rework chains and final-inspection rework
//!
//! A completion splits the input quantity of one batch at one process into
//! OK, scrap and rework portions. The three must sum back to the input
//! within the configured tolerance. A positive rework portion chains a
//! rework batch whose cycle number is one deeper than its parent's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::units::Grams;
use crate::models::actor::UserId;
use crate::models::batch::BatchId;
use crate::models::masters::WorkCenterId;
use crate::models::mo::MoId;
use crate::models::process_execution::ExecutionId;

/// Surrogate identifier for a completion row.
pub type CompletionId = u64;

/// Surrogate identifier for a rework batch.
pub type ReworkId = u64;

/// Surrogate identifier for a FI rework assignment.
pub type FiReworkId = u64;

/// Surrogate identifier for a receipt handover row.
pub type HandoverId = u64;

/// One OK/Scrap/Rework completion record.
///
/// Invariant: `|ok + scrap + rework - input|` is within the completion
/// tolerance (0.010 kg by default), enforced at creation by the batch
/// lifecycle service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessCompletion {
    pub id: CompletionId,
    pub batch_id: BatchId,
    pub execution_id: ExecutionId,
    pub completed_by: UserId,
    pub completed_at: DateTime<Utc>,
    pub input_g: Grams,
    pub ok_g: Grams,
    pub scrap_g: Grams,
    pub rework_g: Grams,
    /// Depth of the rework chain this completion belongs to; 0 for an
    /// original completion.
    pub rework_cycle_number: u32,
    /// Parent completion when this record closes a rework batch.
    pub parent_completion: Option<CompletionId>,
    pub defect_description: String,
    pub notes: String,
}

/// Status of a rework batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReworkStatus {
    Pending,
    InProgress,
    Completed,
}

/// A rework batch chained from a completion with a positive rework portion.
///
/// Assigned to the process's currently active supervisor for the current
/// shift at creation time, not to the actor who recorded the completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReworkBatch {
    pub id: ReworkId,
    pub original_batch: BatchId,
    pub execution_id: ExecutionId,
    pub completion_id: CompletionId,
    pub quantity_g: Grams,
    pub status: ReworkStatus,
    pub assigned_supervisor: Option<UserId>,
    pub cycle_number: u32,
    pub defect_description: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Receipt handover log row, written when OK quantity moves from one
/// process execution to its successor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptHandover {
    pub id: HandoverId,
    pub batch_id: BatchId,
    pub mo_id: MoId,
    pub from_execution: ExecutionId,
    pub to_execution: ExecutionId,
    pub quantity_g: Grams,
    pub handed_over_by: Option<UserId>,
    pub handed_over_at: DateTime<Utc>,
    pub notes: String,
}

/// Problem reported on a receipt verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptIssue {
    LowQty,
    HighQty,
    Damaged,
    WrongProduct,
    Other,
}

/// Outcome of the receiving supervisor's verification of a handover.
///
/// # Example
/// ```
/// use manufacturing_core_rs::models::completion::{ReceiptIssue, ReceiptOutcome};
///
/// let outcome = ReceiptOutcome::Reported(ReceiptIssue::LowQty);
/// assert!(matches!(outcome, ReceiptOutcome::Reported(_)));
/// assert_ne!(outcome, ReceiptOutcome::Ok);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "issue")]
pub enum ReceiptOutcome {
    /// Quantity within tolerance of expected; the handover is cleared.
    Ok,
    /// A problem was reported; the batch goes on hold at the receiving
    /// process and the production head is notified.
    Reported(ReceiptIssue),
}

/// Verification record for one handover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptVerification {
    pub handover_id: HandoverId,
    pub outcome: ReceiptOutcome,
    pub verified_by: UserId,
    pub verified_at: DateTime<Utc>,
    pub notes: String,
}

/// Status of a final-inspection rework assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiReworkStatus {
    Pending,
    InProgress,
    Completed,
    Passed,
}

/// A rework assignment raised at final inspection against the process
/// responsible for the defect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiRework {
    pub id: FiReworkId,
    pub batch_id: BatchId,
    pub mo_id: MoId,
    pub inspected_by: UserId,
    pub defective_work_center: WorkCenterId,
    pub defect_description: String,
    pub quantity_g: Grams,
    pub assigned_supervisor: UserId,
    pub status: FiReworkStatus,
    /// Number of failed re-inspections so far.
    pub rework_cycle_count: u32,
    pub fi_notes: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<UserId>,
    pub reinspected_at: Option<DateTime<Utc>>,
    pub reinspected_by: Option<UserId>,
    pub reinspection_passed: Option<bool>,
    pub reinspection_notes: String,
}
