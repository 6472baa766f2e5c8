//! Process execution model
//!
//! One execution per distinct process in the product's BOM, sequenced
//! 1..=N per MO. Progress is a pure function of the per-batch-per-process
//! status relation; the only legal regression is the revert from
//! `completed` back to `in_progress` when a new batch joins the order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::actor::UserId;
use crate::models::masters::WorkCenterId;
use crate::models::mo::MoId;

/// Surrogate identifier for a process execution.
pub type ExecutionId = u64;

/// Status of a process execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Stopped,
    Completed,
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// A process applied to an MO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessExecution {
    id: ExecutionId,
    mo_id: MoId,
    work_center: WorkCenterId,
    /// 1-based, contiguous and unique within the MO.
    sequence_order: u32,
    status: ExecutionStatus,
    planned_start_time: Option<DateTime<Utc>>,
    planned_end_time: Option<DateTime<Utc>>,
    actual_start_time: Option<DateTime<Utc>>,
    actual_end_time: Option<DateTime<Utc>>,
    /// The single currently effective supervisor, if any.
    assigned_supervisor: Option<UserId>,
    progress_percentage: f64,
}

impl ProcessExecution {
    /// Create a pending execution.
    ///
    /// # Arguments
    /// * `id` - Surrogate execution id
    /// * `mo_id` - Parent order
    /// * `work_center` - Process this execution applies
    /// * `sequence_order` - 1-based position in the order's routing
    ///
    /// # Panics
    /// Panics if `sequence_order` is zero.
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::process_execution::{ExecutionStatus, ProcessExecution};
    ///
    /// let execution = ProcessExecution::new(1, "MO-001", "WC-COILING", 1);
    /// assert_eq!(execution.status(), ExecutionStatus::Pending);
    /// assert_eq!(execution.sequence_order(), 1);
    /// assert_eq!(execution.duration_minutes(), None);
    /// ```
    pub fn new(
        id: ExecutionId,
        mo_id: impl Into<MoId>,
        work_center: impl Into<WorkCenterId>,
        sequence_order: u32,
    ) -> Self {
        assert!(sequence_order >= 1, "sequence order is 1-based");
        Self {
            id,
            mo_id: mo_id.into(),
            work_center: work_center.into(),
            sequence_order,
            status: ExecutionStatus::Pending,
            planned_start_time: None,
            planned_end_time: None,
            actual_start_time: None,
            actual_end_time: None,
            assigned_supervisor: None,
            progress_percentage: 0.0,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn mo_id(&self) -> &str {
        &self.mo_id
    }

    pub fn work_center(&self) -> &str {
        &self.work_center
    }

    pub fn sequence_order(&self) -> u32 {
        self.sequence_order
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn actual_start_time(&self) -> Option<DateTime<Utc>> {
        self.actual_start_time
    }

    pub fn actual_end_time(&self) -> Option<DateTime<Utc>> {
        self.actual_end_time
    }

    pub fn assigned_supervisor(&self) -> Option<&str> {
        self.assigned_supervisor.as_deref()
    }

    pub fn progress_percentage(&self) -> f64 {
        self.progress_percentage
    }

    /// Actual duration in whole minutes.
    ///
    /// # Returns
    /// `Some(minutes)` when both actual timestamps are present, `None`
    /// otherwise.
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.actual_start_time, self.actual_end_time) {
            (Some(start), Some(end)) => Some((end - start).num_seconds() / 60),
            _ => None,
        }
    }

    pub(crate) fn set_status(&mut self, status: ExecutionStatus) {
        self.status = status;
    }

    pub(crate) fn set_actual_start(&mut self, at: DateTime<Utc>) {
        if self.actual_start_time.is_none() {
            self.actual_start_time = Some(at);
        }
    }

    pub(crate) fn set_actual_end(&mut self, at: Option<DateTime<Utc>>) {
        self.actual_end_time = at;
    }

    pub(crate) fn set_supervisor(&mut self, supervisor: Option<UserId>) {
        self.assigned_supervisor = supervisor;
    }

    pub(crate) fn set_progress(&mut self, progress: f64) {
        self.progress_percentage = progress.clamp(0.0, 100.0);
    }
}
