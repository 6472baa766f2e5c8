//! Batch model
//!
//! A batch is a production-sized subdivision of an MO that flows through
//! every process execution. `planned_quantity` is an integer whose meaning
//! is fixed by the product's material type at creation time: grams for coil
//! products, strips for sheet products.
//!
//! The per-batch-per-process status lives in a dedicated relation on the
//! entity store, not on the batch itself, so it stays queryable by either
//! key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::units::Grams;
use crate::models::actor::UserId;
use crate::models::masters::WorkCenterId;
use crate::models::mo::MoId;

/// Batch identifier.
pub type BatchId = String;

/// Marker appended to the batch notes stream when a supervisor verifies the
/// batch before start.
pub const BATCH_VERIFIED_MARKER: &str = "[BATCH_VERIFIED]";

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Created,
    InProcess,
    Completed,
    Packed,
    Cancelled,
    ReturnedToRm,
}

/// Status of one batch at one process execution. The authoritative input to
/// process progress computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchProcessState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Where a batch physically sits. Packing is a mandatory stop between the
/// last process and the FG store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchLocation {
    WorkCenter(WorkCenterId),
    Packing,
    FgStore,
    Dispatched,
}

/// Append-only movement row for the batch location tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMovement {
    pub batch_id: BatchId,
    pub mo_id: MoId,
    pub from_location: Option<BatchLocation>,
    pub to_location: BatchLocation,
    pub moved_by: Option<UserId>,
    pub moved_at: DateTime<Utc>,
    pub notes: String,
}

/// A production batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    batch_id: BatchId,
    mo_id: MoId,
    /// Grams (coil) or strips (sheet); fixed by the product at creation.
    planned_quantity: i64,
    actual_quantity_completed: i64,
    scrap_quantity: i64,
    scrap_rm_weight_g: Grams,
    status: BatchStatus,
    progress_percentage: f64,
    /// Free-text notes stream; carries the verification marker.
    notes: String,
    /// Hold flag set when a receipt verification reports a problem.
    on_hold: bool,
    actual_start_date: Option<DateTime<Utc>>,
    actual_end_date: Option<DateTime<Utc>>,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl Batch {
    /// Create a batch in `created` status.
    ///
    /// # Arguments
    /// * `batch_id` - Batch id
    /// * `mo_id` - Parent order
    /// * `planned_quantity` - Grams (coil) or strips (sheet), fixed by the
    ///   product's material type at creation (must be positive)
    /// * `created_by` - User creating the batch
    /// * `created_at` - Creation instant
    ///
    /// # Panics
    /// Panics if `planned_quantity` is not positive.
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::batch::{Batch, BatchStatus};
    ///
    /// let batch = Batch::new(
    ///     "MO-001-B1",
    ///     "MO-001",
    ///     25_000,
    ///     "U-PH",
    ///     Utc.with_ymd_and_hms(2025, 10, 2, 8, 0, 0).unwrap(),
    /// );
    ///
    /// assert_eq!(batch.status(), BatchStatus::Created);
    /// assert!(!batch.is_verified());
    /// assert!(batch.counts_for_progress());
    /// ```
    pub fn new(
        batch_id: impl Into<BatchId>,
        mo_id: impl Into<MoId>,
        planned_quantity: i64,
        created_by: impl Into<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        assert!(planned_quantity > 0, "planned quantity must be positive");
        Self {
            batch_id: batch_id.into(),
            mo_id: mo_id.into(),
            planned_quantity,
            actual_quantity_completed: 0,
            scrap_quantity: 0,
            scrap_rm_weight_g: 0,
            status: BatchStatus::Created,
            progress_percentage: 0.0,
            notes: String::new(),
            on_hold: false,
            actual_start_date: None,
            actual_end_date: None,
            created_by: created_by.into(),
            created_at,
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn mo_id(&self) -> &str {
        &self.mo_id
    }

    pub fn planned_quantity(&self) -> i64 {
        self.planned_quantity
    }

    pub fn actual_quantity_completed(&self) -> i64 {
        self.actual_quantity_completed
    }

    pub fn scrap_quantity(&self) -> i64 {
        self.scrap_quantity
    }

    pub fn scrap_rm_weight_g(&self) -> Grams {
        self.scrap_rm_weight_g
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn progress_percentage(&self) -> f64 {
        self.progress_percentage
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn is_on_hold(&self) -> bool {
        self.on_hold
    }

    pub fn actual_start_date(&self) -> Option<DateTime<Utc>> {
        self.actual_start_date
    }

    pub fn actual_end_date(&self) -> Option<DateTime<Utc>> {
        self.actual_end_date
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the verification marker is present in the notes stream.
    pub fn is_verified(&self) -> bool {
        self.notes.contains(BATCH_VERIFIED_MARKER)
    }

    /// Counts toward progress: anything not cancelled.
    pub fn counts_for_progress(&self) -> bool {
        self.status != BatchStatus::Cancelled
    }

    /// Still consumes remaining RM: anything not cancelled or returned.
    pub fn consumes_rm(&self) -> bool {
        !matches!(self.status, BatchStatus::Cancelled | BatchStatus::ReturnedToRm)
    }

    /// Can still be stopped: created or running.
    pub fn is_stoppable(&self) -> bool {
        matches!(self.status, BatchStatus::Created | BatchStatus::InProcess)
    }

    pub(crate) fn append_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }

    pub(crate) fn set_status(&mut self, status: BatchStatus) {
        self.status = status;
    }

    pub(crate) fn set_progress(&mut self, progress: f64) {
        self.progress_percentage = progress.clamp(0.0, 100.0);
    }

    pub(crate) fn set_actual_start(&mut self, at: DateTime<Utc>) {
        if self.actual_start_date.is_none() {
            self.actual_start_date = Some(at);
        }
    }

    pub(crate) fn set_actual_end(&mut self, at: DateTime<Utc>) {
        self.actual_end_date = Some(at);
    }

    pub(crate) fn add_scrap(&mut self, quantity: i64) {
        self.scrap_quantity += quantity;
    }

    pub(crate) fn add_scrap_rm_weight(&mut self, grams: Grams) {
        self.scrap_rm_weight_g += grams;
    }

    pub(crate) fn set_actual_completed(&mut self, quantity: i64) {
        self.actual_quantity_completed = quantity.min(self.planned_quantity);
    }

    pub(crate) fn set_on_hold(&mut self, on_hold: bool) {
        self.on_hold = on_hold;
    }
}
