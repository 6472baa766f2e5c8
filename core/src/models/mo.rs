//! Manufacturing Order model
//!
//! The MO is the top-level production unit. It owns its batches, process
//! executions, allocations and status history through the entity store;
//! children reference each other by identifier only.
//!
//! # Status machine
//!
//! ```text
//! on_hold --approve--> mo_approved --start_production--> in_progress
//!   |                      |                                  |
//!   |--reject--> rejected  '--stop--> stopped <----stop-------|
//!   |                                                         |
//!   '--(direct start / first batch)--> in_progress --complete--> completed
//!                                                     completed --dispatch--> (completed)
//! ```
//!
//! `rm_allocated` is a bookkeeping sub-status issued by the RM store while
//! the order is still on hold. Status history is append-only and written in
//! the same transaction as the change itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::units::{CentiPercent, Grams};
use crate::models::actor::UserId;
use crate::models::supervisor::ShiftId;

/// Manufacturing order identifier. Globally unique, human-readable.
pub type MoId = String;

/// Lifecycle status of a manufacturing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoStatus {
    /// Created, waiting for approval.
    OnHold,
    /// Approved by a manager or production head.
    MoApproved,
    /// RM store confirmed the allocation while the order was on hold.
    RmAllocated,
    /// Production running.
    InProgress,
    /// Stopped mid-way; in-flight batches may still finish.
    Stopped,
    /// Rejected before production.
    Rejected,
    /// All processes finished and target quantity produced.
    Completed,
}

impl MoStatus {
    /// Terminal states admit no further transition (dispatch-quantity
    /// accumulation on a completed order is the single exception).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Stopped)
    }
}

/// Order priority. Numeric level drives allocation auto-swap: material only
/// ever moves from a strictly lower level to a strictly higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Numeric level, higher is more urgent.
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::mo::Priority;
    ///
    /// assert!(Priority::Urgent.level() > Priority::High.level());
    /// assert!(Priority::Medium.level() > Priority::Low.level());
    /// ```
    pub fn level(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }
}

/// One append-only status history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoStatusChange {
    pub from_status: MoStatus,
    pub to_status: MoStatus,
    pub changed_by: Option<UserId>,
    pub changed_at: DateTime<Utc>,
    pub notes: String,
}

/// A manufacturing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManufacturingOrder {
    mo_id: MoId,
    product_code: String,
    /// Target quantity in finished pieces.
    quantity: i64,
    tolerance_cp: CentiPercent,
    scrap_cp: CentiPercent,
    priority: Priority,
    status: MoStatus,
    customer: Option<String>,
    shift: ShiftId,
    planned_start_date: Option<DateTime<Utc>>,
    planned_end_date: Option<DateTime<Utc>>,
    actual_start_date: Option<DateTime<Utc>>,
    actual_end_date: Option<DateTime<Utc>>,
    /// Computed raw material requirement (grams).
    rm_required_g: Grams,
    /// Order-level scrap accumulator (grams).
    scrap_rm_weight_g: Grams,
    /// Finished pieces already dispatched to the customer.
    dispatched_quantity: i64,
    stop_reason: Option<String>,
    stopped_at: Option<DateTime<Utc>>,
    rm_allocated_at: Option<DateTime<Utc>>,
    rm_allocated_by: Option<UserId>,
    /// Append-only status history.
    status_history: Vec<MoStatusChange>,
    created_by: UserId,
    created_at: DateTime<Utc>,
}

impl ManufacturingOrder {
    /// Create a new order in `on_hold`.
    ///
    /// # Arguments
    /// * `mo_id` - Globally unique, human-readable order id
    /// * `product_code` - Product to produce
    /// * `quantity` - Target quantity in finished pieces (must be positive)
    /// * `tolerance_cp` - Tolerance at scale 2 (2.00 % == 200)
    /// * `priority` - Order priority for allocation auto-swap
    /// * `shift` - Shift the order is planned into
    /// * `rm_required_g` - Computed raw material requirement in grams
    /// * `created_by` - User creating the order
    /// * `created_at` - Creation instant
    ///
    /// # Panics
    /// Panics if `quantity` is not positive.
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::mo::{ManufacturingOrder, MoStatus, Priority};
    /// use manufacturing_core_rs::models::supervisor::ShiftId;
    ///
    /// let mo = ManufacturingOrder::new(
    ///     "MO-001",
    ///     "P-SPRING",
    ///     1000,
    ///     200,
    ///     Priority::Medium,
    ///     ShiftId::Shift1,
    ///     51_000,
    ///     "U-PH",
    ///     Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap(),
    /// )
    /// .with_customer("CUST-01");
    ///
    /// assert_eq!(mo.status(), MoStatus::OnHold);
    /// assert_eq!(mo.rm_required_g(), 51_000);
    /// assert!(mo.status_history().is_empty());
    /// ```
    pub fn new(
        mo_id: impl Into<MoId>,
        product_code: impl Into<String>,
        quantity: i64,
        tolerance_cp: CentiPercent,
        priority: Priority,
        shift: ShiftId,
        rm_required_g: Grams,
        created_by: impl Into<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        assert!(quantity > 0, "order quantity must be positive");
        Self {
            mo_id: mo_id.into(),
            product_code: product_code.into(),
            quantity,
            tolerance_cp,
            scrap_cp: 0,
            priority,
            status: MoStatus::OnHold,
            customer: None,
            shift,
            planned_start_date: None,
            planned_end_date: None,
            actual_start_date: None,
            actual_end_date: None,
            rm_required_g,
            scrap_rm_weight_g: 0,
            dispatched_quantity: 0,
            stop_reason: None,
            stopped_at: None,
            rm_allocated_at: None,
            rm_allocated_by: None,
            status_history: Vec::new(),
            created_by: created_by.into(),
            created_at,
        }
    }

    /// Set the customer reference (builder pattern).
    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    /// Set the scrap percentage (builder pattern).
    pub fn with_scrap_percent(mut self, scrap_cp: CentiPercent) -> Self {
        self.scrap_cp = scrap_cp;
        self
    }

    pub fn mo_id(&self) -> &str {
        &self.mo_id
    }

    pub fn product_code(&self) -> &str {
        &self.product_code
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn tolerance_cp(&self) -> CentiPercent {
        self.tolerance_cp
    }

    pub fn scrap_cp(&self) -> CentiPercent {
        self.scrap_cp
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> MoStatus {
        self.status
    }

    pub fn customer(&self) -> Option<&str> {
        self.customer.as_deref()
    }

    pub fn shift(&self) -> ShiftId {
        self.shift
    }

    pub fn actual_start_date(&self) -> Option<DateTime<Utc>> {
        self.actual_start_date
    }

    pub fn actual_end_date(&self) -> Option<DateTime<Utc>> {
        self.actual_end_date
    }

    pub fn rm_required_g(&self) -> Grams {
        self.rm_required_g
    }

    pub fn scrap_rm_weight_g(&self) -> Grams {
        self.scrap_rm_weight_g
    }

    pub fn dispatched_quantity(&self) -> i64 {
        self.dispatched_quantity
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    pub fn status_history(&self) -> &[MoStatusChange] {
        &self.status_history
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Apply a status change, recording the history row alongside it.
    ///
    /// Transition legality is enforced by the lifecycle service; this method
    /// only guarantees the history stays in lockstep with the status field.
    pub(crate) fn transition(
        &mut self,
        to: MoStatus,
        changed_by: Option<UserId>,
        changed_at: DateTime<Utc>,
        notes: impl Into<String>,
    ) {
        let from = self.status;
        self.status = to;
        self.status_history.push(MoStatusChange {
            from_status: from,
            to_status: to,
            changed_by,
            changed_at,
            notes: notes.into(),
        });
    }

    pub(crate) fn set_actual_start(&mut self, at: DateTime<Utc>) {
        if self.actual_start_date.is_none() {
            self.actual_start_date = Some(at);
        }
    }

    pub(crate) fn set_actual_end(&mut self, at: DateTime<Utc>) {
        self.actual_end_date = Some(at);
    }

    pub(crate) fn record_stop(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.stop_reason = Some(reason.into());
        self.stopped_at = Some(at);
    }

    pub(crate) fn record_rm_allocated(&mut self, by: UserId, at: DateTime<Utc>) {
        self.rm_allocated_by = Some(by);
        self.rm_allocated_at = Some(at);
    }

    pub(crate) fn add_scrap_rm(&mut self, grams: Grams) {
        self.scrap_rm_weight_g += grams;
    }

    pub(crate) fn add_dispatched(&mut self, pieces: i64) {
        self.dispatched_quantity += pieces;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mo() -> ManufacturingOrder {
        ManufacturingOrder::new(
            "MO-001",
            "P-COIL",
            1000,
            200,
            Priority::Medium,
            ShiftId::Shift1,
            51_000,
            "U-CREATOR",
            Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_transition_records_history() {
        let mut mo = mo();
        let at = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        mo.transition(MoStatus::MoApproved, Some("U-MGR".into()), at, "approved");

        assert_eq!(mo.status(), MoStatus::MoApproved);
        assert_eq!(mo.status_history().len(), 1);
        let row = &mo.status_history()[0];
        assert_eq!(row.from_status, MoStatus::OnHold);
        assert_eq!(row.to_status, MoStatus::MoApproved);
        assert_eq!(row.changed_by.as_deref(), Some("U-MGR"));
    }

    #[test]
    fn test_actual_start_set_once() {
        let mut mo = mo();
        let first = Utc.with_ymd_and_hms(2025, 10, 2, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 10, 3, 8, 0, 0).unwrap();
        mo.set_actual_start(first);
        mo.set_actual_start(later);
        assert_eq!(mo.actual_start_date(), Some(first));
    }

    #[test]
    fn test_priority_levels_strictly_ordered() {
        assert!(Priority::Urgent.level() > Priority::High.level());
        assert!(Priority::High.level() > Priority::Medium.level());
        assert!(Priority::Medium.level() > Priority::Low.level());
    }
}
