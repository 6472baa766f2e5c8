//! Raw-material allocations and stock balance
//!
//! An allocation is a committed quantity of raw material bound to an MO.
//!
//! # Status machine
//!
//! ```text
//! reserved --lock--> locked
//!     |                 |
//!     |--swap--> swapped |
//!     '--release--> released <--release--'
//! ```
//!
//! `reserved` is the only swappable state. Locking is one-way; the
//! batch-lock split case never mutates a reserved row into a locked one
//! with a different quantity, it creates a fresh locked child and shrinks
//! (or deletes) the parent.
//!
//! # Critical Invariants
//!
//! - Stock availability never goes negative at a committed state.
//! - Reservation does not touch stock. Each allocation records whether its
//!   quantity has been drawn; the draw happens once, when the order enters
//!   production, and the flag is inherited across splits and swap mirrors,
//!   which is what makes a second production start decrement nothing.
//! - Release hands the quantity back to stock exactly when it was drawn.
//! - After a split, parent + child quantities equal the original quantity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::units::Grams;
use crate::models::actor::UserId;
use crate::models::masters::MaterialCode;
use crate::models::mo::MoId;

/// Surrogate identifier for an allocation row. Monotonically assigned, so
/// id order doubles as a deterministic lock-acquisition order.
pub type AllocationId = u64;

/// Status of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// Committed to the MO but not pinned to a batch; swappable.
    Reserved,
    /// Pinned to a batch; terminal with respect to swapping.
    Locked,
    /// Reassigned to a higher-priority MO; terminal for this row.
    Swapped,
    /// Returned to stock; terminal for this row.
    Released,
}

/// Action recorded in the allocation history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationAction {
    Reserved,
    Locked,
    Swapped,
    Released,
}

/// Errors raised by allocation row transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationRowError {
    #[error("allocation {0} is not reserved and cannot be locked")]
    NotReserved(AllocationId),

    #[error("allocation {0} is already terminal and cannot be released")]
    AlreadyTerminal(AllocationId),

    #[error("allocation {0} cannot be swapped (status is not reserved)")]
    NotSwappable(AllocationId),
}

/// One raw-material allocation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    id: AllocationId,
    mo_id: MoId,
    material: MaterialCode,
    quantity_g: Grams,
    status: AllocationStatus,
    allocated_at: DateTime<Utc>,
    allocated_by: Option<UserId>,
    locked_at: Option<DateTime<Utc>>,
    locked_by: Option<UserId>,
    released_at: Option<DateTime<Utc>>,
    released_by: Option<UserId>,
    swapped_at: Option<DateTime<Utc>>,
    swapped_by: Option<UserId>,
    /// Target MO when this row was swapped away.
    swapped_to_mo: Option<MoId>,
    /// Whether this quantity has been drawn from stock (set when the MO
    /// enters production; inherited across splits and swap mirrors).
    stock_drawn: bool,
    notes: String,
}

impl Allocation {
    /// Create a `reserved` allocation.
    ///
    /// # Arguments
    /// * `id` - Surrogate allocation id
    /// * `mo_id` - Order the material is committed to
    /// * `material` - Material code
    /// * `quantity_g` - Committed quantity in grams (must be positive)
    /// * `allocated_by` - User who reserved, when known
    /// * `allocated_at` - Reservation instant
    /// * `notes` - Free-text note
    ///
    /// # Panics
    /// Panics if `quantity_g` is not positive.
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::allocation::{Allocation, AllocationStatus};
    ///
    /// let allocation = Allocation::reserve(
    ///     1,
    ///     "MO-001",
    ///     "RM-A",
    ///     51_000,
    ///     Some("U-PH".to_string()),
    ///     Utc.with_ymd_and_hms(2025, 10, 2, 8, 0, 0).unwrap(),
    ///     "",
    /// );
    ///
    /// assert_eq!(allocation.status(), AllocationStatus::Reserved);
    /// assert!(allocation.can_be_swapped());
    /// assert!(!allocation.stock_drawn());
    /// ```
    pub fn reserve(
        id: AllocationId,
        mo_id: impl Into<MoId>,
        material: impl Into<MaterialCode>,
        quantity_g: Grams,
        allocated_by: Option<UserId>,
        allocated_at: DateTime<Utc>,
        notes: impl Into<String>,
    ) -> Self {
        assert!(quantity_g > 0, "allocation quantity must be positive");
        Self {
            id,
            mo_id: mo_id.into(),
            material: material.into(),
            quantity_g,
            status: AllocationStatus::Reserved,
            allocated_at,
            allocated_by,
            locked_at: None,
            locked_by: None,
            released_at: None,
            released_by: None,
            swapped_at: None,
            swapped_by: None,
            swapped_to_mo: None,
            stock_drawn: false,
            notes: notes.into(),
        }
    }

    /// Create a `locked` allocation directly, used by the batch-lock split.
    /// The child inherits the parent's stock-drawn state.
    ///
    /// # Arguments
    /// * `id` - Surrogate allocation id of the child
    /// * `mo_id` - Order the material stays committed to
    /// * `material` - Material code
    /// * `quantity_g` - Locked quantity in grams (must be positive)
    /// * `locked_by` - User starting the batch, when known
    /// * `at` - Lock instant
    /// * `stock_drawn` - Drawn state inherited from the parent row
    /// * `notes` - Free-text note
    pub fn locked_split(
        id: AllocationId,
        mo_id: impl Into<MoId>,
        material: impl Into<MaterialCode>,
        quantity_g: Grams,
        locked_by: Option<UserId>,
        at: DateTime<Utc>,
        stock_drawn: bool,
        notes: impl Into<String>,
    ) -> Self {
        assert!(quantity_g > 0, "allocation quantity must be positive");
        Self {
            id,
            mo_id: mo_id.into(),
            material: material.into(),
            quantity_g,
            status: AllocationStatus::Locked,
            allocated_at: at,
            allocated_by: locked_by.clone(),
            locked_at: Some(at),
            locked_by,
            released_at: None,
            released_by: None,
            swapped_at: None,
            swapped_by: None,
            swapped_to_mo: None,
            stock_drawn,
            notes: notes.into(),
        }
    }

    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn mo_id(&self) -> &str {
        &self.mo_id
    }

    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn quantity_g(&self) -> Grams {
        self.quantity_g
    }

    pub fn status(&self) -> AllocationStatus {
        self.status
    }

    pub fn allocated_at(&self) -> DateTime<Utc> {
        self.allocated_at
    }

    pub fn swapped_to_mo(&self) -> Option<&str> {
        self.swapped_to_mo.as_deref()
    }

    /// Whether this quantity has already been drawn from stock.
    pub fn stock_drawn(&self) -> bool {
        self.stock_drawn
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Derived: only reserved rows may move to another MO.
    pub fn can_be_swapped(&self) -> bool {
        self.status == AllocationStatus::Reserved
    }

    /// Counts toward the MO's covered requirement.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            AllocationStatus::Reserved | AllocationStatus::Locked
        )
    }

    /// Flip a reserved row to locked in place (whole-row lock, no split).
    pub(crate) fn lock(
        &mut self,
        locked_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), AllocationRowError> {
        if self.status != AllocationStatus::Reserved {
            return Err(AllocationRowError::NotReserved(self.id));
        }
        self.status = AllocationStatus::Locked;
        self.locked_at = Some(at);
        self.locked_by = locked_by;
        Ok(())
    }

    /// Mark the row released. Reserved and locked rows both qualify
    /// (a locked release happens during MO stop or reject).
    pub(crate) fn release(
        &mut self,
        released_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<Grams, AllocationRowError> {
        if !self.is_active() {
            return Err(AllocationRowError::AlreadyTerminal(self.id));
        }
        self.status = AllocationStatus::Released;
        self.released_at = Some(at);
        self.released_by = released_by;
        Ok(self.quantity_g)
    }

    /// Mark this row swapped away to `target_mo`.
    pub(crate) fn swap_to(
        &mut self,
        target_mo: impl Into<MoId>,
        swapped_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), AllocationRowError> {
        if !self.can_be_swapped() {
            return Err(AllocationRowError::NotSwappable(self.id));
        }
        self.status = AllocationStatus::Swapped;
        self.swapped_at = Some(at);
        self.swapped_by = swapped_by;
        self.swapped_to_mo = Some(target_mo.into());
        Ok(())
    }

    /// Mark the quantity as drawn from stock.
    pub(crate) fn mark_stock_drawn(&mut self) {
        self.stock_drawn = true;
    }

    /// Shrink a reserved parent during a split. The caller removes the row
    /// instead when the remainder would hit zero.
    pub(crate) fn shrink_by(&mut self, quantity_g: Grams) {
        debug_assert!(self.status == AllocationStatus::Reserved);
        debug_assert!(quantity_g > 0 && quantity_g < self.quantity_g);
        self.quantity_g -= quantity_g;
    }
}

/// Append-only allocation history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationHistoryEntry {
    pub allocation_id: AllocationId,
    pub action: AllocationAction,
    pub from_mo: Option<MoId>,
    pub to_mo: Option<MoId>,
    pub quantity_g: Grams,
    pub performed_by: Option<UserId>,
    pub performed_at: DateTime<Utc>,
    pub reason: String,
}

/// Stock balance for one raw material. The hottest row in the system: every
/// production-start decrement and every release serialises on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockBalance {
    material: MaterialCode,
    available_g: Grams,
}

/// Error raised when a stock decrement would take availability negative.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("insufficient stock for {material}: required {required_g}g, available {available_g}g")]
pub struct InsufficientStock {
    pub material: MaterialCode,
    pub required_g: Grams,
    pub available_g: Grams,
}

impl StockBalance {
    /// Create a stock balance row.
    ///
    /// # Panics
    /// Panics if `available_g` is negative.
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::allocation::StockBalance;
    ///
    /// let stock = StockBalance::new("RM-A", 60_000);
    /// assert_eq!(stock.material(), "RM-A");
    /// assert_eq!(stock.available_g(), 60_000);
    /// ```
    pub fn new(material: impl Into<MaterialCode>, available_g: Grams) -> Self {
        assert!(available_g >= 0, "stock cannot start negative");
        Self {
            material: material.into(),
            available_g,
        }
    }

    pub fn material(&self) -> &str {
        &self.material
    }

    pub fn available_g(&self) -> Grams {
        self.available_g
    }

    /// Checked decrement; never lets availability go negative.
    pub(crate) fn decrement(&mut self, quantity_g: Grams) -> Result<(), InsufficientStock> {
        if quantity_g > self.available_g {
            return Err(InsufficientStock {
                material: self.material.clone(),
                required_g: quantity_g,
                available_g: self.available_g,
            });
        }
        self.available_g -= quantity_g;
        Ok(())
    }

    pub(crate) fn increment(&mut self, quantity_g: Grams) {
        debug_assert!(quantity_g >= 0);
        self.available_g += quantity_g;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_lock_requires_reserved() {
        let mut allocation =
            Allocation::reserve(1, "MO-001", "RM-A", 51_000, None, at(), "");
        assert!(allocation.lock(None, at()).is_ok());
        assert_eq!(allocation.status(), AllocationStatus::Locked);
        assert!(!allocation.can_be_swapped());
        // second lock fails
        assert_eq!(
            allocation.lock(None, at()),
            Err(AllocationRowError::NotReserved(1))
        );
    }

    #[test]
    fn test_release_locked_is_permitted() {
        let mut allocation =
            Allocation::reserve(2, "MO-001", "RM-A", 10_000, None, at(), "");
        allocation.lock(None, at()).unwrap();
        assert_eq!(allocation.release(None, at()), Ok(10_000));
        assert_eq!(allocation.status(), AllocationStatus::Released);
        // released is terminal
        assert_eq!(
            allocation.release(None, at()),
            Err(AllocationRowError::AlreadyTerminal(2))
        );
    }

    #[test]
    fn test_swap_only_from_reserved() {
        let mut allocation =
            Allocation::reserve(3, "MO-A", "RM-A", 30_000, None, at(), "");
        allocation.lock(None, at()).unwrap();
        assert_eq!(
            allocation.swap_to("MO-B", None, at()),
            Err(AllocationRowError::NotSwappable(3))
        );
    }

    #[test]
    fn test_stock_never_negative() {
        let mut stock = StockBalance::new("RM-A", 60_000);
        stock.decrement(51_000).unwrap();
        assert_eq!(stock.available_g(), 9_000);
        let err = stock.decrement(10_000).unwrap_err();
        assert_eq!(err.available_g, 9_000);
        assert_eq!(stock.available_g(), 9_000);
    }
}
