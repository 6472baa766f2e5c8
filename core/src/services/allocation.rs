//! Raw-material allocation service
//!
//! Two-phase commitment of raw material to manufacturing orders:
//! reservation binds quantity to an MO while it is still swappable, locking
//! pins it to a batch. Stock availability is only drawn down once, when
//! production starts, and only for allocations not already drawn; the
//! per-row drawn flag travels across splits and swap mirrors.
//!
//! # Settlement flow
//!
//! ```text
//! MO create ──reserve──> reserved (stock untouched)
//! MO start  ──────────── stock -= newly reserved
//! batch start ──lock───> locked (split when a row is larger than the need)
//! MO stop/reject ──release──> released, stock += quantity
//! higher-priority MO ──swap──> swapped + mirror reservation on the target
//! ```
//!
//! # Critical Invariants
//!
//! - Atomicity: every operation here runs inside one store transaction.
//! - A split conserves quantity: parent + child equal the original row.
//! - A swap moves material strictly from lower to higher priority and only
//!   from reserved rows on `on_hold` orders.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::units::{apply_tolerance, format_kg, mul_div_round, Grams};
use crate::models::actor::Actor;
use crate::models::allocation::{
    Allocation, AllocationAction, AllocationHistoryEntry, AllocationId, AllocationRowError,
    AllocationStatus, InsufficientStock,
};
use crate::models::masters::{MaterialType, Product};
use crate::models::mo::{ManufacturingOrder, MoId, MoStatus};
use crate::models::state::{FactoryState, StoreError};

/// Errors raised by allocation operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("product has no associated raw material")]
    NoMaterial,

    #[error("required RM quantity must be greater than 0")]
    ZeroRequirement,

    #[error(transparent)]
    InsufficientStock(#[from] InsufficientStock),

    #[error("allocation {0} was already swapped away")]
    DuplicateSwap(AllocationId),

    #[error(
        "swap target priority must be strictly higher than source \
         (target {target_level}, source {source_level})"
    )]
    SwapTargetLowerOrEqualPriority { target_level: u8, source_level: u8 },

    #[error("source order {0} must be on hold to give up its reservation")]
    SwapSourceNotOnHold(MoId),

    #[error("insufficient swappable quantity: required {required_g}g, found {available_g}g")]
    InsufficientSwappable { required_g: Grams, available_g: Grams },

    #[error(transparent)]
    Row(#[from] AllocationRowError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of [`reserve_for_mo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveOutcome {
    /// Ids of the reservation rows covering the requirement.
    pub allocation_ids: Vec<AllocationId>,
    /// Grams reserved by this call (zero when already covered).
    pub newly_reserved_g: Grams,
    /// Total reserved + locked grams after the call.
    pub total_active_g: Grams,
}

/// Outcome of [`lock_for_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLockResult {
    pub locked_count: usize,
    pub locked_g: Grams,
    pub required_g: Grams,
}

impl BatchLockResult {
    /// Whether the whole batch need was covered.
    pub fn is_complete(&self) -> bool {
        self.locked_g >= self.required_g
    }
}

/// Outcome of [`release_all_for_mo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseResult {
    pub released_count: usize,
    pub released_g: Grams,
}

/// Outcome of [`auto_swap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSwapResult {
    pub swapped_count: usize,
    pub swapped_g: Grams,
    /// Orders the material was taken from, in swap order.
    pub swapped_from_mos: Vec<MoId>,
    /// Mirror reservation rows created on the target order.
    pub mirror_allocation_ids: Vec<AllocationId>,
}

/// Read-only availability report for an MO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub required_g: Grams,
    pub current_allocated_g: Grams,
    pub available_in_stock_g: Grams,
    pub swappable_g: Grams,
    pub total_available_g: Grams,
    pub shortage_g: Grams,
    pub can_swap: bool,
    /// First few source orders swappable material would come from.
    pub swappable_from_mos: Vec<MoId>,
}

/// Read-only per-MO allocation rollup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationSummary {
    pub total_reserved_g: Grams,
    pub total_locked_g: Grams,
    pub total_swapped_g: Grams,
    pub total_released_g: Grams,
    pub is_fully_allocated: bool,
}

fn history_entry(
    allocation_id: AllocationId,
    action: AllocationAction,
    from_mo: Option<&str>,
    to_mo: Option<&str>,
    quantity_g: Grams,
    actor: Option<&Actor>,
    at: DateTime<Utc>,
    reason: impl Into<String>,
) -> AllocationHistoryEntry {
    AllocationHistoryEntry {
        allocation_id,
        action,
        from_mo: from_mo.map(str::to_string),
        to_mo: to_mo.map(str::to_string),
        quantity_g,
        performed_by: actor.map(|actor| actor.id.clone()),
        performed_at: at,
        reason: reason.into(),
    }
}

/// Material of the MO's product, or `NoMaterial`.
fn material_of(state: &FactoryState, mo: &ManufacturingOrder) -> Result<String, AllocationError> {
    let product = state.product(mo.product_code())?;
    product
        .material
        .clone()
        .ok_or(AllocationError::NoMaterial)
}

/// Reserve raw material for an MO up to its computed requirement.
///
/// Idempotent: when existing reserved + locked rows already cover the
/// requirement the call returns them without side effects. Partial coverage
/// is topped up with one additional reservation for the deficit.
///
/// Reservation never touches stock availability; it only checks that the
/// deficit could be drawn.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order to reserve for
/// * `actor` - Acting user, recorded on the allocation and history rows
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(ReserveOutcome)` with the covering rows and the newly reserved
///   quantity (zero when already covered)
/// - `Err(AllocationError)` on a missing material, zero requirement or
///   insufficient stock
///
/// # Example
/// ```
/// # use manufacturing_core_rs::services::allocation;
/// # use chrono::{TimeZone, Utc};
/// # use manufacturing_core_rs::models::actor::{Actor, Role};
/// # use manufacturing_core_rs::models::masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter};
/// # use manufacturing_core_rs::models::mo::Priority;
/// # use manufacturing_core_rs::models::supervisor::ShiftId;
/// # use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # use manufacturing_core_rs::{FactoryState, StockBalance};
/// # let mut state = FactoryState::new();
/// # state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
/// # state.add_product(Product::coil("P-SPRING", "RM-A", 50));
/// # state.set_stock(StockBalance::new("RM-A", 60_000));
/// # state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
/// # state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
/// # let ph = Actor::new("U-PH", &[Role::ProductionHead, Role::Manager, Role::Supervisor]);
/// # let now = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
/// # let order = NewMo {
/// #     mo_id: "MO-001".into(), product_code: "P-SPRING".into(), quantity: 1000,
/// #     tolerance_cp: 200, scrap_cp: 0, priority: Priority::Medium, shift: ShiftId::Shift1,
/// #     customer: None, rm_required_override_g: None,
/// # };
/// # mo_lifecycle::create_mo(&mut state, order, &ph, now).unwrap();
/// // MO creation already reserved the 51.000 kg requirement, so a
/// // second reserve is a no-op
/// let outcome = allocation::reserve_for_mo(&mut state, "MO-001", &ph, now).unwrap();
/// assert_eq!(outcome.newly_reserved_g, 0);
/// assert_eq!(outcome.total_active_g, 51_000);
/// // reservation never touches stock
/// assert_eq!(state.stock("RM-A").unwrap().available_g(), 60_000);
/// ```
pub fn reserve_for_mo(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<ReserveOutcome, AllocationError> {
    state.transact(|state| {
        let mo = state.mo(mo_id)?;
        let required_g = mo.rm_required_g();
        let material = material_of(state, mo)?;

        if required_g <= 0 {
            return Err(AllocationError::ZeroRequirement);
        }

        let existing_g = state.active_allocation_total(mo_id, &material);
        if existing_g >= required_g {
            info!(mo_id, existing_kg = %format_kg(existing_g), "reservation already covers requirement");
            let ids = state
                .allocations_of_mo(mo_id)
                .iter()
                .filter(|allocation| allocation.is_active() && allocation.material() == material)
                .map(|allocation| allocation.id())
                .collect();
            return Ok(ReserveOutcome {
                allocation_ids: ids,
                newly_reserved_g: 0,
                total_active_g: existing_g,
            });
        }

        let deficit_g = required_g - existing_g;
        let available_g = state.stock(&material)?.available_g();
        if available_g < deficit_g {
            return Err(AllocationError::InsufficientStock(InsufficientStock {
                material: material.clone(),
                required_g: deficit_g,
                available_g,
            }));
        }

        let id = state.next_allocation_id();
        let allocation = Allocation::reserve(
            id,
            mo_id,
            material.clone(),
            deficit_g,
            Some(actor.id.clone()),
            now,
            format!("Initial allocation for MO {mo_id}"),
        );
        state.insert_allocation(allocation);
        state.push_allocation_history(history_entry(
            id,
            AllocationAction::Reserved,
            None,
            Some(mo_id),
            deficit_g,
            Some(actor),
            now,
            "RM reservation",
        ));
        info!(mo_id, reserved_kg = %format_kg(deficit_g), "reserved raw material");

        Ok(ReserveOutcome {
            allocation_ids: vec![id],
            newly_reserved_g: deficit_g,
            total_active_g: existing_g + deficit_g,
        })
    })
}

/// Draw stock for every active allocation of the MO whose quantity has not
/// been drawn yet, at the production-start moment.
///
/// Reading the amount from the undrawn set at the transition point (rather
/// than the whole allocation set) is what prevents a double decrement when
/// production is started twice with reservations already in place.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order entering production
///
/// # Returns
/// The total grams drawn by this call (zero when everything was already
/// drawn).
///
/// # Example
/// ```
/// # use manufacturing_core_rs::services::allocation;
/// # use chrono::{TimeZone, Utc};
/// # use manufacturing_core_rs::models::actor::{Actor, Role};
/// # use manufacturing_core_rs::models::masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter};
/// # use manufacturing_core_rs::models::mo::Priority;
/// # use manufacturing_core_rs::models::supervisor::ShiftId;
/// # use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # use manufacturing_core_rs::{FactoryState, StockBalance};
/// # let mut state = FactoryState::new();
/// # state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
/// # state.add_product(Product::coil("P-SPRING", "RM-A", 50));
/// # state.set_stock(StockBalance::new("RM-A", 60_000));
/// # state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
/// # state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
/// # let ph = Actor::new("U-PH", &[Role::ProductionHead, Role::Manager, Role::Supervisor]);
/// # let now = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
/// # let order = NewMo {
/// #     mo_id: "MO-001".into(), product_code: "P-SPRING".into(), quantity: 1000,
/// #     tolerance_cp: 200, scrap_cp: 0, priority: Priority::Medium, shift: ShiftId::Shift1,
/// #     customer: None, rm_required_override_g: None,
/// # };
/// # mo_lifecycle::create_mo(&mut state, order, &ph, now).unwrap();
/// let drawn = allocation::draw_stock_for_mo(&mut state, "MO-001").unwrap();
/// assert_eq!(drawn, 51_000);
/// assert_eq!(state.stock("RM-A").unwrap().available_g(), 9_000);
///
/// // a second draw finds nothing undrawn
/// assert_eq!(allocation::draw_stock_for_mo(&mut state, "MO-001").unwrap(), 0);
/// assert_eq!(state.stock("RM-A").unwrap().available_g(), 9_000);
/// ```
pub fn draw_stock_for_mo(
    state: &mut FactoryState,
    mo_id: &str,
) -> Result<Grams, AllocationError> {
    state.transact(|state| {
        let pending: Vec<(AllocationId, String, Grams)> = state
            .allocations_of_mo(mo_id)
            .iter()
            .filter(|allocation| allocation.is_active() && !allocation.stock_drawn())
            .map(|allocation| {
                (
                    allocation.id(),
                    allocation.material().to_string(),
                    allocation.quantity_g(),
                )
            })
            .collect();

        let mut drawn_g = 0;
        for (allocation_id, material, quantity_g) in pending {
            state.stock_mut(&material)?.decrement(quantity_g)?;
            state.allocation_mut(allocation_id)?.mark_stock_drawn();
            drawn_g += quantity_g;
        }
        if drawn_g > 0 {
            info!(mo_id, drawn_kg = %format_kg(drawn_g), "stock drawn at production start");
        }
        Ok(drawn_g)
    })
}

/// Lock one reserved allocation in place (no split).
///
/// # Arguments
/// * `state` - Factory entity store
/// * `allocation_id` - Reserved row to lock
/// * `actor` - Acting user, recorded on the row and its history
/// * `now` - Current instant
/// * `reason` - History-row reason text
///
/// # Returns
/// - `Ok(())` when the row flipped to locked
/// - `Err(AllocationError)` when the row is not reserved
pub fn lock_allocation(
    state: &mut FactoryState,
    allocation_id: AllocationId,
    actor: &Actor,
    now: DateTime<Utc>,
    reason: &str,
) -> Result<(), AllocationError> {
    state.transact(|state| {
        let allocation = state.allocation_mut(allocation_id)?;
        let mo_id = allocation.mo_id().to_string();
        let quantity_g = allocation.quantity_g();
        allocation.lock(Some(actor.id.clone()), now)?;
        state.push_allocation_history(history_entry(
            allocation_id,
            AllocationAction::Locked,
            None,
            Some(&mo_id),
            quantity_g,
            Some(actor),
            now,
            reason,
        ));
        Ok(())
    })
}

/// Raw material needed by one batch, in grams.
///
/// Coil: planned grams with the MO tolerance applied. Sheet: the batch's
/// share of the MO requirement, proportional to its strips.
///
/// # Arguments
/// * `product` - Product master of the order
/// * `mo` - The order
/// * `batch_planned_quantity` - Grams (coil) or strips (sheet)
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use manufacturing_core_rs::models::masters::Product;
/// use manufacturing_core_rs::models::mo::{ManufacturingOrder, Priority};
/// use manufacturing_core_rs::models::supervisor::ShiftId;
/// use manufacturing_core_rs::services::allocation::batch_rm_required_g;
///
/// let product = Product::coil("P-SPRING", "RM-A", 50);
/// let mo = ManufacturingOrder::new(
///     "MO-001", "P-SPRING", 1000, 200, Priority::Medium, ShiftId::Shift1,
///     51_000, "U-PH", Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap(),
/// );
///
/// // 25 kg planned with 2 % tolerance needs 25.5 kg of coil
/// assert_eq!(batch_rm_required_g(&product, &mo, 25_000), 25_500);
/// ```
pub fn batch_rm_required_g(
    product: &Product,
    mo: &ManufacturingOrder,
    batch_planned_quantity: i64,
) -> Grams {
    match product.material_type {
        MaterialType::Coil => apply_tolerance(batch_planned_quantity, mo.tolerance_cp()),
        MaterialType::Sheet => {
            let mo_total_strips = product.strips_required(mo.quantity());
            if mo_total_strips <= 0 {
                return 0;
            }
            mul_div_round(mo.rm_required_g(), batch_planned_quantity, mo_total_strips)
        }
    }
}

/// Lock the MO's reserved allocations against a starting batch.
///
/// Rows are taken oldest first. When a row holds more than the remaining
/// need it is split: a fresh locked child carries exactly the need and the
/// parent shrinks by that amount (or disappears at zero). Never locks more
/// than the batch's computed requirement; a shortfall is reported, not
/// raised, so the caller can decide whether the batch may proceed anyway.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `batch_id` - Batch starting production
/// * `actor` - Acting user, recorded on locked rows and history
/// * `now` - Current instant
///
/// # Returns
/// A [`BatchLockResult`] with the locked row count, the locked grams and
/// the computed requirement; `is_complete` tells whether the need was
/// fully covered.
pub fn lock_for_batch(
    state: &mut FactoryState,
    batch_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<BatchLockResult, AllocationError> {
    state.transact(|state| {
        let batch = state.batch(batch_id)?;
        let mo_id = batch.mo_id().to_string();
        let planned = batch.planned_quantity();
        let mo = state.mo(&mo_id)?;
        let product = state.product(mo.product_code())?;

        let required_g = batch_rm_required_g(product, mo, planned);
        if required_g <= 0 {
            return Err(AllocationError::ZeroRequirement);
        }

        let reserved_ids: Vec<AllocationId> = state
            .reserved_allocations_of_mo(&mo_id)
            .iter()
            .map(|allocation| allocation.id())
            .collect();

        let mut locked_count = 0;
        let mut locked_g: Grams = 0;

        for allocation_id in reserved_ids {
            if locked_g >= required_g {
                break;
            }
            let remaining_needed = required_g - locked_g;
            let (row_quantity, material, drawn) = {
                let allocation = state.allocation(allocation_id)?;
                (
                    allocation.quantity_g(),
                    allocation.material().to_string(),
                    allocation.stock_drawn(),
                )
            };

            if row_quantity > remaining_needed {
                // Split: fresh locked child for the need, parent shrinks.
                let child_id = state.next_allocation_id();
                let child = Allocation::locked_split(
                    child_id,
                    mo_id.clone(),
                    material,
                    remaining_needed,
                    Some(actor.id.clone()),
                    now,
                    drawn,
                    format!("Split from allocation {allocation_id} for batch {batch_id}"),
                );
                state.insert_allocation(child);
                let parent = state.allocation_mut(allocation_id)?;
                parent.shrink_by(remaining_needed);
                state.push_allocation_history(history_entry(
                    child_id,
                    AllocationAction::Locked,
                    None,
                    Some(&mo_id),
                    remaining_needed,
                    Some(actor),
                    now,
                    format!(
                        "Batch {batch_id} started, split and locked {}kg from allocation {allocation_id}",
                        format_kg(remaining_needed)
                    ),
                ));
                locked_count += 1;
                locked_g += remaining_needed;
            } else {
                // Whole-row lock.
                state
                    .allocation_mut(allocation_id)?
                    .lock(Some(actor.id.clone()), now)?;
                state.push_allocation_history(history_entry(
                    allocation_id,
                    AllocationAction::Locked,
                    None,
                    Some(&mo_id),
                    row_quantity,
                    Some(actor),
                    now,
                    format!("Batch {batch_id} started, allocation locked"),
                ));
                locked_count += 1;
                locked_g += row_quantity;
            }
        }

        if locked_g < required_g {
            warn!(
                batch_id,
                locked_kg = %format_kg(locked_g),
                required_kg = %format_kg(required_g),
                "batch lock shortfall"
            );
        }

        Ok(BatchLockResult {
            locked_count,
            locked_g,
            required_g,
        })
    })
}

/// Release one allocation, handing its quantity back to stock when it had
/// been drawn.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `allocation_id` - Reserved or locked row to release
/// * `actor` - Acting user, `None` for system-driven releases
/// * `now` - Current instant
/// * `reason` - History-row reason text
///
/// # Returns
/// The released quantity in grams.
pub fn release_allocation(
    state: &mut FactoryState,
    allocation_id: AllocationId,
    actor: Option<&Actor>,
    now: DateTime<Utc>,
    reason: &str,
) -> Result<Grams, AllocationError> {
    state.transact(|state| {
        let (mo_id, material, quantity_g, drawn) = {
            let allocation = state.allocation_mut(allocation_id)?;
            let mo_id = allocation.mo_id().to_string();
            let material = allocation.material().to_string();
            let drawn = allocation.stock_drawn();
            let quantity_g = allocation.release(actor.map(|actor| actor.id.clone()), now)?;
            (mo_id, material, quantity_g, drawn)
        };
        if drawn {
            state.stock_mut(&material)?.increment(quantity_g);
        }
        state.push_allocation_history(history_entry(
            allocation_id,
            AllocationAction::Released,
            Some(&mo_id),
            None,
            quantity_g,
            actor,
            now,
            reason,
        ));
        Ok(quantity_g)
    })
}

/// Release every allocation of an MO in the given statuses.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order whose allocations are released
/// * `statuses` - Which allocation statuses qualify (reserved on stop,
///   reserved plus locked on reject)
/// * `actor` - Acting user, `None` for system-driven releases
/// * `now` - Current instant
/// * `reason` - History-row reason text
///
/// # Returns
/// The count and total grams released.
pub fn release_all_for_mo(
    state: &mut FactoryState,
    mo_id: &str,
    statuses: &[AllocationStatus],
    actor: Option<&Actor>,
    now: DateTime<Utc>,
    reason: &str,
) -> Result<ReleaseResult, AllocationError> {
    state.transact(|state| {
        let ids: Vec<AllocationId> = state
            .allocations_of_mo(mo_id)
            .iter()
            .filter(|allocation| statuses.contains(&allocation.status()))
            .map(|allocation| allocation.id())
            .collect();

        let mut result = ReleaseResult::default();
        for allocation_id in ids {
            let released_g = release_allocation(state, allocation_id, actor, now, reason)?;
            result.released_count += 1;
            result.released_g += released_g;
        }
        Ok(result)
    })
}

/// Swap one reserved allocation to a strictly higher-priority MO.
///
/// The source row flips to `swapped` and keeps a pointer to the target; a
/// mirror `reserved` row appears on the target order. History is written
/// for both sides.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `allocation_id` - Reserved row on the lower-priority source order
/// * `target_mo_id` - Strictly higher-priority order receiving the material
/// * `actor` - Acting user
/// * `now` - Current instant
/// * `reason` - History-row reason text
///
/// # Returns
/// The id of the mirror reservation created on the target order.
pub fn swap_allocation(
    state: &mut FactoryState,
    allocation_id: AllocationId,
    target_mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
    reason: &str,
) -> Result<AllocationId, AllocationError> {
    state.transact(|state| {
        let (source_mo_id, material, quantity_g, status, drawn) = {
            let allocation = state.allocation(allocation_id)?;
            (
                allocation.mo_id().to_string(),
                allocation.material().to_string(),
                allocation.quantity_g(),
                allocation.status(),
                allocation.stock_drawn(),
            )
        };
        if status == AllocationStatus::Swapped {
            return Err(AllocationError::DuplicateSwap(allocation_id));
        }

        let source_mo = state.mo(&source_mo_id)?;
        let target_mo = state.mo(target_mo_id)?;
        let source_level = source_mo.priority().level();
        let target_level = target_mo.priority().level();
        if target_level <= source_level {
            return Err(AllocationError::SwapTargetLowerOrEqualPriority {
                target_level,
                source_level,
            });
        }
        if source_mo.status() != MoStatus::OnHold {
            return Err(AllocationError::SwapSourceNotOnHold(source_mo_id));
        }

        state
            .allocation_mut(allocation_id)?
            .swap_to(target_mo_id, Some(actor.id.clone()), now)?;
        state.push_allocation_history(history_entry(
            allocation_id,
            AllocationAction::Swapped,
            Some(&source_mo_id),
            Some(target_mo_id),
            quantity_g,
            Some(actor),
            now,
            reason,
        ));

        let mirror_id = state.next_allocation_id();
        let mut mirror = Allocation::reserve(
            mirror_id,
            target_mo_id,
            material,
            quantity_g,
            Some(actor.id.clone()),
            now,
            format!("Swapped in from MO {source_mo_id}"),
        );
        if drawn {
            mirror.mark_stock_drawn();
        }
        state.insert_allocation(mirror);
        state.push_allocation_history(history_entry(
            mirror_id,
            AllocationAction::Reserved,
            Some(&source_mo_id),
            Some(target_mo_id),
            quantity_g,
            Some(actor),
            now,
            format!("Mirror reservation for swap from MO {source_mo_id}"),
        ));

        info!(
            allocation_id,
            from = %source_mo_id,
            to = %target_mo_id,
            quantity_kg = %format_kg(quantity_g),
            "allocation swapped"
        );
        Ok(mirror_id)
    })
}

/// Candidate rows for [`auto_swap`]: reserved, swappable, same material,
/// strictly lower priority, source order on hold. Ordered lowest priority
/// first, then oldest allocation.
fn swap_candidates(state: &FactoryState, target_mo: &ManufacturingOrder, material: &str) -> Vec<AllocationId> {
    let target_level = target_mo.priority().level();
    let mut candidates: Vec<(u8, DateTime<Utc>, AllocationId)> = state
        .allocations()
        .filter(|allocation| {
            allocation.material() == material && allocation.can_be_swapped()
        })
        .filter_map(|allocation| {
            let source = state.mo(allocation.mo_id()).ok()?;
            let level = source.priority().level();
            (source.status() == MoStatus::OnHold && level < target_level)
                .then_some((level, allocation.allocated_at(), allocation.id()))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().map(|(_, _, id)| id).collect()
}

/// Automatically pull reserved material from lower-priority on-hold orders
/// until the target order's outstanding requirement is covered.
///
/// All-or-nothing: if the candidates cannot cover the requirement the whole
/// attempt rolls back and nothing is swapped.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `target_mo_id` - Order whose outstanding requirement is to be covered
/// * `actor` - Acting user
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(AutoSwapResult)` with the swapped rows and source orders
/// - `Err(AllocationError::InsufficientSwappable)` when the candidates
///   fall short, leaving every row untouched
pub fn auto_swap(
    state: &mut FactoryState,
    target_mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<AutoSwapResult, AllocationError> {
    state.transact(|state| {
        let target = state.mo(target_mo_id)?;
        let material = material_of(state, target)?;
        let required_g = target.rm_required_g();
        if required_g <= 0 {
            return Err(AllocationError::ZeroRequirement);
        }
        let deficit_g = required_g - state.active_allocation_total(target_mo_id, &material);
        if deficit_g <= 0 {
            return Ok(AutoSwapResult {
                swapped_count: 0,
                swapped_g: 0,
                swapped_from_mos: Vec::new(),
                mirror_allocation_ids: Vec::new(),
            });
        }

        let target = state.mo(target_mo_id)?.clone();
        let candidates = swap_candidates(state, &target, &material);

        let mut result = AutoSwapResult {
            swapped_count: 0,
            swapped_g: 0,
            swapped_from_mos: Vec::new(),
            mirror_allocation_ids: Vec::new(),
        };
        for allocation_id in candidates {
            if result.swapped_g >= deficit_g {
                break;
            }
            let (source_mo, quantity_g) = {
                let allocation = state.allocation(allocation_id)?;
                (allocation.mo_id().to_string(), allocation.quantity_g())
            };
            let mirror_id = swap_allocation(
                state,
                allocation_id,
                target_mo_id,
                actor,
                now,
                &format!("Auto-swapped to higher priority MO {target_mo_id}"),
            )?;
            result.swapped_count += 1;
            result.swapped_g += quantity_g;
            result.swapped_from_mos.push(source_mo);
            result.mirror_allocation_ids.push(mirror_id);
        }

        if result.swapped_g < deficit_g {
            return Err(AllocationError::InsufficientSwappable {
                required_g: deficit_g,
                available_g: result.swapped_g,
            });
        }
        Ok(result)
    })
}

/// Read-only availability check for an MO: what is already allocated, what
/// stock could cover, and what could be pulled from lower-priority orders.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order to check
///
/// # Returns
/// An [`AvailabilityReport`]; its shortage is computed before swappable
/// material is considered.
///
/// # Example
/// ```
/// # use manufacturing_core_rs::services::allocation;
/// # use chrono::{TimeZone, Utc};
/// # use manufacturing_core_rs::models::actor::{Actor, Role};
/// # use manufacturing_core_rs::models::masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter};
/// # use manufacturing_core_rs::models::mo::Priority;
/// # use manufacturing_core_rs::models::supervisor::ShiftId;
/// # use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # use manufacturing_core_rs::{FactoryState, StockBalance};
/// # let mut state = FactoryState::new();
/// # state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
/// # state.add_product(Product::coil("P-SPRING", "RM-A", 50));
/// # state.set_stock(StockBalance::new("RM-A", 60_000));
/// # state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
/// # state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
/// # let ph = Actor::new("U-PH", &[Role::ProductionHead, Role::Manager, Role::Supervisor]);
/// # let now = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
/// # let order = NewMo {
/// #     mo_id: "MO-001".into(), product_code: "P-SPRING".into(), quantity: 1000,
/// #     tolerance_cp: 200, scrap_cp: 0, priority: Priority::Medium, shift: ShiftId::Shift1,
/// #     customer: None, rm_required_override_g: None,
/// # };
/// # mo_lifecycle::create_mo(&mut state, order, &ph, now).unwrap();
/// let report = allocation::check_availability(&state, "MO-001").unwrap();
/// assert_eq!(report.required_g, 51_000);
/// assert_eq!(report.current_allocated_g, 51_000);
/// assert_eq!(report.shortage_g, 0);
/// assert!(!report.can_swap);
/// ```
pub fn check_availability(
    state: &FactoryState,
    mo_id: &str,
) -> Result<AvailabilityReport, AllocationError> {
    let mo = state.mo(mo_id)?;
    let material = material_of(state, mo)?;
    let required_g = mo.rm_required_g();

    let current_allocated_g = state.active_allocation_total(mo_id, &material);
    let available_in_stock_g = state
        .stock(&material)
        .map(|stock| stock.available_g())
        .unwrap_or(0);

    let candidates = swap_candidates(state, mo, &material);
    let mut swappable_g = 0;
    let mut swappable_from_mos = Vec::new();
    for allocation_id in &candidates {
        let allocation = state.allocation(*allocation_id)?;
        swappable_g += allocation.quantity_g();
        if swappable_from_mos.len() < 5 {
            swappable_from_mos.push(allocation.mo_id().to_string());
        }
    }

    let total_available_g = current_allocated_g + available_in_stock_g + swappable_g;
    // Shortage is what is missing before swaps are considered; the
    // swappable figure shows how it could be covered.
    let shortage_g = (required_g - current_allocated_g - available_in_stock_g).max(0);
    Ok(AvailabilityReport {
        required_g,
        current_allocated_g,
        available_in_stock_g,
        swappable_g,
        total_available_g,
        shortage_g,
        can_swap: swappable_g > 0,
        swappable_from_mos,
    })
}

/// Per-MO allocation rollup by status.
///
/// # Returns
/// Totals per allocation status plus whether reserved + locked cover the
/// order's requirement.
pub fn allocation_summary(state: &FactoryState, mo_id: &str) -> Result<AllocationSummary, AllocationError> {
    let mo = state.mo(mo_id)?;
    let mut summary = AllocationSummary::default();
    for allocation in state.allocations_of_mo(mo_id) {
        match allocation.status() {
            AllocationStatus::Reserved => summary.total_reserved_g += allocation.quantity_g(),
            AllocationStatus::Locked => summary.total_locked_g += allocation.quantity_g(),
            AllocationStatus::Swapped => summary.total_swapped_g += allocation.quantity_g(),
            AllocationStatus::Released => summary.total_released_g += allocation.quantity_g(),
        }
    }
    summary.is_fully_allocated =
        summary.total_reserved_g + summary.total_locked_g >= mo.rm_required_g();
    Ok(summary)
}
