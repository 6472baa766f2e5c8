//! Manufacturing-order state machine
//!
//! Validates and applies MO status transitions. Every transition writes its
//! status-history row in the same transaction; a failed precondition leaves
//! no writes behind.
//!
//! ```text
//! on_hold --approve--> mo_approved --start_production--> in_progress
//!   |                      |                                  |
//!   |--reject--> rejected  '--stop--> stopped <----stop-------|
//!   '--(direct start)--> in_progress --complete--> completed --dispatch-->
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::core::units::{CentiPercent, Grams};
use crate::models::actor::{Actor, Role};
use crate::models::allocation::AllocationStatus;
use crate::models::mo::{ManufacturingOrder, MoId, MoStatus, Priority};
use crate::models::notification::{Notification, NotificationKind, NotificationPriority};
use crate::models::state::{FactoryState, StoreError};
use crate::models::supervisor::ShiftId;
use crate::services::allocation::{self, AllocationError, ReleaseResult};
use crate::services::batch_lifecycle::{self, BatchError};
use crate::services::notify_role_holders;
use crate::services::process_flow::{self, ProcessError};

/// Errors raised by MO transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition: cannot {action} while MO {mo_id} is {status:?}")]
    InvalidTransition {
        mo_id: MoId,
        action: &'static str,
        status: MoStatus,
    },

    #[error("caller is not authorised to {0}")]
    SupervisorUnauthorised(String),

    #[error("stop reason must be at least {min} characters")]
    StopReasonTooShort { min: usize },

    #[error("dispatch quantity must be positive")]
    InvalidDispatchQuantity,

    #[error("dispatch quantity {requested} exceeds finished quantity {available}")]
    DispatchExceedsCompleted { requested: i64, available: i64 },

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Input for creating a manufacturing order.
#[derive(Debug, Clone)]
pub struct NewMo {
    pub mo_id: MoId,
    pub product_code: String,
    /// Target quantity in finished pieces.
    pub quantity: i64,
    pub tolerance_cp: CentiPercent,
    pub scrap_cp: CentiPercent,
    pub priority: Priority,
    pub shift: ShiftId,
    pub customer: Option<String>,
    /// Explicit RM requirement in grams; computed from the product master
    /// when absent.
    pub rm_required_override_g: Option<Grams>,
}

fn invalid(mo: &ManufacturingOrder, action: &'static str) -> TransitionError {
    TransitionError::InvalidTransition {
        mo_id: mo.mo_id().to_string(),
        action,
        status: mo.status(),
    }
}

/// Create an MO in `on_hold` and attempt its initial RM reservation.
///
/// A reservation failure (no material, nothing required, insufficient
/// stock) is deliberately non-fatal at creation: the order can still be
/// planned, swapped into, or started later once material arrives.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `input` - Order parameters
/// * `actor` - Creating user
/// * `now` - Current instant
///
/// # Returns
/// The new order's id; the order sits in `on_hold`.
///
/// # Example
/// ```
/// use manufacturing_core_rs::models::mo::{MoStatus, Priority};
/// use manufacturing_core_rs::models::supervisor::ShiftId;
/// use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # use chrono::{TimeZone, Utc};
/// # use manufacturing_core_rs::models::actor::{Actor, Role};
/// # use manufacturing_core_rs::models::masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter};
/// # use manufacturing_core_rs::{FactoryState, StockBalance};
/// # let mut state = FactoryState::new();
/// # state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
/// # state.add_product(Product::coil("P-SPRING", "RM-A", 50));
/// # state.set_stock(StockBalance::new("RM-A", 60_000));
/// # state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
/// # state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
/// # let ph = Actor::new("U-PH", &[Role::ProductionHead, Role::Manager, Role::Supervisor]);
/// # let now = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
/// let order = NewMo {
///     mo_id: "MO-001".into(),
///     product_code: "P-SPRING".into(),
///     quantity: 1000,
///     tolerance_cp: 200,
///     scrap_cp: 0,
///     priority: Priority::Medium,
///     shift: ShiftId::Shift1,
///     customer: None,
///     rm_required_override_g: None,
/// };
/// let mo_id = mo_lifecycle::create_mo(&mut state, order, &ph, now).unwrap();
///
/// assert_eq!(state.mo(&mo_id).unwrap().status(), MoStatus::OnHold);
/// assert_eq!(state.mo(&mo_id).unwrap().rm_required_g(), 51_000);
/// // the requirement was reserved at creation, stock untouched
/// assert_eq!(state.stock("RM-A").unwrap().available_g(), 60_000);
/// ```
pub fn create_mo(
    state: &mut FactoryState,
    input: NewMo,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<MoId, TransitionError> {
    state.transact(|state| {
        let product = state.product(&input.product_code)?;
        let rm_required_g = input
            .rm_required_override_g
            .or_else(|| product.rm_required(input.quantity, input.tolerance_cp))
            .unwrap_or(0);

        let mut mo = ManufacturingOrder::new(
            input.mo_id.clone(),
            input.product_code.clone(),
            input.quantity,
            input.tolerance_cp,
            input.priority,
            input.shift,
            rm_required_g,
            actor.id.clone(),
            now,
        )
        .with_scrap_percent(input.scrap_cp);
        if let Some(customer) = input.customer.clone() {
            mo = mo.with_customer(customer);
        }
        state.insert_mo(mo)?;

        match allocation::reserve_for_mo(state, &input.mo_id, actor, now) {
            Ok(outcome) => {
                info!(mo_id = %input.mo_id, reserved_g = outcome.newly_reserved_g, "MO created with reservation");
            }
            Err(
                error @ (AllocationError::NoMaterial
                | AllocationError::ZeroRequirement
                | AllocationError::InsufficientStock(_)),
            ) => {
                warn!(mo_id = %input.mo_id, %error, "MO created without reservation");
            }
            Err(error) => return Err(error.into()),
        }
        Ok(input.mo_id)
    })
}

/// Approve an on-hold MO. Managers and production heads only. Performs no
/// stock operation; initialises process executions from the BOM and
/// auto-assigns their supervisors.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order to approve
/// * `actor` - Approving user (manager or production head)
/// * `now` - Current instant
/// * `notes` - Status-history note; a default is written when empty
///
/// # Returns
/// - `Ok(())` with the order in `mo_approved` and its executions created
/// - `Err(TransitionError)` on a role or status precondition failure
pub fn approve_mo(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
    notes: &str,
) -> Result<(), TransitionError> {
    if !actor.has_any_role(&[Role::Manager, Role::ProductionHead]) {
        return Err(TransitionError::SupervisorUnauthorised(
            "approve manufacturing orders".into(),
        ));
    }
    state.transact(|state| {
        {
            let mo = state.mo(mo_id)?;
            if mo.status() != MoStatus::OnHold {
                return Err(invalid(mo, "approve"));
            }
        }
        let notes = if notes.is_empty() {
            "MO approved by manager"
        } else {
            notes
        };
        state.mo_mut(mo_id)?.transition(
            MoStatus::MoApproved,
            Some(actor.id.clone()),
            now,
            notes,
        );

        match process_flow::initialize_executions(state, mo_id, actor, now) {
            Ok(_) => {}
            Err(ProcessError::NoBomProcesses(product)) => {
                warn!(mo_id, product = %product, "approved without process executions, product has no BOM");
            }
            Err(error) => return Err(error.into()),
        }
        info!(mo_id, "MO approved");
        Ok(())
    })
}

/// RM-store confirmation that allocation work for the order is done.
/// Flips `on_hold` to the `rm_allocated` sub-status; an order already in
/// progress only gets the bookkeeping fields.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order being confirmed
/// * `actor` - RM-store user
/// * `now` - Current instant
pub fn complete_rm_allocation(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !actor.has_any_role(&[Role::RmStore, Role::Admin]) {
        return Err(TransitionError::SupervisorUnauthorised(
            "complete RM allocation".into(),
        ));
    }
    state.transact(|state| {
        let status = state.mo(mo_id)?.status();
        match status {
            MoStatus::OnHold => {
                let mo = state.mo_mut(mo_id)?;
                mo.transition(
                    MoStatus::RmAllocated,
                    Some(actor.id.clone()),
                    now,
                    "RM allocation completed by RM store",
                );
                mo.record_rm_allocated(actor.id.clone(), now);
            }
            MoStatus::InProgress => {
                state.mo_mut(mo_id)?.record_rm_allocated(actor.id.clone(), now);
            }
            _ => {
                let mo = state.mo(mo_id)?;
                return Err(invalid(mo, "complete RM allocation"));
            }
        }
        Ok(())
    })
}

fn ensure_reservation_and_draw(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Grams, TransitionError> {
    match allocation::reserve_for_mo(state, mo_id, actor, now) {
        Ok(_) => {}
        Err(
            error @ (AllocationError::NoMaterial
            | AllocationError::ZeroRequirement
            | AllocationError::InsufficientStock(_)),
        ) => {
            warn!(mo_id, %error, "production starting without full reservation");
        }
        Err(error) => return Err(error.into()),
    }
    Ok(allocation::draw_stock_for_mo(state, mo_id)?)
}

/// Start production on an approved MO. Production heads only.
///
/// Ensures reservations exist (topping up a partial one), draws the
/// undrawn allocation quantity from stock, stamps the actual start and
/// notifies the RM store.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Approved order to start
/// * `actor` - Production head
/// * `now` - Current instant
/// * `notes` - Status-history note; a default is written when empty
///
/// # Returns
/// - `Ok(())` with the order in `in_progress` and stock drawn
/// - `Err(TransitionError)` on a role or status precondition failure,
///   leaving every row untouched
///
/// # Example
/// ```
/// use manufacturing_core_rs::models::mo::{MoStatus, Priority};
/// use manufacturing_core_rs::models::supervisor::ShiftId;
/// use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # use chrono::{TimeZone, Utc};
/// # use manufacturing_core_rs::models::actor::{Actor, Role};
/// # use manufacturing_core_rs::models::masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter};
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
/// mo_lifecycle::approve_mo(&mut state, "MO-001", &ph, now, "").unwrap();
/// mo_lifecycle::start_production(&mut state, "MO-001", &ph, now, "").unwrap();
///
/// assert_eq!(state.mo("MO-001").unwrap().status(), MoStatus::InProgress);
/// // the reserved 51.000 kg was drawn from stock exactly once
/// assert_eq!(state.stock("RM-A").unwrap().available_g(), 9_000);
/// ```
pub fn start_production(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
    notes: &str,
) -> Result<(), TransitionError> {
    if !actor.has_role(Role::ProductionHead) {
        return Err(TransitionError::SupervisorUnauthorised(
            "start production".into(),
        ));
    }
    state.transact(|state| {
        {
            let mo = state.mo(mo_id)?;
            if mo.status() != MoStatus::MoApproved {
                return Err(invalid(mo, "start production"));
            }
        }
        let drawn_g = ensure_reservation_and_draw(state, mo_id, actor, now)?;

        let notes = if notes.is_empty() {
            "Production started by production head".to_string()
        } else {
            notes.to_string()
        };
        {
            let mo = state.mo_mut(mo_id)?;
            mo.transition(MoStatus::InProgress, Some(actor.id.clone()), now, notes);
            mo.set_actual_start(now);
        }

        let message =
            format!("MO {mo_id} has started production and requires RM allocation.");
        let mo = mo_id.to_string();
        let creator = actor.id.clone();
        notify_role_holders(state, &[Role::RmStore], |recipient| {
            Notification::new(
                NotificationKind::RmAllocationRequired,
                format!("RM Allocation Required: {mo}"),
                message.clone(),
                recipient.clone(),
                now,
            )
            .with_priority(NotificationPriority::High)
            .with_related_mo(mo.clone())
            .action_required()
            .with_creator(creator.clone())
        });

        info!(mo_id, drawn_g, "production started");
        Ok(())
    })
}

/// Direct start by a supervisor, skipping the approval step. Same
/// reservation and stock semantics as [`start_production`].
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - On-hold order to start
/// * `actor` - Supervisor or production head
/// * `now` - Current instant
pub fn start_direct(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !actor.has_any_role(&[Role::Supervisor, Role::ProductionHead]) {
        return Err(TransitionError::SupervisorUnauthorised(
            "start an order directly".into(),
        ));
    }
    state.transact(|state| {
        {
            let mo = state.mo(mo_id)?;
            if !matches!(mo.status(), MoStatus::OnHold | MoStatus::RmAllocated) {
                return Err(invalid(mo, "start directly"));
            }
        }
        let drawn_g = ensure_reservation_and_draw(state, mo_id, actor, now)?;
        {
            let mo = state.mo_mut(mo_id)?;
            mo.transition(
                MoStatus::InProgress,
                Some(actor.id.clone()),
                now,
                "Production started directly by supervisor",
            );
            mo.set_actual_start(now);
        }
        info!(mo_id, drawn_g, "production started directly");
        Ok(())
    })
}

/// Stop an MO, releasing every still-swappable (non-locked) allocation
/// back to stock. In-flight batches are allowed to finish their current
/// process step; new starts are blocked by the coordinator.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `config` - Core configuration (minimum stop-reason length)
/// * `mo_id` - Order to stop
/// * `reason` - Trimmed reason, at least the configured length
/// * `actor` - Acting user
/// * `now` - Current instant
///
/// # Returns
/// The count and grams of released allocations.
///
/// # Example
/// ```
/// use manufacturing_core_rs::models::mo::Priority;
/// use manufacturing_core_rs::models::supervisor::ShiftId;
/// use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo, TransitionError};
/// use manufacturing_core_rs::CoreConfig;
/// # use chrono::{TimeZone, Utc};
/// # use manufacturing_core_rs::models::actor::{Actor, Role};
/// # use manufacturing_core_rs::models::masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter};
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
/// let config = CoreConfig::default();
///
/// // a throwaway reason is rejected before anything changes
/// let error = mo_lifecycle::stop_mo(&mut state, &config, "MO-001", "  broken  ", &ph, now)
///     .unwrap_err();
/// assert_eq!(error, TransitionError::StopReasonTooShort { min: 10 });
///
/// mo_lifecycle::stop_mo(
///     &mut state,
///     &config,
///     "MO-001",
///     "material needed for an urgent order",
///     &ph,
///     now,
/// )
/// .unwrap();
/// ```
pub fn stop_mo(
    state: &mut FactoryState,
    config: &CoreConfig,
    mo_id: &str,
    reason: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<ReleaseResult, TransitionError> {
    let trimmed = reason.trim();
    if trimmed.len() < config.min_stop_reason_len {
        return Err(TransitionError::StopReasonTooShort {
            min: config.min_stop_reason_len,
        });
    }
    state.transact(|state| {
        {
            let mo = state.mo(mo_id)?;
            if !matches!(
                mo.status(),
                MoStatus::OnHold | MoStatus::RmAllocated | MoStatus::InProgress
            ) {
                return Err(invalid(mo, "stop"));
            }
        }

        let released = allocation::release_all_for_mo(
            state,
            mo_id,
            &[AllocationStatus::Reserved],
            Some(actor),
            now,
            &format!("MO {mo_id} stopped: {trimmed}"),
        )?;

        {
            let mo = state.mo_mut(mo_id)?;
            mo.record_stop(trimmed, now);
            mo.transition(MoStatus::Stopped, Some(actor.id.clone()), now, trimmed);
        }

        let message = format!("MO {mo_id} was stopped: {trimmed}");
        let mo = mo_id.to_string();
        notify_role_holders(
            state,
            &[Role::ProductionHead, Role::Manager],
            |recipient| {
                Notification::new(
                    NotificationKind::MoStopped,
                    "MO Stopped",
                    message.clone(),
                    recipient.clone(),
                    now,
                )
                .with_priority(NotificationPriority::High)
                .with_related_mo(mo.clone())
            },
        );
        info!(mo_id, released_g = released.released_g, "MO stopped");
        Ok(released)
    })
}

/// Reject an MO in any non-terminal status, releasing every allocation
/// regardless of its state.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order to reject
/// * `reason` - Status-history note
/// * `actor` - Acting user
/// * `now` - Current instant
///
/// # Returns
/// The count and grams of released allocations.
pub fn reject_mo(
    state: &mut FactoryState,
    mo_id: &str,
    reason: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<ReleaseResult, TransitionError> {
    state.transact(|state| {
        {
            let mo = state.mo(mo_id)?;
            if mo.status().is_terminal() {
                return Err(invalid(mo, "reject"));
            }
        }
        let released = allocation::release_all_for_mo(
            state,
            mo_id,
            &[AllocationStatus::Reserved, AllocationStatus::Locked],
            Some(actor),
            now,
            &format!("MO {mo_id} rejected: {reason}"),
        )?;
        state.mo_mut(mo_id)?.transition(
            MoStatus::Rejected,
            Some(actor.id.clone()),
            now,
            reason,
        );
        info!(mo_id, released_g = released.released_g, "MO rejected");
        Ok(released)
    })
}

/// Complete an in-progress MO once every process execution is completed
/// and the finished quantity reaches the target.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order to complete
/// * `actor` - Acting user
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(())` with the order completed and its actual end stamped
/// - `Err(TransitionError::InvalidTransition)` while processes are open
///   or the target quantity is not reached
pub fn complete_mo(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    state.transact(|state| {
        {
            let mo = state.mo(mo_id)?;
            if mo.status() != MoStatus::InProgress {
                return Err(invalid(mo, "complete"));
            }
        }
        let executions = state.executions_of_mo(mo_id);
        let all_done = !executions.is_empty()
            && executions
                .iter()
                .all(|execution| execution.status().is_terminal());
        if !all_done {
            let mo = state.mo(mo_id)?;
            return Err(invalid(mo, "complete (processes still open)"));
        }

        let produced = batch_lifecycle::completed_pieces(state, mo_id)?;
        let target = state.mo(mo_id)?.quantity();
        if produced < target {
            let mo = state.mo(mo_id)?;
            return Err(invalid(mo, "complete (target quantity not reached)"));
        }

        let mo = state.mo_mut(mo_id)?;
        mo.set_actual_end(now);
        mo.transition(
            MoStatus::Completed,
            Some(actor.id.clone()),
            now,
            format!("MO completed with {produced} finished pieces"),
        );
        info!(mo_id, produced, "MO completed");
        Ok(())
    })
}

/// Dispatch finished quantity to the customer. Raw-material state is
/// untouched; only the finished-goods quantity moves. A full dispatch on
/// an in-progress order completes it.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Completed (or in-progress) order
/// * `quantity` - Pieces to dispatch (must be positive)
/// * `actor` - Manager, FG store or production head
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(())` with the dispatched quantity accumulated
/// - `Err(TransitionError::DispatchExceedsCompleted)` when the request
///   exceeds the finished, not-yet-dispatched quantity
pub fn dispatch(
    state: &mut FactoryState,
    mo_id: &str,
    quantity: i64,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !actor.has_any_role(&[Role::Manager, Role::FgStore, Role::ProductionHead]) {
        return Err(TransitionError::SupervisorUnauthorised(
            "dispatch orders".into(),
        ));
    }
    if quantity <= 0 {
        return Err(TransitionError::InvalidDispatchQuantity);
    }
    state.transact(|state| {
        {
            let mo = state.mo(mo_id)?;
            if !matches!(mo.status(), MoStatus::Completed | MoStatus::InProgress) {
                return Err(invalid(mo, "dispatch"));
            }
        }
        let produced = batch_lifecycle::completed_pieces(state, mo_id)?;
        let available = produced - state.mo(mo_id)?.dispatched_quantity();
        if quantity > available {
            return Err(TransitionError::DispatchExceedsCompleted {
                requested: quantity,
                available,
            });
        }

        {
            let mo = state.mo_mut(mo_id)?;
            mo.add_dispatched(quantity);
        }
        let (dispatched, target, status) = {
            let mo = state.mo(mo_id)?;
            (mo.dispatched_quantity(), mo.quantity(), mo.status())
        };
        if dispatched >= target && status != MoStatus::Completed {
            let mo = state.mo_mut(mo_id)?;
            mo.set_actual_end(now);
            mo.transition(
                MoStatus::Completed,
                Some(actor.id.clone()),
                now,
                "MO completed and fully dispatched to customer",
            );
        }
        info!(mo_id, quantity, dispatched, "dispatched to customer");
        Ok(())
    })
}
