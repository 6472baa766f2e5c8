//! Batch lifecycle controller
//!
//! Creation against the remaining-RM budget, supervisor verification,
//! start with per-batch RM locking, the OK/Scrap/Rework completion split,
//! and order-level scrap of whatever RM is left over.
//!
//! # Remaining RM
//!
//! ```text
//! coil:  remaining_g = mo.rm_required - sum(batch_rm of live batches) - mo.scrap_rm
//! sheet: remaining_strips = strips_required(mo.quantity) - sum(batch strips of live batches)
//! ```
//!
//! A new batch is permitted only while the remaining budget strictly
//! exceeds the configured threshold (0.050 kg for coil, 1 strip for
//! sheet).

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::core::units::{format_kg, Grams};
use crate::models::actor::{Actor, Role};
use crate::models::batch::{Batch, BatchId, BatchStatus, BATCH_VERIFIED_MARKER};
use crate::models::completion::{
    BatchProcessCompletion, CompletionId, ReworkBatch, ReworkId, ReworkStatus,
};
use crate::models::masters::MaterialType;
use crate::models::mo::MoStatus;
use crate::models::notification::{ActivityEntry, ActivityKind};
use crate::models::process_execution::ExecutionId;
use crate::models::state::{FactoryState, StoreError};
use crate::services::allocation::{self, batch_rm_required_g, AllocationError, BatchLockResult};
use crate::services::process_flow::{self, ProcessError, StepCompletion};
use crate::services::scheduler;

/// Errors raised by batch operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("caller is not authorised to {0}")]
    SupervisorUnauthorised(String),

    #[error("remaining RM budget is exhausted ({remaining} left, threshold {threshold})")]
    RemainingRmExhausted { remaining: i64, threshold: i64 },

    #[error("batch {0} must be verified by a supervisor before starting")]
    BatchNotVerified(BatchId),

    #[error("batch {0} is already verified")]
    BatchAlreadyVerified(BatchId),

    #[error(
        "completion quantities do not balance: input {input_g}g, ok {ok_g}g, \
         scrap {scrap_g}g, rework {rework_g}g (tolerance {tolerance_g}g)"
    )]
    QuantityMismatch {
        input_g: Grams,
        ok_g: Grams,
        scrap_g: Grams,
        rework_g: Grams,
        tolerance_g: Grams,
    },

    #[error("no remaining RM to send to scrap")]
    NoScrapToSend,

    #[error("scrap amount {requested_g}g exceeds remaining RM {remaining_g}g")]
    ScrapExceedsRemaining { requested_g: Grams, remaining_g: Grams },

    #[error("operation is not defined for this material type")]
    UnsupportedMaterialType,

    #[error("RM lock incomplete for batch: locked {locked_g}g of {required_g}g")]
    BatchLockIncomplete { locked_g: Grams, required_g: Grams },

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Remaining batch-creation budget of an MO, in the unit of its material
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingRm {
    CoilGrams(Grams),
    SheetStrips(i64),
}

impl RemainingRm {
    /// Whether a new batch may still be created under the configured
    /// thresholds (strictly-greater check).
    pub fn allows_new_batch(&self, config: &CoreConfig) -> bool {
        match self {
            Self::CoilGrams(grams) => *grams > config.coil_remaining_threshold_g,
            Self::SheetStrips(strips) => *strips > config.sheet_remaining_threshold_strips,
        }
    }

    fn raw(&self) -> i64 {
        match self {
            Self::CoilGrams(grams) => *grams,
            Self::SheetStrips(strips) => *strips,
        }
    }
}

/// Outcome of a completion with an OK/Scrap/Rework split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub completion_id: CompletionId,
    /// Rework batch chained when the rework portion was positive.
    pub rework_id: Option<ReworkId>,
    pub step: StepCompletion,
}

/// Raw material still available for new batches under an MO.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order to compute the budget for
///
/// # Returns
/// The remaining budget in the unit of the order's material type: grams
/// for coil, strips for sheet.
pub fn remaining_rm(state: &FactoryState, mo_id: &str) -> Result<RemainingRm, BatchError> {
    let mo = state.mo(mo_id)?;
    let product = state.product(mo.product_code())?;
    let live_batches: Vec<&Batch> = state
        .batches_of_mo(mo_id)
        .into_iter()
        .filter(|batch| batch.consumes_rm())
        .collect();

    match product.material_type {
        MaterialType::Coil => {
            let consumed_g: Grams = live_batches
                .iter()
                .map(|batch| batch_rm_required_g(product, mo, batch.planned_quantity()))
                .sum();
            Ok(RemainingRm::CoilGrams(
                mo.rm_required_g() - consumed_g - mo.scrap_rm_weight_g(),
            ))
        }
        MaterialType::Sheet => {
            let consumed_strips: i64 = live_batches
                .iter()
                .map(|batch| batch.planned_quantity())
                .sum();
            Ok(RemainingRm::SheetStrips(
                product.strips_required(mo.quantity()) - consumed_strips,
            ))
        }
    }
}

/// Create a batch under an MO.
///
/// The parent must be on hold (including the rm_allocated sub-status) or in
/// progress, and the remaining-RM budget must strictly exceed the
/// threshold. The first batch of an on-hold order flips it to in_progress
/// in the same transaction. Every process execution's progress is
/// recomputed afterwards, which is where a previously completed process
/// legally reverts.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `config` - Core configuration (remaining-RM thresholds)
/// * `mo_id` - Parent order
/// * `planned_quantity` - Grams (coil) or strips (sheet), must be positive
/// * `actor` - Creating user
/// * `now` - Current instant
///
/// # Returns
/// The generated batch id.
///
/// # Example
/// ```
/// # use manufacturing_core_rs::services::batch_lifecycle;
/// use manufacturing_core_rs::models::mo::MoStatus;
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
/// # use manufacturing_core_rs::models::mo::Priority;
/// # use manufacturing_core_rs::models::supervisor::ShiftId;
/// # use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # let order = NewMo {
/// #     mo_id: "MO-001".into(), product_code: "P-SPRING".into(), quantity: 1000,
/// #     tolerance_cp: 200, scrap_cp: 0, priority: Priority::Medium, shift: ShiftId::Shift1,
/// #     customer: None, rm_required_override_g: None,
/// # };
/// # mo_lifecycle::create_mo(&mut state, order, &ph, now).unwrap();
/// let config = CoreConfig::default();
/// let batch_id =
///     batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph, now).unwrap();
///
/// assert_eq!(batch_id, "MO-001-B1");
/// // the first batch flips the on-hold order into progress
/// assert_eq!(state.mo("MO-001").unwrap().status(), MoStatus::InProgress);
/// ```
pub fn create_batch(
    state: &mut FactoryState,
    config: &CoreConfig,
    mo_id: &str,
    planned_quantity: i64,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<BatchId, BatchError> {
    state.transact(|state| {
        if planned_quantity <= 0 {
            return Err(BatchError::InvalidTransition(
                "batch planned quantity must be positive".into(),
            ));
        }
        let mo_status = state.mo(mo_id)?.status();
        if !matches!(
            mo_status,
            MoStatus::OnHold | MoStatus::RmAllocated | MoStatus::InProgress
        ) {
            return Err(BatchError::InvalidTransition(format!(
                "batches can only be created while the MO is on hold or in progress, status is {mo_status:?}"
            )));
        }

        let remaining = remaining_rm(state, mo_id)?;
        if !remaining.allows_new_batch(config) {
            let threshold = match remaining {
                RemainingRm::CoilGrams(_) => config.coil_remaining_threshold_g,
                RemainingRm::SheetStrips(_) => config.sheet_remaining_threshold_strips,
            };
            return Err(BatchError::RemainingRmExhausted {
                remaining: remaining.raw(),
                threshold,
            });
        }

        let batch_id = format!("{mo_id}-B{}", state.batch_count_of_mo(mo_id) + 1);
        state.insert_batch(Batch::new(
            batch_id.clone(),
            mo_id,
            planned_quantity,
            actor.id.clone(),
            now,
        ))?;

        if matches!(mo_status, MoStatus::OnHold | MoStatus::RmAllocated) {
            let mo = state.mo_mut(mo_id)?;
            mo.transition(
                MoStatus::InProgress,
                Some(actor.id.clone()),
                now,
                format!("first batch created: {batch_id}"),
            );
            mo.set_actual_start(now);
        }

        process_flow::recompute_progress_for_mo(state, mo_id)?;
        info!(mo_id, batch_id = %batch_id, planned_quantity, "batch created");
        Ok(batch_id)
    })
}

/// Supervisor verification of a freshly created batch.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `batch_id` - Batch in `created` status
/// * `actor` - Verifying supervisor
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(())` with the marker appended and the activity row written
/// - `Err(BatchError::BatchAlreadyVerified)` on a repeat verification
pub fn verify_batch(
    state: &mut FactoryState,
    batch_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), BatchError> {
    if !actor.has_role(Role::Supervisor) {
        return Err(BatchError::SupervisorUnauthorised("verify a batch".into()));
    }
    state.transact(|state| {
        let mo_id = {
            let batch = state.batch(batch_id)?;
            if batch.status() != BatchStatus::Created {
                return Err(BatchError::InvalidTransition(format!(
                    "batch can only be verified in created status, status is {:?}",
                    batch.status()
                )));
            }
            if batch.is_verified() {
                return Err(BatchError::BatchAlreadyVerified(batch_id.to_string()));
            }
            batch.mo_id().to_string()
        };

        state.batch_mut(batch_id)?.append_note(&format!(
            "{BATCH_VERIFIED_MARKER} Verified by {} on {}",
            actor.id,
            now.format("%Y-%m-%d %H:%M:%S")
        ));

        let first_execution = state
            .executions_of_mo(&mo_id)
            .first()
            .map(|execution| execution.id());
        let mut activity = ActivityEntry::new(ActivityKind::BatchVerified, now)
            .with_mo(mo_id)
            .with_batch(batch_id.to_string())
            .by(actor.id.clone())
            .with_remark(format!("Batch {batch_id} verified by supervisor before starting"));
        if let Some(execution_id) = first_execution {
            activity = activity.with_execution(execution_id);
        }
        state.push_activity(activity);
        Ok(())
    })
}

/// Start a verified batch, locking its share of the MO's reserved RM.
///
/// A lock shortfall is logged and surfaced in the result; the batch still
/// proceeds unless `strict_batch_lock` is set.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `config` - Core configuration (`strict_batch_lock`)
/// * `batch_id` - Verified batch in `created` status
/// * `actor` - Starting user
/// * `now` - Current instant
///
/// # Returns
/// The [`BatchLockResult`] of the per-batch RM lock.
///
/// # Example
/// ```
/// # use manufacturing_core_rs::services::batch_lifecycle;
/// use manufacturing_core_rs::models::batch::BatchStatus;
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
/// # use manufacturing_core_rs::models::mo::Priority;
/// # use manufacturing_core_rs::models::supervisor::ShiftId;
/// # use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # let order = NewMo {
/// #     mo_id: "MO-001".into(), product_code: "P-SPRING".into(), quantity: 1000,
/// #     tolerance_cp: 200, scrap_cp: 0, priority: Priority::Medium, shift: ShiftId::Shift1,
/// #     customer: None, rm_required_override_g: None,
/// # };
/// # mo_lifecycle::create_mo(&mut state, order, &ph, now).unwrap();
/// let config = CoreConfig::default();
/// let batch_id =
///     batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph, now).unwrap();
/// batch_lifecycle::verify_batch(&mut state, &batch_id, &ph, now).unwrap();
///
/// let lock = batch_lifecycle::start_batch(&mut state, &config, &batch_id, &ph, now).unwrap();
/// // the 25.5 kg need was split out of the 51 kg reservation
/// assert_eq!(lock.locked_g, 25_500);
/// assert!(lock.is_complete());
/// assert_eq!(state.batch(&batch_id).unwrap().status(), BatchStatus::InProcess);
/// ```
pub fn start_batch(
    state: &mut FactoryState,
    config: &CoreConfig,
    batch_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<BatchLockResult, BatchError> {
    state.transact(|state| {
        {
            let batch = state.batch(batch_id)?;
            if batch.status() != BatchStatus::Created {
                return Err(BatchError::InvalidTransition(format!(
                    "batch can only be started from created status, status is {:?}",
                    batch.status()
                )));
            }
            if !batch.is_verified() {
                return Err(BatchError::BatchNotVerified(batch_id.to_string()));
            }
            let mo = state.mo(batch.mo_id())?;
            if mo.status() != MoStatus::InProgress {
                return Err(BatchError::InvalidTransition(format!(
                    "batch cannot start while its MO is {:?}",
                    mo.status()
                )));
            }
        }

        let lock = allocation::lock_for_batch(state, batch_id, actor, now)?;
        if !lock.is_complete() {
            if config.strict_batch_lock {
                return Err(BatchError::BatchLockIncomplete {
                    locked_g: lock.locked_g,
                    required_g: lock.required_g,
                });
            }
            warn!(
                batch_id,
                locked_kg = %format_kg(lock.locked_g),
                required_kg = %format_kg(lock.required_g),
                "failed to lock full RM for batch, proceeding anyway"
            );
        }

        let batch = state.batch_mut(batch_id)?;
        batch.set_status(BatchStatus::InProcess);
        batch.set_actual_start(now);
        info!(batch_id, locked_kg = %format_kg(lock.locked_g), "batch started");
        Ok(lock)
    })
}

/// Complete one batch at one process with an OK/Scrap/Rework split.
///
/// The three output quantities must be non-negative and sum back to the
/// input within the configured tolerance. A positive rework portion chains
/// a rework batch assigned to the process's currently active supervisor
/// for the current shift (not to the acting user). The OK portion hands
/// over to the successor process.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `config` - Core configuration (completion tolerance)
/// * `batch_id` - Batch being completed at the process
/// * `execution_id` - Process execution the batch finished
/// * `input_g` - Input quantity in grams (must be positive)
/// * `ok_g` - Good output in grams
/// * `scrap_g` - Scrapped quantity in grams
/// * `rework_g` - Quantity sent to rework in grams
/// * `defect_description` - Carried onto the completion and rework rows
/// * `actor` - Recording user
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(SplitOutcome)` with the completion id, the chained rework batch
///   (when any) and the step fan-out
/// - `Err(BatchError::QuantityMismatch)` when the split does not sum back
///   to the input within tolerance
#[allow(clippy::too_many_arguments)]
pub fn complete_batch_with_split(
    state: &mut FactoryState,
    config: &CoreConfig,
    batch_id: &str,
    execution_id: ExecutionId,
    input_g: Grams,
    ok_g: Grams,
    scrap_g: Grams,
    rework_g: Grams,
    defect_description: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<SplitOutcome, BatchError> {
    state.transact(|state| {
        let mismatch = BatchError::QuantityMismatch {
            input_g,
            ok_g,
            scrap_g,
            rework_g,
            tolerance_g: config.completion_tolerance_g,
        };
        if input_g <= 0 || ok_g < 0 || scrap_g < 0 || rework_g < 0 {
            return Err(mismatch);
        }
        if (ok_g + scrap_g + rework_g - input_g).abs() > config.completion_tolerance_g {
            return Err(mismatch);
        }

        let (mo_id, work_center) = {
            let execution = state.execution(execution_id)?;
            (
                execution.mo_id().to_string(),
                execution.work_center().to_string(),
            )
        };

        let completion_id = state.next_completion_id();
        state.insert_completion(BatchProcessCompletion {
            id: completion_id,
            batch_id: batch_id.to_string(),
            execution_id,
            completed_by: actor.id.clone(),
            completed_at: now,
            input_g,
            ok_g,
            scrap_g,
            rework_g,
            rework_cycle_number: 0,
            parent_completion: None,
            defect_description: defect_description.to_string(),
            notes: String::new(),
        });
        state.push_activity(
            ActivityEntry::new(ActivityKind::BatchCompletion, now)
                .with_mo(mo_id.clone())
                .with_batch(batch_id.to_string())
                .with_work_center(work_center.clone())
                .with_execution(execution_id)
                .by(actor.id.clone())
                .with_metadata(serde_json::json!({
                    "input_g": input_g,
                    "ok_g": ok_g,
                    "scrap_g": scrap_g,
                    "rework_g": rework_g,
                }))
                .with_remark(format!(
                    "Batch {batch_id} completed at {work_center}: ok {}kg, scrap {}kg, rework {}kg",
                    format_kg(ok_g),
                    format_kg(scrap_g),
                    format_kg(rework_g)
                )),
        );

        let rework_id = if rework_g > 0 {
            Some(create_rework_batch(
                state,
                batch_id,
                execution_id,
                completion_id,
                rework_g,
                0,
                defect_description,
                actor,
                now,
            )?)
        } else {
            None
        };

        if scrap_g > 0 {
            let material_type = {
                let mo = state.mo(&mo_id)?;
                state.product(mo.product_code())?.material_type
            };
            let batch = state.batch_mut(batch_id)?;
            batch.add_scrap_rm_weight(scrap_g);
            if material_type == MaterialType::Coil {
                batch.add_scrap(scrap_g);
            }
        }

        // Record the finished quantity when this was the order's last
        // process (coil batches measure it in grams, same unit as OK).
        let is_last = state.next_execution_after(execution_id).is_none();
        if is_last && ok_g > 0 {
            let material_type = {
                let mo = state.mo(&mo_id)?;
                state.product(mo.product_code())?.material_type
            };
            if material_type == MaterialType::Coil {
                state.batch_mut(batch_id)?.set_actual_completed(ok_g);
            }
        }

        let step = process_flow::mark_batch_process_completed(
            state,
            config,
            batch_id,
            execution_id,
            Some(ok_g),
            actor,
            now,
        )?;

        Ok(SplitOutcome {
            completion_id,
            rework_id,
            step,
        })
    })
}

/// Chain a rework batch from a completion record.
///
/// The assignee is the currently active supervisor of the process in the
/// current shift at this moment, falling back to the acting user when no
/// daily status exists.
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_rework_batch(
    state: &mut FactoryState,
    batch_id: &str,
    execution_id: ExecutionId,
    completion_id: CompletionId,
    quantity_g: Grams,
    parent_cycle: u32,
    defect_description: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<ReworkId, BatchError> {
    let (mo_id, work_center) = {
        let execution = state.execution(execution_id)?;
        (
            execution.mo_id().to_string(),
            execution.work_center().to_string(),
        )
    };
    let shift = scheduler::current_shift(state, &work_center, now);
    let assigned = state
        .daily_status(now.date_naive(), &work_center, shift)
        .map(|status| status.active_supervisor.clone())
        .unwrap_or_else(|| actor.id.clone());

    let rework_id = state.next_rework_id();
    state.insert_rework(ReworkBatch {
        id: rework_id,
        original_batch: batch_id.to_string(),
        execution_id,
        completion_id,
        quantity_g,
        status: ReworkStatus::Pending,
        assigned_supervisor: Some(assigned.clone()),
        cycle_number: parent_cycle + 1,
        defect_description: defect_description.to_string(),
        created_at: now,
        started_at: None,
        completed_at: None,
    });
    state.push_activity(
        ActivityEntry::new(ActivityKind::ReworkCreated, now)
            .with_mo(mo_id)
            .with_batch(batch_id.to_string())
            .with_work_center(work_center)
            .with_execution(execution_id)
            .by(actor.id.clone())
            .with_metadata(serde_json::json!({
                "quantity_g": quantity_g,
                "cycle_number": parent_cycle + 1,
            }))
            .with_remark(format!(
                "Rework batch created for {batch_id}, cycle {}, assigned to {assigned}",
                parent_cycle + 1
            )),
    );
    info!(batch_id, rework_id, assigned = %assigned, "rework batch created");
    Ok(rework_id)
}

/// Cancel a batch that has not finished production. Progress of every
/// execution is recomputed from the shrunken batch set.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `batch_id` - Batch in `created` or `in_process` status
/// * `actor` - Acting user
/// * `now` - Current instant
/// * `reason` - Appended to the batch notes stream
pub fn cancel_batch(
    state: &mut FactoryState,
    batch_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
    reason: &str,
) -> Result<(), BatchError> {
    state.transact(|state| {
        let mo_id = {
            let batch = state.batch(batch_id)?;
            if !batch.is_stoppable() {
                return Err(BatchError::InvalidTransition(format!(
                    "batch cannot be cancelled from {:?}",
                    batch.status()
                )));
            }
            batch.mo_id().to_string()
        };
        let batch = state.batch_mut(batch_id)?;
        batch.set_status(BatchStatus::Cancelled);
        batch.append_note(&format!("Cancelled by {} at {now}: {reason}", actor.id));
        process_flow::recompute_progress_for_mo(state, &mo_id)?;
        Ok(())
    })
}

/// Send part or all of the MO's remaining RM to order-level scrap.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order whose remaining budget is scrapped
/// * `scrap_g` - Grams to scrap, or `None` for everything remaining
/// * `actor` - Acting user
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(grams)` actually added to the order's scrap accumulator
/// - `Err(BatchError::ScrapExceedsRemaining)` when the request overshoots
/// - `Err(BatchError::NoScrapToSend)` when nothing remains
pub fn scrap_remaining_rm(
    state: &mut FactoryState,
    mo_id: &str,
    scrap_g: Option<Grams>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Grams, BatchError> {
    state.transact(|state| {
        let remaining_g = match remaining_rm(state, mo_id)? {
            RemainingRm::CoilGrams(grams) => grams,
            RemainingRm::SheetStrips(_) => return Err(BatchError::UnsupportedMaterialType),
        };
        if remaining_g <= 0 {
            return Err(BatchError::NoScrapToSend);
        }
        let amount_g = match scrap_g {
            None => remaining_g,
            Some(amount) if amount <= 0 => return Err(BatchError::NoScrapToSend),
            Some(amount) if amount > remaining_g => {
                return Err(BatchError::ScrapExceedsRemaining {
                    requested_g: amount,
                    remaining_g,
                })
            }
            Some(amount) => amount,
        };
        state.mo_mut(mo_id)?.add_scrap_rm(amount_g);
        info!(mo_id, scrap_kg = %format_kg(amount_g), by = %actor.id, at = %now, "remaining RM sent to scrap");
        Ok(amount_g)
    })
}

/// Finished pieces across the MO's completed batches, in product units.
///
/// # Returns
/// Grams converted through `grams_per_product` for coil orders, strips
/// times `pcs_per_strip` for sheet orders.
pub fn completed_pieces(state: &FactoryState, mo_id: &str) -> Result<i64, BatchError> {
    let mo = state.mo(mo_id)?;
    let product = state.product(mo.product_code())?;
    let mut pieces = 0;
    for batch in state.batches_of_mo(mo_id) {
        if !matches!(batch.status(), BatchStatus::Completed | BatchStatus::Packed) {
            continue;
        }
        let quantity = if batch.actual_quantity_completed() > 0 {
            batch.actual_quantity_completed()
        } else {
            batch.planned_quantity()
        };
        pieces += match product.material_type {
            MaterialType::Coil => match product.grams_per_product {
                Some(grams) if grams > 0 => quantity / grams,
                _ => 0,
            },
            MaterialType::Sheet => quantity * product.pcs_per_strip.unwrap_or(1),
        };
    }
    Ok(pieces)
}
