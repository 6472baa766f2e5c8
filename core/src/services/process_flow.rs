//! Process execution coordinator
//!
//! Initialises process executions from the product BOM, tracks per-batch
//! per-process status, computes process progress, and moves batches through
//! handover, packing and the FG store.
//!
//! # The central invariant
//!
//! For each process execution P of order M:
//!
//! ```text
//! active  = batches of M with status != cancelled
//! total   = |active|
//! done    = batches whose (batch, P) status is completed
//! P.progress = 100 * done / total      (0 when total == 0)
//! ```
//!
//! Progress is monotone non-decreasing except for one legal regression:
//! when a new batch joins the order, a completed P whose done < total
//! reverts to in_progress and its actual end time is cleared.
//!
//! # The completion gate
//!
//! P flips to completed only when every non-cancelled batch has completed
//! it AND the RM represented by those batches covers at least the
//! configured share (90 % by default) of the order's reserved-plus-locked
//! allocation.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::core::units::{format_kg, Grams};
use crate::models::actor::{Actor, Role};
use crate::models::batch::{BatchLocation, BatchProcessState, BatchStatus};
use crate::models::completion::{HandoverId, ReceiptHandover, ReceiptOutcome, ReceiptVerification};
use crate::models::notification::{
    ActivityEntry, ActivityKind, Notification, NotificationKind, NotificationPriority,
};
use crate::models::process_execution::{ExecutionId, ExecutionStatus, ProcessExecution};
use crate::models::state::{FactoryState, StoreError};
use crate::models::mo::MoStatus;
use crate::services::allocation::batch_rm_required_g;
use crate::services::scheduler::{self, SchedulerError};
use crate::services::notify_role_holders;

/// Errors raised by the process coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("caller is not authorised to {0}")]
    SupervisorUnauthorised(String),

    #[error("batch {batch_id} and execution {execution_id} belong to different orders")]
    MoMismatch {
        batch_id: String,
        execution_id: ExecutionId,
    },

    #[error(
        "process {sequence} cannot start until process {previous} has at least one completed batch"
    )]
    PreviousProcessIncomplete { sequence: u32, previous: u32 },

    #[error("no active BOM processes found for product {0}")]
    NoBomProcesses(String),

    #[error(
        "completion gate not met: {completed}/{total} batches completed, \
         {accounted_g}g of {allocated_g}g RM accounted"
    )]
    CompletionGateNotMet {
        completed: usize,
        total: usize,
        accounted_g: Grams,
        allocated_g: Grams,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of completing one batch at one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCompletion {
    /// The batch finished its last process and moved to packing.
    pub batch_completed_all: bool,
    /// The process execution flipped to completed.
    pub process_completed: bool,
    /// Receipt handover written toward the successor process, if any.
    pub handover_id: Option<HandoverId>,
}

/// Initialise process executions for an MO from its product BOM.
///
/// Deduplicates processes (a process appearing on several BOM lines gets a
/// single execution), assigns contiguous 1-based sequence numbers, and
/// auto-assigns a supervisor to every newly created execution, notifying
/// them. Idempotent: existing executions are kept untouched.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Approved order to initialise
/// * `actor` - Acting user, recorded as the notification creator
/// * `now` - Current instant
///
/// # Returns
/// The ids of the executions created by this call (empty on a repeat).
pub fn initialize_executions(
    state: &mut FactoryState,
    mo_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Vec<ExecutionId>, ProcessError> {
    state.transact(|state| {
        let mo = state.mo(mo_id)?;
        if !matches!(
            mo.status(),
            MoStatus::MoApproved | MoStatus::RmAllocated | MoStatus::InProgress
        ) {
            return Err(ProcessError::InvalidTransition(format!(
                "MO must be approved before processes are initialised, status is {:?}",
                mo.status()
            )));
        }
        let product_code = mo.product_code().to_string();

        // Deduplicate BOM processes preserving line order.
        let mut ordered_processes: Vec<String> = Vec::new();
        for line in state.bom_for_product(&product_code) {
            if !ordered_processes.contains(&line.work_center) {
                ordered_processes.push(line.work_center.clone());
            }
        }
        if ordered_processes.is_empty() {
            return Err(ProcessError::NoBomProcesses(product_code));
        }

        let mut next_sequence = state
            .executions_of_mo(mo_id)
            .last()
            .map(|execution| execution.sequence_order() + 1)
            .unwrap_or(1);

        let mut created = Vec::new();
        for work_center in ordered_processes {
            if state.execution_of_mo_at(mo_id, &work_center).is_some() {
                continue;
            }
            state.work_center(&work_center)?;
            let id = state.next_execution_id();
            state.insert_execution(ProcessExecution::new(id, mo_id, &work_center, next_sequence));
            next_sequence += 1;
            created.push(id);
        }

        for execution_id in &created {
            let assigned = scheduler::auto_assign_supervisor(state, *execution_id, None, now)?;
            if let Some(supervisor) = assigned {
                let work_center = state.execution(*execution_id)?.work_center().to_string();
                let notification = Notification::new(
                    NotificationKind::SupervisorAssigned,
                    format!("Process Assigned: {work_center}"),
                    format!(
                        "You have been automatically assigned as supervisor for process \
                         {work_center} of MO {mo_id}."
                    ),
                    supervisor,
                    now,
                )
                .with_related_mo(mo_id.to_string())
                .action_required()
                .with_creator(actor.id.clone());
                state.push_notification(notification);
            }
        }

        info!(mo_id, created = created.len(), "process executions initialised");
        Ok(created)
    })
}

/// Progress counters for one execution against the current batch set.
fn progress_counts(state: &FactoryState, execution_id: ExecutionId, mo_id: &str) -> (usize, usize) {
    let active: Vec<&str> = state
        .batches_of_mo(mo_id)
        .iter()
        .filter(|batch| batch.counts_for_progress())
        .map(|batch| batch.batch_id())
        .collect();
    let completed = active
        .iter()
        .filter(|batch_id| {
            state.batch_process_state(batch_id, execution_id) == BatchProcessState::Completed
        })
        .count();
    (completed, active.len())
}

/// Cumulative RM represented by the order's non-cancelled batches, in
/// grams.
///
/// # Returns
/// The sum of every non-cancelled batch's RM requirement; the numerator
/// of the completion gate's RM-accounted share.
pub fn cumulative_batch_rm_g(state: &FactoryState, mo_id: &str) -> Result<Grams, ProcessError> {
    let mo = state.mo(mo_id)?;
    let product = state.product(mo.product_code())?;
    Ok(state
        .batches_of_mo(mo_id)
        .iter()
        .filter(|batch| batch.counts_for_progress())
        .map(|batch| batch_rm_required_g(product, mo, batch.planned_quantity()))
        .sum())
}

/// Whether the RM-accounted share of the completion gate holds, with the
/// quantities it was computed from.
fn rm_gate(
    state: &FactoryState,
    config: &CoreConfig,
    mo_id: &str,
) -> Result<(bool, Grams, Grams), ProcessError> {
    let allocated_g = state.active_allocation_total_for_mo(mo_id);
    let accounted_g = cumulative_batch_rm_g(state, mo_id)?;
    // Integer cross-multiplication keeps the 90.0 % boundary exact.
    let holds = allocated_g > 0
        && accounted_g as i128 * 100 >= allocated_g as i128 * config.process_completion_rm_threshold_pct as i128;
    Ok((holds, accounted_g, allocated_g))
}

/// Recompute progress for every execution of an MO, applying the single
/// legal regression. Called whenever the batch set changes.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order whose executions are recomputed
pub fn recompute_progress_for_mo(state: &mut FactoryState, mo_id: &str) -> Result<(), ProcessError> {
    let execution_ids: Vec<ExecutionId> = state
        .executions_of_mo(mo_id)
        .iter()
        .map(|execution| execution.id())
        .collect();

    for execution_id in execution_ids {
        let (completed, total) = progress_counts(state, execution_id, mo_id);
        let progress = if total > 0 {
            100.0 * completed as f64 / total as f64
        } else {
            0.0
        };
        let execution = state.execution_mut(execution_id)?;
        let old_progress = execution.progress_percentage();
        execution.set_progress(progress);
        if execution.status() == ExecutionStatus::Completed && completed < total {
            execution.set_status(ExecutionStatus::InProgress);
            execution.set_actual_end(None);
            info!(
                mo_id,
                execution_id,
                old_progress,
                progress,
                "execution reverted to in_progress after batch set change"
            );
        }
    }
    Ok(())
}

/// Evaluate the completion gate for one execution and apply the outcome.
fn apply_gate(
    state: &mut FactoryState,
    config: &CoreConfig,
    execution_id: ExecutionId,
    now: DateTime<Utc>,
) -> Result<bool, ProcessError> {
    let mo_id = state.execution(execution_id)?.mo_id().to_string();
    let (completed, total) = progress_counts(state, execution_id, &mo_id);
    let all_batches_done = total > 0 && completed == total;
    let (rm_holds, accounted_g, allocated_g) = rm_gate(state, config, &mo_id)?;

    let progress = if total > 0 {
        100.0 * completed as f64 / total as f64
    } else {
        0.0
    };

    let should_complete = all_batches_done && rm_holds;
    let execution = state.execution_mut(execution_id)?;
    if should_complete {
        if execution.status() != ExecutionStatus::Completed {
            execution.set_status(ExecutionStatus::Completed);
            execution.set_actual_end(Some(now));
        }
        execution.set_progress(100.0);
        info!(
            execution_id,
            accounted_kg = %format_kg(accounted_g),
            allocated_kg = %format_kg(allocated_g),
            "process execution completed"
        );
    } else {
        if execution.status() == ExecutionStatus::Completed {
            execution.set_status(ExecutionStatus::InProgress);
            execution.set_actual_end(None);
        }
        execution.set_progress(progress);
        info!(
            execution_id,
            completed,
            total,
            accounted_kg = %format_kg(accounted_g),
            allocated_kg = %format_kg(allocated_g),
            "process execution not complete yet"
        );
    }
    Ok(should_complete)
}

fn check_step_actor(
    state: &FactoryState,
    actor: &Actor,
    execution_id: ExecutionId,
    action: &str,
) -> Result<(), ProcessError> {
    let assigned = state
        .execution(execution_id)?
        .assigned_supervisor()
        .map(str::to_string);
    if actor.has_role(Role::Supervisor) || assigned.as_deref() == Some(actor.id.as_str()) {
        Ok(())
    } else {
        Err(ProcessError::SupervisorUnauthorised(action.to_string()))
    }
}

/// Start one batch at one process execution.
///
/// Enforces the sequence rule (process N+1 needs at least one batch through
/// process N) and the stop rule (a stopped order admits no new starts).
///
/// # Arguments
/// * `state` - Factory entity store
/// * `batch_id` - Started batch entering the process
/// * `execution_id` - Process execution being entered
/// * `actor` - Supervisor (or the execution's assigned supervisor)
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(())` with the step in progress and the batch moved to the work
///   center
/// - `Err(ProcessError::PreviousProcessIncomplete)` when the sequence
///   rule blocks the start
pub fn start_batch_process(
    state: &mut FactoryState,
    batch_id: &str,
    execution_id: ExecutionId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), ProcessError> {
    state.transact(|state| {
        check_step_actor(state, actor, execution_id, "start a batch process")?;

        let (mo_id, work_center, sequence) = {
            let execution = state.execution(execution_id)?;
            (
                execution.mo_id().to_string(),
                execution.work_center().to_string(),
                execution.sequence_order(),
            )
        };
        let batch = state.batch(batch_id)?;
        if batch.mo_id() != mo_id {
            return Err(ProcessError::MoMismatch {
                batch_id: batch_id.to_string(),
                execution_id,
            });
        }
        if batch.status() != BatchStatus::InProcess {
            return Err(ProcessError::InvalidTransition(format!(
                "batch {batch_id} must be started before it enters a process, status is {:?}",
                batch.status()
            )));
        }
        let mo = state.mo(&mo_id)?;
        if mo.status() == MoStatus::Stopped {
            return Err(ProcessError::InvalidTransition(format!(
                "MO {mo_id} is stopped, new process starts are blocked"
            )));
        }

        if sequence > 1 {
            let previous = state
                .executions_of_mo(&mo_id)
                .into_iter()
                .find(|execution| execution.sequence_order() == sequence - 1)
                .map(|execution| execution.id());
            if let Some(previous_id) = previous {
                let (done, _) = progress_counts(state, previous_id, &mo_id);
                if done == 0 {
                    return Err(ProcessError::PreviousProcessIncomplete {
                        sequence,
                        previous: sequence - 1,
                    });
                }
            }
        }

        {
            let execution = state.execution_mut(execution_id)?;
            if execution.status() == ExecutionStatus::Pending {
                execution.set_status(ExecutionStatus::InProgress);
                execution.set_actual_start(now);
            }
        }
        state.set_batch_process_state(batch_id, execution_id, BatchProcessState::InProgress);
        state.move_batch(
            batch_id,
            &mo_id,
            BatchLocation::WorkCenter(work_center.clone()),
            Some(actor.id.clone()),
            now,
            format!("Batch entered process {work_center}"),
        );

        if let Some(supervisor) = state
            .execution(execution_id)?
            .assigned_supervisor()
            .map(str::to_string)
        {
            let summary =
                state.supervisor_activity_mut(now.date_naive(), &work_center, &supervisor);
            summary.operations_in_progress += 1;
            summary.total_operations += 1;
        }
        Ok(())
    })
}

/// Mark one batch completed at one process and fan out the consequences:
/// receipt handover toward the successor, packing on the last process, and
/// the completion-gate evaluation.
///
/// `ok_quantity_g` carries the OK portion when the caller recorded an
/// OK/Scrap/Rework split; without it the handover quantity falls back to
/// the batch's RM requirement.
pub(crate) fn mark_batch_process_completed(
    state: &mut FactoryState,
    config: &CoreConfig,
    batch_id: &str,
    execution_id: ExecutionId,
    ok_quantity_g: Option<Grams>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<StepCompletion, ProcessError> {
    let (mo_id, work_center) = {
        let execution = state.execution(execution_id)?;
        (
            execution.mo_id().to_string(),
            execution.work_center().to_string(),
        )
    };
    let batch = state.batch(batch_id)?;
    if batch.mo_id() != mo_id {
        return Err(ProcessError::MoMismatch {
            batch_id: batch_id.to_string(),
            execution_id,
        });
    }

    // Stop transparency: a step already in progress may finish even when
    // the execution or the whole order has been stopped; fresh steps may
    // not.
    let execution_status = state.execution(execution_id)?.status();
    let step_state = state.batch_process_state(batch_id, execution_id);
    let allowed = execution_status == ExecutionStatus::InProgress
        || step_state == BatchProcessState::InProgress;
    if !allowed {
        return Err(ProcessError::InvalidTransition(format!(
            "process must be in progress to complete a batch, status is {execution_status:?}"
        )));
    }

    state.set_batch_process_state(batch_id, execution_id, BatchProcessState::Completed);

    // Has this batch now completed every process of the order?
    let execution_ids: Vec<ExecutionId> = state
        .executions_of_mo(&mo_id)
        .iter()
        .map(|execution| execution.id())
        .collect();
    let batch_completed_all = execution_ids.iter().all(|id| {
        state.batch_process_state(batch_id, *id) == BatchProcessState::Completed
    });

    if batch_completed_all {
        {
            let batch = state.batch_mut(batch_id)?;
            batch.set_status(BatchStatus::Completed);
            batch.set_actual_end(now);
            if batch.actual_quantity_completed() == 0 {
                let planned = batch.planned_quantity();
                batch.set_actual_completed(planned);
            }
        }
        // Packing is a mandatory stop before the FG store.
        state.move_batch(
            batch_id,
            &mo_id,
            BatchLocation::Packing,
            Some(actor.id.clone()),
            now,
            "Batch completed all processes, moved to packing",
        );
        info!(batch_id, mo_id = %mo_id, "batch completed every process, moved to packing");
    }

    // Receipt handover toward the successor process.
    let mut handover_id = None;
    let handover_quantity = match ok_quantity_g {
        Some(quantity) => quantity,
        None => {
            let mo = state.mo(&mo_id)?;
            let product = state.product(mo.product_code())?;
            let batch = state.batch(batch_id)?;
            batch_rm_required_g(product, mo, batch.planned_quantity())
        }
    };
    if handover_quantity > 0 {
        if let Some(successor) = state.next_execution_after(execution_id) {
            let to_execution = successor.id();
            let receiving_supervisor = successor.assigned_supervisor().map(str::to_string);
            let id = state.next_handover_id();
            let handed_over_by = state
                .execution(execution_id)?
                .assigned_supervisor()
                .map(str::to_string);
            state.insert_handover(ReceiptHandover {
                id,
                batch_id: batch_id.to_string(),
                mo_id: mo_id.clone(),
                from_execution: execution_id,
                to_execution,
                quantity_g: handover_quantity,
                handed_over_by,
                handed_over_at: now,
                notes: format!("OK quantity from {work_center}"),
            });
            handover_id = Some(id);
            if let Some(recipient) = receiving_supervisor {
                let notification = Notification::new(
                    NotificationKind::BatchReceived,
                    "Batch Received",
                    format!(
                        "Batch {batch_id} received from {work_center}, {}kg",
                        format_kg(handover_quantity)
                    ),
                    recipient,
                    now,
                )
                .with_related_mo(mo_id.clone());
                state.push_notification(notification);
            }
        }
    }

    let process_completed = apply_gate(state, config, execution_id, now)?;
    if process_completed {
        if let Some(supervisor) = state
            .execution(execution_id)?
            .assigned_supervisor()
            .map(str::to_string)
        {
            let summary =
                state.supervisor_activity_mut(now.date_naive(), &work_center, &supervisor);
            summary.operations_completed += 1;
            summary.operations_in_progress = summary.operations_in_progress.saturating_sub(1);
        }
    }

    Ok(StepCompletion {
        batch_completed_all,
        process_completed,
        handover_id,
    })
}

/// Complete one batch at one process without an OK/Scrap/Rework split.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `config` - Core configuration (RM-accounted gate threshold)
/// * `batch_id` - Batch finishing the process
/// * `execution_id` - Process execution being finished
/// * `actor` - Supervisor (or the execution's assigned supervisor)
/// * `now` - Current instant
///
/// # Returns
/// The [`StepCompletion`] fan-out: whether the batch finished its last
/// process, whether the execution completed, and the handover written.
///
/// # Example
/// ```
/// # use manufacturing_core_rs::services::{batch_lifecycle, process_flow};
/// use manufacturing_core_rs::models::process_execution::ExecutionStatus;
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
/// # mo_lifecycle::approve_mo(&mut state, "MO-001", &ph, now, "").unwrap();
/// # mo_lifecycle::start_production(&mut state, "MO-001", &ph, now, "").unwrap();
/// # let execution_id = state.executions_of_mo("MO-001")[0].id();
/// # let config = CoreConfig::default();
/// # let batch_id =
/// #     batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph, now).unwrap();
/// # batch_lifecycle::verify_batch(&mut state, &batch_id, &ph, now).unwrap();
/// # batch_lifecycle::start_batch(&mut state, &config, &batch_id, &ph, now).unwrap();
/// process_flow::start_batch_process(&mut state, &batch_id, execution_id, &ph, now).unwrap();
///
/// let step =
///     process_flow::complete_batch_process(&mut state, &config, &batch_id, execution_id, &ph, now)
///         .unwrap();
/// assert!(step.batch_completed_all);
/// // 1/1 batches are through, but only half the allocated RM is
/// // accounted: the completion gate keeps the execution open
/// assert!(!step.process_completed);
/// let execution = state.execution(execution_id).unwrap();
/// assert_eq!(execution.status(), ExecutionStatus::InProgress);
/// assert_eq!(execution.progress_percentage(), 100.0);
/// ```
pub fn complete_batch_process(
    state: &mut FactoryState,
    config: &CoreConfig,
    batch_id: &str,
    execution_id: ExecutionId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<StepCompletion, ProcessError> {
    state.transact(|state| {
        check_step_actor(state, actor, execution_id, "complete a batch process")?;
        mark_batch_process_completed(state, config, batch_id, execution_id, None, actor, now)
    })
}

/// Explicitly complete a process execution, enforcing the completion gate.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `config` - Core configuration (RM-accounted gate threshold)
/// * `execution_id` - Execution to complete
/// * `actor` - Supervisor (or the execution's assigned supervisor)
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(())` when both gate conditions hold
/// - `Err(ProcessError::CompletionGateNotMet)` otherwise
pub fn complete_execution(
    state: &mut FactoryState,
    config: &CoreConfig,
    execution_id: ExecutionId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), ProcessError> {
    state.transact(|state| {
        check_step_actor(state, actor, execution_id, "complete a process")?;
        let mo_id = state.execution(execution_id)?.mo_id().to_string();
        let (completed, total) = progress_counts(state, execution_id, &mo_id);
        let (rm_holds, accounted_g, allocated_g) = rm_gate(state, config, &mo_id)?;
        if !(total > 0 && completed == total && rm_holds) {
            return Err(ProcessError::CompletionGateNotMet {
                completed,
                total,
                accounted_g,
                allocated_g,
            });
        }
        apply_gate(state, config, execution_id, now)?;
        Ok(())
    })
}

/// Record the receiving supervisor's verification of a handover.
///
/// A reported problem puts the batch on hold at the receiving process and
/// escalates to the production heads; an OK clears the handover (and any
/// hold).
///
/// # Arguments
/// * `state` - Factory entity store
/// * `handover_id` - Handover row being verified
/// * `outcome` - OK, or Reported with the issue found
/// * `actor` - Receiving supervisor
/// * `now` - Current instant
/// * `notes` - Free-text verification notes
pub fn verify_receipt(
    state: &mut FactoryState,
    handover_id: HandoverId,
    outcome: ReceiptOutcome,
    actor: &Actor,
    now: DateTime<Utc>,
    notes: &str,
) -> Result<(), ProcessError> {
    state.transact(|state| {
        let (batch_id, mo_id, to_execution) = {
            let handover = state.handover(handover_id)?;
            (
                handover.batch_id.clone(),
                handover.mo_id.clone(),
                handover.to_execution,
            )
        };
        state.push_receipt_verification(ReceiptVerification {
            handover_id,
            outcome,
            verified_by: actor.id.clone(),
            verified_at: now,
            notes: notes.to_string(),
        });
        state.push_activity(
            ActivityEntry::new(ActivityKind::BatchVerification, now)
                .with_mo(mo_id.clone())
                .with_batch(batch_id.clone())
                .with_execution(to_execution)
                .by(actor.id.clone())
                .with_metadata(serde_json::json!({ "outcome": outcome }))
                .with_remark(format!("Receipt verification for batch {batch_id}")),
        );

        match outcome {
            ReceiptOutcome::Ok => {
                state.batch_mut(&batch_id)?.set_on_hold(false);
            }
            ReceiptOutcome::Reported(issue) => {
                state.batch_mut(&batch_id)?.set_on_hold(true);
                warn!(batch_id = %batch_id, ?issue, "receipt reported, batch on hold");
                let message = format!(
                    "Receipt of batch {batch_id} was reported ({issue:?}) at handover verification."
                );
                let mo = mo_id.clone();
                notify_role_holders(state, &[Role::ProductionHead], |recipient| {
                    Notification::new(
                        NotificationKind::ReceiptReported,
                        "Batch Receipt Reported",
                        message.clone(),
                        recipient.clone(),
                        now,
                    )
                    .with_priority(NotificationPriority::High)
                    .with_related_mo(mo.clone())
                    .action_required()
                });
            }
        }
        Ok(())
    })
}

/// Move a completed, packed batch from packing to the FG store.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `batch_id` - Completed batch currently at packing
/// * `actor` - Acting user
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(())` with the batch packed and at the FG store
/// - `Err(ProcessError::InvalidTransition)` when the batch skipped packing
pub fn move_to_fg_store(
    state: &mut FactoryState,
    batch_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), ProcessError> {
    state.transact(|state| {
        let batch = state.batch(batch_id)?;
        let mo_id = batch.mo_id().to_string();
        if batch.status() != BatchStatus::Completed {
            return Err(ProcessError::InvalidTransition(format!(
                "batch must be completed before moving to FG store, status is {:?}",
                batch.status()
            )));
        }
        if state.batch_location(batch_id) != Some(&BatchLocation::Packing) {
            return Err(ProcessError::InvalidTransition(
                "batch must pass through packing before the FG store".into(),
            ));
        }
        state.batch_mut(batch_id)?.set_status(BatchStatus::Packed);
        state.move_batch(
            batch_id,
            &mo_id,
            BatchLocation::FgStore,
            Some(actor.id.clone()),
            now,
            "Batch moved from packing to FG store",
        );
        Ok(())
    })
}
