//! Rework chains and final-inspection rework
//!
//! Rework batches are chained by the batch lifecycle when a completion
//! carries a positive rework portion; this module runs them: start,
//! complete with an OK/Scrap split (chaining a deeper cycle when material
//! still fails), and the distinct final-inspection flow where a quality
//! actor sends a whole batch back to the process responsible for a defect.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::CoreConfig;
use crate::core::units::{format_kg, Grams};
use crate::models::actor::{Actor, Role};
use crate::models::completion::{
    BatchProcessCompletion, CompletionId, FiRework, FiReworkId, FiReworkStatus, ReworkId,
    ReworkStatus,
};
use crate::models::batch::BatchLocation;
use crate::models::masters::WorkCenterId;
use crate::models::notification::{
    ActivityEntry, ActivityKind, Notification, NotificationKind, NotificationPriority,
};
use crate::models::state::{FactoryState, StoreError};
use crate::services::batch_lifecycle::{self, BatchError};
use crate::services::notify_role_holders;
use crate::services::scheduler;

/// Errors raised by rework operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReworkError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("caller is not authorised to {0}")]
    SupervisorUnauthorised(String),

    #[error(
        "rework quantities do not balance: input {input_g}g, ok {ok_g}g, scrap {scrap_g}g \
         (tolerance {tolerance_g}g)"
    )]
    QuantityMismatch {
        input_g: Grams,
        ok_g: Grams,
        scrap_g: Grams,
        tolerance_g: Grams,
    },

    #[error("no active supervisor available for the defective process in the current shift")]
    NoBackupSupervisor,

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of completing a rework batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReworkCompletion {
    pub completion_id: CompletionId,
    /// Next cycle chained when material still failed.
    pub next_rework_id: Option<ReworkId>,
}

/// One row of the FI defect report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiReworkReportRow {
    pub work_center: WorkCenterId,
    pub rework_count: usize,
    pub total_quantity_g: Grams,
}

/// Start a pending rework batch.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `rework_id` - Pending rework batch
/// * `actor` - Supervisor starting the rework
/// * `now` - Current instant
pub fn start_rework(
    state: &mut FactoryState,
    rework_id: ReworkId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), ReworkError> {
    state.transact(|state| {
        let rework = state.rework_mut(rework_id)?;
        if rework.status != ReworkStatus::Pending {
            return Err(ReworkError::InvalidTransition(format!(
                "rework batch can only start from pending, status is {:?}",
                rework.status
            )));
        }
        rework.status = ReworkStatus::InProgress;
        rework.started_at = Some(now);
        info!(rework_id, by = %actor.id, "rework batch started");
        Ok(())
    })
}

/// Complete a rework batch with OK and scrap portions.
///
/// The unaccounted remainder (input - ok - scrap) chains a further rework
/// cycle when it exceeds the completion tolerance. The OK portion proceeds
/// to the next process through the usual receipt handover performed by the
/// original batch's flow.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `config` - Core configuration (completion tolerance)
/// * `rework_id` - Rework batch being closed
/// * `ok_g` - Recovered quantity in grams
/// * `scrap_g` - Scrapped quantity in grams
/// * `actor` - Supervisor recording the result
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(ReworkCompletion)` with the child completion record and the next
///   cycle's rework batch when material still failed
/// - `Err(ReworkError::QuantityMismatch)` when ok + scrap overshoot the
///   input beyond tolerance
pub fn complete_rework(
    state: &mut FactoryState,
    config: &CoreConfig,
    rework_id: ReworkId,
    ok_g: Grams,
    scrap_g: Grams,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<ReworkCompletion, ReworkError> {
    state.transact(|state| {
        let (batch_id, execution_id, input_g, cycle, parent_completion, defect) = {
            let rework = state.rework(rework_id)?;
            if !matches!(rework.status, ReworkStatus::Pending | ReworkStatus::InProgress) {
                return Err(ReworkError::InvalidTransition(format!(
                    "rework batch already {:?}",
                    rework.status
                )));
            }
            (
                rework.original_batch.clone(),
                rework.execution_id,
                rework.quantity_g,
                rework.cycle_number,
                rework.completion_id,
                rework.defect_description.clone(),
            )
        };

        if ok_g < 0 || scrap_g < 0 || ok_g + scrap_g > input_g + config.completion_tolerance_g {
            return Err(ReworkError::QuantityMismatch {
                input_g,
                ok_g,
                scrap_g,
                tolerance_g: config.completion_tolerance_g,
            });
        }
        let leftover_g = input_g - ok_g - scrap_g;
        let next_rework_g = if leftover_g > config.completion_tolerance_g {
            leftover_g
        } else {
            0
        };

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
            batch_id: batch_id.clone(),
            execution_id,
            completed_by: actor.id.clone(),
            completed_at: now,
            input_g,
            ok_g,
            scrap_g,
            rework_g: next_rework_g,
            rework_cycle_number: cycle,
            parent_completion: Some(parent_completion),
            defect_description: defect.clone(),
            notes: String::new(),
        });
        state.push_activity(
            ActivityEntry::new(ActivityKind::BatchCompletion, now)
                .with_mo(mo_id.clone())
                .with_batch(batch_id.clone())
                .with_work_center(work_center.clone())
                .with_execution(execution_id)
                .by(actor.id.clone())
                .with_metadata(serde_json::json!({
                    "input_g": input_g,
                    "ok_g": ok_g,
                    "scrap_g": scrap_g,
                    "rework_g": next_rework_g,
                    "rework_cycle": cycle,
                }))
                .with_remark(format!(
                    "Rework cycle {cycle} of batch {batch_id} completed: ok {}kg, scrap {}kg",
                    format_kg(ok_g),
                    format_kg(scrap_g)
                )),
        );

        let next_rework_id = if next_rework_g > 0 {
            Some(batch_lifecycle::create_rework_batch(
                state,
                &batch_id,
                execution_id,
                completion_id,
                next_rework_g,
                cycle,
                &defect,
                actor,
                now,
            )?)
        } else {
            None
        };

        {
            let rework = state.rework_mut(rework_id)?;
            rework.status = ReworkStatus::Completed;
            rework.completed_at = Some(now);
        }

        // OK quantity proceeds to the next process.
        if ok_g > 0 {
            if let Some(successor) = state.next_execution_after(execution_id) {
                if let Some(recipient) = successor.assigned_supervisor().map(str::to_string) {
                    let notification = Notification::new(
                        NotificationKind::ReworkCompleted,
                        "Rework Completed",
                        format!(
                            "Rework batch {batch_id} completed, {}kg OK",
                            format_kg(ok_g)
                        ),
                        recipient,
                        now,
                    )
                    .with_related_mo(mo_id.clone());
                    state.push_notification(notification);
                }
            }
        }

        info!(rework_id, completion_id, chained = next_rework_id.is_some(), "rework completed");
        Ok(ReworkCompletion {
            completion_id,
            next_rework_id,
        })
    })
}

/// Raise a final-inspection rework against the process responsible for a
/// defect. Quality actors only.
///
/// The assignment goes to the defective process's currently active
/// supervisor in the current shift; when no daily status resolves one the
/// call fails rather than guessing.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `batch_id` - Batch found defective at final inspection
/// * `defective_work_center` - Process responsible for the defect
/// * `defect_description` - What the inspector found
/// * `quantity_g` - Defective quantity in grams
/// * `actor` - Quality inspector
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(FiReworkId)` with the assignment created and notified
/// - `Err(ReworkError::NoBackupSupervisor)` when no active supervisor
///   resolves for the process and shift
pub fn create_fi_rework(
    state: &mut FactoryState,
    batch_id: &str,
    defective_work_center: &str,
    defect_description: &str,
    quantity_g: Grams,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<FiReworkId, ReworkError> {
    if !actor.has_any_role(&[Role::Quality, Role::Admin]) {
        return Err(ReworkError::SupervisorUnauthorised(
            "raise final-inspection rework".into(),
        ));
    }
    state.transact(|state| {
        let mo_id = state.batch(batch_id)?.mo_id().to_string();
        state.work_center(defective_work_center)?;

        let shift = scheduler::current_shift(state, defective_work_center, now);
        let supervisor = state
            .daily_status(now.date_naive(), defective_work_center, shift)
            .map(|status| status.active_supervisor.clone())
            .ok_or(ReworkError::NoBackupSupervisor)?;

        let id = state.next_fi_rework_id();
        state.insert_fi_rework(FiRework {
            id,
            batch_id: batch_id.to_string(),
            mo_id: mo_id.clone(),
            inspected_by: actor.id.clone(),
            defective_work_center: defective_work_center.to_string(),
            defect_description: defect_description.to_string(),
            quantity_g,
            assigned_supervisor: supervisor.clone(),
            status: FiReworkStatus::Pending,
            rework_cycle_count: 0,
            fi_notes: String::new(),
            created_at: now,
            completed_at: None,
            completed_by: None,
            reinspected_at: None,
            reinspected_by: None,
            reinspection_passed: None,
            reinspection_notes: String::new(),
        });
        state.push_activity(
            ActivityEntry::new(ActivityKind::FiRework, now)
                .with_mo(mo_id.clone())
                .with_batch(batch_id.to_string())
                .with_work_center(defective_work_center.to_string())
                .by(actor.id.clone())
                .with_metadata(serde_json::json!({ "quantity_g": quantity_g }))
                .with_remark(format!(
                    "FI rework raised for batch {batch_id}, defect in {defective_work_center}"
                )),
        );

        let assignment = Notification::new(
            NotificationKind::FiReworkAssigned,
            "FI Rework Assigned",
            format!(
                "Rework batch {batch_id} assigned from final inspection, defect in {defective_work_center}"
            ),
            supervisor,
            now,
        )
        .with_priority(NotificationPriority::High)
        .with_related_mo(mo_id.clone())
        .action_required();
        state.push_notification(assignment);

        let message = format!(
            "FI rework created for batch {batch_id}, process {defective_work_center}"
        );
        let mo = mo_id.clone();
        notify_role_holders(state, &[Role::ProductionHead], |recipient| {
            Notification::new(
                NotificationKind::FiReworkCreated,
                "FI Rework Created",
                message.clone(),
                recipient.clone(),
                now,
            )
            .with_related_mo(mo.clone())
        });

        info!(fi_rework = id, batch_id, "FI rework created");
        Ok(id)
    })
}

/// Supervisor completes the assigned FI rework; the inspecting quality
/// actor is notified to re-inspect.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `fi_rework_id` - Assignment being completed
/// * `actor` - Supervisor who did the rework
/// * `now` - Current instant
pub fn complete_fi_rework(
    state: &mut FactoryState,
    fi_rework_id: FiReworkId,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), ReworkError> {
    state.transact(|state| {
        let (batch_id, mo_id, inspector) = {
            let fi_rework = state.fi_rework_mut(fi_rework_id)?;
            if !matches!(
                fi_rework.status,
                FiReworkStatus::Pending | FiReworkStatus::InProgress
            ) {
                return Err(ReworkError::InvalidTransition(format!(
                    "FI rework already {:?}",
                    fi_rework.status
                )));
            }
            fi_rework.status = FiReworkStatus::Completed;
            fi_rework.completed_at = Some(now);
            fi_rework.completed_by = Some(actor.id.clone());
            (
                fi_rework.batch_id.clone(),
                fi_rework.mo_id.clone(),
                fi_rework.inspected_by.clone(),
            )
        };
        let notification = Notification::new(
            NotificationKind::FiReworkCompleted,
            "FI Rework Completed",
            format!("Rework for batch {batch_id} completed, ready for re-inspection"),
            inspector,
            now,
        )
        .with_related_mo(mo_id)
        .action_required();
        state.push_notification(notification);
        info!(fi_rework = fi_rework_id, "FI rework completed");
        Ok(())
    })
}

/// Quality re-inspection after FI rework: pass sends the batch to packing,
/// fail opens the next FI rework cycle.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `fi_rework_id` - Completed assignment being re-inspected
/// * `passed` - Whether the batch passed
/// * `notes` - Re-inspection notes
/// * `actor` - Quality inspector
/// * `now` - Current instant
pub fn reinspect(
    state: &mut FactoryState,
    fi_rework_id: FiReworkId,
    passed: bool,
    notes: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(), ReworkError> {
    if !actor.has_any_role(&[Role::Quality, Role::Admin]) {
        return Err(ReworkError::SupervisorUnauthorised(
            "re-inspect FI rework".into(),
        ));
    }
    state.transact(|state| {
        let (batch_id, mo_id) = {
            let fi_rework = state.fi_rework_mut(fi_rework_id)?;
            if fi_rework.status != FiReworkStatus::Completed {
                return Err(ReworkError::InvalidTransition(format!(
                    "FI rework must be completed before re-inspection, status is {:?}",
                    fi_rework.status
                )));
            }
            fi_rework.reinspected_at = Some(now);
            fi_rework.reinspected_by = Some(actor.id.clone());
            fi_rework.reinspection_passed = Some(passed);
            fi_rework.reinspection_notes = notes.to_string();
            if passed {
                fi_rework.status = FiReworkStatus::Passed;
            } else {
                fi_rework.status = FiReworkStatus::Pending;
                fi_rework.rework_cycle_count += 1;
            }
            (fi_rework.batch_id.clone(), fi_rework.mo_id.clone())
        };
        if passed {
            state.move_batch(
                &batch_id,
                &mo_id,
                BatchLocation::Packing,
                Some(actor.id.clone()),
                now,
                "Batch passed FI re-inspection, moved to packing",
            );
        }
        info!(fi_rework = fi_rework_id, passed, "FI re-inspection recorded");
        Ok(())
    })
}

/// Aggregate FI rework defects by process over a date range (inclusive).
///
/// # Arguments
/// * `state` - Factory entity store
/// * `from` - First day of the range
/// * `to` - Last day of the range
///
/// # Returns
/// One row per process with its rework count and total quantity.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use manufacturing_core_rs::services::rework;
/// use manufacturing_core_rs::FactoryState;
///
/// let state = FactoryState::new();
/// let date = NaiveDate::from_ymd_opt(2025, 10, 12).unwrap();
/// assert!(rework::fi_rework_report(&state, date, date).is_empty());
/// ```
pub fn fi_rework_report(
    state: &FactoryState,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<FiReworkReportRow> {
    let mut by_process: BTreeMap<WorkCenterId, (usize, Grams)> = BTreeMap::new();
    for fi_rework in state.fi_reworks() {
        let date = fi_rework.created_at.date_naive();
        if date < from || date > to {
            continue;
        }
        let entry = by_process
            .entry(fi_rework.defective_work_center.clone())
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += fi_rework.quantity_g;
    }
    by_process
        .into_iter()
        .map(|(work_center, (rework_count, total_quantity_g))| FiReworkReportRow {
            work_center,
            rework_count,
            total_quantity_g,
        })
        .collect()
}
