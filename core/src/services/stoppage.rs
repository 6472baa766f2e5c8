//! Process stop and resume with downtime accounting
//!
//! Stopping a process execution writes one stop row per active batch of
//! the order, all in one transaction, and flips the execution to
//! `stopped`. Resuming any one stop closes every unresolved stop on the
//! execution, computes floor-minute downtime per row, flips the execution
//! back once nothing is left unresolved, and rebuilds the day's downtime
//! summary for that process.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::actor::{Actor, Role};
use crate::models::batch::BatchStatus;
use crate::models::notification::{
    ActivityEntry, ActivityKind, Notification, NotificationKind, NotificationPriority,
};
use crate::models::process_execution::{ExecutionId, ExecutionStatus};
use crate::models::state::{FactoryState, StoreError};
use crate::models::stoppage::{DowntimeSummary, ProcessStop, StopReason};
use crate::services::notify_role_holders;

/// Errors raised by stop/resume operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StopError {
    #[error("process is already stopped with unresolved stops; resume it first")]
    ProcessAlreadyStopped,

    #[error("no active stops found for this process")]
    NoActiveStops,

    #[error("no stoppable batches found for this order")]
    NoStoppableBatches,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a stop call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopResult {
    pub stop_ids: Vec<Uuid>,
    pub batches_stopped: Vec<String>,
}

/// Outcome of a resume call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeResult {
    pub resumed_stop_ids: Vec<Uuid>,
    pub total_downtime_minutes: i64,
}

/// Stop a process execution, recording one stop row per affected batch.
///
/// When `batch_id` names a batch that does not belong to the execution's
/// order, the call falls back to stopping every active batch of the order
/// (logged as a warning rather than rejected).
///
/// # Arguments
/// * `state` - Factory entity store
/// * `execution_id` - Process execution to stop
/// * `batch_id` - Specific batch to stop, or `None` for every active batch
/// * `reason` - Stop reason category
/// * `reason_detail` - Free-text detail
/// * `actor` - User recording the stop
/// * `now` - Current instant
///
/// # Returns
/// - `Ok(StopResult)` with one stop row per affected batch
/// - `Err(StopError::ProcessAlreadyStopped)` when unresolved stops exist
///
/// # Example
/// ```
/// # use manufacturing_core_rs::services::{batch_lifecycle, stoppage};
/// use chrono::Duration;
/// use manufacturing_core_rs::models::process_execution::ExecutionStatus;
/// use manufacturing_core_rs::models::stoppage::StopReason;
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
/// let stop = stoppage::stop_process(
///     &mut state,
///     execution_id,
///     None,
///     StopReason::MachineBreakdown,
///     "spindle jam",
///     &ph,
///     now,
/// )
/// .unwrap();
/// assert_eq!(stop.batches_stopped.len(), 1);
/// assert_eq!(
///     state.execution(execution_id).unwrap().status(),
///     ExecutionStatus::Stopped
/// );
///
/// // resuming fifteen minutes later books 15 minutes of downtime
/// let resume = stoppage::resume_process(
///     &mut state,
///     stop.stop_ids[0],
///     &ph,
///     now + Duration::minutes(15),
///     "jam cleared",
/// )
/// .unwrap();
/// assert_eq!(resume.total_downtime_minutes, 15);
/// ```
pub fn stop_process(
    state: &mut FactoryState,
    execution_id: ExecutionId,
    batch_id: Option<&str>,
    reason: StopReason,
    reason_detail: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<StopResult, StopError> {
    state.transact(|state| {
        let (mo_id, work_center, status) = {
            let execution = state.execution(execution_id)?;
            (
                execution.mo_id().to_string(),
                execution.work_center().to_string(),
                execution.status(),
            )
        };
        if status == ExecutionStatus::Stopped
            && !state.unresolved_stop_ids(execution_id).is_empty()
        {
            return Err(StopError::ProcessAlreadyStopped);
        }

        let active_batches: Vec<String> = state
            .batches_of_mo(&mo_id)
            .iter()
            .filter(|batch| {
                matches!(batch.status(), BatchStatus::Created | BatchStatus::InProcess)
            })
            .map(|batch| batch.batch_id().to_string())
            .collect();

        let targets: Vec<String> = match batch_id {
            Some(named) if active_batches.iter().any(|batch| batch == named) => {
                vec![named.to_string()]
            }
            Some(named) => {
                warn!(
                    named,
                    mo_id = %mo_id,
                    "named batch does not belong to this order, stopping every active batch"
                );
                active_batches
            }
            None => active_batches,
        };
        if targets.is_empty() {
            return Err(StopError::NoStoppableBatches);
        }

        let mut result = StopResult {
            stop_ids: Vec::new(),
            batches_stopped: Vec::new(),
        };
        for batch in &targets {
            let stop = ProcessStop::new(
                batch.clone(),
                mo_id.clone(),
                execution_id,
                actor.id.clone(),
                reason,
                reason_detail,
                now,
            );
            result.stop_ids.push(stop.id);
            result.batches_stopped.push(batch.clone());
            state.insert_stop(stop);
            state.push_activity(
                ActivityEntry::new(ActivityKind::ProcessStopped, now)
                    .with_mo(mo_id.clone())
                    .with_batch(batch.clone())
                    .with_work_center(work_center.clone())
                    .with_execution(execution_id)
                    .by(actor.id.clone())
                    .with_metadata(serde_json::json!({
                        "reason": reason,
                        "detail": reason_detail,
                    }))
                    .with_remark(format!("Process {work_center} stopped for batch {batch}")),
            );
        }

        state
            .execution_mut(execution_id)?
            .set_status(ExecutionStatus::Stopped);

        let message = format!(
            "Process {work_center} stopped by {} ({reason:?}), {} batch(es) affected",
            actor.id,
            result.batches_stopped.len()
        );
        let mo = mo_id.clone();
        notify_role_holders(
            state,
            &[Role::ProductionHead, Role::Manager],
            |recipient| {
                Notification::new(
                    NotificationKind::ProcessStopped,
                    "Process Stopped",
                    message.clone(),
                    recipient.clone(),
                    now,
                )
                .with_priority(NotificationPriority::High)
                .with_related_mo(mo.clone())
            },
        );

        info!(
            execution_id,
            stops = result.stop_ids.len(),
            "process stopped"
        );
        Ok(result)
    })
}

/// Rebuild the downtime summary for every day the given stops touch.
fn rebuild_summaries(state: &mut FactoryState, work_center: &str, dates: &[NaiveDate]) {
    let mut unique: Vec<NaiveDate> = dates.to_vec();
    unique.sort();
    unique.dedup();
    for date in unique {
        let stops: Vec<ProcessStop> = state
            .resolved_stops_on(date, work_center)
            .into_iter()
            .cloned()
            .collect();
        let summary = DowntimeSummary::from_stops(date, work_center, stops.iter());
        state.upsert_downtime_summary(summary);
    }
}

/// Resume from one stop row, closing every unresolved stop on the same
/// process execution.
///
/// Resuming an already-resumed stop is a no-op. When no unresolved stops
/// remain afterwards the execution flips back to `in_progress`.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `stop_id` - Any one stop row of the execution
/// * `actor` - User resuming
/// * `now` - Current instant
/// * `notes` - Resume notes copied onto every closed stop
///
/// # Returns
/// The closed stop rows and their summed floor-minute downtime (empty on
/// the no-op path).
pub fn resume_process(
    state: &mut FactoryState,
    stop_id: Uuid,
    actor: &Actor,
    now: DateTime<Utc>,
    notes: &str,
) -> Result<ResumeResult, StopError> {
    state.transact(|state| {
        let (execution_id, already_resumed) = {
            let stop = state.stop(stop_id)?;
            (stop.execution_id, stop.is_resumed)
        };
        if already_resumed {
            info!(%stop_id, "stop already resumed, nothing to do");
            return Ok(ResumeResult::default());
        }
        resume_all(state, execution_id, actor, now, notes)
    })
}

/// Close every unresolved stop on a process execution.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `execution_id` - Execution to resume
/// * `actor` - User resuming
/// * `now` - Current instant
/// * `notes` - Resume notes copied onto every closed stop
///
/// # Returns
/// - `Ok(ResumeResult)` with the closed stops and total downtime
/// - `Err(StopError::NoActiveStops)` when nothing is unresolved
pub fn resume_all(
    state: &mut FactoryState,
    execution_id: ExecutionId,
    actor: &Actor,
    now: DateTime<Utc>,
    notes: &str,
) -> Result<ResumeResult, StopError> {
    state.transact(|state| {
        let unresolved = state.unresolved_stop_ids(execution_id);
        if unresolved.is_empty() {
            return Err(StopError::NoActiveStops);
        }
        let (mo_id, work_center) = {
            let execution = state.execution(execution_id)?;
            (
                execution.mo_id().to_string(),
                execution.work_center().to_string(),
            )
        };

        let mut result = ResumeResult::default();
        let mut dates = Vec::new();
        for stop_id in unresolved {
            let (batch, downtime, stopped_date) = {
                let stop = state.stop_mut(stop_id)?;
                let downtime = stop.resume(actor.id.clone(), now, notes);
                (stop.batch_id.clone(), downtime, stop.stopped_at.date_naive())
            };
            result.resumed_stop_ids.push(stop_id);
            result.total_downtime_minutes += downtime;
            dates.push(stopped_date);
            state.push_activity(
                ActivityEntry::new(ActivityKind::ProcessResumed, now)
                    .with_mo(mo_id.clone())
                    .with_batch(batch.clone())
                    .with_work_center(work_center.clone())
                    .with_execution(execution_id)
                    .by(actor.id.clone())
                    .with_metadata(serde_json::json!({ "downtime_minutes": downtime }))
                    .with_remark(format!(
                        "Process {work_center} resumed for batch {batch} after {downtime} minutes"
                    )),
            );
        }

        if state.unresolved_stop_ids(execution_id).is_empty() {
            let execution = state.execution_mut(execution_id)?;
            if execution.status() == ExecutionStatus::Stopped {
                execution.set_status(ExecutionStatus::InProgress);
            }
        }

        rebuild_summaries(state, &work_center, &dates);

        let message = format!(
            "Process {work_center} resumed by {}, total downtime {} minutes across {} batch(es)",
            actor.id,
            result.total_downtime_minutes,
            result.resumed_stop_ids.len()
        );
        let mo = mo_id.clone();
        notify_role_holders(
            state,
            &[Role::ProductionHead, Role::Manager],
            |recipient| {
                Notification::new(
                    NotificationKind::ProcessResumed,
                    "Process Resumed",
                    message.clone(),
                    recipient.clone(),
                    now,
                )
                .with_related_mo(mo.clone())
            },
        );

        info!(
            execution_id,
            resumed = result.resumed_stop_ids.len(),
            downtime = result.total_downtime_minutes,
            "process resumed"
        );
        Ok(result)
    })
}
