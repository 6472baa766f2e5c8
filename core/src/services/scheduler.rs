//! Supervisor scheduling and failover
//!
//! Per-shift primary/backup assignment driven by a daily attendance check,
//! precedence-based resolution of the effective supervisor for an (MO,
//! process, shift), manual mid-process override, and the cascading
//! reassignment of active work when a supervisor logs out.
//!
//! The attendance snapshot and the logout cascade iterate many rows; each
//! row commits in its own transaction and a cancellation token is honoured
//! between rows, so partial progress is durable and a single bad row never
//! poisons the batch.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::cancel::CancelToken;
use crate::core::time::{in_shift_window, time_of_day};
use crate::models::actor::{Actor, Role, UserId};
use crate::models::masters::WorkCenterId;
use crate::models::mo::MoId;
use crate::models::notification::{Notification, NotificationKind, NotificationPriority};
use crate::models::process_execution::{ExecutionId, ExecutionStatus};
use crate::models::state::{FactoryState, StoreError};
use crate::models::supervisor::{
    ChangeReason, DailySupervisorStatus, ShiftId, SupervisorChangeEntry,
};
use crate::services::notify_role_holders;

/// Errors raised by scheduler operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("caller is not authorised to {0}")]
    SupervisorUnauthorised(String),

    #[error("no daily supervisor status for {work_center} {shift:?} on {date}")]
    NoDailyStatus {
        date: NaiveDate,
        work_center: WorkCenterId,
        shift: ShiftId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one attendance snapshot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub backup_assigned: usize,
    /// True when the run stopped early on the cancellation token.
    pub cancelled: bool,
    pub errors: Vec<String>,
}

/// What happened to one execution during a logout cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassignmentOutcome {
    ReassignedToBackup,
    UnassignedBackupUnavailable,
    UnassignedNoBackup,
    Error(String),
}

/// One row of the logout-cascade summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassignmentEntry {
    pub mo_id: MoId,
    pub work_center: WorkCenterId,
    pub old_supervisor: Option<UserId>,
    pub new_supervisor: Option<UserId>,
    pub outcome: ReassignmentOutcome,
}

/// Result of a logout call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutSummary {
    /// Sessions closed by this call; 0 means the logout was a repeat and
    /// the cascade did not run again.
    pub closed_sessions: usize,
    pub reassignments: Vec<ReassignmentEntry>,
}

/// The shift whose `[start, end)` window contains the wall-clock time at
/// the given work center. Defaults to shift 1 when nothing matches.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `work_center` - Work center whose shift windows apply
/// * `now` - Current instant
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use manufacturing_core_rs::models::supervisor::ShiftId;
/// use manufacturing_core_rs::services::scheduler;
/// use manufacturing_core_rs::FactoryState;
///
/// let state = FactoryState::new();
/// let now = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
///
/// // an unconfigured work center always resolves to shift 1
/// assert_eq!(scheduler::current_shift(&state, "WC-COILING", now), ShiftId::Shift1);
/// ```
pub fn current_shift(state: &FactoryState, work_center: &str, now: DateTime<Utc>) -> ShiftId {
    let time = time_of_day(now);
    for config in state.shift_configs_of(work_center) {
        if in_shift_window(time, config.shift_start_time, config.shift_end_time) {
            return config.shift;
        }
    }
    ShiftId::Shift1
}

/// Daily attendance snapshot.
///
/// For every active (work center, shift) configuration: create (or with
/// `force`, refresh) the day's status row, then compare the primary
/// supervisor's first login of the day against the check-in deadline. A
/// missing or late login marks the primary absent and promotes the backup
/// to active. An activity-log row is initialised for whoever ends up
/// active.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `date` - Day to snapshot
/// * `force` - Refresh rows that already exist for the day
/// * `cancel` - Cancellation token checked between rows
/// * `_now` - Current instant (reserved for the job's own bookkeeping)
///
/// # Returns
/// A summary of rows processed, created, refreshed and backups promoted;
/// per-row errors are collected, never raised.
///
/// # Example
/// ```
/// use chrono::{NaiveTime, TimeZone, Utc};
/// use manufacturing_core_rs::core::cancel::CancelToken;
/// use manufacturing_core_rs::models::supervisor::{ShiftConfig, ShiftId};
/// use manufacturing_core_rs::services::scheduler;
/// use manufacturing_core_rs::FactoryState;
///
/// let mut state = FactoryState::new();
/// state.upsert_shift_config(
///     ShiftConfig::new(
///         "WC-COILING",
///         ShiftId::Shift1,
///         NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
///         NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
///         "U-PRIMARY",
///         "U-BACKUP",
///         NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
///     )
///     .unwrap(),
/// );
/// // the primary logged in before the 09:15 deadline
/// state.record_login("U-PRIMARY", Utc.with_ymd_and_hms(2025, 10, 12, 9, 5, 0).unwrap());
///
/// let now = Utc.with_ymd_and_hms(2025, 10, 12, 9, 20, 0).unwrap();
/// let summary =
///     scheduler::attendance_snapshot(&mut state, now.date_naive(), false, &CancelToken::new(), now);
/// assert_eq!(summary.created, 1);
/// assert_eq!(summary.backup_assigned, 0);
///
/// let status = state
///     .daily_status(now.date_naive(), "WC-COILING", ShiftId::Shift1)
///     .unwrap();
/// assert!(status.is_present);
/// assert_eq!(status.active_supervisor, "U-PRIMARY");
/// assert_eq!(status.status_color(), "green");
/// ```
pub fn attendance_snapshot(
    state: &mut FactoryState,
    date: NaiveDate,
    force: bool,
    cancel: &CancelToken,
    _now: DateTime<Utc>,
) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();

    let configs: Vec<_> = state
        .active_shift_configs()
        .into_iter()
        .cloned()
        .collect();
    if configs.is_empty() {
        warn!("no active work center shift configurations found");
        return summary;
    }

    for config in configs {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        summary.processed += 1;

        let existed = state
            .daily_status(date, &config.work_center, config.shift)
            .is_some();

        // Each row is its own transaction so one failure does not undo the
        // rows already committed.
        let row: Result<(), SchedulerError> = state.transact(|state| {
            if !existed {
                state.upsert_daily_status(DailySupervisorStatus {
                    date,
                    work_center: config.work_center.clone(),
                    shift: config.shift,
                    default_supervisor: config.primary_supervisor.clone(),
                    is_present: false,
                    login_time: None,
                    check_in_deadline: config.check_in_deadline,
                    active_supervisor: config.primary_supervisor.clone(),
                    manually_updated: false,
                    manually_updated_by: None,
                    manually_updated_at: None,
                    manual_update_reason: String::new(),
                });
            } else if force {
                let status = state
                    .daily_status_mut(date, &config.work_center, config.shift)
                    .ok_or_else(|| SchedulerError::NoDailyStatus {
                        date,
                        work_center: config.work_center.clone(),
                        shift: config.shift,
                    })?;
                status.default_supervisor = config.primary_supervisor.clone();
                status.check_in_deadline = config.check_in_deadline;
            }

            let login = state.first_login_on(&config.primary_supervisor, date);
            let status = state
                .daily_status_mut(date, &config.work_center, config.shift)
                .ok_or_else(|| SchedulerError::NoDailyStatus {
                    date,
                    work_center: config.work_center.clone(),
                    shift: config.shift,
                })?;
            status.login_time = login;
            match login {
                Some(login_time) if login_time <= config.check_in_deadline => {
                    status.is_present = true;
                    status.active_supervisor = config.primary_supervisor.clone();
                }
                _ => {
                    status.is_present = false;
                    status.active_supervisor = config.backup_supervisor.clone();
                }
            }
            let active = status.active_supervisor.clone();
            state.supervisor_activity_mut(date, &config.work_center, &active);
            Ok(())
        });

        if let Err(err) = row {
            summary.errors.push(format!(
                "{} {:?}: {err}",
                config.work_center, config.shift
            ));
            continue;
        }

        if !existed {
            summary.created += 1;
        } else if force {
            summary.updated += 1;
        }

        match state.daily_status(date, &config.work_center, config.shift) {
            Some(status) if status.is_present => {
                info!(
                    work_center = %config.work_center,
                    shift = ?config.shift,
                    "primary supervisor present"
                );
            }
            _ => {
                summary.backup_assigned += 1;
                warn!(
                    work_center = %config.work_center,
                    shift = ?config.shift,
                    backup = %config.backup_supervisor,
                    "primary absent or late, backup assigned"
                );
            }
        }
    }

    summary
}

/// Write a supervisor change-log row.
fn log_change(
    state: &mut FactoryState,
    execution_id: ExecutionId,
    from: Option<UserId>,
    to: Option<UserId>,
    reason: ChangeReason,
    shift: ShiftId,
    status: ExecutionStatus,
    changed_by: Option<UserId>,
    notes: impl Into<String>,
    now: DateTime<Utc>,
) {
    state.push_supervisor_change(SupervisorChangeEntry {
        execution_id,
        from_supervisor: from,
        to_supervisor: to,
        reason,
        shift,
        changed_at: now,
        changed_by,
        process_status_at_change: status,
        notes: notes.into(),
    });
}

/// High-priority escalation when nobody can supervise a process.
fn notify_no_supervisor(
    state: &mut FactoryState,
    mo_id: &str,
    work_center: &str,
    shift: ShiftId,
    now: DateTime<Utc>,
) {
    let message = format!(
        "No supervisor available for MO {mo_id}, process {work_center}, shift {shift:?}. \
         Both primary and backup supervisors are unavailable. Please assign a supervisor manually."
    );
    let mo = mo_id.to_string();
    notify_role_holders(
        state,
        &[Role::ProductionHead, Role::Manager],
        |recipient| {
            Notification::new(
                NotificationKind::SupervisorUnavailable,
                "Action Needed: No Supervisor Available",
                message.clone(),
                recipient.clone(),
                now,
            )
            .with_priority(NotificationPriority::High)
            .with_related_mo(mo.clone())
            .action_required()
        },
    );
}

/// Resolve and assign the effective supervisor for one process execution.
///
/// Precedence: active MO-specific override, then today's daily status, then
/// the global shift configuration's primary. When nothing resolves the
/// execution is left unassigned and a high-priority escalation goes out to
/// every production head and manager. Every outcome writes a change-log
/// row.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `execution_id` - Execution to assign
/// * `shift` - Shift to resolve for; derived from the wall clock when
///   absent
/// * `now` - Current instant
///
/// # Returns
/// The assigned supervisor, or `None` when nobody could be resolved.
pub fn auto_assign_supervisor(
    state: &mut FactoryState,
    execution_id: ExecutionId,
    shift: Option<ShiftId>,
    now: DateTime<Utc>,
) -> Result<Option<UserId>, SchedulerError> {
    state.transact(|state| {
        let (mo_id, work_center, status, old_supervisor) = {
            let execution = state.execution(execution_id)?;
            (
                execution.mo_id().to_string(),
                execution.work_center().to_string(),
                execution.status(),
                execution.assigned_supervisor().map(str::to_string),
            )
        };
        let shift = shift.unwrap_or_else(|| current_shift(state, &work_center, now));
        let today = now.date_naive();

        let mut assigned: Option<UserId> = None;
        let mut reason = ChangeReason::InitialAssignment;

        if let Some(mo_override) = state.mo_override(&mo_id, &work_center, shift) {
            let daily = state.daily_status(today, &work_center, shift);
            match daily {
                Some(status_row) if status_row.active_supervisor == mo_override.backup_supervisor => {
                    assigned = Some(mo_override.backup_supervisor.clone());
                    reason = ChangeReason::AttendanceAbsence;
                }
                _ => {
                    assigned = Some(mo_override.primary_supervisor.clone());
                }
            }
            info!(mo_id = %mo_id, work_center = %work_center, shift = ?shift, "using MO-specific supervisor override");
        }

        if assigned.is_none() {
            if let Some(status_row) = state.daily_status(today, &work_center, shift) {
                if !status_row.is_present {
                    reason = ChangeReason::AttendanceAbsence;
                }
                assigned = Some(status_row.active_supervisor.clone());
            } else if let Some(config) = state.shift_config(&work_center, shift) {
                warn!(
                    work_center = %work_center,
                    shift = ?shift,
                    "no daily status found, using default primary supervisor; run the attendance snapshot"
                );
                assigned = Some(config.primary_supervisor.clone());
            }
        }

        match assigned {
            Some(supervisor) => {
                state
                    .execution_mut(execution_id)?
                    .set_supervisor(Some(supervisor.clone()));
                log_change(
                    state,
                    execution_id,
                    old_supervisor,
                    Some(supervisor.clone()),
                    reason,
                    shift,
                    status,
                    None,
                    "",
                    now,
                );
                state.supervisor_activity_mut(today, &work_center, &supervisor);
                info!(mo_id = %mo_id, work_center = %work_center, supervisor = %supervisor, "auto-assigned supervisor");
                Ok(Some(supervisor))
            }
            None => {
                notify_no_supervisor(state, &mo_id, &work_center, shift, now);
                error!(mo_id = %mo_id, work_center = %work_center, shift = ?shift, "no supervisor available, leaving unassigned");
                Ok(None)
            }
        }
    })
}

/// Manual mid-process reassignment by a production head or manager.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `execution_id` - Execution being reassigned
/// * `new_supervisor` - User taking over
/// * `actor` - Production head, manager or admin
/// * `now` - Current instant
/// * `notes` - Change-log note
pub fn assign_supervisor_manually(
    state: &mut FactoryState,
    execution_id: ExecutionId,
    new_supervisor: &str,
    actor: &Actor,
    now: DateTime<Utc>,
    notes: &str,
) -> Result<(), SchedulerError> {
    if !actor.has_any_role(&[Role::Manager, Role::ProductionHead, Role::Admin]) {
        return Err(SchedulerError::SupervisorUnauthorised(
            "reassign a process supervisor".into(),
        ));
    }
    state.transact(|state| {
        state.user(new_supervisor)?;
        let (mo_id, work_center, status, old_supervisor) = {
            let execution = state.execution(execution_id)?;
            (
                execution.mo_id().to_string(),
                execution.work_center().to_string(),
                execution.status(),
                execution.assigned_supervisor().map(str::to_string),
            )
        };
        let shift = current_shift(state, &work_center, now);

        state
            .execution_mut(execution_id)?
            .set_supervisor(Some(new_supervisor.to_string()));
        log_change(
            state,
            execution_id,
            old_supervisor,
            Some(new_supervisor.to_string()),
            ChangeReason::MidProcessChange,
            shift,
            status,
            Some(actor.id.clone()),
            notes,
            now,
        );
        state.supervisor_activity_mut(now.date_naive(), &work_center, new_supervisor);

        let notification = Notification::new(
            NotificationKind::SupervisorAssigned,
            format!("Process Assigned: {work_center}"),
            format!(
                "You have been assigned as supervisor for process {work_center} of MO {mo_id}."
            ),
            new_supervisor,
            now,
        )
        .with_related_mo(mo_id)
        .action_required()
        .with_creator(actor.id.clone());
        state.push_notification(notification);
        Ok(())
    })
}

/// Manual correction of a daily attendance row.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `date` - Day of the row
/// * `work_center` - Work center of the row
/// * `shift` - Shift of the row
/// * `new_active` - Supervisor to mark active
/// * `actor` - Production head, manager or admin
/// * `now` - Current instant
/// * `reason` - Recorded as the manual-update reason
pub fn update_daily_status_manually(
    state: &mut FactoryState,
    date: NaiveDate,
    work_center: &str,
    shift: ShiftId,
    new_active: &str,
    actor: &Actor,
    now: DateTime<Utc>,
    reason: &str,
) -> Result<(), SchedulerError> {
    if !actor.has_any_role(&[Role::Manager, Role::ProductionHead, Role::Admin]) {
        return Err(SchedulerError::SupervisorUnauthorised(
            "override a daily supervisor status".into(),
        ));
    }
    state.transact(|state| {
        state.user(new_active)?;
        let status = state.daily_status_mut(date, work_center, shift).ok_or(
            SchedulerError::NoDailyStatus {
                date,
                work_center: work_center.to_string(),
                shift,
            },
        )?;
        status.active_supervisor = new_active.to_string();
        status.manually_updated = true;
        status.manually_updated_by = Some(actor.id.clone());
        status.manually_updated_at = Some(now);
        status.manual_update_reason = reason.to_string();
        state.supervisor_activity_mut(date, work_center, new_active);
        Ok(())
    })
}

/// Backup resolution for the logout cascade: the MO-specific override's
/// backup first, then the work-center shift configuration's backup (only
/// when the leaver is that configuration's primary; a leaving backup has no
/// further fallback).
fn find_backup(
    state: &FactoryState,
    mo_id: &str,
    work_center: &str,
    shift: ShiftId,
    leaving: &str,
) -> Option<UserId> {
    if let Some(mo_override) = state.mo_override(mo_id, work_center, shift) {
        if mo_override.backup_supervisor != leaving {
            return Some(mo_override.backup_supervisor.clone());
        }
    }
    let config = state.shift_config(work_center, shift)?;
    if config.primary_supervisor == leaving {
        Some(config.backup_supervisor.clone())
    } else {
        None
    }
}

/// Record a logout and cascade the leaver's active work to backups.
///
/// At most once per session: a second logout for the same user finds no
/// open session and returns an empty summary. Every per-execution failure
/// is captured into the summary; the cascade always returns, never raises.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `user` - User logging out
/// * `now` - Current instant
///
/// # Returns
/// The sessions closed and one [`ReassignmentEntry`] per affected
/// execution.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use manufacturing_core_rs::services::scheduler;
/// use manufacturing_core_rs::FactoryState;
///
/// let mut state = FactoryState::new();
/// let login = Utc.with_ymd_and_hms(2025, 10, 12, 9, 0, 0).unwrap();
/// state.record_login("U-SUP", login);
///
/// let first = scheduler::logout(&mut state, "U-SUP", login + Duration::hours(8));
/// assert_eq!(first.closed_sessions, 1);
///
/// // a repeated logout is a no-op
/// let second = scheduler::logout(&mut state, "U-SUP", login + Duration::hours(9));
/// assert_eq!(second.closed_sessions, 0);
/// assert!(second.reassignments.is_empty());
/// ```
pub fn logout(state: &mut FactoryState, user: &str, now: DateTime<Utc>) -> LogoutSummary {
    let closed_sessions = state.close_sessions(user, now);
    let mut summary = LogoutSummary {
        closed_sessions,
        reassignments: Vec::new(),
    };
    if closed_sessions == 0 {
        info!(user, "logout repeated for an already closed session, skipping cascade");
        return summary;
    }

    let is_supervisor = state
        .user(user)
        .map(|record| record.roles.contains(&Role::Supervisor))
        .unwrap_or(false);
    if !is_supervisor {
        return summary;
    }

    let assigned: Vec<ExecutionId> = state
        .executions()
        .filter(|execution| {
            execution.assigned_supervisor() == Some(user)
                && matches!(
                    execution.status(),
                    ExecutionStatus::Pending | ExecutionStatus::InProgress
                )
        })
        .map(|execution| execution.id())
        .collect();

    if assigned.is_empty() {
        info!(user, "no active process executions to reassign");
        return summary;
    }

    for execution_id in assigned {
        let entry = state.transact(|state| reassign_one(state, execution_id, user, now));
        match entry {
            Ok(entry) => summary.reassignments.push(entry),
            Err(err) => {
                error!(user, execution_id, error = %err, "error reassigning process execution");
                summary.reassignments.push(ReassignmentEntry {
                    mo_id: String::new(),
                    work_center: String::new(),
                    old_supervisor: Some(user.to_string()),
                    new_supervisor: None,
                    outcome: ReassignmentOutcome::Error(err.to_string()),
                });
            }
        }
    }
    summary
}

fn reassign_one(
    state: &mut FactoryState,
    execution_id: ExecutionId,
    leaving: &str,
    now: DateTime<Utc>,
) -> Result<ReassignmentEntry, SchedulerError> {
    let (mo_id, work_center, status) = {
        let execution = state.execution(execution_id)?;
        (
            execution.mo_id().to_string(),
            execution.work_center().to_string(),
            execution.status(),
        )
    };
    let shift = current_shift(state, &work_center, now);
    let backup = find_backup(state, &mo_id, &work_center, shift, leaving);

    match backup {
        Some(backup) if state.is_logged_in(&backup) => {
            state
                .execution_mut(execution_id)?
                .set_supervisor(Some(backup.clone()));
            log_change(
                state,
                execution_id,
                Some(leaving.to_string()),
                Some(backup.clone()),
                ChangeReason::AttendanceAbsence,
                shift,
                status,
                None,
                format!("Automatic reassignment due to {leaving} logout"),
                now,
            );
            let notification = Notification::new(
                NotificationKind::SupervisorReassignment,
                "Process Reassigned To You",
                format!(
                    "You have been reassigned as supervisor for process {work_center} of MO {mo_id} \
                     after {leaving} logged out."
                ),
                backup.clone(),
                now,
            )
            .with_related_mo(mo_id.clone())
            .action_required();
            state.push_notification(notification);
            info!(mo_id = %mo_id, work_center = %work_center, backup = %backup, "reassigned to backup");
            Ok(ReassignmentEntry {
                mo_id,
                work_center,
                old_supervisor: Some(leaving.to_string()),
                new_supervisor: Some(backup),
                outcome: ReassignmentOutcome::ReassignedToBackup,
            })
        }
        Some(backup) => {
            // Backup exists but is not logged in.
            state.execution_mut(execution_id)?.set_supervisor(None);
            log_change(
                state,
                execution_id,
                Some(leaving.to_string()),
                None,
                ChangeReason::BothUnavailable,
                shift,
                status,
                None,
                format!("Backup {backup} not logged in at {leaving} logout"),
                now,
            );
            notify_no_supervisor(state, &mo_id, &work_center, shift, now);
            warn!(mo_id = %mo_id, work_center = %work_center, backup = %backup, "backup not logged in, unassigned");
            Ok(ReassignmentEntry {
                mo_id,
                work_center,
                old_supervisor: Some(leaving.to_string()),
                new_supervisor: None,
                outcome: ReassignmentOutcome::UnassignedBackupUnavailable,
            })
        }
        None => {
            state.execution_mut(execution_id)?.set_supervisor(None);
            log_change(
                state,
                execution_id,
                Some(leaving.to_string()),
                None,
                ChangeReason::BothUnavailable,
                shift,
                status,
                None,
                format!("No backup supervisor configured at {leaving} logout"),
                now,
            );
            notify_no_supervisor(state, &mo_id, &work_center, shift, now);
            warn!(mo_id = %mo_id, work_center = %work_center, "no backup supervisor found, unassigned");
            Ok(ReassignmentEntry {
                mo_id,
                work_center,
                old_supervisor: Some(leaving.to_string()),
                new_supervisor: None,
                outcome: ReassignmentOutcome::UnassignedNoBackup,
            })
        }
    }
}
