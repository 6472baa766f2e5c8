//! Supervisor scheduling records
//!
//! Per-shift primary/backup assignment for each work center, the daily
//! attendance snapshot that resolves who is effectively in charge, the
//! MO-specific overrides that take precedence over the global defaults, and
//! the append-only change log that records every reassignment.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::actor::UserId;
use crate::models::masters::WorkCenterId;
use crate::models::mo::MoId;
use crate::models::process_execution::{ExecutionId, ExecutionStatus};

/// Shift identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftId {
    Shift1,
    Shift2,
    Shift3,
}

/// Why a process execution's supervisor changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    InitialAssignment,
    AttendanceAbsence,
    MidProcessChange,
    ShiftChange,
    ManualOverride,
    BothUnavailable,
}

/// Validation error for shift configurations and overrides.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SupervisorConfigError {
    #[error("primary and backup supervisors must be different users")]
    PrimaryEqualsBackup,
}

/// Global per-(work center, shift) supervisor defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfig {
    pub work_center: WorkCenterId,
    pub shift: ShiftId,
    pub shift_start_time: NaiveTime,
    pub shift_end_time: NaiveTime,
    pub primary_supervisor: UserId,
    pub backup_supervisor: UserId,
    /// Time by which the primary must have logged in to count as present.
    pub check_in_deadline: NaiveTime,
    pub is_active: bool,
}

impl ShiftConfig {
    /// Create an active shift configuration.
    ///
    /// # Arguments
    /// * `work_center` - Work center the shift belongs to
    /// * `shift` - Shift id
    /// * `shift_start_time` - Start of the `[start, end)` window
    /// * `shift_end_time` - End of the window
    /// * `primary_supervisor` - Default supervisor for the shift
    /// * `backup_supervisor` - Failover supervisor (must differ)
    /// * `check_in_deadline` - Login deadline for the primary
    ///
    /// # Returns
    /// - `Ok(ShiftConfig)` when the pair is valid
    /// - `Err(SupervisorConfigError)` when primary and backup are the same
    ///
    /// # Example
    /// ```
    /// use chrono::NaiveTime;
    /// use manufacturing_core_rs::models::supervisor::{
    ///     ShiftConfig, ShiftId, SupervisorConfigError,
    /// };
    ///
    /// let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    /// let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
    /// let deadline = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
    ///
    /// let config = ShiftConfig::new(
    ///     "WC-COILING", ShiftId::Shift1, nine, five, "U-PRIMARY", "U-BACKUP", deadline,
    /// )
    /// .unwrap();
    /// assert!(config.is_active);
    ///
    /// let same_user = ShiftConfig::new(
    ///     "WC-COILING", ShiftId::Shift1, nine, five, "U-ONE", "U-ONE", deadline,
    /// );
    /// assert_eq!(same_user.unwrap_err(), SupervisorConfigError::PrimaryEqualsBackup);
    /// ```
    pub fn new(
        work_center: impl Into<WorkCenterId>,
        shift: ShiftId,
        shift_start_time: NaiveTime,
        shift_end_time: NaiveTime,
        primary_supervisor: impl Into<UserId>,
        backup_supervisor: impl Into<UserId>,
        check_in_deadline: NaiveTime,
    ) -> Result<Self, SupervisorConfigError> {
        let primary = primary_supervisor.into();
        let backup = backup_supervisor.into();
        if primary == backup {
            return Err(SupervisorConfigError::PrimaryEqualsBackup);
        }
        Ok(Self {
            work_center: work_center.into(),
            shift,
            shift_start_time,
            shift_end_time,
            primary_supervisor: primary,
            backup_supervisor: backup,
            check_in_deadline,
            is_active: true,
        })
    }
}

/// MO-specific override that takes precedence over [`ShiftConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoSupervisorOverride {
    pub mo_id: MoId,
    pub work_center: WorkCenterId,
    pub shift: ShiftId,
    pub primary_supervisor: UserId,
    pub backup_supervisor: UserId,
    pub is_active: bool,
}

impl MoSupervisorOverride {
    /// Create an active override.
    ///
    /// # Returns
    /// - `Ok(MoSupervisorOverride)` when the pair is valid
    /// - `Err(SupervisorConfigError)` when primary and backup are the same
    pub fn new(
        mo_id: impl Into<MoId>,
        work_center: impl Into<WorkCenterId>,
        shift: ShiftId,
        primary_supervisor: impl Into<UserId>,
        backup_supervisor: impl Into<UserId>,
    ) -> Result<Self, SupervisorConfigError> {
        let primary = primary_supervisor.into();
        let backup = backup_supervisor.into();
        if primary == backup {
            return Err(SupervisorConfigError::PrimaryEqualsBackup);
        }
        Ok(Self {
            mo_id: mo_id.into(),
            work_center: work_center.into(),
            shift,
            primary_supervisor: primary,
            backup_supervisor: backup,
            is_active: true,
        })
    }
}

/// Daily attendance snapshot row for one (date, work center, shift).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySupervisorStatus {
    pub date: NaiveDate,
    pub work_center: WorkCenterId,
    pub shift: ShiftId,
    pub default_supervisor: UserId,
    /// True when the default supervisor logged in before the deadline.
    pub is_present: bool,
    /// First login time of the default supervisor that day, if any.
    pub login_time: Option<NaiveTime>,
    pub check_in_deadline: NaiveTime,
    /// Who is effectively in charge today (default or backup).
    pub active_supervisor: UserId,
    pub manually_updated: bool,
    pub manually_updated_by: Option<UserId>,
    pub manually_updated_at: Option<DateTime<Utc>>,
    pub manual_update_reason: String,
}

impl DailySupervisorStatus {
    /// Frontend colour semantics: green when the default supervisor is
    /// present, red otherwise.
    pub fn status_color(&self) -> &'static str {
        if self.is_present {
            "green"
        } else {
            "red"
        }
    }
}

/// Append-only supervisor change log row. `to_supervisor` is `None` for an
/// unassignment (both primary and backup unavailable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorChangeEntry {
    pub execution_id: ExecutionId,
    pub from_supervisor: Option<UserId>,
    pub to_supervisor: Option<UserId>,
    pub reason: ChangeReason,
    pub shift: ShiftId,
    pub changed_at: DateTime<Utc>,
    /// `None` for system-generated changes (attendance, logout cascade).
    pub changed_by: Option<UserId>,
    pub process_status_at_change: ExecutionStatus,
    pub notes: String,
}

/// Daily activity counters per (date, work center, active supervisor).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorActivitySummary {
    pub mos_handled: u32,
    pub total_operations: u32,
    pub operations_completed: u32,
    pub operations_in_progress: u32,
    pub total_processing_time_minutes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_primary_must_differ_from_backup() {
        let result = ShiftConfig::new(
            "WC-COILING",
            ShiftId::Shift1,
            t(9, 0),
            t(17, 0),
            "U-SUP",
            "U-SUP",
            t(9, 15),
        );
        assert_eq!(result.unwrap_err(), SupervisorConfigError::PrimaryEqualsBackup);
    }

    #[test]
    fn test_status_color() {
        let status = DailySupervisorStatus {
            date: NaiveDate::from_ymd_opt(2025, 10, 12).unwrap(),
            work_center: "WC-COILING".into(),
            shift: ShiftId::Shift1,
            default_supervisor: "U-P".into(),
            is_present: true,
            login_time: Some(t(9, 2)),
            check_in_deadline: t(9, 15),
            active_supervisor: "U-P".into(),
            manually_updated: false,
            manually_updated_by: None,
            manually_updated_at: None,
            manual_update_reason: String::new(),
        };
        assert_eq!(status.status_color(), "green");
    }
}
