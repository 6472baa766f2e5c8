//! Process stops and downtime accounting
//!
//! Stopping a process writes one stop row per affected batch. Resuming
//! closes every unresolved stop on the execution, computing floor-minute
//! downtime per row, and recomputes the day's downtime summary for the
//! process.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::time::downtime_minutes;
use crate::models::actor::UserId;
use crate::models::batch::BatchId;
use crate::models::masters::WorkCenterId;
use crate::models::mo::MoId;
use crate::models::process_execution::ExecutionId;

/// Why a process was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MachineBreakdown,
    MaterialShortage,
    PowerFailure,
    QualityIssue,
    ManpowerShortage,
    Other,
}

/// One stop event for one batch at one process execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStop {
    pub id: Uuid,
    pub batch_id: BatchId,
    pub mo_id: MoId,
    pub execution_id: ExecutionId,
    pub stopped_by: UserId,
    pub reason: StopReason,
    pub reason_detail: String,
    pub stopped_at: DateTime<Utc>,
    pub is_resumed: bool,
    pub resumed_by: Option<UserId>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub resume_notes: String,
    /// Wall-clock minutes between stop and resume, floored. Zero until
    /// resumed.
    pub downtime_minutes: i64,
}

impl ProcessStop {
    /// Record a new, unresolved stop.
    ///
    /// # Arguments
    /// * `batch_id` - Batch affected by the stop
    /// * `mo_id` - Parent order
    /// * `execution_id` - Process execution being stopped
    /// * `stopped_by` - User recording the stop
    /// * `reason` - Stop reason category
    /// * `reason_detail` - Free-text detail
    /// * `stopped_at` - Stop instant
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::stoppage::{ProcessStop, StopReason};
    ///
    /// let stop = ProcessStop::new(
    ///     "MO-001-B1",
    ///     "MO-001",
    ///     1,
    ///     "U-SUP",
    ///     StopReason::MachineBreakdown,
    ///     "spindle jam",
    ///     Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap(),
    /// );
    ///
    /// assert!(!stop.is_resumed);
    /// assert_eq!(stop.downtime_minutes, 0);
    /// ```
    pub fn new(
        batch_id: impl Into<BatchId>,
        mo_id: impl Into<MoId>,
        execution_id: ExecutionId,
        stopped_by: impl Into<UserId>,
        reason: StopReason,
        reason_detail: impl Into<String>,
        stopped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id: batch_id.into(),
            mo_id: mo_id.into(),
            execution_id,
            stopped_by: stopped_by.into(),
            reason,
            reason_detail: reason_detail.into(),
            stopped_at,
            is_resumed: false,
            resumed_by: None,
            resumed_at: None,
            resume_notes: String::new(),
            downtime_minutes: 0,
        }
    }

    /// Close the stop, returning the computed downtime. Resuming an already
    /// resumed stop is a no-op that returns the recorded downtime.
    pub(crate) fn resume(
        &mut self,
        resumed_by: impl Into<UserId>,
        resumed_at: DateTime<Utc>,
        notes: &str,
    ) -> i64 {
        if self.is_resumed {
            return self.downtime_minutes;
        }
        self.downtime_minutes = downtime_minutes(self.stopped_at, resumed_at);
        self.is_resumed = true;
        self.resumed_by = Some(resumed_by.into());
        self.resumed_at = Some(resumed_at);
        self.resume_notes = notes.to_string();
        self.downtime_minutes
    }
}

/// Aggregated downtime for one (date, process), bucketed by reason.
/// Recomputed from the resolved stop rows on every resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DowntimeSummary {
    pub date: NaiveDate,
    pub work_center: WorkCenterId,
    pub minutes_by_reason: BTreeMap<StopReason, i64>,
    pub total_minutes: i64,
    pub stop_count: u32,
}

impl DowntimeSummary {
    /// Rebuild a summary from the resolved stops of that day and process.
    ///
    /// # Arguments
    /// * `date` - Day the stops were recorded on
    /// * `work_center` - Process the stops belong to
    /// * `stops` - Resolved stop rows to aggregate
    ///
    /// # Returns
    /// A fresh summary with per-reason minute buckets, total minutes and
    /// the stop count.
    ///
    /// # Example
    /// ```
    /// use chrono::NaiveDate;
    /// use manufacturing_core_rs::models::stoppage::DowntimeSummary;
    ///
    /// let date = NaiveDate::from_ymd_opt(2025, 10, 12).unwrap();
    /// let summary = DowntimeSummary::from_stops(date, "WC-COILING", std::iter::empty());
    /// assert_eq!(summary.stop_count, 0);
    /// assert_eq!(summary.total_minutes, 0);
    /// ```
    pub fn from_stops<'a>(
        date: NaiveDate,
        work_center: impl Into<WorkCenterId>,
        stops: impl Iterator<Item = &'a ProcessStop>,
    ) -> Self {
        let mut summary = Self {
            date,
            work_center: work_center.into(),
            ..Self::default()
        };
        for stop in stops {
            debug_assert!(stop.is_resumed);
            *summary.minutes_by_reason.entry(stop.reason).or_insert(0) +=
                stop.downtime_minutes;
            summary.total_minutes += stop.downtime_minutes;
            summary.stop_count += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resume_is_idempotent() {
        let stopped_at = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
        let mut stop = ProcessStop::new(
            "B1",
            "MO-001",
            1,
            "U-SUP",
            StopReason::MachineBreakdown,
            "spindle jam",
            stopped_at,
        );

        let first = stop.resume("U-SUP", stopped_at + chrono::Duration::minutes(15), "fixed");
        assert_eq!(first, 15);

        // a later second resume does not stretch the downtime
        let second = stop.resume("U-SUP", stopped_at + chrono::Duration::minutes(45), "again");
        assert_eq!(second, 15);
        assert_eq!(stop.downtime_minutes, 15);
    }

    #[test]
    fn test_summary_buckets_by_reason() {
        let stopped_at = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
        let mut stops = Vec::new();
        for batch in ["B1", "B2", "B3"] {
            let mut stop = ProcessStop::new(
                batch,
                "MO-001",
                1,
                "U-SUP",
                StopReason::MachineBreakdown,
                "",
                stopped_at,
            );
            stop.resume("U-SUP", stopped_at + chrono::Duration::minutes(15), "");
            stops.push(stop);
        }

        let summary = DowntimeSummary::from_stops(
            stopped_at.date_naive(),
            "WC-COILING",
            stops.iter(),
        );
        assert_eq!(summary.stop_count, 3);
        assert_eq!(summary.total_minutes, 45);
        assert_eq!(
            summary.minutes_by_reason.get(&StopReason::MachineBreakdown),
            Some(&45)
        );
    }
}
