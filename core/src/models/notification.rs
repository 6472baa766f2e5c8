//! Notification and activity-log records
//!
//! The core never delivers anything: it writes notification rows inside the
//! caller's transaction (so an aborted operation produces none) and a
//! downstream worker outside the core consumes them. Activity-log rows feed
//! the batch traceability timeline and are strictly append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::actor::UserId;
use crate::models::batch::BatchId;
use crate::models::masters::WorkCenterId;
use crate::models::mo::MoId;
use crate::models::process_execution::ExecutionId;

/// Delivery priority of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

/// Closed set of notification kinds emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SupervisorAssigned,
    SupervisorUnavailable,
    SupervisorReassignment,
    RmAllocationRequired,
    ProcessStopped,
    ProcessResumed,
    MoStopped,
    BatchReceived,
    ReceiptReported,
    ReworkCompleted,
    FiReworkAssigned,
    FiReworkCreated,
    FiReworkCompleted,
}

/// One notification row for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub recipient: UserId,
    pub priority: NotificationPriority,
    pub related_mo: Option<MoId>,
    pub action_required: bool,
    pub action_url: Option<String>,
    /// `None` for system-generated notifications.
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a normal-priority notification; builders refine it.
    ///
    /// # Arguments
    /// * `kind` - Notification kind
    /// * `title` - Short title
    /// * `message` - Human-readable body
    /// * `recipient` - User the row is addressed to
    /// * `created_at` - Emission instant
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::notification::{
    ///     Notification, NotificationKind, NotificationPriority,
    /// };
    ///
    /// let notification = Notification::new(
    ///     NotificationKind::ProcessStopped,
    ///     "Process Stopped",
    ///     "Coiling stopped for batch MO-001-B1",
    ///     "U-PH",
    ///     Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap(),
    /// )
    /// .with_priority(NotificationPriority::High)
    /// .with_related_mo("MO-001")
    /// .action_required();
    ///
    /// assert_eq!(notification.priority, NotificationPriority::High);
    /// assert!(notification.action_required);
    /// assert_eq!(notification.related_mo.as_deref(), Some("MO-001"));
    /// ```
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        recipient: impl Into<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            recipient: recipient.into(),
            priority: NotificationPriority::Normal,
            related_mo: None,
            action_required: false,
            action_url: None,
            created_by: None,
            created_at,
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_related_mo(mut self, mo_id: impl Into<MoId>) -> Self {
        self.related_mo = Some(mo_id.into());
        self
    }

    pub fn action_required(mut self) -> Self {
        self.action_required = true;
        self
    }

    pub fn with_creator(mut self, created_by: impl Into<UserId>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

/// Kinds of domain events recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    BatchVerified,
    ProcessStopped,
    ProcessResumed,
    BatchCompletion,
    ReworkCreated,
    /// Receipt verification at process handover.
    BatchVerification,
    FiRework,
}

/// Append-only activity-log row: structured metadata plus a human-readable
/// remark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub mo_id: Option<MoId>,
    pub batch_id: Option<BatchId>,
    pub work_center: Option<WorkCenterId>,
    pub execution_id: Option<ExecutionId>,
    pub performed_by: Option<UserId>,
    pub performed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub remark: String,
}

impl ActivityEntry {
    /// Create a bare entry; builders attach the context keys.
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::notification::{ActivityEntry, ActivityKind};
    ///
    /// let entry = ActivityEntry::new(
    ///     ActivityKind::BatchVerified,
    ///     Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap(),
    /// )
    /// .with_mo("MO-001")
    /// .with_batch("MO-001-B1")
    /// .with_remark("Batch verified by supervisor");
    ///
    /// assert_eq!(entry.mo_id.as_deref(), Some("MO-001"));
    /// assert_eq!(entry.remark, "Batch verified by supervisor");
    /// ```
    pub fn new(kind: ActivityKind, performed_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            mo_id: None,
            batch_id: None,
            work_center: None,
            execution_id: None,
            performed_by: None,
            performed_at,
            metadata: serde_json::Value::Null,
            remark: String::new(),
        }
    }

    pub fn with_mo(mut self, mo_id: impl Into<MoId>) -> Self {
        self.mo_id = Some(mo_id.into());
        self
    }

    pub fn with_batch(mut self, batch_id: impl Into<BatchId>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_work_center(mut self, work_center: impl Into<WorkCenterId>) -> Self {
        self.work_center = Some(work_center.into());
        self
    }

    pub fn with_execution(mut self, execution_id: ExecutionId) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn by(mut self, performed_by: impl Into<UserId>) -> Self {
        self.performed_by = Some(performed_by.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }
}
