//! Read-model projections
//!
//! Explicit view structs for the dashboards that consume the core. Each
//! projection is a pure read over [`FactoryState`] with the field list the
//! consuming page actually needs; nothing here mutates state.

use serde::Serialize;

use crate::core::units::Grams;
use crate::models::actor::UserId;
use crate::models::batch::{BatchLocation, BatchStatus};
use crate::models::completion::{FiReworkStatus, ReworkStatus};
use crate::models::masters::WorkCenterId;
use crate::models::mo::{MoId, MoStatus, Priority};
use crate::models::process_execution::{ExecutionId, ExecutionStatus};
use crate::models::state::{FactoryState, StoreError};
use crate::services::allocation::{self, AllocationError};
use crate::services::batch_lifecycle::{self, BatchError, RemainingRm};

/// Per-execution progress line in the MO summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionProgressView {
    pub execution_id: ExecutionId,
    pub work_center: WorkCenterId,
    pub sequence_order: u32,
    pub status: ExecutionStatus,
    pub progress_percentage: f64,
    pub assigned_supervisor: Option<UserId>,
}

/// Order summary with resource status, for the production-head detail
/// page.
#[derive(Debug, Clone, Serialize)]
pub struct MoSummaryView {
    pub mo_id: MoId,
    pub product_code: String,
    pub status: MoStatus,
    pub priority: Priority,
    pub quantity: i64,
    pub completed_pieces: i64,
    pub dispatched_quantity: i64,
    pub rm_required_g: Grams,
    pub reserved_g: Grams,
    pub locked_g: Grams,
    pub scrap_rm_weight_g: Grams,
    pub remaining_rm: RemainingRmView,
    pub batch_count: usize,
    pub executions: Vec<ExecutionProgressView>,
}

/// Remaining-RM rendered in the unit of the order's material type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "unit", content = "value")]
pub enum RemainingRmView {
    Grams(Grams),
    Strips(i64),
}

impl From<RemainingRm> for RemainingRmView {
    fn from(remaining: RemainingRm) -> Self {
        match remaining {
            RemainingRm::CoilGrams(grams) => Self::Grams(grams),
            RemainingRm::SheetStrips(strips) => Self::Strips(strips),
        }
    }
}

/// One row of the priority queue.
#[derive(Debug, Clone, Serialize)]
pub struct PriorityQueueEntry {
    pub mo_id: MoId,
    pub priority: Priority,
    pub status: MoStatus,
    pub shortage_g: Grams,
    pub can_swap: bool,
}

/// Supervisor dashboard: everything waiting on one supervisor.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorDashboardView {
    pub supervisor: UserId,
    pub assigned_executions: Vec<ExecutionProgressView>,
    pub pending_rework_count: usize,
    pub pending_fi_rework_count: usize,
}

/// RM-store dashboard: orders waiting on material plus stock levels.
#[derive(Debug, Clone, Serialize)]
pub struct RmStoreDashboardView {
    pub awaiting_allocation: Vec<PriorityQueueEntry>,
    pub stock_levels: Vec<StockLevelView>,
}

/// One material's stock level.
#[derive(Debug, Clone, Serialize)]
pub struct StockLevelView {
    pub material: String,
    pub available_g: Grams,
}

/// One event on a batch's traceability timeline, merged from movements and
/// activity-log rows.
#[derive(Debug, Clone, Serialize)]
pub struct TraceabilityEvent {
    pub at: chrono::DateTime<chrono::Utc>,
    pub description: String,
}

/// Full traceability timeline for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchTraceabilityView {
    pub batch_id: String,
    pub mo_id: MoId,
    pub status: BatchStatus,
    pub current_location: Option<BatchLocation>,
    pub timeline: Vec<TraceabilityEvent>,
}

/// Build the MO summary with resource status.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `mo_id` - Order to project
///
/// # Returns
/// The field list the production-head detail page renders: quantities,
/// allocation totals, remaining RM and per-execution progress.
pub fn mo_summary(state: &FactoryState, mo_id: &str) -> Result<MoSummaryView, BatchError> {
    let mo = state.mo(mo_id)?;
    let summary = allocation::allocation_summary(state, mo_id).map_err(|error| match error {
        AllocationError::Store(store) => BatchError::Store(store),
        other => BatchError::Allocation(other),
    })?;
    let executions = state
        .executions_of_mo(mo_id)
        .into_iter()
        .map(|execution| ExecutionProgressView {
            execution_id: execution.id(),
            work_center: execution.work_center().to_string(),
            sequence_order: execution.sequence_order(),
            status: execution.status(),
            progress_percentage: execution.progress_percentage(),
            assigned_supervisor: execution.assigned_supervisor().map(str::to_string),
        })
        .collect();

    Ok(MoSummaryView {
        mo_id: mo.mo_id().to_string(),
        product_code: mo.product_code().to_string(),
        status: mo.status(),
        priority: mo.priority(),
        quantity: mo.quantity(),
        completed_pieces: batch_lifecycle::completed_pieces(state, mo_id)?,
        dispatched_quantity: mo.dispatched_quantity(),
        rm_required_g: mo.rm_required_g(),
        reserved_g: summary.total_reserved_g,
        locked_g: summary.total_locked_g,
        scrap_rm_weight_g: mo.scrap_rm_weight_g(),
        remaining_rm: batch_lifecycle::remaining_rm(state, mo_id)?.into(),
        batch_count: state.batches_of_mo(mo_id).len(),
        executions,
    })
}

/// Non-terminal orders ordered by priority (most urgent first), then age.
///
/// # Example
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use manufacturing_core_rs::models::actor::{Actor, Role};
/// # use manufacturing_core_rs::models::masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter};
/// # use manufacturing_core_rs::models::mo::Priority;
/// # use manufacturing_core_rs::models::supervisor::ShiftId;
/// # use manufacturing_core_rs::services::mo_lifecycle::{self, NewMo};
/// # use manufacturing_core_rs::{FactoryState, StockBalance};
/// use manufacturing_core_rs::services::views;
/// # let mut state = FactoryState::new();
/// # state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
/// # state.add_product(Product::coil("P-SPRING", "RM-A", 50));
/// # state.set_stock(StockBalance::new("RM-A", 60_000));
/// # state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
/// # state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
/// # let ph = Actor::new("U-PH", &[Role::ProductionHead, Role::Manager]);
/// # let now = Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap();
/// # for (mo_id, priority) in [("MO-LOW", Priority::Low), ("MO-URGENT", Priority::Urgent)] {
/// #     let order = NewMo {
/// #         mo_id: mo_id.into(), product_code: "P-SPRING".into(), quantity: 1000,
/// #         tolerance_cp: 200, scrap_cp: 0, priority, shift: ShiftId::Shift1,
/// #         customer: None, rm_required_override_g: None,
/// #     };
/// #     mo_lifecycle::create_mo(&mut state, order, &ph, now).unwrap();
/// # }
/// let queue = views::priority_queue(&state);
/// assert_eq!(queue[0].mo_id, "MO-URGENT");
/// assert_eq!(queue[1].mo_id, "MO-LOW");
/// ```
pub fn priority_queue(state: &FactoryState) -> Vec<PriorityQueueEntry> {
    let mut entries: Vec<(u8, chrono::DateTime<chrono::Utc>, PriorityQueueEntry)> = state
        .mos()
        .filter(|mo| !mo.status().is_terminal())
        .map(|mo| {
            let availability = allocation::check_availability(state, mo.mo_id()).ok();
            let (shortage_g, can_swap) = availability
                .map(|report| (report.shortage_g, report.can_swap))
                .unwrap_or((0, false));
            (
                mo.priority().level(),
                mo.created_at(),
                PriorityQueueEntry {
                    mo_id: mo.mo_id().to_string(),
                    priority: mo.priority(),
                    status: mo.status(),
                    shortage_g,
                    can_swap,
                },
            )
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    entries.into_iter().map(|(_, _, entry)| entry).collect()
}

/// Dashboard for one supervisor.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `supervisor` - Supervisor whose work is listed
///
/// # Returns
/// The supervisor's open executions plus pending rework and FI-rework
/// counts.
pub fn supervisor_dashboard(state: &FactoryState, supervisor: &str) -> SupervisorDashboardView {
    let assigned_executions = state
        .executions()
        .filter(|execution| {
            execution.assigned_supervisor() == Some(supervisor)
                && !execution.status().is_terminal()
        })
        .map(|execution| ExecutionProgressView {
            execution_id: execution.id(),
            work_center: execution.work_center().to_string(),
            sequence_order: execution.sequence_order(),
            status: execution.status(),
            progress_percentage: execution.progress_percentage(),
            assigned_supervisor: execution.assigned_supervisor().map(str::to_string),
        })
        .collect();
    let pending_rework_count = state
        .reworks()
        .filter(|rework| {
            rework.assigned_supervisor.as_deref() == Some(supervisor)
                && rework.status == ReworkStatus::Pending
        })
        .count();
    let pending_fi_rework_count = state
        .fi_reworks()
        .filter(|fi_rework| {
            fi_rework.assigned_supervisor == supervisor
                && matches!(
                    fi_rework.status,
                    FiReworkStatus::Pending | FiReworkStatus::InProgress
                )
        })
        .count();
    SupervisorDashboardView {
        supervisor: supervisor.to_string(),
        assigned_executions,
        pending_rework_count,
        pending_fi_rework_count,
    }
}

/// Dashboard for the RM store.
///
/// # Returns
/// Orders still waiting on material, plus the stock level of every
/// material the open orders touch.
pub fn rm_store_dashboard(state: &FactoryState) -> RmStoreDashboardView {
    let awaiting_allocation = priority_queue(state)
        .into_iter()
        .filter(|entry| {
            matches!(
                entry.status,
                MoStatus::OnHold | MoStatus::MoApproved | MoStatus::RmAllocated
            )
        })
        .collect();
    let stock_levels = state
        .allocations()
        .map(|allocation| allocation.material().to_string())
        .chain(state.mos().filter_map(|mo| {
            state
                .product(mo.product_code())
                .ok()
                .and_then(|product| product.material.clone())
        }))
        .collect::<std::collections::BTreeSet<String>>()
        .into_iter()
        .filter_map(|material| {
            state.stock(&material).ok().map(|stock| StockLevelView {
                material,
                available_g: stock.available_g(),
            })
        })
        .collect();
    RmStoreDashboardView {
        awaiting_allocation,
        stock_levels,
    }
}

/// Strictly chronological traceability timeline for a batch, derived from
/// the append-only movement and activity logs.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `batch_id` - Batch to trace
///
/// # Returns
/// The batch's status, current location, and its merged event timeline in
/// time order.
pub fn batch_traceability(
    state: &FactoryState,
    batch_id: &str,
) -> Result<BatchTraceabilityView, StoreError> {
    let batch = state.batch(batch_id)?;
    let mut timeline: Vec<TraceabilityEvent> = Vec::new();

    for movement in state
        .batch_movements()
        .iter()
        .filter(|movement| movement.batch_id == batch_id)
    {
        timeline.push(TraceabilityEvent {
            at: movement.moved_at,
            description: format!(
                "Moved to {:?}{}",
                movement.to_location,
                if movement.notes.is_empty() {
                    String::new()
                } else {
                    format!(": {}", movement.notes)
                }
            ),
        });
    }
    for entry in state
        .activity_log()
        .iter()
        .filter(|entry| entry.batch_id.as_deref() == Some(batch_id))
    {
        timeline.push(TraceabilityEvent {
            at: entry.performed_at,
            description: if entry.remark.is_empty() {
                format!("{:?}", entry.kind)
            } else {
                entry.remark.clone()
            },
        });
    }
    timeline.sort_by_key(|event| event.at);

    Ok(BatchTraceabilityView {
        batch_id: batch_id.to_string(),
        mo_id: batch.mo_id().to_string(),
        status: batch.status(),
        current_location: state.batch_location(batch_id).cloned(),
        timeline,
    })
}
