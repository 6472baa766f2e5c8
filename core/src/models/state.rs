//! Factory entity store
//!
//! [`FactoryState`] holds every entity the orchestration core owns: master
//! data, manufacturing orders with their batches, executions and
//! allocations, the supervisor scheduling records, and the append-only
//! logs. Services operate on `&mut FactoryState` the way the settlement
//! functions of a payment core operate on shared simulation state.
//!
//! # Transactions
//!
//! [`FactoryState::transact`] snapshots the whole store, runs a closure and
//! restores the snapshot when the closure errors. Every mutation that spans
//! two entities (MO and allocation, allocation and stock, batch and
//! execution progress) runs inside one `transact` call, which gives the
//! all-or-nothing semantics a serializable database transaction would.
//! Because a failed closure restores everything, notification and log rows
//! written mid-operation can never outlive an aborted operation.
//!
//! # Critical Invariants
//!
//! 1. Every batch, execution and allocation references an existing MO.
//! 2. Append-only logs (allocation history, supervisor change log, activity
//!    log, batch movements, notifications) expose insert-only APIs.
//! 3. Surrogate ids are monotone; id order is a deterministic tie-breaker
//!    wherever ordering matters.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use crate::models::actor::{LoginSession, Role, UserId, UserRecord};
use crate::models::allocation::{
    Allocation, AllocationHistoryEntry, AllocationId, AllocationStatus, StockBalance,
};
use crate::models::batch::{
    Batch, BatchId, BatchLocation, BatchMovement, BatchProcessState,
};
use crate::models::completion::{
    BatchProcessCompletion, CompletionId, FiRework, FiReworkId, HandoverId, ReceiptHandover,
    ReceiptVerification, ReworkBatch, ReworkId,
};
use crate::models::masters::{BomLine, MaterialCode, Product, RawMaterial, WorkCenter, WorkCenterId};
use crate::models::mo::{ManufacturingOrder, MoId};
use crate::models::notification::{ActivityEntry, Notification};
use crate::models::process_execution::{ExecutionId, ProcessExecution};
use crate::models::stoppage::{DowntimeSummary, ProcessStop};
use crate::models::supervisor::{
    DailySupervisorStatus, MoSupervisorOverride, ShiftConfig, ShiftId, SupervisorActivitySummary,
    SupervisorChangeEntry,
};
use crate::core::units::Grams;

/// Lookup failures and uniqueness violations raised by the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("manufacturing order not found: {0}")]
    MoNotFound(MoId),

    #[error("manufacturing order already exists: {0}")]
    DuplicateMo(MoId),

    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("batch already exists: {0}")]
    DuplicateBatch(BatchId),

    #[error("process execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("allocation not found: {0}")]
    AllocationNotFound(AllocationId),

    #[error("no stock balance for material: {0}")]
    StockNotFound(MaterialCode),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("raw material not found: {0}")]
    MaterialNotFound(MaterialCode),

    #[error("work center not found: {0}")]
    WorkCenterNotFound(WorkCenterId),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("process stop not found: {0}")]
    StopNotFound(uuid::Uuid),

    #[error("rework batch not found: {0}")]
    ReworkNotFound(ReworkId),

    #[error("final-inspection rework not found: {0}")]
    FiReworkNotFound(FiReworkId),

    #[error("receipt handover not found: {0}")]
    HandoverNotFound(HandoverId),
}

/// The complete in-memory entity store.
#[derive(Debug, Clone, Default)]
pub struct FactoryState {
    // Master data
    raw_materials: BTreeMap<MaterialCode, RawMaterial>,
    products: BTreeMap<String, Product>,
    work_centers: BTreeMap<WorkCenterId, WorkCenter>,
    bom_lines: Vec<BomLine>,
    users: BTreeMap<UserId, UserRecord>,
    login_sessions: Vec<LoginSession>,

    // Hot rows
    stock: BTreeMap<MaterialCode, StockBalance>,
    mos: BTreeMap<MoId, ManufacturingOrder>,
    batches: BTreeMap<BatchId, Batch>,
    executions: BTreeMap<ExecutionId, ProcessExecution>,
    allocations: BTreeMap<AllocationId, Allocation>,

    // Per-batch-per-process status relation, queryable by either key.
    batch_process_status: BTreeMap<(BatchId, ExecutionId), BatchProcessState>,
    batch_locations: BTreeMap<BatchId, BatchLocation>,

    // Supervisor scheduling
    shift_configs: BTreeMap<(WorkCenterId, ShiftId), ShiftConfig>,
    daily_statuses: BTreeMap<(NaiveDate, WorkCenterId, ShiftId), DailySupervisorStatus>,
    mo_overrides: BTreeMap<(MoId, WorkCenterId, ShiftId), MoSupervisorOverride>,
    supervisor_activity: BTreeMap<(NaiveDate, WorkCenterId, UserId), SupervisorActivitySummary>,

    // Stops, completions, rework
    process_stops: BTreeMap<uuid::Uuid, ProcessStop>,
    downtime_summaries: BTreeMap<(NaiveDate, WorkCenterId), DowntimeSummary>,
    completions: BTreeMap<CompletionId, BatchProcessCompletion>,
    rework_batches: BTreeMap<ReworkId, ReworkBatch>,
    fi_reworks: BTreeMap<FiReworkId, FiRework>,
    receipt_handovers: BTreeMap<HandoverId, ReceiptHandover>,
    receipt_verifications: Vec<ReceiptVerification>,

    // Append-only logs
    allocation_history: Vec<AllocationHistoryEntry>,
    supervisor_changes: Vec<SupervisorChangeEntry>,
    activity_log: Vec<ActivityEntry>,
    batch_movements: Vec<BatchMovement>,
    notifications: Vec<Notification>,

    // Surrogate id counters
    next_allocation_id: AllocationId,
    next_execution_id: ExecutionId,
    next_completion_id: CompletionId,
    next_rework_id: ReworkId,
    next_fi_rework_id: FiReworkId,
    next_handover_id: HandoverId,
}

impl FactoryState {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` atomically: when it errors, every mutation it made is rolled
    /// back by restoring the pre-call snapshot.
    ///
    /// # Arguments
    /// * `f` - Closure receiving the store; its `Err` aborts the whole call
    ///
    /// # Returns
    /// - `Ok(value)` with every mutation committed
    /// - `Err(error)` with the store exactly as it was before the call
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::mo::{ManufacturingOrder, Priority};
    /// use manufacturing_core_rs::models::state::FactoryState;
    /// use manufacturing_core_rs::models::supervisor::ShiftId;
    ///
    /// let mut state = FactoryState::new();
    /// let mo = ManufacturingOrder::new(
    ///     "MO-001", "P-SPRING", 1000, 200, Priority::Medium, ShiftId::Shift1,
    ///     51_000, "U-PH", Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap(),
    /// );
    ///
    /// // the insert happens inside a failing transaction and is rolled back
    /// let result: Result<(), &str> = state.transact(|state| {
    ///     state.insert_mo(mo).unwrap();
    ///     Err("abort")
    /// });
    /// assert!(result.is_err());
    /// assert!(state.mo("MO-001").is_err());
    /// ```
    pub fn transact<T, E>(
        &mut self,
        f: impl FnOnce(&mut FactoryState) -> Result<T, E>,
    ) -> Result<T, E> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(error) => {
                *self = snapshot;
                Err(error)
            }
        }
    }

    // =========================================================================
    // Master data
    // =========================================================================

    pub fn add_raw_material(&mut self, material: RawMaterial) {
        self.raw_materials
            .insert(material.material_code.clone(), material);
    }

    pub fn add_product(&mut self, product: Product) {
        self.products.insert(product.product_code.clone(), product);
    }

    pub fn add_work_center(&mut self, work_center: WorkCenter) {
        self.work_centers.insert(work_center.id.clone(), work_center);
    }

    pub fn add_bom_line(&mut self, line: BomLine) {
        self.bom_lines.push(line);
    }

    pub fn add_user(&mut self, user: UserRecord) {
        self.users.insert(user.id.clone(), user);
    }

    /// Get a product by code.
    pub fn product(&self, code: &str) -> Result<&Product, StoreError> {
        self.products
            .get(code)
            .ok_or_else(|| StoreError::ProductNotFound(code.to_string()))
    }

    /// Get a raw material by code.
    pub fn raw_material(&self, code: &str) -> Result<&RawMaterial, StoreError> {
        self.raw_materials
            .get(code)
            .ok_or_else(|| StoreError::MaterialNotFound(code.to_string()))
    }

    /// Get a work center by id.
    pub fn work_center(&self, id: &str) -> Result<&WorkCenter, StoreError> {
        self.work_centers
            .get(id)
            .ok_or_else(|| StoreError::WorkCenterNotFound(id.to_string()))
    }

    /// Get a user directory entry by id.
    pub fn user(&self, id: &str) -> Result<&UserRecord, StoreError> {
        self.users
            .get(id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }

    /// Active users holding any of the given roles, in id order.
    pub fn users_with_any_role(&self, roles: &[Role]) -> Vec<&UserRecord> {
        self.users
            .values()
            .filter(|user| roles.iter().any(|role| user.has_role(*role)))
            .collect()
    }

    /// Active BOM lines for a product, in sequence order.
    pub fn bom_for_product(&self, product_code: &str) -> Vec<&BomLine> {
        let mut lines: Vec<&BomLine> = self
            .bom_lines
            .iter()
            .filter(|line| line.is_active && line.product_code == product_code)
            .collect();
        lines.sort_by_key(|line| line.sequence);
        lines
    }

    // =========================================================================
    // Login sessions
    // =========================================================================

    /// Record a login, opening a new session.
    ///
    /// # Arguments
    /// * `user` - User logging in
    /// * `at` - Login instant
    pub fn record_login(&mut self, user: impl Into<UserId>, at: DateTime<Utc>) {
        self.login_sessions.push(LoginSession::new(user, at));
    }

    /// Close every open session of a user.
    ///
    /// # Returns
    /// How many sessions were open; 0 when the user had none (a second
    /// logout no-ops).
    ///
    /// # Example
    /// ```
    /// use chrono::{Duration, TimeZone, Utc};
    /// use manufacturing_core_rs::models::state::FactoryState;
    ///
    /// let mut state = FactoryState::new();
    /// let login = Utc.with_ymd_and_hms(2025, 10, 12, 9, 0, 0).unwrap();
    /// state.record_login("U-SUP", login);
    /// assert!(state.is_logged_in("U-SUP"));
    ///
    /// assert_eq!(state.close_sessions("U-SUP", login + Duration::hours(8)), 1);
    /// assert_eq!(state.close_sessions("U-SUP", login + Duration::hours(9)), 0);
    /// ```
    pub fn close_sessions(&mut self, user: &str, at: DateTime<Utc>) -> usize {
        let mut closed = 0;
        for session in self
            .login_sessions
            .iter_mut()
            .filter(|session| session.user == user && session.is_active())
        {
            session.logout_time = Some(at);
            closed += 1;
        }
        closed
    }

    /// Whether the user currently has an open session.
    pub fn is_logged_in(&self, user: &str) -> bool {
        self.login_sessions
            .iter()
            .any(|session| session.user == user && session.is_active())
    }

    /// First login time-of-day for a user on a date.
    ///
    /// # Returns
    /// The earliest login time of that day, or `None` when the user never
    /// logged in.
    pub fn first_login_on(&self, user: &str, date: NaiveDate) -> Option<NaiveTime> {
        self.login_sessions
            .iter()
            .filter(|session| {
                session.user == user && session.login_time.date_naive() == date
            })
            .map(|session| session.login_time.time())
            .min()
    }

    // =========================================================================
    // Manufacturing orders
    // =========================================================================

    /// Insert a new manufacturing order; the id must be unused.
    pub fn insert_mo(&mut self, mo: ManufacturingOrder) -> Result<(), StoreError> {
        let id = mo.mo_id().to_string();
        if self.mos.contains_key(&id) {
            return Err(StoreError::DuplicateMo(id));
        }
        self.mos.insert(id, mo);
        Ok(())
    }

    /// Get a manufacturing order by id.
    pub fn mo(&self, mo_id: &str) -> Result<&ManufacturingOrder, StoreError> {
        self.mos
            .get(mo_id)
            .ok_or_else(|| StoreError::MoNotFound(mo_id.to_string()))
    }

    /// Get a mutable manufacturing order by id.
    pub fn mo_mut(&mut self, mo_id: &str) -> Result<&mut ManufacturingOrder, StoreError> {
        self.mos
            .get_mut(mo_id)
            .ok_or_else(|| StoreError::MoNotFound(mo_id.to_string()))
    }

    /// Iterate every manufacturing order.
    pub fn mos(&self) -> impl Iterator<Item = &ManufacturingOrder> {
        self.mos.values()
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Insert a new batch; the id must be unused.
    pub fn insert_batch(&mut self, batch: Batch) -> Result<(), StoreError> {
        let id = batch.batch_id().to_string();
        if self.batches.contains_key(&id) {
            return Err(StoreError::DuplicateBatch(id));
        }
        self.batches.insert(id, batch);
        Ok(())
    }

    /// Get a batch by id.
    pub fn batch(&self, batch_id: &str) -> Result<&Batch, StoreError> {
        self.batches
            .get(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))
    }

    /// Get a mutable batch by id.
    pub fn batch_mut(&mut self, batch_id: &str) -> Result<&mut Batch, StoreError> {
        self.batches
            .get_mut(batch_id)
            .ok_or_else(|| StoreError::BatchNotFound(batch_id.to_string()))
    }

    /// All batches of an MO, in id order.
    pub fn batches_of_mo(&self, mo_id: &str) -> Vec<&Batch> {
        self.batches
            .values()
            .filter(|batch| batch.mo_id() == mo_id)
            .collect()
    }

    /// Number of batches ever created under an MO (for batch id generation).
    pub fn batch_count_of_mo(&self, mo_id: &str) -> usize {
        self.batches
            .values()
            .filter(|batch| batch.mo_id() == mo_id)
            .count()
    }

    // =========================================================================
    // Process executions
    // =========================================================================

    /// Insert a process execution.
    pub fn insert_execution(&mut self, execution: ProcessExecution) {
        self.executions.insert(execution.id(), execution);
    }

    /// Get a process execution by id.
    pub fn execution(&self, id: ExecutionId) -> Result<&ProcessExecution, StoreError> {
        self.executions
            .get(&id)
            .ok_or(StoreError::ExecutionNotFound(id))
    }

    /// Get a mutable process execution by id.
    pub fn execution_mut(&mut self, id: ExecutionId) -> Result<&mut ProcessExecution, StoreError> {
        self.executions
            .get_mut(&id)
            .ok_or(StoreError::ExecutionNotFound(id))
    }

    /// Iterate every process execution.
    pub fn executions(&self) -> impl Iterator<Item = &ProcessExecution> {
        self.executions.values()
    }

    /// Executions of an MO in sequence order.
    pub fn executions_of_mo(&self, mo_id: &str) -> Vec<&ProcessExecution> {
        let mut executions: Vec<&ProcessExecution> = self
            .executions
            .values()
            .filter(|execution| execution.mo_id() == mo_id)
            .collect();
        executions.sort_by_key(|execution| execution.sequence_order());
        executions
    }

    /// The execution of an MO at a given work center, if initialised.
    pub fn execution_of_mo_at(&self, mo_id: &str, work_center: &str) -> Option<&ProcessExecution> {
        self.executions
            .values()
            .find(|execution| execution.mo_id() == mo_id && execution.work_center() == work_center)
    }

    /// The successor of an execution in its MO's sequence, if any.
    pub fn next_execution_after(&self, execution_id: ExecutionId) -> Option<&ProcessExecution> {
        let current = self.executions.get(&execution_id)?;
        self.executions
            .values()
            .filter(|candidate| {
                candidate.mo_id() == current.mo_id()
                    && candidate.sequence_order() > current.sequence_order()
            })
            .min_by_key(|candidate| candidate.sequence_order())
    }

    // =========================================================================
    // Per-batch-per-process status
    // =========================================================================

    /// Status of a batch at an execution; `Pending` when never recorded.
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::batch::BatchProcessState;
    /// use manufacturing_core_rs::models::state::FactoryState;
    ///
    /// let mut state = FactoryState::new();
    /// assert_eq!(state.batch_process_state("MO-001-B1", 1), BatchProcessState::Pending);
    ///
    /// state.set_batch_process_state("MO-001-B1", 1, BatchProcessState::InProgress);
    /// assert_eq!(state.batch_process_state("MO-001-B1", 1), BatchProcessState::InProgress);
    /// ```
    pub fn batch_process_state(&self, batch_id: &str, execution_id: ExecutionId) -> BatchProcessState {
        self.batch_process_status
            .get(&(batch_id.to_string(), execution_id))
            .copied()
            .unwrap_or(BatchProcessState::Pending)
    }

    pub fn set_batch_process_state(
        &mut self,
        batch_id: impl Into<BatchId>,
        execution_id: ExecutionId,
        state: BatchProcessState,
    ) {
        self.batch_process_status
            .insert((batch_id.into(), execution_id), state);
    }

    /// All recorded (batch, state) pairs for one execution.
    pub fn batch_states_for_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Vec<(&BatchId, BatchProcessState)> {
        self.batch_process_status
            .iter()
            .filter(|((_, exec), _)| *exec == execution_id)
            .map(|((batch, _), state)| (batch, *state))
            .collect()
    }

    /// All recorded (execution, state) pairs for one batch.
    pub fn batch_states_for_batch(
        &self,
        batch_id: &str,
    ) -> Vec<(ExecutionId, BatchProcessState)> {
        self.batch_process_status
            .range((batch_id.to_string(), ExecutionId::MIN)..=(batch_id.to_string(), ExecutionId::MAX))
            .map(|((_, exec), state)| (*exec, *state))
            .collect()
    }

    // =========================================================================
    // Batch locations
    // =========================================================================

    pub fn batch_location(&self, batch_id: &str) -> Option<&BatchLocation> {
        self.batch_locations.get(batch_id)
    }

    /// Move a batch, recording the movement row.
    ///
    /// # Arguments
    /// * `batch_id` - Batch to move
    /// * `mo_id` - Parent order, stamped onto the movement row
    /// * `to` - Destination location
    /// * `moved_by` - Acting user, when known
    /// * `moved_at` - Movement instant
    /// * `notes` - Free-text note on the movement row
    pub fn move_batch(
        &mut self,
        batch_id: &str,
        mo_id: &str,
        to: BatchLocation,
        moved_by: Option<UserId>,
        moved_at: DateTime<Utc>,
        notes: impl Into<String>,
    ) {
        let from = self.batch_locations.get(batch_id).cloned();
        self.batch_locations.insert(batch_id.to_string(), to.clone());
        self.batch_movements.push(BatchMovement {
            batch_id: batch_id.to_string(),
            mo_id: mo_id.to_string(),
            from_location: from,
            to_location: to,
            moved_by,
            moved_at,
            notes: notes.into(),
        });
    }

    pub fn batch_movements(&self) -> &[BatchMovement] {
        &self.batch_movements
    }

    // =========================================================================
    // Allocations and stock
    // =========================================================================

    /// Insert or replace the stock balance of a material.
    pub fn set_stock(&mut self, stock: StockBalance) {
        self.stock.insert(stock.material().to_string(), stock);
    }

    /// Get the stock balance of a material.
    pub fn stock(&self, material: &str) -> Result<&StockBalance, StoreError> {
        self.stock
            .get(material)
            .ok_or_else(|| StoreError::StockNotFound(material.to_string()))
    }

    /// Get the mutable stock balance of a material.
    pub fn stock_mut(&mut self, material: &str) -> Result<&mut StockBalance, StoreError> {
        self.stock
            .get_mut(material)
            .ok_or_else(|| StoreError::StockNotFound(material.to_string()))
    }

    /// Insert an allocation row.
    pub fn insert_allocation(&mut self, allocation: Allocation) {
        self.allocations.insert(allocation.id(), allocation);
    }

    /// Get an allocation by id.
    pub fn allocation(&self, id: AllocationId) -> Result<&Allocation, StoreError> {
        self.allocations
            .get(&id)
            .ok_or(StoreError::AllocationNotFound(id))
    }

    /// Get a mutable allocation by id.
    pub fn allocation_mut(&mut self, id: AllocationId) -> Result<&mut Allocation, StoreError> {
        self.allocations
            .get_mut(&id)
            .ok_or(StoreError::AllocationNotFound(id))
    }

    /// Delete an allocation row (split case: parent shrank to zero).
    pub fn remove_allocation(&mut self, id: AllocationId) {
        self.allocations.remove(&id);
    }

    /// Iterate every allocation row.
    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    /// Allocations of an MO, in id order.
    pub fn allocations_of_mo(&self, mo_id: &str) -> Vec<&Allocation> {
        self.allocations
            .values()
            .filter(|allocation| allocation.mo_id() == mo_id)
            .collect()
    }

    /// Reserved allocations of an MO, oldest first (allocation time, then
    /// id for a deterministic tie-break).
    pub fn reserved_allocations_of_mo(&self, mo_id: &str) -> Vec<&Allocation> {
        let mut reserved: Vec<&Allocation> = self
            .allocations
            .values()
            .filter(|allocation| {
                allocation.mo_id() == mo_id && allocation.status() == AllocationStatus::Reserved
            })
            .collect();
        reserved.sort_by_key(|allocation| (allocation.allocated_at(), allocation.id()));
        reserved
    }

    /// Total reserved + locked grams committed to an MO for a material.
    pub fn active_allocation_total(&self, mo_id: &str, material: &str) -> Grams {
        self.allocations
            .values()
            .filter(|allocation| {
                allocation.mo_id() == mo_id
                    && allocation.material() == material
                    && allocation.is_active()
            })
            .map(|allocation| allocation.quantity_g())
            .sum()
    }

    /// Total reserved + locked grams committed to an MO across materials.
    pub fn active_allocation_total_for_mo(&self, mo_id: &str) -> Grams {
        self.allocations
            .values()
            .filter(|allocation| allocation.mo_id() == mo_id && allocation.is_active())
            .map(|allocation| allocation.quantity_g())
            .sum()
    }

    pub fn push_allocation_history(&mut self, entry: AllocationHistoryEntry) {
        self.allocation_history.push(entry);
    }

    pub fn allocation_history(&self) -> &[AllocationHistoryEntry] {
        &self.allocation_history
    }

    // =========================================================================
    // Supervisor scheduling
    // =========================================================================

    pub fn upsert_shift_config(&mut self, config: ShiftConfig) {
        self.shift_configs
            .insert((config.work_center.clone(), config.shift), config);
    }

    pub fn shift_config(&self, work_center: &str, shift: ShiftId) -> Option<&ShiftConfig> {
        self.shift_configs
            .get(&(work_center.to_string(), shift))
            .filter(|config| config.is_active)
    }

    /// Active shift configurations for one work center, by shift order.
    pub fn shift_configs_of(&self, work_center: &str) -> Vec<&ShiftConfig> {
        self.shift_configs
            .values()
            .filter(|config| config.is_active && config.work_center == work_center)
            .collect()
    }

    /// Every active shift configuration, deterministic order.
    pub fn active_shift_configs(&self) -> Vec<&ShiftConfig> {
        self.shift_configs
            .values()
            .filter(|config| config.is_active)
            .collect()
    }

    pub fn upsert_mo_override(&mut self, config: MoSupervisorOverride) {
        self.mo_overrides.insert(
            (config.mo_id.clone(), config.work_center.clone(), config.shift),
            config,
        );
    }

    pub fn mo_override(
        &self,
        mo_id: &str,
        work_center: &str,
        shift: ShiftId,
    ) -> Option<&MoSupervisorOverride> {
        self.mo_overrides
            .get(&(mo_id.to_string(), work_center.to_string(), shift))
            .filter(|config| config.is_active)
    }

    pub fn upsert_daily_status(&mut self, status: DailySupervisorStatus) {
        self.daily_statuses.insert(
            (status.date, status.work_center.clone(), status.shift),
            status,
        );
    }

    pub fn daily_status(
        &self,
        date: NaiveDate,
        work_center: &str,
        shift: ShiftId,
    ) -> Option<&DailySupervisorStatus> {
        self.daily_statuses
            .get(&(date, work_center.to_string(), shift))
    }

    pub fn daily_status_mut(
        &mut self,
        date: NaiveDate,
        work_center: &str,
        shift: ShiftId,
    ) -> Option<&mut DailySupervisorStatus> {
        self.daily_statuses
            .get_mut(&(date, work_center.to_string(), shift))
    }

    pub fn push_supervisor_change(&mut self, entry: SupervisorChangeEntry) {
        self.supervisor_changes.push(entry);
    }

    pub fn supervisor_changes(&self) -> &[SupervisorChangeEntry] {
        &self.supervisor_changes
    }

    /// Get-or-create the daily activity counters for an active supervisor.
    pub fn supervisor_activity_mut(
        &mut self,
        date: NaiveDate,
        work_center: &str,
        supervisor: &str,
    ) -> &mut SupervisorActivitySummary {
        self.supervisor_activity
            .entry((date, work_center.to_string(), supervisor.to_string()))
            .or_default()
    }

    pub fn supervisor_activity(
        &self,
        date: NaiveDate,
        work_center: &str,
        supervisor: &str,
    ) -> Option<&SupervisorActivitySummary> {
        self.supervisor_activity
            .get(&(date, work_center.to_string(), supervisor.to_string()))
    }

    // =========================================================================
    // Stops and downtime
    // =========================================================================

    /// Insert a process stop row.
    pub fn insert_stop(&mut self, stop: ProcessStop) {
        self.process_stops.insert(stop.id, stop);
    }

    /// Get a process stop by id.
    pub fn stop(&self, id: uuid::Uuid) -> Result<&ProcessStop, StoreError> {
        self.process_stops.get(&id).ok_or(StoreError::StopNotFound(id))
    }

    /// Get a mutable process stop by id.
    pub fn stop_mut(&mut self, id: uuid::Uuid) -> Result<&mut ProcessStop, StoreError> {
        self.process_stops
            .get_mut(&id)
            .ok_or(StoreError::StopNotFound(id))
    }

    /// Iterate every process stop.
    pub fn stops(&self) -> impl Iterator<Item = &ProcessStop> {
        self.process_stops.values()
    }

    /// Ids of unresolved stops on an execution.
    pub fn unresolved_stop_ids(&self, execution_id: ExecutionId) -> Vec<uuid::Uuid> {
        self.process_stops
            .values()
            .filter(|stop| stop.execution_id == execution_id && !stop.is_resumed)
            .map(|stop| stop.id)
            .collect()
    }

    /// Resolved stops of one day at one work center. The work center is
    /// resolved through the execution each stop points at.
    pub fn resolved_stops_on(
        &self,
        date: NaiveDate,
        work_center: &str,
    ) -> Vec<&ProcessStop> {
        self.process_stops
            .values()
            .filter(|stop| {
                stop.is_resumed
                    && stop.stopped_at.date_naive() == date
                    && self
                        .executions
                        .get(&stop.execution_id)
                        .is_some_and(|execution| execution.work_center() == work_center)
            })
            .collect()
    }

    pub fn upsert_downtime_summary(&mut self, summary: DowntimeSummary) {
        self.downtime_summaries
            .insert((summary.date, summary.work_center.clone()), summary);
    }

    pub fn downtime_summary(&self, date: NaiveDate, work_center: &str) -> Option<&DowntimeSummary> {
        self.downtime_summaries
            .get(&(date, work_center.to_string()))
    }

    // =========================================================================
    // Completions, rework, handovers
    // =========================================================================

    pub fn insert_completion(&mut self, completion: BatchProcessCompletion) {
        self.completions.insert(completion.id, completion);
    }

    pub fn completion(&self, id: CompletionId) -> Option<&BatchProcessCompletion> {
        self.completions.get(&id)
    }

    pub fn completions_of_batch(&self, batch_id: &str) -> Vec<&BatchProcessCompletion> {
        self.completions
            .values()
            .filter(|completion| completion.batch_id == batch_id)
            .collect()
    }

    pub fn completions(&self) -> impl Iterator<Item = &BatchProcessCompletion> {
        self.completions.values()
    }

    pub fn insert_rework(&mut self, rework: ReworkBatch) {
        self.rework_batches.insert(rework.id, rework);
    }

    pub fn rework(&self, id: ReworkId) -> Result<&ReworkBatch, StoreError> {
        self.rework_batches.get(&id).ok_or(StoreError::ReworkNotFound(id))
    }

    pub fn rework_mut(&mut self, id: ReworkId) -> Result<&mut ReworkBatch, StoreError> {
        self.rework_batches
            .get_mut(&id)
            .ok_or(StoreError::ReworkNotFound(id))
    }

    pub fn reworks(&self) -> impl Iterator<Item = &ReworkBatch> {
        self.rework_batches.values()
    }

    pub fn insert_fi_rework(&mut self, fi_rework: FiRework) {
        self.fi_reworks.insert(fi_rework.id, fi_rework);
    }

    pub fn fi_rework(&self, id: FiReworkId) -> Result<&FiRework, StoreError> {
        self.fi_reworks.get(&id).ok_or(StoreError::FiReworkNotFound(id))
    }

    pub fn fi_rework_mut(&mut self, id: FiReworkId) -> Result<&mut FiRework, StoreError> {
        self.fi_reworks
            .get_mut(&id)
            .ok_or(StoreError::FiReworkNotFound(id))
    }

    pub fn fi_reworks(&self) -> impl Iterator<Item = &FiRework> {
        self.fi_reworks.values()
    }

    pub fn insert_handover(&mut self, handover: ReceiptHandover) {
        self.receipt_handovers.insert(handover.id, handover);
    }

    pub fn handover(&self, id: HandoverId) -> Result<&ReceiptHandover, StoreError> {
        self.receipt_handovers
            .get(&id)
            .ok_or(StoreError::HandoverNotFound(id))
    }

    pub fn handovers(&self) -> impl Iterator<Item = &ReceiptHandover> {
        self.receipt_handovers.values()
    }

    pub fn push_receipt_verification(&mut self, verification: ReceiptVerification) {
        self.receipt_verifications.push(verification);
    }

    pub fn receipt_verifications(&self) -> &[ReceiptVerification] {
        &self.receipt_verifications
    }

    // =========================================================================
    // Logs and notifications
    // =========================================================================

    pub fn push_activity(&mut self, entry: ActivityEntry) {
        self.activity_log.push(entry);
    }

    pub fn activity_log(&self) -> &[ActivityEntry] {
        &self.activity_log
    }

    pub fn push_notification(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    // =========================================================================
    // Surrogate ids
    // =========================================================================

    pub fn next_allocation_id(&mut self) -> AllocationId {
        self.next_allocation_id += 1;
        self.next_allocation_id
    }

    pub fn next_execution_id(&mut self) -> ExecutionId {
        self.next_execution_id += 1;
        self.next_execution_id
    }

    pub fn next_completion_id(&mut self) -> CompletionId {
        self.next_completion_id += 1;
        self.next_completion_id
    }

    pub fn next_rework_id(&mut self) -> ReworkId {
        self.next_rework_id += 1;
        self.next_rework_id
    }

    pub fn next_fi_rework_id(&mut self) -> FiReworkId {
        self.next_fi_rework_id += 1;
        self.next_fi_rework_id
    }

    pub fn next_handover_id(&mut self) -> HandoverId {
        self.next_handover_id += 1;
        self.next_handover_id
    }
}
