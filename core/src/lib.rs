//! Manufacturing Execution Core - Rust Engine
//!
//! Orchestration core for a discrete-parts factory: the life of a
//! Manufacturing Order from approval through batch production to dispatch.
//!
//! # Architecture
//!
//! - **core**: quantity conventions, wall-clock helpers, cancellation
//! - **models**: domain entities and the factory entity store
//! - **services**: the orchestration services (MO state machine, RM
//!   allocation, batch lifecycle, process coordination, supervisor
//!   scheduling, stop/resume, rework, read-model projections)
//! - **config**: behavioural knobs with factory-floor defaults
//!
//! # Critical Invariants
//!
//! 1. All mass values are i64 grams (kilograms at scale 3)
//! 2. Every multi-entity mutation is transactional: a failed operation
//!    leaves no partial writes, including notification and log rows
//! 3. History, change-log, activity and traceability records are
//!    append-only

pub mod config;
pub mod core;
pub mod models;
pub mod services;

pub use config::CoreConfig;
pub use crate::core::cancel::CancelToken;
pub use crate::core::units::{CentiPercent, Grams};
pub use models::{
    actor::{Actor, Role},
    allocation::{Allocation, AllocationStatus, StockBalance},
    batch::{Batch, BatchLocation, BatchProcessState, BatchStatus},
    masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter},
    mo::{ManufacturingOrder, MoStatus, Priority},
    process_execution::{ExecutionStatus, ProcessExecution},
    state::{FactoryState, StoreError},
    supervisor::ShiftId,
};
pub use services::allocation::AllocationError;
pub use services::batch_lifecycle::BatchError;
pub use services::mo_lifecycle::{NewMo, TransitionError};
pub use services::process_flow::ProcessError;
pub use services::rework::ReworkError;
pub use services::scheduler::SchedulerError;
pub use services::stoppage::StopError;
