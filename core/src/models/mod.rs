//! Domain entities and the factory entity store.

pub mod actor;
pub mod allocation;
pub mod batch;
pub mod completion;
pub mod masters;
pub mod mo;
pub mod notification;
pub mod process_execution;
pub mod state;
pub mod stoppage;
pub mod supervisor;

pub use actor::{Actor, Role, UserId, UserRecord};
pub use allocation::{Allocation, AllocationId, AllocationStatus, StockBalance};
pub use batch::{Batch, BatchId, BatchLocation, BatchProcessState, BatchStatus};
pub use masters::{BomLine, MaterialType, Product, RawMaterial, WorkCenter, WorkCenterId};
pub use mo::{ManufacturingOrder, MoId, MoStatus, Priority};
pub use process_execution::{ExecutionId, ExecutionStatus, ProcessExecution};
pub use state::{FactoryState, StoreError};
pub use supervisor::{ChangeReason, ShiftId};
