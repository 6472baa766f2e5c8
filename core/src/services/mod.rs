//! Orchestration services
//!
//! Free functions over `&mut FactoryState`, one module per concern. Every
//! mutating operation wraps itself in a store transaction, so a failed
//! precondition or consistency violation leaves no partial writes.

pub mod allocation;
pub mod batch_lifecycle;
pub mod mo_lifecycle;
pub mod process_flow;
pub mod rework;
pub mod scheduler;
pub mod stoppage;
pub mod views;

use crate::models::actor::{Role, UserId};
use crate::models::notification::Notification;
use crate::models::state::FactoryState;

/// Write one notification per active holder of any of the given roles.
///
/// # Arguments
/// * `state` - Factory entity store
/// * `roles` - Roles whose active holders are addressed
/// * `build` - Builds the notification for each recipient
pub(crate) fn notify_role_holders(
    state: &mut FactoryState,
    roles: &[Role],
    build: impl Fn(&UserId) -> Notification,
) {
    let recipients: Vec<UserId> = state
        .users_with_any_role(roles)
        .iter()
        .map(|user| user.id.clone())
        .collect();
    for recipient in recipients {
        let notification = build(&recipient);
        state.push_notification(notification);
    }
}
