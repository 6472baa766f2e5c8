//! Actors, roles and login sessions
//!
//! Authentication lives outside the core: every call arrives with an already
//! authenticated [`Actor`] (identity plus active role set). The core keeps a
//! user directory only so that role-addressed notifications ("notify all
//! production heads and managers") and the attendance job's first-login
//! lookup can be answered.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identifier. Opaque, human-readable.
pub type UserId = String;

/// Roles recognised by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    ProductionHead,
    Supervisor,
    RmStore,
    FgStore,
    Operator,
    Packing,
    Quality,
}

/// Authenticated caller identity with its active role set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// User id of the caller.
    pub id: UserId,
    /// Active roles granted to the caller.
    pub roles: BTreeSet<Role>,
}

impl Actor {
    /// Build an actor from an id and a role slice.
    ///
    /// # Arguments
    /// * `id` - User id of the caller
    /// * `roles` - Active roles granted to the caller
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::actor::{Actor, Role};
    ///
    /// let actor = Actor::new("U-SUP", &[Role::Supervisor]);
    /// assert!(actor.has_role(Role::Supervisor));
    /// assert!(!actor.has_role(Role::Manager));
    /// ```
    pub fn new(id: impl Into<UserId>, roles: &[Role]) -> Self {
        Self {
            id: id.into(),
            roles: roles.iter().copied().collect(),
        }
    }

    /// Whether the actor holds the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the actor holds any of the given roles.
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.roles.contains(role))
    }
}

/// Directory entry for a known user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub full_name: String,
    pub roles: BTreeSet<Role>,
    pub is_active: bool,
}

impl UserRecord {
    /// Create an active directory entry.
    ///
    /// # Arguments
    /// * `id` - User id
    /// * `full_name` - Display name
    /// * `roles` - Roles held by the user
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::actor::{Role, UserRecord};
    ///
    /// let user = UserRecord::new("U-SUP", "Floor Supervisor", &[Role::Supervisor]);
    /// assert!(user.has_role(Role::Supervisor));
    /// ```
    pub fn new(id: impl Into<UserId>, full_name: impl Into<String>, roles: &[Role]) -> Self {
        Self {
            id: id.into(),
            full_name: full_name.into(),
            roles: roles.iter().copied().collect(),
            is_active: true,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.is_active && self.roles.contains(&role)
    }
}

/// A login/logout pair for one user session.
///
/// Sessions drive two scheduler behaviours: the attendance check reads the
/// first login of the day, and the logout cascade fires at most once per
/// session (the session is closed before any reassignment starts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    pub user: UserId,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
}

impl LoginSession {
    /// Open a session at the given login instant.
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use manufacturing_core_rs::models::actor::LoginSession;
    ///
    /// let login = Utc.with_ymd_and_hms(2025, 10, 12, 9, 0, 0).unwrap();
    /// let mut session = LoginSession::new("U-SUP", login);
    /// assert!(session.is_active());
    ///
    /// session.logout_time = Some(Utc.with_ymd_and_hms(2025, 10, 12, 17, 0, 0).unwrap());
    /// assert!(!session.is_active());
    /// ```
    pub fn new(user: impl Into<UserId>, login_time: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            login_time,
            logout_time: None,
        }
    }

    /// Session is open (no logout recorded yet).
    pub fn is_active(&self) -> bool {
        self.logout_time.is_none()
    }
}
