pub mod credential;
pub mod money;
pub mod payment_request;
pub mod ports;
pub mod transfer;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = u32;
pub type ProjectId = u32;
pub type PaymentRequestId = Uuid;
pub type TransferId = Uuid;

/// Role of the acting user, as supplied by the (external) authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Staff,
    Manager,
    Admin,
}

impl Role {
    /// Only managers and admins may approve, reject, or move money.
    pub fn can_disburse(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }
}

/// The authenticated identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}
