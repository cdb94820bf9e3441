//! Signed-in accounts as the pipeline sees them.

use serde::{Deserialize, Serialize};

/// A user account resolved from a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub is_admin: bool,
    /// Admin, or holder of an active subscription.
    pub is_paid: bool,
}

impl Account {
    /// Paid and admin accounts bypass the AI quota.
    pub fn is_paid_or_admin(&self) -> bool {
        self.is_paid || self.is_admin
    }
}
