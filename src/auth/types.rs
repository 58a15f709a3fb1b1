//! Authentication user types.

use serde::Serialize;

use crate::db::{Identity, UserRole};

/// Verified identity attached to a request or realtime connection.
/// This is the only shape downstream code may depend on; it never carries tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: i64,
    pub organization_id: Option<i64>,
    pub department_id: Option<i64>,
    pub role: UserRole,
}

impl From<Identity> for AuthContext {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: identity.id,
            organization_id: identity.organization_id,
            department_id: identity.department_id,
            role: identity.role,
        }
    }
}
