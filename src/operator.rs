use crate::capability::Capability;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Profile of a signed-in console operator. Only non-sensitive metadata is
/// kept here; tokens live in the session store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub mfa_enabled: bool,
    pub capabilities: HashSet<Capability>,
}

impl Operator {
    /// Returns true when the operator holds the capability.
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
