//! Who may run scans and resolve overlaps.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{OverlapError, Result};
use crate::model::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    RunScan,
    ResolveOverlap,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::RunScan => "run_scan",
            Permission::ResolveOverlap => "resolve_overlap",
        }
    }
}

pub trait Authorizer: Send + Sync {
    fn allows(&self, actor: &Actor, permission: Permission) -> bool;

    fn authorize(&self, actor: &Actor, permission: Permission) -> Result<()> {
        if self.allows(actor, permission) {
            Ok(())
        } else {
            tracing::warn!(actor = %actor.id, permission = permission.as_str(), "authorization denied");
            Err(OverlapError::Unauthorized {
                actor_id: actor.id.clone(),
                permission: permission.as_str().to_string(),
            })
        }
    }
}

/// Grants every permission to holders of any of the configured roles.
#[derive(Debug, Clone)]
pub struct RoleAuthorizer {
    roles: BTreeSet<String>,
}

impl Default for RoleAuthorizer {
    fn default() -> Self {
        Self::new(["admin", "verification", "spatial_analyst"])
    }
}

impl RoleAuthorizer {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Authorizer for RoleAuthorizer {
    fn allows(&self, actor: &Actor, _permission: Permission) -> bool {
        actor.roles.iter().any(|role| self.roles.contains(role))
    }
}
