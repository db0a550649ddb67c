//! Role-based authorization over the closed operation set.
//!
//! The permission table is immutable after construction and the check is a
//! pure lookup. Default is deny: any (role, operation) pair absent from the
//! table is rejected, including pairs involving roles or operations the
//! table has never heard of.

use std::collections::{HashMap, HashSet};

use crate::errors::{GovError, GovResult};
use crate::types::{OperationName, Role};

#[derive(Debug)]
pub struct PermissionTable {
    allowed: HashMap<Role, HashSet<OperationName>>,
}

impl Default for PermissionTable {
    /// Default policy: anonymous/public callers may run geometry-only
    /// operations; dataset-backed nearest-neighbors requires membership.
    fn default() -> Self {
        let geometry_only: HashSet<OperationName> = [
            OperationName::Buffer,
            OperationName::Area,
            OperationName::Intersection,
            OperationName::TransformCrs,
        ]
        .into_iter()
        .collect();
        let all: HashSet<OperationName> = OperationName::ALL.into_iter().collect();

        let mut allowed = HashMap::new();
        allowed.insert(Role::Public, geometry_only);
        allowed.insert(Role::Member, all.clone());
        allowed.insert(Role::Elevated, all.clone());
        allowed.insert(Role::Admin, all);
        Self { allowed }
    }
}

impl PermissionTable {
    /// Build a table from explicit grants. Roles without an entry deny
    /// everything.
    pub fn from_grants<I>(grants: I) -> Self
    where
        I: IntoIterator<Item = (Role, Vec<OperationName>)>,
    {
        let mut allowed: HashMap<Role, HashSet<OperationName>> = HashMap::new();
        for (role, ops) in grants {
            allowed.entry(role).or_default().extend(ops);
        }
        Self { allowed }
    }

    pub fn is_allowed(&self, role: Role, operation: OperationName) -> bool {
        self.allowed
            .get(&role)
            .map(|ops| ops.contains(&operation))
            .unwrap_or(false)
    }

    /// `Ok(())` when the role may run the operation, `Unauthorized` otherwise.
    pub fn authorize(&self, role: Role, operation: OperationName) -> GovResult<()> {
        if self.is_allowed(role, operation) {
            Ok(())
        } else {
            Err(GovError::Unauthorized)
        }
    }

    /// Whether the role may run anything at all. Used to reject callers
    /// before spending a model call on intent resolution.
    pub fn has_any_grant(&self, role: Role) -> bool {
        self.allowed
            .get(&role)
            .map(|ops| !ops.is_empty())
            .unwrap_or(false)
    }
}
