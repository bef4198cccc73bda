//! Aggregates: the unit of transactional consistency.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use idforge_core::{InstanceId, OrgId};

/// Type tag of an aggregate (e.g. `user`, `org`, `idp.intent`).
///
/// Aggregate types are stable identifiers persisted with every event. They
/// are `Cow`-backed so the common case (a `const` tag) costs nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateType(Cow<'static, str>);

impl AggregateType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logical entity identified by `(aggregate_type, aggregate_id)`, owned by
/// exactly one org (`resource_owner`) and one instance.
///
/// Every event carries the full descriptor so the log can be filtered by any
/// of the four axes without joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(rename = "type")]
    pub ty: AggregateType,
    pub id: String,
    pub resource_owner: String,
    pub instance_id: InstanceId,
}

impl Aggregate {
    pub fn new(
        ty: AggregateType,
        id: impl Into<String>,
        resource_owner: &OrgId,
        instance_id: &InstanceId,
    ) -> Self {
        Self {
            ty,
            id: id.into(),
            resource_owner: resource_owner.as_str().to_string(),
            instance_id: instance_id.clone(),
        }
    }

    /// An aggregate owned by the instance itself (instance-level resources).
    pub fn instance_scoped(ty: AggregateType, id: impl Into<String>, instance_id: &InstanceId) -> Self {
        Self {
            ty,
            id: id.into(),
            resource_owner: instance_id.as_str().to_string(),
            instance_id: instance_id.clone(),
        }
    }
}
