//! Execution conditions: what maps a request, response, event, or function
//! to a list of targets.
//!
//! An execution's identity is a function of its condition, so repeated set
//! operations are natural upserts. The id is derived from a canonical
//! rendering of the condition, hashed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use idforge_core::{Error, ExecutionId, Result, TargetId};

/// Condition selecting when an execution runs.
///
/// Request and response conditions narrow by method or service, or match
/// everything. Event conditions narrow by event type or group. Exactly one
/// level of specificity may be set per condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionCondition {
    Request {
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        service: Option<String>,
        #[serde(default)]
        all: bool,
    },
    Response {
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        service: Option<String>,
        #[serde(default)]
        all: bool,
    },
    Event {
        #[serde(default)]
        event: Option<String>,
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        all: bool,
    },
    Function {
        name: String,
    },
}

impl ExecutionCondition {
    pub fn validate(&self) -> Result<()> {
        let set = match self {
            Self::Request { method, service, all } | Self::Response { method, service, all } => {
                [method.is_some(), service.is_some(), *all]
            }
            Self::Event { event, group, all } => [event.is_some(), group.is_some(), *all],
            Self::Function { name } => {
                if name.is_empty() {
                    return Err(Error::invalid_argument(
                        "DOMAIN-exc1",
                        "function name must not be empty",
                    ));
                }
                return Ok(());
            }
        };
        if set.iter().filter(|s| **s).count() != 1 {
            return Err(Error::invalid_argument(
                "DOMAIN-exc2",
                "exactly one of method/service/all (or event/group/all) must be set",
            ));
        }
        Ok(())
    }

    /// Canonical rendering; input to the id hash. Stable across releases.
    pub fn canonical(&self) -> String {
        match self {
            Self::Request { method, service, all } => {
                render("request", method.as_deref(), service.as_deref(), *all)
            }
            Self::Response { method, service, all } => {
                render("response", method.as_deref(), service.as_deref(), *all)
            }
            Self::Event { event, group, all } => {
                render("event", event.as_deref(), group.as_deref(), *all)
            }
            Self::Function { name } => format!("function/{name}"),
        }
    }

    /// Deterministic id: `exec:` plus the first 16 hex chars of the
    /// SHA-256 of the canonical form.
    pub fn execution_id(&self) -> ExecutionId {
        let digest = Sha256::digest(self.canonical().as_bytes());
        ExecutionId::new(format!("exec:{}", &hex::encode(digest)[..16]))
    }
}

fn render(kind: &str, specific: Option<&str>, group: Option<&str>, all: bool) -> String {
    if let Some(s) = specific {
        format!("{kind}/{s}")
    } else if let Some(g) = group {
        format!("{kind}/group/{g}")
    } else if all {
        format!("{kind}/*")
    } else {
        format!("{kind}/-")
    }
}

/// A target list entry: either a webhook target or the inclusion of another
/// execution's targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionTargetRef {
    Target { id: TargetId },
    Include { id: ExecutionId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_ids_are_deterministic_upsert_keys() {
        let a = ExecutionCondition::Request {
            method: Some("/idforge.v1.UserService/AddHumanUser".to_string()),
            service: None,
            all: false,
        };
        let b = a.clone();
        assert_eq!(a.execution_id(), b.execution_id());

        let c = ExecutionCondition::Response {
            method: Some("/idforge.v1.UserService/AddHumanUser".to_string()),
            service: None,
            all: false,
        };
        assert_ne!(a.execution_id(), c.execution_id());
        assert!(a.execution_id().as_str().starts_with("exec:"));
    }

    #[test]
    fn exactly_one_specificity_level() {
        assert!(ExecutionCondition::Request {
            method: Some("m".into()),
            service: Some("s".into()),
            all: false
        }
        .validate()
        .is_err());
        assert!(ExecutionCondition::Event {
            event: None,
            group: None,
            all: false
        }
        .validate()
        .is_err());
        assert!(ExecutionCondition::Event {
            event: None,
            group: None,
            all: true
        }
        .validate()
        .is_ok());
        assert!(ExecutionCondition::Function { name: String::new() }.validate().is_err());
    }
}
