//! Command context: who is acting, in which instance and org, and until when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{InstanceId, OrgId, UserId};

/// Role granted to the system context. Bypasses org-scoped permission checks.
pub const ROLE_SYSTEM: &str = "SYSTEM";

/// Identity of the synthetic system actor.
pub const USER_SYSTEM: &str = "system";

/// Per-request context required on every command.
///
/// The timestamp is the single time source for all expiry decisions inside
/// command logic; reducers and write models never read the wall clock. The
/// deadline, when set, bounds every suspension point (database, outbound
/// HTTP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub instance_id: InstanceId,
    pub org_id: OrgId,
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

impl Context {
    pub fn new(instance_id: InstanceId, org_id: OrgId, timestamp: DateTime<Utc>) -> Self {
        Self {
            instance_id,
            org_id,
            user_id: None,
            roles: Vec::new(),
            request_id: None,
            timestamp,
            deadline: None,
        }
    }

    /// System context: org scope equals the instance, actor is `system`.
    pub fn system(instance_id: InstanceId, timestamp: DateTime<Utc>) -> Self {
        let org_id = instance_id.as_org_id();
        Self {
            instance_id,
            org_id,
            user_id: Some(UserId::new(USER_SYSTEM)),
            roles: vec![ROLE_SYSTEM.to_string()],
            request_id: None,
            timestamp,
            deadline: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId, roles: Vec<String>) -> Self {
        self.user_id = Some(user_id);
        self.roles = roles;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The event creator recorded on pushed events.
    pub fn creator(&self) -> String {
        self.user_id
            .as_ref()
            .map(|u| u.as_str().to_string())
            .unwrap_or_else(|| USER_SYSTEM.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.roles.iter().any(|r| r == ROLE_SYSTEM)
    }

    /// Fail with `DeadlineExceeded` once the deadline has elapsed.
    ///
    /// Checked before every suspension point so a command never starts new
    /// I/O after its budget is spent.
    pub fn check_deadline(&self, now: DateTime<Utc>) -> Result<()> {
        match self.deadline {
            Some(deadline) if now > deadline => Err(Error::deadline_exceeded(
                "CORE-dl01",
                "command deadline elapsed",
            )),
            _ => Ok(()),
        }
    }

    /// Remaining budget until the deadline, if one is set.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.deadline.map(|d| d - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn system_context_scopes_org_to_instance() {
        let ctx = Context::system(InstanceId::new("i1"), now());
        assert_eq!(ctx.org_id.as_str(), "i1");
        assert_eq!(ctx.creator(), "system");
        assert!(ctx.is_system());
    }

    #[test]
    fn deadline_check() {
        let ctx = Context::new(InstanceId::new("i1"), OrgId::new("o1"), now())
            .with_deadline(now() + chrono::Duration::seconds(5));
        assert!(ctx.check_deadline(now()).is_ok());
        let late = now() + chrono::Duration::seconds(6);
        let err = ctx.check_deadline(late).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::DeadlineExceeded);
    }
}
