//! Capability checks: `(subject, resource, action, scope)` reduced to a
//! permission string checked against the caller's roles and org scope.

use idforge_core::{Context, Error, Result};

pub const PERM_INSTANCE_WRITE: &str = "instance.write";
pub const PERM_ORG_WRITE: &str = "org.write";
pub const PERM_USER_WRITE: &str = "user.write";
pub const PERM_USER_CREDENTIAL_WRITE: &str = "user.credential.write";
pub const PERM_PROJECT_WRITE: &str = "project.write";
pub const PERM_APP_WRITE: &str = "project.app.write";
pub const PERM_POLICY_WRITE: &str = "policy.write";
pub const PERM_IDP_WRITE: &str = "org.idp.write";
pub const PERM_ACTION_WRITE: &str = "org.action.write";
pub const PERM_TARGET_WRITE: &str = "action.target.write";
pub const PERM_EXECUTION_WRITE: &str = "execution.write";
pub const PERM_SESSION_WRITE: &str = "session.write";
pub const PERM_KEY_WRITE: &str = "crypto.key.write";

pub const ROLE_IAM_OWNER: &str = "IAM_OWNER";
pub const ROLE_ORG_OWNER: &str = "ORG_OWNER";

/// Decides whether a subject may perform an action on a resource owner's
/// scope. Pure; no I/O.
pub trait PermissionChecker: Send + Sync {
    fn check(&self, ctx: &Context, permission: &str, resource_owner: &str) -> Result<()>;
}

/// Role-based default:
///
/// - `SYSTEM` and `IAM_OWNER` act anywhere in the instance
/// - `ORG_OWNER` acts only within the context org
#[derive(Debug, Default)]
pub struct RolePermissionChecker;

impl RolePermissionChecker {
    pub fn new() -> Self {
        Self
    }
}

impl PermissionChecker for RolePermissionChecker {
    fn check(&self, ctx: &Context, permission: &str, resource_owner: &str) -> Result<()> {
        if ctx.is_system() || ctx.roles.iter().any(|r| r == ROLE_IAM_OWNER) {
            return Ok(());
        }
        if ctx.roles.iter().any(|r| r == ROLE_ORG_OWNER) && ctx.org_id.as_str() == resource_owner {
            return Ok(());
        }
        Err(
            Error::permission_denied("COMMAND-pm01", format!("missing permission '{permission}'"))
                .with_detail("resource_owner", resource_owner),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use idforge_core::{InstanceId, OrgId, UserId};

    fn ctx_with_roles(org: &str, roles: &[&str]) -> Context {
        Context::new(InstanceId::new("i1"), OrgId::new(org), Utc::now()).with_user(
            UserId::new("u1"),
            roles.iter().map(|r| r.to_string()).collect(),
        )
    }

    #[test]
    fn system_acts_anywhere() {
        let ctx = Context::system(InstanceId::new("i1"), Utc::now());
        assert!(RolePermissionChecker.check(&ctx, PERM_USER_WRITE, "o9").is_ok());
    }

    #[test]
    fn org_owner_is_scoped_to_its_org() {
        let checker = RolePermissionChecker;
        let ctx = ctx_with_roles("o1", &[ROLE_ORG_OWNER]);
        assert!(checker.check(&ctx, PERM_USER_WRITE, "o1").is_ok());
        let err = checker.check(&ctx, PERM_USER_WRITE, "o2").unwrap_err();
        assert_eq!(err.kind, idforge_core::ErrorKind::PermissionDenied);
    }

    #[test]
    fn no_roles_means_no_access() {
        let ctx = ctx_with_roles("o1", &[]);
        assert!(RolePermissionChecker.check(&ctx, PERM_USER_WRITE, "o1").is_err());
    }
}
