//! The read API commands validate against.
//!
//! All lookups are served from projections; commands never read the log
//! through this type. Policy reads resolve the org override first and fall
//! back to the instance default.

use std::sync::Arc;

use idforge_core::{Error, IdpId, InstanceId, OrgId, Result, UserId};

use crate::cursor::CursorStore;
use crate::projections::{
    IdpIntentsProjection, IdpView, IdpsProjection, IntentView, LoginPoliciesProjection,
    LoginPolicyView, OrgView, OrgsProjection, PasswordComplexityProjection,
    PasswordComplexityView, SamlRequestView, SamlRequestsProjection, UserView, UsersProjection,
};
use crate::runtime::Projection;
use crate::store::{InMemoryReadStore, ReadStore};
use crate::InMemoryCursorStore;

pub struct Queries {
    orgs: Arc<dyn ReadStore<OrgView>>,
    users: Arc<dyn ReadStore<UserView>>,
    login_policies: Arc<dyn ReadStore<LoginPolicyView>>,
    password_complexity: Arc<dyn ReadStore<PasswordComplexityView>>,
    idps: Arc<dyn ReadStore<IdpView>>,
    intents: Arc<dyn ReadStore<IntentView>>,
    saml_requests: Arc<dyn ReadStore<SamlRequestView>>,
    cursors: Arc<dyn CursorStore>,
}

impl Queries {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orgs: Arc<dyn ReadStore<OrgView>>,
        users: Arc<dyn ReadStore<UserView>>,
        login_policies: Arc<dyn ReadStore<LoginPolicyView>>,
        password_complexity: Arc<dyn ReadStore<PasswordComplexityView>>,
        idps: Arc<dyn ReadStore<IdpView>>,
        intents: Arc<dyn ReadStore<IntentView>>,
        saml_requests: Arc<dyn ReadStore<SamlRequestView>>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            orgs,
            users,
            login_policies,
            password_complexity,
            idps,
            intents,
            saml_requests,
            cursors,
        }
    }

    /// Wire an in-memory query side: the `Queries` facade plus the matching
    /// projections over the same stores, ready for a `ProjectionRunner`.
    pub fn in_memory() -> (Arc<Self>, Vec<Arc<dyn Projection>>, Arc<InMemoryCursorStore>) {
        let orgs = Arc::new(InMemoryReadStore::new());
        let users = Arc::new(InMemoryReadStore::new());
        let login_policies = Arc::new(InMemoryReadStore::new());
        let password_complexity = Arc::new(InMemoryReadStore::new());
        let idps = Arc::new(InMemoryReadStore::new());
        let intents = Arc::new(InMemoryReadStore::new());
        let saml_requests = Arc::new(InMemoryReadStore::new());
        let cursors = Arc::new(InMemoryCursorStore::new());

        let projections: Vec<Arc<dyn Projection>> = vec![
            Arc::new(OrgsProjection::new(orgs.clone())),
            Arc::new(UsersProjection::new(users.clone())),
            Arc::new(LoginPoliciesProjection::new(login_policies.clone())),
            Arc::new(PasswordComplexityProjection::new(password_complexity.clone())),
            Arc::new(IdpsProjection::new(idps.clone())),
            Arc::new(IdpIntentsProjection::new(intents.clone())),
            Arc::new(SamlRequestsProjection::new(saml_requests.clone())),
        ];

        let queries = Arc::new(Self::new(
            orgs,
            users,
            login_policies,
            password_complexity,
            idps,
            intents,
            saml_requests,
            cursors.clone(),
        ));
        (queries, projections, cursors)
    }

    pub async fn org_by_id(&self, instance_id: &InstanceId, org_id: &OrgId) -> Result<Option<OrgView>> {
        self.orgs.get(instance_id, org_id.as_str()).await
    }

    /// An org that exists and is not removed; `NotFound` otherwise.
    pub async fn existing_org(&self, instance_id: &InstanceId, org_id: &OrgId) -> Result<OrgView> {
        self.org_by_id(instance_id, org_id)
            .await?
            .filter(|o| o.state.exists())
            .ok_or_else(|| {
                Error::not_found("QUERY-or01", "org not found")
                    .with_detail("org_id", org_id.as_str())
            })
    }

    pub async fn user_by_id(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<Option<UserView>> {
        self.users.get(instance_id, user_id.as_str()).await
    }

    /// Case-insensitive username lookup within an org.
    pub async fn user_by_username(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
        username: &str,
    ) -> Result<Option<UserView>> {
        let users = self.users.list(instance_id).await?;
        Ok(users.into_iter().find(|u| {
            u.resource_owner == org_id.as_str() && u.username.eq_ignore_ascii_case(username)
        }))
    }

    /// Login policy: org override shadows the instance default.
    pub async fn login_policy(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
    ) -> Result<LoginPolicyView> {
        if let Some(view) = self.login_policies.get(instance_id, org_id.as_str()).await? {
            return Ok(view);
        }
        self.login_policies
            .get(instance_id, instance_id.as_str())
            .await?
            .ok_or_else(|| Error::not_found("QUERY-lp01", "no login policy configured"))
    }

    pub async fn password_complexity_policy(
        &self,
        instance_id: &InstanceId,
        org_id: &OrgId,
    ) -> Result<PasswordComplexityView> {
        if let Some(view) = self
            .password_complexity
            .get(instance_id, org_id.as_str())
            .await?
        {
            return Ok(view);
        }
        self.password_complexity
            .get(instance_id, instance_id.as_str())
            .await?
            .ok_or_else(|| Error::not_found("QUERY-pc01", "no password complexity policy configured"))
    }

    pub async fn idp_by_id(&self, instance_id: &InstanceId, idp_id: &IdpId) -> Result<Option<IdpView>> {
        self.idps.get(instance_id, idp_id.as_str()).await
    }

    /// Intent lookup by CSRF state, projection-backed.
    pub async fn intent_by_state(
        &self,
        instance_id: &InstanceId,
        state: &str,
    ) -> Result<Option<IntentView>> {
        let intents = self.intents.list(instance_id).await?;
        Ok(intents.into_iter().find(|i| i.state_param == state))
    }

    pub async fn intent_by_id(
        &self,
        instance_id: &InstanceId,
        intent_id: &str,
    ) -> Result<Option<IntentView>> {
        self.intents.get(instance_id, intent_id).await
    }

    pub async fn saml_request_by_id(
        &self,
        instance_id: &InstanceId,
        request_id: &str,
    ) -> Result<Option<SamlRequestView>> {
        self.saml_requests.get(instance_id, request_id).await
    }

    /// Cursor of a projection, for read-your-write callers.
    pub async fn projection_position(&self, projection: &str) -> Result<u64> {
        Ok(self
            .cursors
            .get(projection)
            .await?
            .map(|c| c.position)
            .unwrap_or(0))
    }
}
