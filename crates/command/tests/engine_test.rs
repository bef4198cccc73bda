//! End-to-end tests for the command engine: in-memory event store, real
//! projections driven to latest, stubbed external providers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use idforge_command::action::AddAction;
use idforge_command::application::AddOidcApplication;
use idforge_command::auth_request::CreatePushedAuthRequest;
use idforge_command::idp::AddIdp;
use idforge_command::idp_intent::StartIdpIntent;
use idforge_command::org::AddOrg;
use idforge_command::project::AddProject;
use idforge_command::saml::AddSamlRequest;
use idforge_command::target::AddTarget;
use idforge_command::user::{AddHumanUser, AddMachineUser};
use idforge_command::user_pat::AddPersonalAccessToken;
use idforge_command::instance::SetupInstance;
use idforge_command::{Commands, RolePermissionChecker};
use idforge_core::{
    Context, ErrorKind, IdpId, InstanceId, OrgId, ProjectId, Result, TargetId, UserId,
};
use idforge_crypto::InMemoryKeyStore;
use idforge_domain::execution::{ExecutionCondition, ExecutionTargetRef};
use idforge_domain::{
    ClientMetadata, IdpConfig, LoginPolicy, OidcAppType, OidcAuthMethod, OidcIdpConfig,
    ProvisioningOptions, SamlBinding, TargetType,
};
use idforge_eventstore::{EventStore, InMemoryEventStore};
use idforge_events::SearchQuery;
use idforge_idp::{ExternalUser, IdpCallback, Provider, ProviderFactory, Tokens};
use idforge_query::{Projection, ProjectionRunner, Queries};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Provider stub: accepts the well-known test code and answers the
/// userinfo fetch with a configurable external user.
struct StubProvider {
    user: ExternalUser,
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn auth_url(
        &self,
        _redirect_uri: &str,
        state: &str,
        _nonce: Option<&str>,
        _code_challenge: Option<&str>,
    ) -> Result<String> {
        Ok(format!("https://idp.example.com/authorize?state={state}"))
    }

    async fn exchange_code(
        &self,
        _ctx: &Context,
        code: &str,
        _code_verifier: Option<&str>,
        _redirect_uri: &str,
    ) -> Result<Tokens> {
        assert_eq!(code, "good-code");
        Ok(Tokens {
            access_token: "at".to_string(),
            token_type: "Bearer".to_string(),
            id_token: None,
            refresh_token: None,
            expires_in: Some(3600),
        })
    }

    async fn fetch_user(
        &self,
        _ctx: &Context,
        _tokens: &Tokens,
        _expected_nonce: Option<&str>,
    ) -> Result<ExternalUser> {
        Ok(self.user.clone())
    }
}

struct StubProviderFactory {
    user: Mutex<ExternalUser>,
}

impl StubProviderFactory {
    fn new(user: ExternalUser) -> Self {
        Self {
            user: Mutex::new(user),
        }
    }
}

#[async_trait]
impl ProviderFactory for StubProviderFactory {
    async fn provider(
        &self,
        _ctx: &Context,
        _idp_id: &IdpId,
        _config: &IdpConfig,
    ) -> Result<Box<dyn Provider>> {
        Ok(Box::new(StubProvider {
            user: self.user.lock().unwrap().clone(),
        }))
    }
}

struct Harness {
    commands: Commands,
    store: Arc<InMemoryEventStore>,
    queries: Arc<Queries>,
    runner: ProjectionRunner<Arc<InMemoryEventStore>>,
    projections: Vec<Arc<dyn Projection>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_external_user(ExternalUser {
            external_user_id: "ext-123".to_string(),
            email: Some(idforge_core::EmailAddress::parse("alice.ext@example.com").unwrap()),
            email_verified: true,
            username: None,
            first_name: Some("Alice".to_string()),
            last_name: Some("External".to_string()),
            display_name: Some("Alice External".to_string()),
            avatar_url: None,
            locale: None,
        })
    }

    fn with_external_user(user: ExternalUser) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let (queries, projections, cursors) = Queries::in_memory();
        let runner = ProjectionRunner::new(store.clone(), cursors);
        let commands = Commands::new(
            store.clone(),
            queries.clone(),
            Arc::new(InMemoryKeyStore::new()),
            Arc::new(RolePermissionChecker::new()),
            Arc::new(StubProviderFactory::new(user)),
        );
        Self {
            commands,
            store,
            queries,
            runner,
            projections,
        }
    }

    fn system_ctx(&self) -> Context {
        Context::system(InstanceId::new("i1"), t0())
    }

    fn org_ctx(&self, org: &str) -> Context {
        Context::system(InstanceId::new("i1"), t0()).with_org(org)
    }

    async fn project(&self) {
        self.runner.run_to_latest(&self.projections).await.unwrap();
    }

    /// Instance i1 with org o1 ready to use.
    async fn bootstrap(&self) {
        let ctx = self.system_ctx();
        self.commands
            .setup_instance(
                &ctx,
                SetupInstance {
                    name: "test instance".to_string(),
                    default_language: Some("en".to_string()),
                    login_policy: None,
                    password_complexity_policy: None,
                    lockout_policy: None,
                    privacy_policy: None,
                    domain_policy: None,
                },
            )
            .await
            .unwrap();
        self.commands
            .add_org(
                &ctx,
                AddOrg {
                    org_id: Some(OrgId::new("o1")),
                    name: "org one".to_string(),
                },
            )
            .await
            .unwrap();
    }

    fn add_alice(&self) -> AddHumanUser {
        AddHumanUser {
            user_id: None,
            username: "alice".to_string(),
            first_name: "A".to_string(),
            last_name: "L".to_string(),
            email: "alice@example.com".to_string(),
            email_verified: false,
            phone: None,
            phone_verified: false,
            preferred_language: None,
        }
    }

    async fn add_oidc_idp(&self, ctx: &Context) -> IdpId {
        self.commands
            .add_idp(
                ctx,
                AddIdp {
                    idp_id: Some(IdpId::new("idp1")),
                    name: "corp idp".to_string(),
                    config: IdpConfig::Oidc(OidcIdpConfig {
                        issuer: "https://idp.example.com".to_string(),
                        client_id: "client-1".to_string(),
                        client_secret: b"secret".to_vec(),
                        scopes: vec![],
                        is_id_token_mapping: false,
                    }),
                    options: ProvisioningOptions::default(),
                },
            )
            .await
            .unwrap()
            .idp_id
    }
}

trait ContextExt {
    fn with_org(self, org: &str) -> Context;
}

impl ContextExt for Context {
    fn with_org(mut self, org: &str) -> Context {
        self.org_id = OrgId::new(org);
        self
    }
}

#[tokio::test]
async fn s1_add_human_user_and_username_uniqueness() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");

    let created = h.commands.add_human_user(&ctx, h.add_alice()).await.unwrap();
    assert_eq!(created.details.sequence, 1);
    assert_eq!(created.details.resource_owner, "o1");

    // Exactly one user.human.added event exists for the aggregate.
    let events = h
        .store
        .filter(
            &SearchQuery::instance(&ctx.instance_id)
                .aggregate_id(created.user_id.as_str())
                .order_by_version(),
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type.as_str(), "user.human.added");

    // Same username, different case: refused.
    let mut dup = h.add_alice();
    dup.username = "ALICE".to_string();
    dup.email = "alice2@example.com".to_string();
    let err = h.commands.add_human_user(&ctx, dup).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AlreadyExists);

    // A removed user releases the name.
    h.commands.remove_user(&ctx, &created.user_id).await.unwrap();
    let recreated = h.commands.add_human_user(&ctx, h.add_alice()).await.unwrap();
    assert_ne!(recreated.user_id, created.user_id);
}

#[tokio::test]
async fn s2_org_login_policy_shadows_instance_default() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.system_ctx();
    h.commands
        .add_org(
            &ctx,
            AddOrg {
                org_id: Some(OrgId::new("o2")),
                name: "org two".to_string(),
            },
        )
        .await
        .unwrap();

    let override_policy = LoginPolicy {
        allow_register: false,
        ..LoginPolicy::default()
    };
    h.commands
        .add_org_login_policy(&ctx, &OrgId::new("o1"), override_policy)
        .await
        .unwrap();
    h.project().await;

    let o1 = h
        .queries
        .login_policy(&ctx.instance_id, &OrgId::new("o1"))
        .await
        .unwrap();
    assert!(!o1.policy.allow_register);
    assert!(!o1.is_default);

    let o2 = h
        .queries
        .login_policy(&ctx.instance_id, &OrgId::new("o2"))
        .await
        .unwrap();
    assert!(o2.policy.allow_register);
    assert!(o2.is_default);
}

#[tokio::test]
async fn s3_oidc_intent_happy_path_provisions_and_links() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");
    let idp_id = h.add_oidc_idp(&ctx).await;

    let started = h
        .commands
        .start_idp_intent(
            &ctx,
            StartIdpIntent {
                idp_id: idp_id.clone(),
                redirect_uri: "https://rp/cb".to_string(),
                failure_uri: String::new(),
                auth_request_id: None,
            },
        )
        .await
        .unwrap();
    assert!(!started.state.is_empty());
    assert!(started.code_verifier.as_deref().is_some_and(|v| !v.is_empty()));
    assert!(started.nonce.as_deref().is_some_and(|n| !n.is_empty()));

    h.project().await;

    let outcome = h
        .commands
        .handle_oauth_callback(
            &ctx,
            IdpCallback {
                code: Some("good-code".to_string()),
                state: started.state.clone(),
                error: None,
                error_description: None,
            },
            None,
        )
        .await
        .unwrap();

    // A user was provisioned with the claims-derived username and linked.
    h.project().await;
    let user = h
        .queries
        .user_by_id(&ctx.instance_id, &outcome.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.username, "alice.ext");
    assert_eq!(user.links.len(), 1);
    assert_eq!(user.links[0].idp_config_id, idp_id);
    assert_eq!(user.links[0].external_user_id, "ext-123");

    let succeeded = h
        .store
        .filter(
            &SearchQuery::instance(&ctx.instance_id)
                .aggregate_id(started.intent_id.as_str())
                .order_by_version(),
        )
        .await
        .unwrap();
    assert!(succeeded
        .iter()
        .any(|e| e.event_type.as_str() == "idp.intent.succeeded"));

    // The one-time intent token verifies once and only against the digest.
    let verified = h
        .commands
        .verify_intent_token(&ctx, &outcome.intent_id, &outcome.intent_token)
        .await
        .unwrap();
    assert_eq!(verified, outcome.user_id);
    assert!(h
        .commands
        .verify_intent_token(&ctx, &outcome.intent_id, "wrong")
        .await
        .is_err());
}

#[tokio::test]
async fn s4_expired_intent_is_refused() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");
    let idp_id = h.add_oidc_idp(&ctx).await;

    let started = h
        .commands
        .start_idp_intent(
            &ctx,
            StartIdpIntent {
                idp_id,
                redirect_uri: "https://rp/cb".to_string(),
                failure_uri: String::new(),
                auth_request_id: None,
            },
        )
        .await
        .unwrap();
    h.project().await;

    let mut late_ctx = h.org_ctx("o1");
    late_ctx.timestamp = t0() + Duration::minutes(11);
    let err = h
        .commands
        .handle_oauth_callback(
            &late_ctx,
            IdpCallback {
                code: Some("good-code".to_string()),
                state: started.state,
                error: None,
                error_description: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
}

#[tokio::test]
async fn intent_is_single_use() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");
    let idp_id = h.add_oidc_idp(&ctx).await;

    let started = h
        .commands
        .start_idp_intent(
            &ctx,
            StartIdpIntent {
                idp_id,
                redirect_uri: "https://rp/cb".to_string(),
                failure_uri: String::new(),
                auth_request_id: None,
            },
        )
        .await
        .unwrap();
    h.project().await;

    let callback = IdpCallback {
        code: Some("good-code".to_string()),
        state: started.state.clone(),
        error: None,
        error_description: None,
    };
    h.commands
        .handle_oauth_callback(&ctx, callback.clone(), None)
        .await
        .unwrap();

    let err = h
        .commands
        .handle_oauth_callback(&ctx, callback, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
}

#[tokio::test]
async fn s5_dcr_web_app_https_rule_and_secret_rules() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");
    let project_id = h
        .commands
        .add_project(
            &ctx,
            AddProject {
                project_id: Some(ProjectId::new("p1")),
                name: "portal".to_string(),
                project_role_assertion: false,
                project_role_check: false,
                has_project_check: false,
                private_labeling_setting: Default::default(),
            },
        )
        .await
        .unwrap()
        .project_id;

    let metadata = |uris: &[&str], auth: Option<OidcAuthMethod>| ClientMetadata {
        client_name: "my web app".to_string(),
        redirect_uris: uris.iter().map(|s| s.to_string()).collect(),
        application_type: Some(OidcAppType::Web),
        grant_types: vec![],
        response_types: vec![],
        token_endpoint_auth_method: auth,
        post_logout_redirect_uris: vec![],
        scope: None,
    };

    let err = h
        .commands
        .register_client(&ctx, &project_id, metadata(&["http://example.com/cb"], None))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);

    let registered = h
        .commands
        .register_client(&ctx, &project_id, metadata(&["https://example.com/cb"], None))
        .await
        .unwrap();
    assert!(registered.client_secret.is_some());
    assert_eq!(registered.client_secret_expires_at, 0);

    let public = h
        .commands
        .register_client(
            &ctx,
            &project_id,
            metadata(&["https://example.com/cb2"], Some(OidcAuthMethod::None)),
        )
        .await
        .unwrap();
    assert!(public.client_secret.is_none());
}

#[tokio::test]
async fn s6_circular_execution_includes_are_rejected() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");

    let target_id = h
        .commands
        .add_target(
            &ctx,
            AddTarget {
                target_id: Some(TargetId::new("t1")),
                name: "hook".to_string(),
                target_type: TargetType::Webhook,
                endpoint: "https://hooks.example.com".to_string(),
                timeout_ms: 5_000,
                interrupt_on_error: false,
            },
        )
        .await
        .unwrap()
        .target_id;

    let cond_e1 = ExecutionCondition::Request {
        method: Some("/v1/users/add".to_string()),
        service: None,
        all: false,
    };
    let cond_e2 = ExecutionCondition::Request {
        method: Some("/v1/orgs/add".to_string()),
        service: None,
        all: false,
    };

    h.commands
        .set_execution(
            &ctx,
            cond_e1.clone(),
            vec![ExecutionTargetRef::Target {
                id: target_id.clone(),
            }],
        )
        .await
        .unwrap();
    h.commands
        .set_execution(
            &ctx,
            cond_e2.clone(),
            vec![ExecutionTargetRef::Include {
                id: cond_e1.execution_id(),
            }],
        )
        .await
        .unwrap();

    // Completing the cycle fails.
    let err = h
        .commands
        .set_execution(
            &ctx,
            cond_e1,
            vec![ExecutionTargetRef::Include {
                id: cond_e2.execution_id(),
            }],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
    assert!(err.message.contains("circular include"));
}

#[tokio::test]
async fn execution_cannot_include_itself() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");

    let target_id = h
        .commands
        .add_target(
            &ctx,
            AddTarget {
                target_id: Some(TargetId::new("t1")),
                name: "hook".to_string(),
                target_type: TargetType::Webhook,
                endpoint: "https://hooks.example.com".to_string(),
                timeout_ms: 5_000,
                interrupt_on_error: false,
            },
        )
        .await
        .unwrap()
        .target_id;

    let condition = ExecutionCondition::Request {
        method: Some("/v1/users/add".to_string()),
        service: None,
        all: false,
    };
    h.commands
        .set_execution(
            &ctx,
            condition.clone(),
            vec![ExecutionTargetRef::Target { id: target_id }],
        )
        .await
        .unwrap();

    // The depth-1 cycle: an execution including itself.
    let err = h
        .commands
        .set_execution(
            &ctx,
            condition.clone(),
            vec![ExecutionTargetRef::Include {
                id: condition.execution_id(),
            }],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
    assert!(err.message.contains("circular include"));
}

#[tokio::test]
async fn s7_personal_access_token_single_view() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");

    let machine = h
        .commands
        .add_machine_user(
            &ctx,
            AddMachineUser {
                user_id: Some(UserId::new("m1")),
                username: "ci-bot".to_string(),
                name: "CI Bot".to_string(),
                description: String::new(),
            },
        )
        .await
        .unwrap();

    let created = h
        .commands
        .add_personal_access_token(
            &ctx,
            AddPersonalAccessToken {
                user_id: machine.user_id.clone(),
                expiration: Some(t0() + Duration::days(30)),
                scopes: vec!["openid".to_string()],
            },
        )
        .await
        .unwrap();
    assert!(!created.token.is_empty());

    // Subsequent reads only ever see the digest.
    let digests = h
        .commands
        .list_personal_access_token_digests(&ctx, &machine.user_id)
        .await
        .unwrap();
    assert_eq!(digests.len(), 1);
    assert_ne!(digests[0].token_digest, created.token);
    assert_eq!(digests[0].token_digest.len(), 64);

    let verified = h
        .commands
        .verify_personal_access_token(&ctx, &machine.user_id, &created.token)
        .await
        .unwrap();
    assert_eq!(verified, created.token_id);

    h.commands
        .remove_personal_access_token(&ctx, &machine.user_id, &created.token_id)
        .await
        .unwrap();
    let err = h
        .commands
        .verify_personal_access_token(&ctx, &machine.user_id, &created.token)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthenticated);
}

#[tokio::test]
async fn saml_request_is_one_shot() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");

    let alice = h.commands.add_human_user(&ctx, h.add_alice()).await.unwrap();
    let request = h
        .commands
        .add_saml_request(
            &ctx,
            AddSamlRequest {
                request_id: None,
                binding: SamlBinding::HttpPost,
                destination: "https://sp.example.com/sso".to_string(),
                acs_url: "https://sp.example.com/acs".to_string(),
                sp_request_id: "_abc123".to_string(),
                issuer: "https://sp.example.com".to_string(),
                relay_state: String::new(),
                login_hint: None,
            },
        )
        .await
        .unwrap();

    h.commands
        .link_session_to_saml_request(&ctx, &request.request_id, &alice.user_id)
        .await
        .unwrap();
    h.commands
        .succeed_saml_request(&ctx, &request.request_id)
        .await
        .unwrap();

    // Terminal state cannot be left again.
    let err = h
        .commands
        .fail_saml_request(&ctx, &request.request_id, "late failure")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);

    // Repeating the reached terminal transition is idempotent.
    h.commands
        .succeed_saml_request(&ctx, &request.request_id)
        .await
        .unwrap();

    // Linking after terminal is refused.
    let err = h
        .commands
        .link_session_to_saml_request(&ctx, &request.request_id, &alice.user_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
}

#[tokio::test]
async fn par_request_uri_is_single_use_and_expires() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");

    let created = h
        .commands
        .create_pushed_auth_request(
            &ctx,
            CreatePushedAuthRequest {
                client_id: "client-1".to_string(),
                redirect_uri: "https://rp/cb".to_string(),
                scope: "openid".to_string(),
                response_type: "code".to_string(),
                state: None,
                code_challenge: None,
                code_challenge_method: None,
            },
        )
        .await
        .unwrap();
    assert!(created
        .request_uri
        .starts_with("urn:ietf:params:oauth:request_uri:"));
    assert_eq!(created.expires_in, 90);

    h.commands
        .consume_pushed_auth_request(&ctx, &created.request_id, &created.request_uri)
        .await
        .unwrap();
    let err = h
        .commands
        .consume_pushed_auth_request(&ctx, &created.request_id, &created.request_uri)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);

    // A fresh request past its lifetime is refused.
    let second = h
        .commands
        .create_pushed_auth_request(
            &ctx,
            CreatePushedAuthRequest {
                client_id: "client-1".to_string(),
                redirect_uri: "https://rp/cb".to_string(),
                scope: String::new(),
                response_type: "code".to_string(),
                state: None,
                code_challenge: None,
                code_challenge_method: None,
            },
        )
        .await
        .unwrap();
    let mut late_ctx = h.org_ctx("o1");
    late_ctx.timestamp = t0() + Duration::seconds(91);
    let err = h
        .commands
        .consume_pushed_auth_request(&late_ctx, &second.request_id, &second.request_uri)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
}

#[tokio::test]
async fn action_removal_cascades_into_flows() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");

    let action = h
        .commands
        .add_action(
            &ctx,
            AddAction {
                action_id: None,
                name: "enrich".to_string(),
                script: "function enrich(ctx) { return ctx }".to_string(),
                timeout_ms: 1_000,
                allowed_to_fail: false,
            },
        )
        .await
        .unwrap();

    h.commands
        .set_trigger_actions(
            &ctx,
            &OrgId::new("o1"),
            idforge_domain::FlowType::ExternalAuthentication,
            idforge_domain::TriggerType::PostAuthentication,
            vec![action.action_id.clone()],
        )
        .await
        .unwrap();

    h.commands.remove_action(&ctx, &action.action_id).await.unwrap();

    // The cascade event landed on the org aggregate in the same push.
    let org_events = h
        .store
        .filter(
            &SearchQuery::instance(&ctx.instance_id)
                .aggregate_id("o1")
                .order_by_version(),
        )
        .await
        .unwrap();
    assert!(org_events
        .iter()
        .any(|e| e.event_type.as_str() == "org.flow.trigger_actions.cascade_removed"));
}

#[tokio::test]
async fn change_commands_are_idempotent_on_no_op() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.system_ctx();

    let first = h
        .commands
        .change_org(&ctx, &OrgId::new("o1"), "renamed org")
        .await
        .unwrap();
    let second = h
        .commands
        .change_org(&ctx, &OrgId::new("o1"), "renamed org")
        .await
        .unwrap();
    assert_eq!(first.sequence, second.sequence);

    let events = h
        .store
        .filter(&SearchQuery::instance(&ctx.instance_id).aggregate_id("o1"))
        .await
        .unwrap();
    let changes = events
        .iter()
        .filter(|e| e.event_type.as_str() == "org.changed")
        .count();
    assert_eq!(changes, 1);
}

#[tokio::test]
async fn permission_check_precedes_mutation() {
    let h = Harness::new();
    h.bootstrap().await;

    // A subject without roles in the target org cannot create users there.
    let intruder = Context::new(InstanceId::new("i1"), OrgId::new("o1"), t0())
        .with_user(UserId::new("intruder"), vec![]);

    let before = h.store.latest_position(&InstanceId::new("i1")).await.unwrap();
    let err = h
        .commands
        .add_human_user(&intruder, h.add_alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);
    let after = h.store.latest_position(&InstanceId::new("i1")).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn projections_are_idempotent_under_replay() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");
    h.commands.add_human_user(&ctx, h.add_alice()).await.unwrap();
    h.project().await;

    let before = h
        .queries
        .user_by_username(&ctx.instance_id, &ctx.org_id, "alice")
        .await
        .unwrap()
        .unwrap();

    // Re-apply the full log through every projection.
    for projection in &h.projections {
        let events = h
            .store
            .filter(&SearchQuery::all_instances().event_types(projection.event_types()))
            .await
            .unwrap();
        for event in &events {
            projection.reduce(event).await.unwrap();
        }
    }

    let after = h
        .queries
        .user_by_username(&ctx.instance_id, &ctx.org_id, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn set_default_org_requires_existing_org() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.system_ctx();

    let err = h
        .commands
        .set_default_org(&ctx, &OrgId::new("ghost"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);

    h.commands.set_default_org(&ctx, &OrgId::new("o1")).await.unwrap();
}

#[tokio::test]
async fn add_oidc_app_returns_secret_once() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.org_ctx("o1");
    let project_id = h
        .commands
        .add_project(
            &ctx,
            AddProject {
                project_id: None,
                name: "api".to_string(),
                project_role_assertion: false,
                project_role_check: false,
                has_project_check: false,
                private_labeling_setting: Default::default(),
            },
        )
        .await
        .unwrap()
        .project_id;

    let app = h
        .commands
        .add_oidc_application(
            &ctx,
            AddOidcApplication {
                project_id: project_id.clone(),
                name: "web".to_string(),
                redirect_uris: vec!["https://app.example.com/cb".to_string()],
                response_types: vec![idforge_domain::OidcResponseType::Code],
                grant_types: vec![idforge_domain::OidcGrantType::AuthorizationCode],
                app_type: OidcAppType::Web,
                auth_method: OidcAuthMethod::Basic,
                post_logout_redirect_uris: vec![],
                dev_mode: false,
            },
        )
        .await
        .unwrap();
    let secret = app.client_secret.expect("basic auth gets a secret");

    // Rotation invalidates the old digest and returns a new plaintext.
    let (rotated, _) = h
        .commands
        .regenerate_oidc_secret(&ctx, &project_id, &app.app_id)
        .await
        .unwrap();
    assert_ne!(rotated, secret);
}

#[tokio::test]
async fn login_policy_factors_are_added_and_removed() {
    let h = Harness::new();
    h.bootstrap().await;
    let ctx = h.system_ctx();
    let org_id = OrgId::new("o1");

    h.commands
        .add_org_login_policy(&ctx, &org_id, LoginPolicy::default())
        .await
        .unwrap();

    use idforge_command::policy::PolicyScope;
    use idforge_domain::SecondFactorType;

    h.commands
        .add_second_factor_to_login_policy(&ctx, PolicyScope::Org(&org_id), SecondFactorType::Otp)
        .await
        .unwrap();
    // Re-adding an enabled factor is a no-op.
    let details = h
        .commands
        .add_second_factor_to_login_policy(&ctx, PolicyScope::Org(&org_id), SecondFactorType::Otp)
        .await
        .unwrap();
    h.project().await;

    let view = h.queries.login_policy(&ctx.instance_id, &org_id).await.unwrap();
    assert_eq!(view.second_factors, vec![SecondFactorType::Otp]);
    assert_eq!(view.sequence, details.sequence);

    h.commands
        .remove_second_factor_from_login_policy(&ctx, PolicyScope::Org(&org_id), SecondFactorType::Otp)
        .await
        .unwrap();
    let err = h
        .commands
        .remove_second_factor_from_login_policy(&ctx, PolicyScope::Org(&org_id), SecondFactorType::Otp)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}
