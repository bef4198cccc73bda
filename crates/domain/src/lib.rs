//! Shared domain model: states, policies, IDP configurations, application
//! metadata, and the execution/target types. No storage, no I/O; every type
//! here is a value with its own validation.

pub mod action;
pub mod application;
pub mod events;
pub mod execution;
pub mod idp;
pub mod instance;
pub mod oidc;
pub mod org;
pub mod policy;
pub mod project;
pub mod target;
pub mod user;
pub mod validate;

pub use action::{ActionState, FlowType, TriggerType};
pub use application::{ApiAuthMethod, AppState, OidcAppType, OidcAuthMethod, OidcGrantType, OidcResponseType};
pub use execution::{ExecutionCondition, ExecutionTargetRef};
pub use idp::{
    AppleIdpConfig, IdpConfig, IdpState, IdpType, JwtIdpConfig, LdapIdpConfig, OAuthIdpConfig,
    OidcIdpConfig, ProvisioningOptions, SamlBinding, SamlIdpConfig,
};
pub use instance::FeatureFlags;
pub use oidc::ClientMetadata;
pub use org::OrgState;
pub use policy::{
    DomainPolicy, LabelPolicy, LockoutPolicy, LoginPolicy, MultiFactorType,
    PasswordAgePolicy, PasswordComplexityPolicy, PrivacyPolicy, SecondFactorType, SecurityPolicy,
};
pub use project::{PrivateLabelingSetting, ProjectState};
pub use target::{TargetType, MAX_TARGET_TIMEOUT_MS};
pub use user::{Gender, Profile, UserState, UserType};
