//! Concrete projections and their view types.

pub mod idp_intents;
pub mod idps;
pub mod login_policies;
pub mod orgs;
pub mod password_complexity;
pub mod saml_requests;
pub mod users;

pub use idp_intents::{IdpIntentsProjection, IntentView, IntentViewState};
pub use idps::{IdpView, IdpsProjection};
pub use login_policies::{LoginPoliciesProjection, LoginPolicyView};
pub use orgs::{OrgView, OrgsProjection};
pub use password_complexity::{PasswordComplexityProjection, PasswordComplexityView};
pub use saml_requests::{SamlRequestView, SamlRequestViewState, SamlRequestsProjection};
pub use users::{IdpLinkView, UserView, UsersProjection};
