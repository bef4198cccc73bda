//! Event definitions: aggregate types, event types, and payload structs.
//!
//! Payloads are the persisted shape of every fact in the log. They are
//! append-only contracts: fields may be added (with serde defaults), never
//! renamed or removed. Write models and projections both fold these.

pub mod action;
pub mod auth_request;
pub mod execution;
pub mod idp;
pub mod idp_intent;
pub mod instance;
pub mod org;
pub mod policy;
pub mod project;
pub mod saml;
pub mod target;
pub mod user;

use idforge_events::AggregateType;

pub const AGGREGATE_INSTANCE: AggregateType = AggregateType::from_static("instance");
pub const AGGREGATE_ORG: AggregateType = AggregateType::from_static("org");
pub const AGGREGATE_USER: AggregateType = AggregateType::from_static("user");
pub const AGGREGATE_PROJECT: AggregateType = AggregateType::from_static("project");
pub const AGGREGATE_ACTION: AggregateType = AggregateType::from_static("action");
pub const AGGREGATE_TARGET: AggregateType = AggregateType::from_static("target");
pub const AGGREGATE_EXECUTION: AggregateType = AggregateType::from_static("execution");
pub const AGGREGATE_IDP: AggregateType = AggregateType::from_static("idp");
pub const AGGREGATE_IDP_INTENT: AggregateType = AggregateType::from_static("idp.intent");
pub const AGGREGATE_SAML_REQUEST: AggregateType = AggregateType::from_static("saml_request");
pub const AGGREGATE_SAML_SESSION: AggregateType = AggregateType::from_static("saml_session");
pub const AGGREGATE_AUTH_REQUEST: AggregateType = AggregateType::from_static("auth_request");

#[cfg(test)]
mod tests {
    use super::user::HumanAdded;
    use crate::user::Profile;
    use idforge_core::EmailAddress;

    /// Payload codecs must be two-sided identities, and reducers built
    /// against older schemas must accept payloads with added fields.
    #[test]
    fn payload_roundtrip_and_unknown_fields() {
        let payload = HumanAdded {
            username: "alice".to_string(),
            profile: Profile {
                first_name: "A".to_string(),
                last_name: "L".to_string(),
                nick_name: String::new(),
                display_name: String::new(),
                preferred_language: Default::default(),
                gender: Default::default(),
            },
            email: EmailAddress::parse("alice@example.com").unwrap(),
            email_verified: false,
            phone: None,
            phone_verified: false,
        };

        let encoded = serde_json::to_value(&payload).unwrap();
        let decoded: HumanAdded = serde_json::from_value(encoded.clone()).unwrap();
        assert_eq!(decoded, payload);

        // A future writer may add fields; this reader ignores them.
        let mut extended = encoded;
        extended["added_in_v2"] = serde_json::json!("ignored");
        let decoded: HumanAdded = serde_json::from_value(extended).unwrap();
        assert_eq!(decoded, payload);
    }
}
