//! IDP intent events: the server-side state of one in-flight federated
//! login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{IdpId, RequestId, UserId};
use idforge_events::EventType;

use crate::idp::IdpType;

pub const INTENT_STARTED: EventType = EventType::from_static("idp.intent.started");
pub const INTENT_SUCCEEDED: EventType = EventType::from_static("idp.intent.succeeded");
pub const INTENT_FAILED: EventType = EventType::from_static("idp.intent.failed");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentStarted {
    pub idp_id: IdpId,
    pub idp_type: IdpType,
    /// CSRF state carried through the provider round trip.
    pub state: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub failure_uri: String,
    #[serde(default)]
    pub auth_request_id: Option<RequestId>,
    /// PKCE verifier, kept until the code exchange. Opaque bytes, assumed
    /// wrapped by the caller's key layer.
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSucceeded {
    pub user_id: UserId,
    /// Normalised external claims, serialized as stored by the idp crate.
    pub idp_user: serde_json::Value,
    pub external_user_id: String,
    /// Digest of the one-time intent token handed to the caller.
    pub intent_token_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFailed {
    pub reason: String,
}
