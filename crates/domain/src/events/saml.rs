//! SAML request and session events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_core::{RequestId, SessionId, UserId};
use idforge_events::EventType;

use crate::idp::SamlBinding;

pub const SAML_REQUEST_ADDED: EventType = EventType::from_static("saml.request.added");
pub const SAML_REQUEST_SESSION_LINKED: EventType =
    EventType::from_static("saml.request.session.linked");
pub const SAML_REQUEST_SUCCEEDED: EventType = EventType::from_static("saml.request.succeeded");
pub const SAML_REQUEST_FAILED: EventType = EventType::from_static("saml.request.failed");

pub const SAML_SESSION_ADDED: EventType = EventType::from_static("saml.session.added");
pub const SAML_SESSION_TERMINATED: EventType = EventType::from_static("saml.session.terminated");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlRequestAdded {
    pub binding: SamlBinding,
    pub destination: String,
    pub acs_url: String,
    /// The SP-issued request id echoed in the response's InResponseTo.
    pub request_id: String,
    pub issuer: String,
    #[serde(default)]
    pub relay_state: String,
    #[serde(default)]
    pub login_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlRequestSessionLinked {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub authenticated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlRequestFailed {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlSessionAdded {
    pub saml_request_id: RequestId,
    pub user_id: UserId,
    /// Absolute expiry; the session dies at this time regardless of use.
    pub expires_at: DateTime<Utc>,
}
