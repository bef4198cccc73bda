//! Pushed authorization request (RFC 9126) events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idforge_events::EventType;

pub const AUTH_REQUEST_ADDED: EventType = EventType::from_static("auth_request.added");
pub const AUTH_REQUEST_CONSUMED: EventType = EventType::from_static("auth_request.consumed");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequestAdded {
    /// `urn:ietf:params:oauth:request_uri:<hex>`
    pub request_uri: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    pub expires_at: DateTime<Utc>,
}
