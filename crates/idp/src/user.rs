//! Normalised claims of an externally authenticated user.

use serde::{Deserialize, Serialize};

use idforge_core::{EmailAddress, Language};

/// What every provider type normalises its claims into.
///
/// `external_user_id` is the provider-scoped stable subject; everything else
/// is best effort and may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExternalUser {
    pub external_user_id: String,
    pub email: Option<EmailAddress>,
    #[serde(default)]
    pub email_verified: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub locale: Option<Language>,
}

impl ExternalUser {
    pub fn new(external_user_id: impl Into<String>) -> Self {
        Self {
            external_user_id: external_user_id.into(),
            ..Default::default()
        }
    }

    /// Username preference for provisioning: explicit claim, then the email
    /// local part. Callers fall back to a generated name when both miss.
    pub fn preferred_username(&self) -> Option<String> {
        if let Some(username) = &self.username {
            if !username.is_empty() {
                return Some(username.clone());
            }
        }
        self.email.as_ref().map(|e| e.local_part().to_string())
    }
}
