//! Policy payload types.
//!
//! Each policy exists as an instance default and an optional org override;
//! on read the org copy shadows the default. The structs here are the
//! payloads both levels share.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondFactorType {
    Otp,
    U2f,
    OtpEmail,
    OtpSms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiFactorType {
    Otp,
    U2f,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPolicy {
    pub allow_username_password: bool,
    pub allow_register: bool,
    pub allow_external_idp: bool,
    #[serde(default)]
    pub force_mfa: bool,
    #[serde(default)]
    pub force_mfa_local_only: bool,
    #[serde(default)]
    pub hide_password_reset: bool,
    #[serde(default)]
    pub ignore_unknown_usernames: bool,
    #[serde(default)]
    pub allow_domain_discovery: bool,
    #[serde(default)]
    pub disable_login_with_email: bool,
    #[serde(default)]
    pub disable_login_with_phone: bool,
    #[serde(default)]
    pub default_redirect_uri: String,
    /// Lifetimes in seconds; zero means instance default.
    #[serde(default)]
    pub password_check_lifetime: u64,
    #[serde(default)]
    pub external_login_check_lifetime: u64,
    #[serde(default)]
    pub mfa_init_skip_lifetime: u64,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            allow_username_password: true,
            allow_register: true,
            allow_external_idp: true,
            force_mfa: false,
            force_mfa_local_only: false,
            hide_password_reset: false,
            ignore_unknown_usernames: false,
            allow_domain_discovery: true,
            disable_login_with_email: false,
            disable_login_with_phone: false,
            default_redirect_uri: String::new(),
            password_check_lifetime: 0,
            external_login_check_lifetime: 0,
            mfa_init_skip_lifetime: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordComplexityPolicy {
    pub min_length: u32,
    pub has_uppercase: bool,
    pub has_lowercase: bool,
    pub has_number: bool,
    pub has_symbol: bool,
}

impl Default for PasswordComplexityPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            has_uppercase: true,
            has_lowercase: true,
            has_number: true,
            has_symbol: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PasswordAgePolicy {
    /// Zero disables expiry.
    pub max_age_days: u32,
    pub expire_warn_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Zero disables the check.
    pub max_password_attempts: u32,
    pub max_otp_attempts: u32,
    pub show_lockout_failure: bool,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_password_attempts: 0,
            max_otp_attempts: 0,
            show_lockout_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PrivacyPolicy {
    #[serde(default)]
    pub tos_link: String,
    #[serde(default)]
    pub privacy_link: String,
    #[serde(default)]
    pub help_link: String,
    #[serde(default)]
    pub support_email: String,
    #[serde(default)]
    pub docs_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LabelPolicy {
    #[serde(default)]
    pub primary_color: String,
    #[serde(default)]
    pub background_color: String,
    #[serde(default)]
    pub warn_color: String,
    #[serde(default)]
    pub font_color: String,
    #[serde(default)]
    pub primary_color_dark: String,
    #[serde(default)]
    pub background_color_dark: String,
    #[serde(default)]
    pub warn_color_dark: String,
    #[serde(default)]
    pub font_color_dark: String,
    #[serde(default)]
    pub hide_login_name_suffix: bool,
    #[serde(default)]
    pub error_msg_popup: bool,
    #[serde(default)]
    pub disable_watermark: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DomainPolicy {
    pub user_login_must_be_domain: bool,
    pub validate_org_domains: bool,
    pub smtp_sender_address_matches_instance_domain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SecurityPolicy {
    pub enable_iframe_embedding: bool,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub enable_impersonation: bool,
}
