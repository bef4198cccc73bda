//! Webhook targets.

use serde::{Deserialize, Serialize};

use idforge_core::{Error, Result};

use crate::validate::parse_http_url;

/// Upper bound on a target call timeout.
pub const MAX_TARGET_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Fire and forget; response ignored.
    Webhook,
    /// Synchronous call; response can rewrite the request.
    Call,
    /// Queued for asynchronous delivery.
    Async,
}

/// Validate a target endpoint and timeout.
pub fn validate_target(endpoint: &str, timeout_ms: u64) -> Result<()> {
    parse_http_url(endpoint)?;
    if timeout_ms == 0 || timeout_ms > MAX_TARGET_TIMEOUT_MS {
        return Err(Error::invalid_argument(
            "DOMAIN-tgt1",
            format!("timeout must be within (0, {MAX_TARGET_TIMEOUT_MS}] ms"),
        )
        .with_detail("timeout_ms", timeout_ms.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_bounds() {
        assert!(validate_target("https://hooks.example.com", 1).is_ok());
        assert!(validate_target("https://hooks.example.com", 300_000).is_ok());
        assert!(validate_target("https://hooks.example.com", 0).is_err());
        assert!(validate_target("https://hooks.example.com", 300_001).is_err());
    }
}
