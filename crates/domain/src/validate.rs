//! URL validation helpers shared across the domain.

use url::Url;

use idforge_core::{Error, Result};

/// Parse an absolute http(s) URL.
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| {
        Error::invalid_argument("DOMAIN-url1", format!("invalid url: {e}")).with_detail("url", raw)
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::invalid_argument(
            "DOMAIN-url2",
            format!("unsupported url scheme '{other}'"),
        )
        .with_detail("url", raw)),
    }
}

/// Parse an absolute https URL (http allowed for localhost only).
pub fn parse_https_url(raw: &str) -> Result<Url> {
    let url = parse_http_url(raw)?;
    if url.scheme() == "https" || is_localhost(&url) {
        Ok(url)
    } else {
        Err(
            Error::invalid_argument("DOMAIN-url3", "https is required for non-localhost urls")
                .with_detail("url", raw),
        )
    }
}

pub fn is_localhost(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_rule_allows_localhost() {
        assert!(parse_https_url("https://rp.example.com/cb").is_ok());
        assert!(parse_https_url("http://localhost:8080/cb").is_ok());
        assert!(parse_https_url("http://127.0.0.1/cb").is_ok());
        assert!(parse_https_url("http://rp.example.com/cb").is_err());
        assert!(parse_http_url("custom-scheme://cb").is_err());
    }
}
