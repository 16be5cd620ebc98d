//! API-key credential handling
//!
//! # Security
//!
//! - The raw key is never logged or included in error messages; use
//!   [`CredentialProvider::mask`] for diagnostics
//! - Header values are marked sensitive so they are redacted from `Debug`
//!   output of outbound requests
//! - A missing key is not an error: requests proceed unauthenticated and the
//!   remote decides

use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, info, warn};

use crate::{Error, Result};

/// Header the Portal da Transparência expects the key in
pub const DEFAULT_HEADER_NAME: &str = "chave-api-dados";

/// Upper bound for [`CredentialProvider::test_remote`]
pub const REMOTE_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum length accepted by [`CredentialProvider::validate_format`]
const MIN_KEY_LEN: usize = 10;

/// Holds the optional API key and turns it into request headers
pub struct CredentialProvider {
    key: RwLock<Option<String>>,
    header_name: RwLock<String>,
    test_endpoint: String,
    client: Client,
}

impl CredentialProvider {
    /// Create a provider with no key
    #[must_use]
    pub fn new(client: Client, test_endpoint: impl Into<String>) -> Self {
        Self {
            key: RwLock::new(None),
            header_name: RwLock::new(DEFAULT_HEADER_NAME.to_string()),
            test_endpoint: test_endpoint.into(),
            client,
        }
    }

    /// Seed the key from configuration; blank values count as absent
    #[must_use]
    pub fn with_key(self, key: Option<String>) -> Self {
        *self.key.write() = key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }

    /// Use a different header name
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredential`] if the name is blank or not a
    /// valid HTTP header name.
    pub fn with_header_name(self, name: &str) -> Result<Self> {
        self.set_header_name(name)?;
        Ok(self)
    }

    /// Replace the stored key
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredential`] if the key is empty or
    /// whitespace only.
    pub fn set_key(&self, key: &str) -> Result<()> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidCredential("API key cannot be empty".to_string()));
        }
        *self.key.write() = Some(trimmed.to_string());
        info!("API key updated");
        Ok(())
    }

    /// Forget the stored key
    pub fn clear_key(&self) {
        *self.key.write() = None;
        info!("API key cleared");
    }

    /// Whether a key is stored
    #[must_use]
    pub fn has_key(&self) -> bool {
        self.key.read().is_some()
    }

    /// Current header name
    #[must_use]
    pub fn header_name(&self) -> String {
        self.header_name.read().clone()
    }

    /// Change the header name
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCredential`] if the name is blank or not a
    /// valid HTTP header name.
    pub fn set_header_name(&self, name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidCredential("Header name cannot be empty".to_string()));
        }
        HeaderName::from_bytes(trimmed.as_bytes()).map_err(|_| {
            Error::InvalidCredential(format!("Invalid header name: {trimmed}"))
        })?;
        *self.header_name.write() = trimmed.to_string();
        info!(header_name = %trimmed, "Authentication header name updated");
        Ok(())
    }

    /// Headers carrying the credential
    ///
    /// Uses `override_key` when given, else the stored key. Returns an empty
    /// map when no key is available; callers proceed unauthenticated.
    #[must_use]
    pub fn headers(&self, override_key: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let Some(key) = self.resolve(override_key) else {
            debug!("No API key configured, sending request unauthenticated");
            return headers;
        };

        let name = self.header_name();
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(header_name = %name, "Invalid authentication header name");
            return headers;
        };
        match HeaderValue::from_str(&key) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(header_name, value);
            }
            Err(_) => warn!("API key contains characters not allowed in a header"),
        }
        headers
    }

    /// Basic format check: at least 10 characters of `[A-Za-z0-9_-]`
    #[must_use]
    pub fn validate_format(&self, key: Option<&str>) -> bool {
        let Some(key) = self.resolve(key) else {
            debug!("API key validation failed: no key provided");
            return false;
        };
        if key.len() < MIN_KEY_LEN {
            debug!("API key validation failed: key too short");
            return false;
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            debug!("API key validation failed: invalid format");
            return false;
        }
        debug!("API key validation passed");
        true
    }

    /// Probe the test endpoint with the key
    ///
    /// Returns `true` only on HTTP 200. Every failure (no key, rejected
    /// key, other status, network error, timeout) yields `false`; they differ
    /// only in what gets logged.
    pub async fn test_remote(&self, key: Option<&str>) -> bool {
        if self.resolve(key).is_none() {
            warn!("Cannot test API key: no key provided");
            return false;
        }

        info!(endpoint = %self.test_endpoint, "Testing API key");
        let result = self
            .client
            .get(&self.test_endpoint)
            .headers(self.headers(key))
            .timeout(REMOTE_TEST_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                match status {
                    200 => {
                        info!("API key test successful");
                        true
                    }
                    401 | 403 => {
                        warn!(status, "API key test failed: credential rejected");
                        false
                    }
                    _ => {
                        warn!(status, "API key test failed");
                        false
                    }
                }
            }
            Err(e) => {
                error!(error = %e, timeout = e.is_timeout(), "API key test failed: network error");
                false
            }
        }
    }

    /// Key with all but the first and last four characters hidden
    ///
    /// `None` without a key; `"****"` for keys of 8 characters or fewer.
    #[must_use]
    pub fn mask(&self) -> Option<String> {
        self.key.read().as_deref().map(mask_key)
    }

    fn resolve(&self, override_key: Option<&str>) -> Option<String> {
        override_key
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| self.key.read().clone())
    }
}

/// Mask a key for display
#[must_use]
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();
    format!("{start}{}{end}", "*".repeat(chars.len() - 8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CredentialProvider {
        CredentialProvider::new(Client::new(), "http://127.0.0.1:9/v3/api-docs")
    }

    #[test]
    fn set_key_trims_and_rejects_blank() {
        let p = provider();
        assert!(matches!(p.set_key("   "), Err(Error::InvalidCredential(_))));
        assert!(matches!(p.set_key(""), Err(Error::InvalidCredential(_))));
        assert!(!p.has_key());

        p.set_key("  abc123  ").unwrap();
        let headers = p.headers(None);
        assert_eq!(headers.get(DEFAULT_HEADER_NAME).unwrap(), "abc123");
    }

    #[test]
    fn headers_empty_without_key() {
        let p = provider();
        assert!(p.headers(None).is_empty());
    }

    #[test]
    fn override_key_wins() {
        let p = provider().with_key(Some("stored-key-000".into()));
        let headers = p.headers(Some("override-key-111"));
        assert_eq!(headers.get(DEFAULT_HEADER_NAME).unwrap(), "override-key-111");
        assert!(headers.get(DEFAULT_HEADER_NAME).unwrap().is_sensitive());
    }

    #[test]
    fn blank_configured_key_is_absent() {
        assert!(!provider().with_key(Some("  ".into())).has_key());
    }

    #[test]
    fn custom_header_name() {
        let p = provider()
            .with_key(Some("k".into()))
            .with_header_name("X-Api-Key")
            .unwrap();
        assert!(p.headers(None).contains_key("x-api-key"));
        assert!(p.set_header_name(" ").is_err());
        assert!(p.set_header_name("bad header").is_err());
        assert_eq!(p.header_name(), "X-Api-Key");
    }

    #[test]
    fn format_validation() {
        let p = provider();
        assert!(!p.validate_format(None));
        assert!(!p.validate_format(Some("short")));
        assert!(!p.validate_format(Some("has spaces in it")));
        assert!(!p.validate_format(Some("semi;colon;key")));
        assert!(p.validate_format(Some("abc-DEF_123456")));

        p.set_key("0123456789abcdef").unwrap();
        assert!(p.validate_format(None));
    }

    #[test]
    fn masking() {
        let p = provider();
        assert_eq!(p.mask(), None);

        p.set_key("12345678").unwrap();
        assert_eq!(p.mask().as_deref(), Some("****"));

        let key = "very-long-api-key-12345";
        p.set_key(key).unwrap();
        let masked = p.mask().unwrap();
        assert!(masked.starts_with("very"));
        assert!(masked.ends_with("2345"));
        assert_eq!(masked.len(), key.len());
        assert!(masked[4..masked.len() - 4].chars().all(|c| c == '*'));
    }

    #[test]
    fn clear_key() {
        let p = provider().with_key(Some("something-long".into()));
        assert!(p.has_key());
        p.clear_key();
        assert!(!p.has_key());
        assert!(p.headers(None).is_empty());
    }

    #[tokio::test]
    async fn remote_test_without_key_is_false() {
        assert!(!provider().test_remote(None).await);
    }
}
