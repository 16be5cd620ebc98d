//! Remote API description loader with an in-memory cache

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, error, info};

use super::model::{ApiDescription, SpecInfo};
use crate::{Error, Result};

/// Fetches, validates and caches the API description document
pub struct SpecSource {
    /// Description document URL
    url: String,
    /// Shared HTTP client
    client: Client,
    /// Headers sent with every fetch (credential, when configured)
    auth_headers: HeaderMap,
    /// Last successfully loaded description
    cached: RwLock<Option<Arc<ApiDescription>>>,
}

impl SpecSource {
    /// Create a loader for `url`
    #[must_use]
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
            auth_headers: HeaderMap::new(),
            cached: RwLock::new(None),
        }
    }

    /// Attach headers to every fetch
    #[must_use]
    pub fn with_auth_headers(mut self, headers: HeaderMap) -> Self {
        self.auth_headers = headers;
        self
    }

    /// Description document URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch, validate and cache the description
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpecLoad`] with kind `Network` if the request fails
    /// or answers non-2xx, and kind `Validation` if the document cannot be
    /// parsed or fails validation. The cache is left untouched on failure.
    pub async fn load(&self) -> Result<Arc<ApiDescription>> {
        info!(
            url = %self.url,
            has_auth = !self.auth_headers.is_empty(),
            "Loading API description"
        );

        match self.fetch(&self.url).await {
            Ok(doc) => {
                let doc = Arc::new(doc);
                *self.cached.write() = Some(Arc::clone(&doc));
                info!(
                    title = %doc.title,
                    version = %doc.version,
                    paths = doc.paths.len(),
                    "API description loaded"
                );
                Ok(doc)
            }
            Err(e) => {
                error!(url = %self.url, error = %e, "Failed to load API description");
                Err(e)
            }
        }
    }

    /// Cached description, loading it on first use
    ///
    /// # Errors
    ///
    /// Propagates [`SpecSource::load`] failures.
    pub async fn get(&self) -> Result<Arc<ApiDescription>> {
        if let Some(doc) = self.cached() {
            return Ok(doc);
        }
        self.load().await
    }

    /// Cached description without touching the network
    #[must_use]
    pub fn cached(&self) -> Option<Arc<ApiDescription>> {
        self.cached.read().clone()
    }

    /// Report whether the remote `info.version` differs from the current one
    ///
    /// The comparison document is fetched from `alternate_url` or, when
    /// absent, the configured URL again. It is never cached.
    ///
    /// # Errors
    ///
    /// Propagates load failures of either document.
    pub async fn detect_changes(&self, alternate_url: Option<&str>) -> Result<bool> {
        let current = self.get().await?;
        let url = alternate_url.unwrap_or(&self.url);
        let candidate = self.fetch(url).await?;

        let changed = current.version != candidate.version;
        debug!(
            current = %current.version,
            candidate = %candidate.version,
            url = %url,
            changed,
            "Compared API description versions"
        );
        Ok(changed)
    }

    /// Drop the cached description; the next [`SpecSource::get`] refetches
    pub fn clear_cache(&self) {
        *self.cached.write() = None;
        debug!("API description cache cleared");
    }

    /// Title, version and path count of the cached description
    #[must_use]
    pub fn info(&self) -> Option<SpecInfo> {
        self.cached.read().as_ref().map(|doc| doc.info())
    }

    /// Check the required top-level fields of a raw document
    ///
    /// Never fails; logs the first missing field and returns `false`.
    #[must_use]
    pub fn validate_structure(doc: &Value) -> bool {
        match structure_issue(doc) {
            None => {
                debug!("API description structure validation passed");
                true
            }
            Some(issue) => {
                error!(error = issue, "API description structure validation failed");
                false
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<ApiDescription> {
        let response = self
            .client
            .get(url)
            .headers(self.auth_headers.clone())
            .send()
            .await
            .map_err(|e| Error::spec_network(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::spec_network(format!("{url} returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::spec_network(format!("Failed to read body from {url}: {e}")))?;

        parse_document(&body)
    }
}

/// Parse and validate a description document body (JSON, or YAML)
///
/// # Errors
///
/// Returns a `Validation` spec-load error describing the first structural
/// problem or every semantic problem found.
pub fn parse_document(body: &str) -> Result<ApiDescription> {
    let raw: Value = serde_json::from_str(body)
        .or_else(|_| serde_yaml::from_str(body))
        .map_err(|e| Error::spec_validation(format!("Document is neither JSON nor YAML: {e}")))?;

    if !SpecSource::validate_structure(&raw) {
        let issue = structure_issue(&raw).unwrap_or("invalid structure");
        return Err(Error::spec_validation(issue));
    }

    let doc = ApiDescription::from_value(raw)?;

    let issues = doc.semantic_issues();
    if !issues.is_empty() {
        return Err(Error::spec_validation(issues.join("; ")));
    }
    Ok(doc)
}

fn structure_issue(doc: &Value) -> Option<&'static str> {
    if doc.get("openapi").is_none() && doc.get("swagger").is_none() {
        return Some("Missing OpenAPI/Swagger version");
    }
    let Some(info) = doc.get("info").filter(|i| i.is_object()) else {
        return Some("Missing info section");
    };
    if info.get("title").is_none() || info.get("version").is_none() {
        return Some("Missing required info fields (title, version)");
    }
    if !doc.get("paths").is_some_and(Value::is_object) {
        return Some("Missing paths section");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpecLoadKind;
    use serde_json::json;

    #[test]
    fn structure_requires_each_field() {
        let valid = json!({"openapi": "3.0.0", "info": {"title": "t", "version": "1"}, "paths": {}});
        assert!(SpecSource::validate_structure(&valid));

        let cases = [
            (json!({"info": {"title": "t", "version": "1"}, "paths": {}}), "version"),
            (json!({"swagger": "2.0", "paths": {}}), "info section"),
            (json!({"swagger": "2.0", "info": {"title": "t"}, "paths": {}}), "title, version"),
            (json!({"swagger": "2.0", "info": {"title": "t", "version": "1"}}), "paths"),
        ];
        for (doc, expected) in cases {
            assert!(!SpecSource::validate_structure(&doc));
            assert!(structure_issue(&doc).unwrap().contains(expected));
        }
    }

    #[test]
    fn parse_accepts_yaml() {
        let doc = parse_document(
            "openapi: 3.0.0\ninfo:\n  title: YAML\n  version: '7'\npaths:\n  /a:\n    get:\n      operationId: a\n",
        )
        .unwrap();
        assert_eq!(doc.title, "YAML");
        assert_eq!(doc.version, "7");
    }

    #[test]
    fn parse_rejects_invalid_documents_as_validation() {
        let err = parse_document(r#"{"openapi": "3.0.0", "info": {"title": "t", "version": "1"}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SpecLoad {
                kind: SpecLoadKind::Validation,
                ..
            }
        ));
    }
}
