//! Template catalog lookup with in-memory caching.
//!
//! The catalog is fetched once and cached. Any failure degrades to a built-in
//! template list plus a warning; it never blocks template selection.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::templates::payload::STATIC_TEMPLATE;
use crate::templates::types::Template;

/// `source` reported for the built-in fallback list.
pub const FALLBACK_SOURCE: &str = "builtin";

/// Response body of the catalog endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Templates available for a campaign, plus any warning for the operator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub templates: Vec<Template>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl CatalogSnapshot {
    /// Built-in list used when the catalog is unavailable.
    pub fn fallback(warning: impl Into<String>) -> Self {
        Self {
            templates: vec![Template {
                id: STATIC_TEMPLATE.to_string(),
                name: STATIC_TEMPLATE.to_string(),
                category: "UTILITY".to_string(),
                language: "en_US".to_string(),
                status: "APPROVED".to_string(),
                content: "Hello World".to_string(),
                header: None,
                buttons: None,
            }],
            source: FALLBACK_SOURCE.to_string(),
            warning: Some(warning.into()),
        }
    }

    /// Interpret a catalog response body.
    pub fn from_response(response: CatalogResponse) -> Self {
        if response.templates.is_empty() {
            let reason = response
                .error
                .unwrap_or_else(|| "Template catalog returned no templates".to_string());
            return Self::fallback(reason);
        }

        Self {
            templates: response.templates,
            source: response.source.unwrap_or_else(|| "catalog".to_string()),
            warning: response.error,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == FALLBACK_SOURCE
    }

    /// Look up a template by catalog id, then by name.
    pub fn find(&self, id_or_name: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.id == id_or_name)
            .or_else(|| self.templates.iter().find(|t| t.name == id_or_name))
    }

    /// First approved template, or the first template at all.
    pub fn default_template(&self) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.is_approved())
            .or_else(|| self.templates.first())
    }
}

/// Read-only client for the template catalog endpoint.
pub struct TemplateCatalog {
    client: Client,
    url: String,
    cached: RwLock<Option<Arc<CatalogSnapshot>>>,
}

impl TemplateCatalog {
    pub fn new(client: Client, url: String) -> Self {
        Self {
            client,
            url,
            cached: RwLock::new(None),
        }
    }

    /// Cached snapshot, fetching it on first use.
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        {
            let cached = self.cached.read().await;
            if let Some(snapshot) = cached.as_ref() {
                return Arc::clone(snapshot);
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(snapshot) = cached.as_ref() {
            return Arc::clone(snapshot);
        }

        let snapshot = Arc::new(self.fetch().await);
        *cached = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Drop the cached snapshot and fetch again.
    pub async fn refresh(&self) -> Arc<CatalogSnapshot> {
        let mut cached = self.cached.write().await;
        let snapshot = Arc::new(self.fetch().await);
        *cached = Some(Arc::clone(&snapshot));
        snapshot
    }

    async fn fetch(&self) -> CatalogSnapshot {
        info!(url = %self.url, "catalog_fetch_starting");

        let response = match self.client.get(&self.url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = %self.url, error = %e, "catalog_fetch_failed");
                return CatalogSnapshot::fallback(format!(
                    "Could not reach template catalog: {}",
                    e
                ));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(status_code = status.as_u16(), error = %e, "catalog_body_read_failed");
                return CatalogSnapshot::fallback(format!(
                    "Template catalog response could not be read: {}",
                    e
                ));
            }
        };

        let parsed: Result<CatalogResponse, _> = serde_json::from_str(&body);

        let snapshot = match parsed {
            Ok(mut parsed) => {
                if !status.is_success() && parsed.error.is_none() {
                    parsed.error = Some(format!("Template catalog returned HTTP {}", status.as_u16()));
                }
                CatalogSnapshot::from_response(parsed)
            }
            Err(e) => {
                warn!(
                    status_code = status.as_u16(),
                    error = %e,
                    body_preview = %body.chars().take(200).collect::<String>(),
                    "catalog_parse_failed"
                );
                CatalogSnapshot::fallback(format!(
                    "Template catalog returned an unreadable response (HTTP {})",
                    status.as_u16()
                ))
            }
        };

        if snapshot.is_fallback() {
            warn!(
                warning = ?snapshot.warning,
                "catalog_fallback_used"
            );
        } else {
            info!(
                templates = snapshot.templates.len(),
                source = %snapshot.source,
                warning = ?snapshot.warning,
                "catalog_fetch_complete"
            );
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalog_body() -> serde_json::Value {
        serde_json::json!({
            "templates": [
                {"id": "1", "name": "draft_offer", "status": "PENDING", "content": "Hi {{1}}"},
                {"id": "2", "name": "welcome", "status": "APPROVED", "content": "Hi {{1}}"}
            ],
            "source": "meta"
        })
    }

    #[test]
    fn test_from_response_with_templates() {
        let response: CatalogResponse = serde_json::from_value(catalog_body()).unwrap();
        let snapshot = CatalogSnapshot::from_response(response);

        assert!(!snapshot.is_fallback());
        assert_eq!(snapshot.source, "meta");
        assert_eq!(snapshot.templates.len(), 2);
        assert!(snapshot.warning.is_none());
    }

    #[test]
    fn test_from_response_error_without_templates() {
        let response = CatalogResponse {
            templates: vec![],
            source: None,
            error: Some("token expired".to_string()),
        };
        let snapshot = CatalogSnapshot::from_response(response);

        assert!(snapshot.is_fallback());
        assert_eq!(snapshot.warning.as_deref(), Some("token expired"));
        assert_eq!(snapshot.templates[0].name, STATIC_TEMPLATE);
    }

    #[test]
    fn test_find_and_default() {
        let response: CatalogResponse = serde_json::from_value(catalog_body()).unwrap();
        let snapshot = CatalogSnapshot::from_response(response);

        assert_eq!(snapshot.find("2").unwrap().name, "welcome");
        assert_eq!(snapshot.find("draft_offer").unwrap().id, "1");
        assert!(snapshot.find("missing").is_none());
        assert_eq!(snapshot.default_template().unwrap().name, "welcome");
    }

    #[tokio::test]
    async fn test_snapshot_fetches_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/templates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = TemplateCatalog::new(Client::new(), format!("{}/templates", server.uri()));

        let first = catalog.snapshot().await;
        let second = catalog.snapshot().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.templates.len(), 2);
    }

    #[tokio::test]
    async fn test_http_error_falls_back() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let catalog = TemplateCatalog::new(Client::new(), server.uri());
        let snapshot = catalog.snapshot().await;

        assert!(snapshot.is_fallback());
        assert!(snapshot.warning.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_http_error_with_templates_keeps_them() {
        let server = MockServer::start().await;

        let mut body = catalog_body();
        body["error"] = serde_json::json!("served from stale cache");

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(body))
            .mount(&server)
            .await;

        let catalog = TemplateCatalog::new(Client::new(), server.uri());
        let snapshot = catalog.snapshot().await;

        assert!(!snapshot.is_fallback());
        assert_eq!(snapshot.warning.as_deref(), Some("served from stale cache"));
    }

    #[tokio::test]
    async fn test_unreachable_catalog_falls_back() {
        // Port 1 is reserved and refuses connections
        let catalog = TemplateCatalog::new(Client::new(), "http://127.0.0.1:1/templates".to_string());
        let snapshot = catalog.snapshot().await;

        assert!(snapshot.is_fallback());
        assert!(snapshot
            .warning
            .as_deref()
            .unwrap()
            .starts_with("Could not reach template catalog"));
    }
}
