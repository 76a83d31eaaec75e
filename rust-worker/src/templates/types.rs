//! Template metadata as returned by the catalog.

use serde::{Deserialize, Serialize};

/// A provider-approved outbound message template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Catalog identifier
    pub id: String,
    /// Template name registered with the provider
    pub name: String,
    /// Provider category (MARKETING, UTILITY, ...)
    #[serde(default)]
    pub category: String,
    /// Language code, e.g. "en_US"
    #[serde(default)]
    pub language: String,
    /// Approval state (APPROVED, PENDING, REJECTED)
    #[serde(default)]
    pub status: String,
    /// Body text, with `{{1}}`-style positional placeholders
    #[serde(default)]
    pub content: String,
    /// Optional header text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Optional call-to-action buttons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<TemplateButton>>,
}

/// Button attached to a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateButton {
    /// Button type (QUICK_REPLY, URL, PHONE_NUMBER)
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl Template {
    /// Placeholder for a template id the catalog does not list.
    ///
    /// Campaigns are still allowed to run against such ids; the payload
    /// builder reports them as a fallback.
    pub fn unlisted(id: &str, language: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            category: String::new(),
            language: language.to_string(),
            status: "UNKNOWN".to_string(),
            content: String::new(),
            header: None,
            buttons: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status.eq_ignore_ascii_case("approved")
    }

    /// Number of distinct `{{n}}` placeholders in the body.
    pub fn placeholder_count(&self) -> usize {
        let mut seen: Vec<&str> = Vec::new();
        let mut rest = self.content.as_str();

        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let inner = after[..end].trim();
                    if !inner.is_empty()
                        && inner.chars().all(|c| c.is_ascii_digit())
                        && !seen.contains(&inner)
                    {
                        seen.push(inner);
                    }
                    rest = &after[end + 2..];
                }
                None => break,
            }
        }

        seen.len()
    }

    /// Whether the body needs parameters bound at send time.
    pub fn requires_body_parameters(&self) -> bool {
        self.placeholder_count() > 0
    }
}
