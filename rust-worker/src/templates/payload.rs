//! Provider payload construction.
//!
//! Produces WhatsApp Cloud API "template" message envelopes. Building is pure:
//! the same template id, language and contact always produce the same payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::contacts::Contact;
use crate::templates::types::Template;

/// Value bound to the body parameter when a contact has no name.
pub const DEFAULT_RECIPIENT_NAME: &str = "Customer";

/// The provider's stock template, which takes no parameters.
pub const STATIC_TEMPLATE: &str = "hello_world";

const MESSAGING_PRODUCT: &str = "whatsapp";

// =============================================================================
// Payload Types
// =============================================================================

/// Message envelope posted to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayload {
    pub messaging_product: String,
    pub recipient_type: RecipientType,
    /// Recipient phone number, digits only
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub template: TemplateMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Template,
}

/// Template reference plus bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub name: String,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Text,
}

impl ProviderPayload {
    fn template(to: &str, name: &str, language_code: &str, components: Vec<Component>) -> Self {
        Self {
            messaging_product: MESSAGING_PRODUCT.to_string(),
            recipient_type: RecipientType::Individual,
            to: to.to_string(),
            kind: MessageKind::Template,
            template: TemplateMessage {
                name: name.to_string(),
                language: Language {
                    code: language_code.to_string(),
                },
                components,
            },
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// How a template binds contact data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateShape {
    /// No parameters
    Static,
    /// One body text parameter bound to the contact's name
    Personalized,
}

/// Outcome of building a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltPayload {
    /// The template id was known to the builder
    Recognized(ProviderPayload),
    /// Unknown id; a personalized envelope was built using the id as the name
    FallbackUsed {
        payload: ProviderPayload,
        original_id: String,
    },
}

impl BuiltPayload {
    pub fn payload(&self) -> &ProviderPayload {
        match self {
            BuiltPayload::Recognized(payload) => payload,
            BuiltPayload::FallbackUsed { payload, .. } => payload,
        }
    }

    pub fn into_payload(self) -> ProviderPayload {
        match self {
            BuiltPayload::Recognized(payload) => payload,
            BuiltPayload::FallbackUsed { payload, .. } => payload,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, BuiltPayload::FallbackUsed { .. })
    }
}

#[derive(Debug, Clone)]
struct KnownTemplate {
    name: String,
    shape: TemplateShape,
}

/// Maps template ids to provider envelopes.
///
/// Knows the stock `hello_world` template plus every template registered from
/// the catalog, addressable by catalog id or by name.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    known: HashMap<String, KnownTemplate>,
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PayloadBuilder {
    /// Builder that only knows the stock template.
    pub fn builtin() -> Self {
        let mut known = HashMap::new();
        known.insert(
            STATIC_TEMPLATE.to_string(),
            KnownTemplate {
                name: STATIC_TEMPLATE.to_string(),
                shape: TemplateShape::Static,
            },
        );
        Self { known }
    }

    /// Builder that knows the stock template and all of `templates`.
    pub fn from_templates(templates: &[Template]) -> Self {
        let mut builder = Self::builtin();
        for template in templates {
            builder.register(template);
        }
        builder
    }

    /// Register a catalog template under its id and its name.
    pub fn register(&mut self, template: &Template) {
        let shape = if template.requires_body_parameters() {
            TemplateShape::Personalized
        } else {
            TemplateShape::Static
        };

        let entry = KnownTemplate {
            name: template.name.clone(),
            shape,
        };

        self.known.insert(template.id.clone(), entry.clone());
        self.known.insert(template.name.clone(), entry);
    }

    pub fn is_recognized(&self, template_id: &str) -> bool {
        self.known.contains_key(template_id)
    }

    /// Build the envelope for one contact.
    ///
    /// Never fails: unknown ids yield [`BuiltPayload::FallbackUsed`] so the
    /// caller decides whether to warn or block.
    pub fn build(&self, template_id: &str, language_code: &str, contact: &Contact) -> BuiltPayload {
        match self.known.get(template_id) {
            Some(known) => {
                let components = match known.shape {
                    TemplateShape::Static => Vec::new(),
                    TemplateShape::Personalized => name_components(contact),
                };
                BuiltPayload::Recognized(ProviderPayload::template(
                    &contact.phone,
                    &known.name,
                    language_code,
                    components,
                ))
            }
            None => BuiltPayload::FallbackUsed {
                payload: ProviderPayload::template(
                    &contact.phone,
                    template_id,
                    language_code,
                    name_components(contact),
                ),
                original_id: template_id.to_string(),
            },
        }
    }
}

fn name_components(contact: &Contact) -> Vec<Component> {
    let name = contact
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_RECIPIENT_NAME.to_string());

    vec![Component {
        kind: ComponentKind::Body,
        parameters: vec![Parameter {
            kind: ParameterKind::Text,
            text: name,
        }],
    }]
}
