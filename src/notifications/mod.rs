//! Owner notification messages
//!
//! Renders the direct message sent to a server owner when the loop could
//! not find or create a working invite. The text comes from a Handlebars
//! template; the built-in one lives in `templates/update_request.hbs` and
//! can be replaced from configuration.

use anyhow::{Context, Result};
use handlebars::{no_escape, Handlebars};
use serde::Serialize;

use crate::config::NotificationConfig;
use crate::models::Group;

/// Built-in update request template
const DEFAULT_TEMPLATE: &str = include_str!("../../templates/update_request.hbs");

const TEMPLATE_NAME: &str = "update_request";

/// Template data for an update request
#[derive(Debug, Serialize)]
struct UpdateRequestData<'a> {
    server_id: &'a str,
    server_name: &'a str,
    site_url: &'a str,
}

/// Renders owner notifications
pub struct MessageRenderer {
    handlebars: Handlebars<'static>,
    site_url: String,
}

impl MessageRenderer {
    /// Create a renderer from configuration
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(no_escape);
        handlebars.set_strict_mode(true);

        let template = config.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        handlebars
            .register_template_string(TEMPLATE_NAME, template)
            .context("Failed to register update request template")?;

        Ok(Self {
            handlebars,
            site_url: config.site_url.clone(),
        })
    }

    /// Render the request asking an owner for a new invite
    pub fn update_request(&self, group: &Group) -> Result<String> {
        let data = UpdateRequestData {
            server_id: &group.id,
            server_name: group.name.trim(),
            site_url: &self.site_url,
        };

        self.handlebars
            .render(TEMPLATE_NAME, &data)
            .context("Failed to render update request template")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        let renderer = MessageRenderer::new(&NotificationConfig::default()).unwrap();
        let text = renderer
            .update_request(&Group::new("123", "  Rust Lounge ", "42"))
            .unwrap();

        assert!(text.contains("(Rust Lounge)"));
        assert!(text.contains("update 123 <new invite url>"));
        assert!(text.contains("<http://discordservers.com>"));
        assert!(text.contains("|delist"));
    }

    #[test]
    fn test_custom_template() {
        let config = NotificationConfig {
            template: Some("{{server_name}} needs an invite, see {{site_url}}".to_string()),
            site_url: "https://example.com".to_string(),
            ..Default::default()
        };
        let renderer = MessageRenderer::new(&config).unwrap();

        let text = renderer.update_request(&Group::new("1", "Lounge", "42")).unwrap();
        assert_eq!(text, "Lounge needs an invite, see https://example.com");
    }

    #[test]
    fn test_invalid_template_rejected() {
        let config = NotificationConfig {
            template: Some("{{#if}}".to_string()),
            ..Default::default()
        };
        assert!(MessageRenderer::new(&config).is_err());
    }

    #[test]
    fn test_unknown_field_fails_in_strict_mode() {
        let config = NotificationConfig {
            template: Some("{{owner_name}}".to_string()),
            ..Default::default()
        };
        let renderer = MessageRenderer::new(&config).unwrap();
        assert!(renderer.update_request(&Group::new("1", "Lounge", "42")).is_err());
    }
}
