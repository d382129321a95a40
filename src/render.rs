//! Logic-light template rendering.
//!
//! Templates use mustache-style `{{var}}` interpolation. Rendering runs in
//! non-strict mode: missing variables produce an empty string, never an
//! error. Malformed template syntax does fail, and propagates as a job
//! failure.

use handlebars::Handlebars;

use crate::error::RenderError;
use crate::types::Template;

/// Reusable template renderer.
pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        // Non-strict mode is the default: unknown variables render empty.
        Self {
            registry: Handlebars::new(),
        }
    }

    /// Render a template string against a JSON data map.
    pub fn render(&self, template: &str, data: &serde_json::Value) -> Result<String, RenderError> {
        self.registry
            .render_template(template, data)
            .map_err(|e| RenderError::Template(e.to_string()))
    }

    /// Render a stored template's subject, html, and optional text parts.
    pub fn render_message(
        &self,
        template: &Template,
        data: &serde_json::Value,
    ) -> Result<(String, String, Option<String>), RenderError> {
        let subject = self.render(&template.subject, data)?;
        let html = self.render(&template.html, data)?;
        let text = match &template.text {
            Some(text) => Some(self.render(text, data)?),
            None => None,
        };
        Ok((subject, html, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_variables() {
        let renderer = Renderer::new();
        let out = renderer
            .render("Hello {{name}}, your code is {{code}}", &json!({"name": "Ada", "code": 42}))
            .unwrap();
        assert_eq!(out, "Hello Ada, your code is 42");
    }

    #[test]
    fn missing_variables_render_empty() {
        let renderer = Renderer::new();
        let out = renderer.render("Hello {{name}}!", &json!({})).unwrap();
        assert_eq!(out, "Hello !");
    }

    #[test]
    fn malformed_template_is_an_error() {
        let renderer = Renderer::new();
        assert!(renderer.render("{{#if}}", &json!({})).is_err());
    }

    #[test]
    fn renders_all_parts_of_a_stored_template() {
        let renderer = Renderer::new();
        let template = Template {
            id: crate::types::TemplateId::new("welcome"),
            tenant_id: crate::types::TenantId::new("t1"),
            subject: "Welcome {{name}}".to_string(),
            html: "<p>Hello {{name}}</p>".to_string(),
            text: None,
        };

        let (subject, html, text) = renderer
            .render_message(&template, &json!({"name": "Ada"}))
            .unwrap();
        assert_eq!(subject, "Welcome Ada");
        assert_eq!(html, "<p>Hello Ada</p>");
        assert!(text.is_none());
    }
}
