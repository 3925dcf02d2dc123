//! In-memory template language generator

use std::collections::HashMap;

use anyhow::{anyhow, bail};
use serde_json::Value;

use super::LanguageGenerator;
use crate::state::memory::get_path;

/// Named templates with `{path}` placeholders
///
/// Placeholders resolve against the render scope, e.g. `{dialog.destination}`.
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator {
    templates: HashMap<String, String>,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template
    pub fn template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    /// Number of registered templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl LanguageGenerator for TemplateGenerator {
    fn render(&self, template_name: &str, scope: &Value) -> anyhow::Result<String> {
        let body = self
            .templates
            .get(template_name)
            .ok_or_else(|| anyhow!("template '{template_name}' is not defined"))?;
        expand(body, scope).map_err(|e| e.context(format!("rendering template '{template_name}'")))
    }
}

fn expand(body: &str, scope: &Value) -> anyhow::Result<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut path = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => path.push(ch),
                        None => bail!("unterminated placeholder '{{{path}'"),
                    }
                }
                let path = path.trim();
                let value = get_path(scope, path)
                    .ok_or_else(|| anyhow!("placeholder '{path}' has no value"))?;
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_placeholders() {
        let generator = TemplateGenerator::new()
            .template("Confirm", "Booking {dialog.destination} from {dialog.origin} ({dialog.seats} seats)");
        let scope = json!({"dialog": {"destination": "Paris", "origin": "London", "seats": 2}});

        assert_eq!(
            generator.render("Confirm", &scope).unwrap(),
            "Booking Paris from London (2 seats)"
        );
    }

    #[test]
    fn test_literal_braces() {
        let generator = TemplateGenerator::new().template("Braces", "{{literal}}");
        assert_eq!(generator.render("Braces", &json!({})).unwrap(), "{literal}");
    }

    #[test]
    fn test_failures() {
        let generator = TemplateGenerator::new().template("Greeting", "Hello {user.name}");

        assert!(generator.render("Missing", &json!({})).is_err());
        let err = generator.render("Greeting", &json!({})).unwrap_err();
        assert!(format!("{err:#}").contains("user.name"));
    }
}
