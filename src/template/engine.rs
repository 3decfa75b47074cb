//! Template engine for rendering user rule fields

use super::context::TemplateContext;
use super::errors::TemplateError;
use super::filters;
use minijinja::{Environment, ErrorKind};
use regex::Regex;
use std::sync::OnceLock;

/// Template rendering engine
///
/// Wraps minijinja with custom filters and strict undefined handling.
/// Trailing newlines are kept, since inserted text often ends with one.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        filters::register_filters(&mut env);
        Self { env }
    }

    /// Render a template string with the given context
    ///
    /// # Example
    ///
    /// ```ignore
    /// let engine = TemplateEngine::new();
    /// let ctx = TemplateContext::new();
    ///
    /// let result = engine.render("platform :ios, '{{ defaults.ios_version }}'", &ctx)?;
    /// assert_eq!(result, "platform :ios, '15.0'");
    /// ```
    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
        // Plain strings are the common case
        if !template.contains("{{") && !template.contains("{%") && !template.contains("{#") {
            return Ok(template.to_string());
        }

        self.env
            .render_str(template, ctx.to_value())
            .map_err(|e| convert_minijinja_error(e, template, ctx))
    }
}

/// Convert a minijinja error to our TemplateError type
fn convert_minijinja_error(
    err: minijinja::Error,
    template: &str,
    ctx: &TemplateContext,
) -> TemplateError {
    let line = err.line().unwrap_or(0);
    let known = ctx.known_variables();

    match err.kind() {
        ErrorKind::UndefinedError => {
            let name = first_unknown_reference(template, &known)
                .unwrap_or_else(|| "unknown".to_string());
            TemplateError::undefined_variable_at(name, line, &known)
        }
        ErrorKind::UnknownFilter => TemplateError::filter("unknown", err.to_string()),
        ErrorKind::SyntaxError => TemplateError::syntax(err.to_string(), line),
        _ => TemplateError::Internal(err),
    }
}

/// First `{{ a.b }}` reference whose dotted path is not a known variable
fn first_unknown_reference(template: &str, known: &[String]) -> Option<String> {
    static REFERENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = REFERENCE
        .get_or_init(|| Regex::new(r"\{\{-?\s*([A-Za-z_][A-Za-z0-9_.]*)").ok())
        .as_ref()?;

    re.captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .find(|name| !known.iter().any(|k| k == name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_string_passes_through() {
        let engine = TemplateEngine::new();
        let ctx = TemplateContext::new();
        let result = engine.render(r"buildSettings = \{[\s\S]*?\};", &ctx).unwrap();
        assert_eq!(result, r"buildSettings = \{[\s\S]*?\};");
    }

    #[test]
    fn test_render_defaults_and_vars() {
        let engine = TemplateEngine::new();
        let mut ctx = TemplateContext::new();
        ctx.vars.insert("team".into(), "ABCDE12345".into());

        let result = engine
            .render(
                "platform :ios, '{{ defaults.ios_version }}' # {{ vars.team }}",
                &ctx,
            )
            .unwrap();
        assert_eq!(result, "platform :ios, '15.0' # ABCDE12345");
    }

    #[test]
    fn test_trailing_newline_kept() {
        let engine = TemplateEngine::new();
        let ctx = TemplateContext::new();
        let result = engine
            .render("\tSDKROOT = {{ 'iphoneos' }};\n", &ctx)
            .unwrap();
        assert_eq!(result, "\tSDKROOT = iphoneos;\n");
    }

    #[test]
    fn test_undefined_variable_suggests() {
        let engine = TemplateEngine::new();
        let mut ctx = TemplateContext::new();
        ctx.vars.insert("team".into(), "ABCDE12345".into());

        let err = engine.render("{{ vars.teem }}", &ctx).unwrap_err();
        match err {
            TemplateError::UndefinedVariable {
                name, suggestion, ..
            } => {
                assert_eq!(name, "vars.teem");
                assert_eq!(suggestion.as_deref(), Some("vars.team"));
            }
            other => panic!("expected undefined variable, got {:?}", other),
        }
    }

    #[test]
    fn test_filters_available() {
        let engine = TemplateEngine::new();
        let ctx = TemplateContext::new();
        let result = engine
            .render("{{ defaults.cxx_standard | pbx_quote }}", &ctx)
            .unwrap();
        assert_eq!(result, "\"c++14\"");
    }

    #[test]
    fn test_first_unknown_reference() {
        let known = vec!["paths.podfile".to_string()];
        assert_eq!(
            first_unknown_reference("{{ paths.podfile }} {{ vars.x }}", &known),
            Some("vars.x".to_string())
        );
        assert_eq!(first_unknown_reference("{{ paths.podfile }}", &known), None);
    }
}
