//! Handlebars adapter

use ::handlebars::Handlebars;
use tailplate_core::{
    escape::escape_html, BoxError, CompiledTemplate, InlineConfig, RenderContext, TemplateEngine,
};

use tracing::trace;

use crate::TEMPLATE_NAME;

/// Compiles inline templates with Handlebars
#[derive(Debug, Clone)]
pub struct HandlebarsEngine {
    strict: bool,
}

impl HandlebarsEngine {
    /// Strict engine: missing variables fail the render
    pub fn new() -> Self {
        Self { strict: true }
    }

    pub fn from_config(config: &InlineConfig) -> Self {
        Self {
            strict: config.strict_variables,
        }
    }

    /// Render missing variables as empty instead of failing
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }
}

impl Default for HandlebarsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for HandlebarsEngine {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTemplate>, BoxError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(self.strict);
        registry.register_escape_fn(escape_html);
        registry.register_template_string(TEMPLATE_NAME, source)?;
        trace!(bytes = source.len(), strict = self.strict, "Compiled handlebars template");
        Ok(Box::new(HandlebarsTemplate { registry }))
    }
}

/// One compiled template, owned by its own registry
struct HandlebarsTemplate {
    registry: Handlebars<'static>,
}

impl CompiledTemplate for HandlebarsTemplate {
    fn render(&self, context: &RenderContext) -> Result<String, BoxError> {
        Ok(self.registry.render(TEMPLATE_NAME, context.scope())?)
    }
}
