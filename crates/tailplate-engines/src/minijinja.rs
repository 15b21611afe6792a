//! MiniJinja adapter
//!
//! Inline templates have no file extension to pick an escaping mode from,
//! so HTML auto-escaping is forced on for all of them and output goes
//! through the shared escaper instead of MiniJinja's own.

use std::fmt::Write;

use ::minijinja::{
    escape_formatter, AutoEscape, Environment, Error, ErrorKind, Output, State, UndefinedBehavior,
    Value,
};
use tailplate_core::{
    escape::escape_html, BoxError, CompiledTemplate, InlineConfig, RenderContext, TemplateEngine,
};

use tracing::trace;

use crate::TEMPLATE_NAME;

/// Compiles inline templates with MiniJinja
#[derive(Debug, Clone)]
pub struct MiniJinjaEngine {
    strict: bool,
}

impl MiniJinjaEngine {
    /// Strict engine: undefined variables fail the render
    pub fn new() -> Self {
        Self { strict: true }
    }

    pub fn from_config(config: &InlineConfig) -> Self {
        Self {
            strict: config.strict_variables,
        }
    }

    /// Render undefined variables as empty instead of failing
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_formatter(format_escaped);
        if self.strict {
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        }
        env
    }
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledTemplate>, BoxError> {
        let mut env = self.environment();
        env.add_template_owned(TEMPLATE_NAME, source.to_owned())?;
        trace!(bytes = source.len(), strict = self.strict, "Compiled minijinja template");
        Ok(Box::new(MiniJinjaTemplate { env }))
    }
}

/// One compiled template, owned by its own environment
struct MiniJinjaTemplate {
    env: Environment<'static>,
}

impl CompiledTemplate for MiniJinjaTemplate {
    fn render(&self, context: &RenderContext) -> Result<String, BoxError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        Ok(template.render(context.scope())?)
    }
}

/// Escapes with [`escape_html`] unless the value is marked safe
fn format_escaped(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    if value.is_safe()
        || value.is_undefined()
        || value.is_none()
        || matches!(state.auto_escape(), AutoEscape::None)
    {
        return escape_formatter(out, state, value);
    }

    out.write_str(&escape_html(&value.to_string()))
        .map_err(|_| Error::new(ErrorKind::WriteFailure, "failed to write template output"))
}
