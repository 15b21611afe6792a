//! Engine registry
//!
//! Engines are pluggable compilers identified by a symbolic name. A compiled
//! template is an opaque, pure function from [`RenderContext`] to string.

use std::{collections::HashMap, fmt, sync::Arc};

use tracing::debug;

use crate::{call_site::CallSite, context::RenderContext, error::InlineError, Result};

/// Boxed engine error carried inside compile and render failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Output of an engine's compile step
pub trait CompiledTemplate: Send + Sync {
    /// Evaluate the template against `context`
    fn render(&self, context: &RenderContext) -> std::result::Result<String, BoxError>;
}

impl<F> CompiledTemplate for F
where
    F: Fn(&RenderContext) -> std::result::Result<String, BoxError> + Send + Sync,
{
    fn render(&self, context: &RenderContext) -> std::result::Result<String, BoxError> {
        self(context)
    }
}

/// A template compiler
///
/// Implementations must escape interpolated values with
/// [`crate::escape::escape_html`] unless the engine's own syntax marks them
/// as safe.
pub trait TemplateEngine: Send + Sync {
    /// Compile raw template text
    fn compile(&self, source: &str) -> std::result::Result<Box<dyn CompiledTemplate>, BoxError>;
}

impl<F> TemplateEngine for F
where
    F: Fn(&str) -> std::result::Result<Box<dyn CompiledTemplate>, BoxError> + Send + Sync,
{
    fn compile(&self, source: &str) -> std::result::Result<Box<dyn CompiledTemplate>, BoxError> {
        self(source)
    }
}

/// Maps engine names to compilers
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn TemplateEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `engine` under `name`, replacing any previous registration
    pub fn register(&mut self, name: impl Into<String>, engine: impl TemplateEngine + 'static) {
        let name = name.into();
        debug!(engine = %name, "Registered template engine");
        self.engines.insert(name, Arc::new(engine));
    }

    /// Builder-style [`EngineRegistry::register`]
    pub fn with(mut self, name: impl Into<String>, engine: impl TemplateEngine + 'static) -> Self {
        self.register(name, engine);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// Registered engine names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Compile `source` with the engine named by `call_site`
    pub fn compile(&self, call_site: &CallSite, source: &str) -> Result<Box<dyn CompiledTemplate>> {
        let engine = self
            .engines
            .get(call_site.engine())
            .ok_or_else(|| InlineError::UnknownEngine {
                name: call_site.engine().to_string(),
            })?;

        engine.compile(source).map_err(|source| InlineError::Compile {
            call_site: call_site.clone(),
            source,
        })
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}
