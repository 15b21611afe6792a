//! Render contexts
//!
//! A [`RenderContext`] is built fresh for every render from the caller's
//! state and a [`LocalsSource`]. The caller's fields are exposed at the top
//! level of the template scope and locals shadow fields of the same name,
//! the way a method's locals shadow its receiver's fields.

use serde::Serialize;
use serde_json::{Map, Value};

/// Local variables visible to a template, by name
pub type Locals = Map<String, Value>;

/// Scope key holding the caller's state when it does not serialize to a map
pub const STATE_KEY: &str = "state";

/// Something that can supply a template's local variables
pub trait LocalsSource {
    /// Consume the source into a name-to-value mapping
    fn into_locals(self) -> Result<Locals, serde_json::Error>;
}

/// Name/value pairs whose serialization failure is reported when the
/// locals are collected rather than when a value is bound
#[derive(Debug, Default)]
struct Bindings {
    values: Locals,
    error: Option<serde_json::Error>,
}

impl Bindings {
    fn bind<T: Serialize + ?Sized>(&mut self, name: impl Into<String>, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.values.insert(name.into(), value);
            }
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
    }

    fn finish(self) -> Result<Locals, serde_json::Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.values),
        }
    }
}

/// Locals listed explicitly by the caller
#[derive(Debug, Default)]
pub struct ExplicitMapping {
    bindings: Bindings,
}

impl ExplicitMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one local
    pub fn insert<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        self.bindings.bind(name, value);
        self
    }

    /// Use every entry of a map-like value (a `HashMap`, a struct, a
    /// `json!` object) as a local
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        let mut bindings = Bindings::default();
        match serde_json::to_value(value) {
            Ok(Value::Object(values)) => bindings.values = values,
            Ok(other) => {
                bindings.error = Some(serde::ser::Error::custom(format!(
                    "explicit locals must serialize to a map, got {}",
                    value_kind(&other)
                )));
            }
            Err(err) => bindings.error = Some(err),
        }
        Self { bindings }
    }
}

impl LocalsSource for ExplicitMapping {
    fn into_locals(self) -> Result<Locals, serde_json::Error> {
        self.bindings.finish()
    }
}

/// Locals captured from the caller's scope by name, see [`crate::scope!`]
#[derive(Debug, Default)]
pub struct CapturedScope {
    bindings: Bindings,
}

impl CapturedScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the variable `name` with its current value
    pub fn bind<T: Serialize + ?Sized>(mut self, name: &'static str, value: &T) -> Self {
        self.bindings.bind(name, value);
        self
    }
}

impl LocalsSource for CapturedScope {
    fn into_locals(self) -> Result<Locals, serde_json::Error> {
        self.bindings.finish()
    }
}

/// No locals; the template sees only the caller's state
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocals;

impl LocalsSource for NoLocals {
    fn into_locals(self) -> Result<Locals, serde_json::Error> {
        Ok(Locals::new())
    }
}

impl LocalsSource for Locals {
    fn into_locals(self) -> Result<Locals, serde_json::Error> {
        Ok(self)
    }
}

/// Variable environment a compiled template evaluates against
#[derive(Debug, Clone)]
pub struct RenderContext {
    state: Value,
    locals: Locals,
    scope: Value,
}

impl RenderContext {
    /// Snapshot `state` and collect `locals` into a new context
    ///
    /// Call this right before invoking the compiled template so the template
    /// observes the caller's fields as they are at that moment.
    pub fn build<S, L>(state: &S, locals: L) -> Result<Self, serde_json::Error>
    where
        S: Serialize + ?Sized,
        L: LocalsSource,
    {
        let state = serde_json::to_value(state)?;
        let locals = locals.into_locals()?;

        let mut scope = match &state {
            Value::Object(fields) => fields.clone(),
            Value::Null => Map::new(),
            other => {
                let mut scope = Map::new();
                scope.insert(STATE_KEY.to_string(), other.clone());
                scope
            }
        };
        scope.extend(locals.iter().map(|(name, value)| (name.clone(), value.clone())));

        Ok(Self {
            state,
            locals,
            scope: Value::Object(scope),
        })
    }

    /// The caller's state as captured at build time
    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }

    /// Look up a name the way a template would: locals first, then fields
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    /// Merged scope handed to engines
    pub fn scope(&self) -> &Value {
        &self.scope
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}
