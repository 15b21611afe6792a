//! # Tailplate Engines
//!
//! Template engine adapters for inline templates:
//!
//! - [`HandlebarsEngine`] (`"handlebars"`): `{{value}}` is escaped,
//!   `{{{value}}}` is emitted raw
//! - [`MiniJinjaEngine`] (`"minijinja"`): `{{ value }}` is escaped,
//!   `{{ value|safe }}` is emitted raw
//!
//! Both escape through [`tailplate_core::escape::escape_html`], so a value
//! renders the same whichever engine a call site uses.

pub mod handlebars;
pub mod minijinja;

pub use crate::handlebars::HandlebarsEngine;
pub use crate::minijinja::MiniJinjaEngine;

use tailplate_core::{EngineRegistry, InlineConfig};

/// Registry name of the Handlebars adapter
pub const HANDLEBARS: &str = "handlebars";

/// Registry name of the MiniJinja adapter
pub const MINIJINJA: &str = "minijinja";

/// Name every inline template is registered under inside its engine
pub(crate) const TEMPLATE_NAME: &str = "inline";

/// Registry with both bundled engines, configured from `config`
pub fn default_registry(config: &InlineConfig) -> EngineRegistry {
    EngineRegistry::new()
        .with(HANDLEBARS, HandlebarsEngine::from_config(config))
        .with(MINIJINJA, MiniJinjaEngine::from_config(config))
}
