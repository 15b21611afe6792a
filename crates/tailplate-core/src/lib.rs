//! # Tailplate Core
//!
//! Inline templates for Rust: a method renders the comment block that sits
//! directly beneath the call that renders it.
//!
//! ```text
//! fn greeting(&self, cache: &InlineCache) -> tailplate_core::Result<String> {
//!     render_inline!(cache, "handlebars", self, { name: "world" })
//!     // <p>Hello {{name}}!</p>
//! }
//! ```
//!
//! ## Features
//!
//! - **Template extraction**: comment blocks are located by file and line and
//!   have their indentation normalized
//! - **Pluggable engines**: any compiler implementing [`TemplateEngine`]
//! - **Compiled-template cache**: keyed by `(file, line, engine)`, invalidated
//!   lazily when the source file's modification identity changes
//! - **Uniform escaping**: every engine escapes through [`escape::escape_html`]
//! - **Concurrent renders**: per-key compilation lock, independent keys never
//!   block each other

pub mod cache;
pub mod call_site;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod escape;
pub mod extract;
pub mod macros;
pub mod metrics;
pub mod source;

pub use cache::{CacheBuilder, InlineCache};
pub use call_site::CallSite;
pub use crate::config::InlineConfig;
pub use context::{CapturedScope, ExplicitMapping, Locals, LocalsSource, NoLocals, RenderContext};
pub use engine::{BoxError, CompiledTemplate, EngineRegistry, TemplateEngine};
pub use error::{ConfigError, InlineError};
pub use extract::TemplateExtractor;
pub use metrics::{CacheMetrics, CacheStats};
pub use source::{
    FsSourceReader, MemorySourceReader, ModificationIdentity, SourceReader, SourceText,
};

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, InlineError>;
