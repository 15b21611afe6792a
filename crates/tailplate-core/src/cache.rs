//! Compiled inline-template cache
//!
//! Each call site moves between two states:
//!
//! - **Fresh**: the compiled template was built from the text currently on
//!   disk.
//! - **Stale**: the file's modification identity differs from the one seen
//!   at compile time, or the call site has never been compiled.
//!
//! Staleness is detected lazily on every render with a cheap identity peek.
//! Invalidation works at file granularity: editing any part of a file
//! recompiles every call site in it on next use, even blocks whose text did
//! not change.

use std::{path::PathBuf, sync::Arc};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::{
    call_site::CallSite,
    config::InlineConfig,
    context::{LocalsSource, RenderContext},
    engine::{CompiledTemplate, EngineRegistry},
    error::InlineError,
    extract::TemplateExtractor,
    metrics::{CacheMetrics, CacheStats},
    source::{FsSourceReader, ModificationIdentity, SourceReader},
    Result,
};

/// Compiled template together with the identity it was compiled against
struct CacheEntry {
    identity: ModificationIdentity,
    template: Box<dyn CompiledTemplate>,
}

/// Per-call-site slot; its lock serializes compilation for one key
type Slot = Arc<Mutex<Option<Arc<CacheEntry>>>>;

/// Process-wide cache of compiled inline templates
///
/// Share one instance (behind an `Arc` or a `&'static`) with every render
/// path; [`InlineCache::reset`] is its only lifecycle event.
pub struct InlineCache {
    entries: DashMap<CallSite, Slot>,
    registry: EngineRegistry,
    reader: Arc<dyn SourceReader>,
    extractor: TemplateExtractor,
    source_root: Option<PathBuf>,
    metrics: CacheMetrics,
}

impl InlineCache {
    /// Cache over the filesystem with default configuration
    pub fn new(registry: EngineRegistry) -> Self {
        CacheBuilder::new().registry(registry).build()
    }

    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    /// Render the comment block below `call_site` against `state` and `locals`
    ///
    /// Compiles on first use and whenever the backing file's identity has
    /// changed; otherwise serves the cached template.
    pub fn render<S, L>(&self, call_site: &CallSite, state: &S, locals: L) -> Result<String>
    where
        S: Serialize + ?Sized,
        L: LocalsSource,
    {
        let rooted;
        let call_site = match &self.source_root {
            Some(root) if call_site.file().is_relative() => {
                rooted = call_site.rooted_at(root);
                &rooted
            }
            _ => call_site,
        };

        let entry = self.fresh_entry(call_site)?;

        let context = RenderContext::build(state, locals).map_err(|err| InlineError::Render {
            call_site: call_site.clone(),
            source: Box::new(err),
        })?;

        entry
            .template
            .render(&context)
            .map_err(|source| InlineError::Render {
                call_site: call_site.clone(),
                source,
            })
    }

    /// Discard every entry so each call site recompiles on its next render
    ///
    /// Renders already holding an entry finish with it; renders starting
    /// after this returns never see a pre-reset entry.
    pub fn reset(&self) {
        self.entries.clear();
        self.metrics.record_reset();
        debug!("Inline template cache reset");
    }

    /// Current statistics
    ///
    /// `entries` counts compiled call sites only; a call site whose first
    /// compile failed is not included.
    pub fn stats(&self) -> CacheStats {
        let compiled = self
            .entries
            .iter()
            .filter(|slot| slot.value().lock().is_some())
            .count();
        self.metrics.snapshot(compiled)
    }

    /// Fresh entry for `call_site`, compiling it if missing or stale
    ///
    /// Hits only hold the slot lock long enough to clone the entry; the
    /// identity peek runs unlocked. The lock is held across compilation so
    /// concurrent renders of one stale key compile it once.
    fn fresh_entry(&self, call_site: &CallSite) -> Result<Arc<CacheEntry>> {
        let slot = self.slot(call_site);

        let cached = slot.lock().clone();
        if let Some(entry) = cached {
            if self.is_fresh(call_site, &entry)? {
                return Ok(self.hit(call_site, entry));
            }
        }

        let mut slot = slot.lock();
        match slot.as_ref() {
            // Another render may have recompiled while this one was unlocked.
            Some(entry) => {
                if self.is_fresh(call_site, entry)? {
                    return Ok(self.hit(call_site, Arc::clone(entry)));
                }
                debug!(%call_site, "Source changed, recompiling inline template");
                self.metrics.record_invalidation();
            }
            None => {
                debug!(%call_site, "Compiling inline template");
                self.metrics.record_miss();
            }
        }

        let entry = Arc::new(self.compile(call_site)?);
        *slot = Some(Arc::clone(&entry));
        Ok(entry)
    }

    fn is_fresh(&self, call_site: &CallSite, entry: &CacheEntry) -> Result<bool> {
        let identity = self
            .reader
            .peek_identity(call_site.file())
            .map_err(|err| InlineError::io(call_site.file(), err))?;
        Ok(identity == entry.identity)
    }

    fn hit(&self, call_site: &CallSite, entry: Arc<CacheEntry>) -> Arc<CacheEntry> {
        trace!(%call_site, "Inline template cache hit");
        self.metrics.record_hit();
        entry
    }

    fn slot(&self, call_site: &CallSite) -> Slot {
        if let Some(slot) = self.entries.get(call_site) {
            return Arc::clone(slot.value());
        }
        let slot = self.entries.entry(call_site.clone()).or_default();
        Arc::clone(slot.value())
    }

    fn compile(&self, call_site: &CallSite) -> Result<CacheEntry> {
        let source = self
            .reader
            .read(call_site.file())
            .map_err(|err| InlineError::io(call_site.file(), err))?;

        let body = self.extractor.extract(&source.text, call_site.line());
        if body.is_empty() {
            warn!(%call_site, "No inline template found below call site");
        }

        let template = self.registry.compile(call_site, &body)?;
        self.metrics.record_compile();

        Ok(CacheEntry {
            identity: source.identity,
            template,
        })
    }
}

/// Builder for [`InlineCache`]
pub struct CacheBuilder {
    registry: EngineRegistry,
    reader: Arc<dyn SourceReader>,
    config: InlineConfig,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self {
            registry: EngineRegistry::new(),
            reader: Arc::new(FsSourceReader::new()),
            config: InlineConfig::default(),
        }
    }

    /// Replace the engine registry
    pub fn registry(mut self, registry: EngineRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register one more engine
    pub fn engine(
        mut self,
        name: impl Into<String>,
        engine: impl crate::engine::TemplateEngine + 'static,
    ) -> Self {
        self.registry.register(name, engine);
        self
    }

    /// Read sources through `reader` instead of the filesystem
    pub fn reader(mut self, reader: Arc<dyn SourceReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn config(mut self, config: InlineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> InlineCache {
        InlineCache {
            entries: DashMap::new(),
            registry: self.registry,
            reader: self.reader,
            extractor: TemplateExtractor::new(self.config.comment_marker),
            source_root: self.config.source_root,
            metrics: CacheMetrics::new(),
        }
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Barrier,
        },
        thread,
        time::Duration,
    };

    use serde_json::Value;

    use super::*;
    use crate::{
        context::{ExplicitMapping, NoLocals},
        engine::BoxError,
        source::MemorySourceReader,
    };

    /// Engine that substitutes `$name` with the value of `name` in scope
    fn dollar(source: &str) -> std::result::Result<Box<dyn CompiledTemplate>, BoxError> {
        if source.contains("$$") {
            return Err("unexpected `$$`".into());
        }
        let source = source.to_string();
        Ok(Box::new(move |context: &RenderContext| -> std::result::Result<String, BoxError> {
            let mut out = String::new();
            for (i, word) in source.split(' ').enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                match word.strip_prefix('$') {
                    Some(name) => match context.lookup(name) {
                        Some(Value::String(s)) => out.push_str(s),
                        Some(other) => out.push_str(&other.to_string()),
                        None => return Err(format!("undefined variable `{name}`").into()),
                    },
                    None => out.push_str(word),
                }
            }
            Ok(out)
        }))
    }

    /// Engine that renders its source uppercased, ignoring the context
    fn upper(source: &str) -> std::result::Result<Box<dyn CompiledTemplate>, BoxError> {
        let text = source.to_uppercase();
        Ok(Box::new(move |_: &RenderContext| -> std::result::Result<String, BoxError> {
            Ok(text.clone())
        }))
    }

    const FILE: &str = "/app/presenter.rs";

    fn cache_with(reader: &Arc<MemorySourceReader>) -> InlineCache {
        InlineCache::builder()
            .engine("dollar", dollar)
            .reader(Arc::clone(reader) as Arc<dyn SourceReader>)
            .build()
    }

    fn source(body: &str) -> String {
        format!("fn greet() {{\n    render();\n    // {body}\n}}\n")
    }

    #[derive(Serialize)]
    struct Presenter {
        greetee: &'static str,
    }

    #[test]
    fn test_second_render_is_served_from_cache() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("Hello $greetee"));
        let cache = cache_with(&reader);
        let site = CallSite::new(FILE, 2, "dollar");
        let presenter = Presenter { greetee: "world" };

        let first = cache.render(&site, &presenter, NoLocals).unwrap();
        let second = cache.render(&site, &presenter, NoLocals).unwrap();

        assert_eq!(first, "Hello world");
        assert_eq!(first, second);
        assert_eq!(reader.reads(), 1);
        let stats = cache.stats();
        assert_eq!((stats.misses, stats.hits, stats.compiles), (1, 1, 1));
    }

    #[test]
    fn test_identity_is_the_only_staleness_signal() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("before"));
        let cache = cache_with(&reader);
        let site = CallSite::new(FILE, 2, "dollar");

        assert_eq!(cache.render(&site, &(), NoLocals).unwrap(), "before");

        reader.replace_untracked(Path::new(FILE), source("after"));
        assert_eq!(cache.render(&site, &(), NoLocals).unwrap(), "before");

        reader.touch(Path::new(FILE));
        assert_eq!(cache.render(&site, &(), NoLocals).unwrap(), "after");
        assert_eq!(cache.stats().invalidations, 1);
        assert_eq!(cache.stats().compiles, 2);
    }

    #[test]
    fn test_file_change_invalidates_every_site_in_file() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, "a();\n// one\nb();\n// two\n");
        let cache = cache_with(&reader);
        let first = CallSite::new(FILE, 1, "dollar");
        let second = CallSite::new(FILE, 3, "dollar");

        assert_eq!(cache.render(&first, &(), NoLocals).unwrap(), "one");
        assert_eq!(cache.render(&second, &(), NoLocals).unwrap(), "two");

        reader.insert(FILE, "a();\n// one\nb();\n// three\n");
        assert_eq!(cache.render(&first, &(), NoLocals).unwrap(), "one");
        assert_eq!(cache.render(&second, &(), NoLocals).unwrap(), "three");
        assert_eq!(cache.stats().compiles, 4);
    }

    #[test]
    fn test_unrelated_files_stay_cached() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert("/app/a.rs", "a();\n// a\n");
        reader.insert("/app/b.rs", "b();\n// b\n");
        let cache = cache_with(&reader);
        let a = CallSite::new("/app/a.rs", 1, "dollar");
        let b = CallSite::new("/app/b.rs", 1, "dollar");

        cache.render(&a, &(), NoLocals).unwrap();
        cache.render(&b, &(), NoLocals).unwrap();
        reader.touch(Path::new("/app/a.rs"));
        cache.render(&a, &(), NoLocals).unwrap();
        cache.render(&b, &(), NoLocals).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.compiles, 3);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_reset_forces_one_recompile_per_site() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, "a();\n// one\nb();\n// two\n");
        let cache = cache_with(&reader);
        let sites = [CallSite::new(FILE, 1, "dollar"), CallSite::new(FILE, 3, "dollar")];

        for site in &sites {
            cache.render(site, &(), NoLocals).unwrap();
        }
        cache.reset();
        assert_eq!(cache.stats().entries, 0);

        for _ in 0..3 {
            for site in &sites {
                cache.render(site, &(), NoLocals).unwrap();
            }
        }
        let stats = cache.stats();
        assert_eq!(stats.compiles, 4);
        assert_eq!(stats.resets, 1);
        assert_eq!(stats.hits, 4);
    }

    #[test]
    fn test_same_line_two_engines_are_separate_entries() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("$x"));
        let cache = InlineCache::builder()
            .engine("dollar", dollar)
            .engine("upper", upper)
            .reader(Arc::clone(&reader) as Arc<dyn SourceReader>)
            .build();

        let locals = || ExplicitMapping::new().insert("x", "raw");
        let a = cache.render(&CallSite::new(FILE, 2, "dollar"), &(), locals()).unwrap();
        let b = cache.render(&CallSite::new(FILE, 2, "upper"), &(), locals()).unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("raw", "$X"));
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let reader = Arc::new(MemorySourceReader::new());
        let cache = cache_with(&reader);
        let err = cache
            .render(&CallSite::new("/app/none.rs", 1, "dollar"), &(), NoLocals)
            .unwrap_err();
        assert!(matches!(err, InlineError::Io { .. }));
    }

    #[test]
    fn test_deleted_file_fails_fresh_entry() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("hi"));
        let cache = cache_with(&reader);
        let site = CallSite::new(FILE, 2, "dollar");
        cache.render(&site, &(), NoLocals).unwrap();

        reader.remove(Path::new(FILE));
        assert!(matches!(
            cache.render(&site, &(), NoLocals),
            Err(InlineError::Io { .. })
        ));
    }

    #[test]
    fn test_unknown_engine_is_reported() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("hi"));
        let cache = cache_with(&reader);
        let err = cache
            .render(&CallSite::new(FILE, 2, "erb"), &(), NoLocals)
            .unwrap_err();
        assert!(matches!(err, InlineError::UnknownEngine { ref name } if name == "erb"));
    }

    #[test]
    fn test_compile_error_is_not_cached() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("$$ broken"));
        let cache = cache_with(&reader);
        let site = CallSite::new(FILE, 2, "dollar");

        assert!(matches!(
            cache.render(&site, &(), NoLocals),
            Err(InlineError::Compile { .. })
        ));
        assert!(cache.render(&site, &(), NoLocals).is_err());
        assert_eq!(reader.reads(), 2);
        assert_eq!(cache.stats().entries, 0);

        reader.insert(FILE, source("fixed"));
        assert_eq!(cache.render(&site, &(), NoLocals).unwrap(), "fixed");
    }

    #[test]
    fn test_render_error_attribution() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("Hello $nobody"));
        let cache = cache_with(&reader);
        let site = CallSite::new(FILE, 2, "dollar");

        let err = cache.render(&site, &(), NoLocals).unwrap_err();
        assert!(matches!(err, InlineError::Render { .. }));
        assert_eq!(err.call_site(), Some(&site));
        assert_eq!(
            err.engine_error().unwrap().to_string(),
            "undefined variable `nobody`"
        );
    }

    #[test]
    fn test_source_root_resolves_relative_sites() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert("/srv/app/src/view.rs", source("rooted"));
        let cache = InlineCache::builder()
            .engine("dollar", dollar)
            .reader(Arc::clone(&reader) as Arc<dyn SourceReader>)
            .config(InlineConfig {
                source_root: Some(PathBuf::from("/srv/app")),
                ..Default::default()
            })
            .build();

        let site = CallSite::new("src/view.rs", 2, "dollar");
        assert_eq!(cache.render(&site, &(), NoLocals).unwrap(), "rooted");
    }

    #[test]
    fn test_state_is_read_at_render_time() {
        #[derive(Serialize)]
        struct Counter {
            count: u32,
        }

        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("count $count"));
        let cache = cache_with(&reader);
        let site = CallSite::new(FILE, 2, "dollar");

        let mut counter = Counter { count: 1 };
        assert_eq!(cache.render(&site, &counter, NoLocals).unwrap(), "count 1");
        counter.count = 2;
        assert_eq!(cache.render(&site, &counter, NoLocals).unwrap(), "count 2");
    }

    #[test]
    fn test_concurrent_renders_compile_once_per_key() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, "a();\n// $n\nb();\n// other $n\n");
        let cache = cache_with(&reader);
        let a = CallSite::new(FILE, 1, "dollar");
        let b = CallSite::new(FILE, 3, "dollar");

        thread::scope(|scope| {
            for n in 0..8u32 {
                let (cache, a, b) = (&cache, &a, &b);
                scope.spawn(move || {
                    for _ in 0..50 {
                        let locals = ExplicitMapping::new().insert("n", &n);
                        assert_eq!(cache.render(a, &(), locals).unwrap(), n.to_string());
                        let locals = ExplicitMapping::new().insert("n", &n);
                        assert_eq!(cache.render(b, &(), locals).unwrap(), format!("other {n}"));
                    }
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.compiles, 2);
        assert_eq!(stats.hits, 8 * 50 * 2 - 2);
    }

    #[test]
    fn test_reset_during_renders() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, source("stable"));
        let cache = cache_with(&reader);
        let site = CallSite::new(FILE, 2, "dollar");

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        assert_eq!(cache.render(&site, &(), NoLocals).unwrap(), "stable");
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..20 {
                    cache.reset();
                }
            });
        });

        cache.reset();
        let compiles = cache.stats().compiles;
        cache.render(&site, &(), NoLocals).unwrap();
        cache.render(&site, &(), NoLocals).unwrap();
        assert_eq!(cache.stats().compiles, compiles + 1);
    }

    #[test]
    fn test_slow_compile_does_not_block_other_keys() {
        let reader = Arc::new(MemorySourceReader::new());
        reader.insert(FILE, "a();\n// slow\nb();\n// fast\n");

        let compiling = Arc::new(Barrier::new(2));
        let slow_done = Arc::new(AtomicBool::new(false));
        let engine = {
            let (compiling, slow_done) = (Arc::clone(&compiling), Arc::clone(&slow_done));
            move |source: &str| -> std::result::Result<Box<dyn CompiledTemplate>, BoxError> {
                if source == "slow" {
                    compiling.wait();
                    thread::sleep(Duration::from_millis(300));
                    slow_done.store(true, Ordering::SeqCst);
                }
                let text = source.to_string();
                Ok(Box::new(move |_: &RenderContext| -> std::result::Result<String, BoxError> {
                    Ok(text.clone())
                }))
            }
        };
        let cache = InlineCache::builder()
            .engine("gated", engine)
            .reader(Arc::clone(&reader) as Arc<dyn SourceReader>)
            .build();
        let slow = CallSite::new(FILE, 1, "gated");
        let fast = CallSite::new(FILE, 3, "gated");

        thread::scope(|scope| {
            let pending = scope.spawn(|| cache.render(&slow, &(), NoLocals));

            compiling.wait();
            assert_eq!(cache.render(&fast, &(), NoLocals).unwrap(), "fast");
            assert!(!slow_done.load(Ordering::SeqCst));

            assert_eq!(pending.join().unwrap().unwrap(), "slow");
        });
        assert_eq!(cache.stats().compiles, 2);
    }

    /// Reader whose identity peek lingers, recording how many overlap
    struct LingeringPeek {
        inner: MemorySourceReader,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SourceReader for LingeringPeek {
        fn read(&self, path: &Path) -> std::io::Result<crate::source::SourceText> {
            self.inner.read(path)
        }

        fn peek_identity(&self, path: &Path) -> std::io::Result<ModificationIdentity> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.peek_identity(path)
        }
    }

    #[test]
    fn test_cache_hits_check_freshness_in_parallel() {
        let reader = Arc::new(LingeringPeek {
            inner: MemorySourceReader::new(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        reader.inner.insert(FILE, source("shared"));
        let cache = InlineCache::builder()
            .engine("dollar", dollar)
            .reader(Arc::clone(&reader) as Arc<dyn SourceReader>)
            .build();
        let site = CallSite::new(FILE, 2, "dollar");
        cache.render(&site, &(), NoLocals).unwrap();

        let start = Barrier::new(4);
        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    start.wait();
                    assert_eq!(cache.render(&site, &(), NoLocals).unwrap(), "shared");
                });
            }
        });

        assert!(reader.peak.load(Ordering::SeqCst) > 1);
        assert_eq!(cache.stats().hits, 4);
        assert_eq!(cache.stats().compiles, 1);
    }
}
