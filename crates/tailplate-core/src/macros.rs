//! Call-site capture macros
//!
//! These macros are the glue between a method body and the cache: they
//! record `file!()`/`line!()` of the invocation and hand the cache the
//! caller's state and locals. The invocation must fit on one line, because
//! the template block is read from the line right below it.

/// Build a [`CallSite`](crate::CallSite) for the current line
///
/// The file is located once per expansion site and memoized.
#[macro_export]
macro_rules! call_site {
    ($engine:expr) => {{
        static FILE: ::std::sync::OnceLock<::std::path::PathBuf> = ::std::sync::OnceLock::new();
        let file = FILE.get_or_init(|| {
            $crate::CallSite::locate(::core::file!(), ::core::env!("CARGO_MANIFEST_DIR"))
        });
        $crate::CallSite::new(file.clone(), ::core::line!(), $engine)
    }};
}

/// Capture local variables by name into a [`CapturedScope`](crate::CapturedScope)
///
/// `scope!(title, items)` makes `title` and `items` visible to the template
/// under their own names.
#[macro_export]
macro_rules! scope {
    ($($name:ident),* $(,)?) => {
        $crate::CapturedScope::new()$(.bind(::core::stringify!($name), &$name))*
    };
}

/// Render the comment block below this line
///
/// ```text
/// render_inline!(cache, "handlebars", self)                      // fields only
/// render_inline!(cache, "handlebars", self, { local: "H" })      // explicit locals
/// render_inline!(cache, "handlebars", self, scope!(local))       // captured locals
/// ```
#[macro_export]
macro_rules! render_inline {
    ($cache:expr, $engine:expr, $state:expr) => {
        $cache.render(&$crate::call_site!($engine), $state, $crate::NoLocals)
    };
    ($cache:expr, $engine:expr, $state:expr, { $($name:ident : $value:expr),* $(,)? }) => {
        $cache.render(
            &$crate::call_site!($engine),
            $state,
            $crate::ExplicitMapping::new()$(.insert(::core::stringify!($name), &$value))*,
        )
    };
    ($cache:expr, $engine:expr, $state:expr, $locals:expr) => {
        $cache.render(&$crate::call_site!($engine), $state, $locals)
    };
}
