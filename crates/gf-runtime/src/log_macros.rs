/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never need to
/// remember the string literal. Domains: `sys` (lifecycle/bootstrap), `conn`
/// (client connections), `query` (SCAN/NEARBY/WITHIN execution), `hook`
/// (fence evaluation and delivery), `conf` (config loading).
///
/// # Usage
///
/// ```ignore
/// use crate::log_macros::*;
///
/// gf_info!(sys, collections = 3, "reactor bootstrap complete");
/// gf_warn!(hook, error = %e, "delivery attempt failed");
/// gf_debug!(conn, peer = %peer, "accepted connection");
/// ```
///
/// The macros accept any tracing-compatible field syntax after the domain
/// identifier. The domain identifier is **not** a string — it is a bare
/// identifier that the macro converts to a `&str` literal.

// ---------------------------------------------------------------------------
// Core macro — dispatches to the matching tracing level macro.
// ---------------------------------------------------------------------------

/// Internal helper. Do not call directly; use `gf_error!` … `gf_trace!`.
#[doc(hidden)]
macro_rules! gf_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

// ---------------------------------------------------------------------------
// Public per-level macros
// ---------------------------------------------------------------------------

/// Log at ERROR level with an automatic `domain` field.
macro_rules! gf_error {
    ($domain:ident, $($rest:tt)*) => {
        gf_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
macro_rules! gf_warn {
    ($domain:ident, $($rest:tt)*) => {
        gf_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
macro_rules! gf_info {
    ($domain:ident, $($rest:tt)*) => {
        gf_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
macro_rules! gf_debug {
    ($domain:ident, $($rest:tt)*) => {
        gf_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
#[allow(unused_macros)]
macro_rules! gf_trace {
    ($domain:ident, $($rest:tt)*) => {
        gf_log!(trace, $domain, $($rest)*)
    };
}
