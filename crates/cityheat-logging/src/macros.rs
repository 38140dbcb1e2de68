//! ---
//! cityheat_section: "03-logging"
//! cityheat_subsection: "module"
//! cityheat_type: "source"
//! cityheat_scope: "code"
//! cityheat_description: "Structured logging adapters and subscriber bootstrap."
//! cityheat_version: "v0.1.0"
//! cityheat_owner: "tbd"
//! ---

/// Shared expansion for the context-aware logging macros.
#[doc(hidden)]
#[macro_export]
macro_rules! __heat_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            network = ctx.network.unwrap_or_default(),
            building = ctx.building.unwrap_or_default(),
            timestep = ctx.timestep.unwrap_or_default(),
            mode = ctx.mode.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with network context.
#[macro_export]
macro_rules! heat_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with network context.
#[macro_export]
macro_rules! heat_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with network context.
#[macro_export]
macro_rules! heat_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with network context.
#[macro_export]
macro_rules! heat_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__heat_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
