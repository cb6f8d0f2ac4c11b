//! Internal logging helpers for structured vellum events.

/// Single logging target for vellum.
pub(crate) const LOG_TARGET: &str = "vellum";

macro_rules! vellum_log {
    ($level:expr, $event:expr, $fmt:expr $(, $args:expr)* $(,)?) => {{
        if log::log_enabled!($level) {
            log::log!(
                target: crate::logging::LOG_TARGET,
                $level,
                "event={} {}",
                $event,
                format_args!($fmt $(, $args)*)
            );
        }
    }};
}

pub(crate) use vellum_log;
