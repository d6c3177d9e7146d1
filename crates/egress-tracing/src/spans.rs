//! Span builder helpers for egress-router instrumentation.

/// Create a span for a control-plane proxy command (`set` or `clear`).
///
/// Usage: `let _span = proxy_command_span!("set", host, port).entered();`
///
/// Fields recorded later:
/// - `outcome`: `installed`, `restored`, `noop` or `failed`
/// - `installation_id`: id of the policy installed by a `set`
#[macro_export]
macro_rules! proxy_command_span {
    ($command:expr) => {
        tracing::info_span!(
            "proxy_command",
            command = %$command,
            host = tracing::field::Empty,
            port = tracing::field::Empty,
            outcome = tracing::field::Empty,
            installation_id = tracing::field::Empty,
        )
    };
    ($command:expr, $host:expr, $port:expr) => {
        tracing::info_span!(
            "proxy_command",
            command = %$command,
            host = %$host,
            port = $port,
            outcome = tracing::field::Empty,
            installation_id = tracing::field::Empty,
        )
    };
}

/// Create a span for an on-demand route lookup served by the control API.
#[macro_export]
macro_rules! route_lookup_span {
    ($uri:expr) => {
        tracing::debug_span!(
            "route_lookup",
            uri = %$uri,
            decision = tracing::field::Empty,
        )
    };
}
