//! Error types for the routing core.

use thiserror::Error;

/// Errors surfaced by the routing core.
///
/// Decisions never fail; only configuration and slot installation do.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A proxy target with a blank host or an out-of-range port.
    #[error("invalid proxy target {host:?}:{port}: {reason}")]
    InvalidTarget {
        host: String,
        port: i64,
        reason: &'static str,
    },

    /// The policy slot refused to install a new policy.
    #[error("policy slot is sealed; refusing to install {policy} policy")]
    SlotSealed { policy: &'static str },

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for RouteError {
    fn from(err: figment::Error) -> Self {
        RouteError::Config(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, RouteError>;
