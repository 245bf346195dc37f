use std::fmt::Display;

use thiserror::Error;

use crate::runtime::conf::ConfError;

pub type Result<T> = std::result::Result<T, PortblockError>;

/// Errors raised while bringing the filter up, running it and tearing it down.
///
/// Each setup phase has its own variant so the failing phase is visible in the
/// message that ends the process.
#[derive(Debug, Error)]
pub enum PortblockError {
    /// The eBPF object could not be read or parsed, lacks the entry point, or
    /// was rejected by the verifier.
    #[error("failed to load eBPF program: {0}")]
    Load(String),

    /// The blocked-port map is missing, has the wrong type, or rejected a write.
    #[error("failed to configure blocked port: {0}")]
    Config(String),

    /// The interface is unknown or the kernel refused the binding.
    #[error("failed to attach to interface {iface}: {reason}")]
    Attach { iface: String, reason: String },

    #[error("failed to detach from interface: {0}")]
    Detach(String),

    #[error("configuration error: {0}")]
    Conf(#[from] ConfError),

    #[error("{0}")]
    Internal(String),
}

impl PortblockError {
    pub fn load(reason: impl Display) -> Self {
        Self::Load(reason.to_string())
    }

    pub fn config(reason: impl Display) -> Self {
        Self::Config(reason.to_string())
    }

    pub fn attach(iface: impl Into<String>, reason: impl Display) -> Self {
        Self::Attach {
            iface: iface.into(),
            reason: reason.to_string(),
        }
    }

    pub fn detach(reason: impl Display) -> Self {
        Self::Detach(reason.to_string())
    }

    pub fn internal(reason: impl Display) -> Self {
        Self::Internal(reason.to_string())
    }
}
