//! 统一错误类型定义

use std::io;

use serde::Serialize;
use thiserror::Error;

/// Classified probe failure.
///
/// Failures of a single sub-operation (one port, one record type, one resolver)
/// are recorded inside a partial report; only failures affecting a whole probe
/// are returned to the caller as this type.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum ProbeError {
    /// The operation exceeded its time budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Connection refused, reset or no route to the host.
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// NXDOMAIN / unknown host, or a WHOIS no-match.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The DNS server answered SERVFAIL.
    #[error("Server failure: {0}")]
    ServerFailure(String),

    /// Malformed or unexpected response from the peer.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Unparseable hostname or URL.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unreadable or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProbeError {
    /// Classify a socket-level I/O error.
    pub(crate) fn from_io(context: &str, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => Self::Timeout(format!("{context}: {err}")),
            io::ErrorKind::InvalidInput => Self::InvalidInput(format!("{context}: {err}")),
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Self::ProtocolError(format!("{context}: {err}"))
            }
            _ => Self::Unreachable(format!("{context}: {err}")),
        }
    }

    /// Whether this failure is a budget overrun rather than a reported error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Hostscope Result 类型别名
pub type HostscopeResult<T> = std::result::Result<T, ProbeError>;
