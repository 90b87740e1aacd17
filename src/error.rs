//! Error types for the observer.
//!
//! Errors are strongly typed using thiserror so callers can match on the
//! specific condition (duplicate listener, dial failure, closed socket) and
//! decide locally whether to retry.

use thiserror::Error;

/// Errors raised by the listener registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("A callback exists for event kind '{kind}'")]
    Duplicate {
        kind: String,
    },

    #[error("A listener was not found for event kind '{kind}'")]
    NotFound {
        kind: String,
    },
}

/// Transport errors for the connection to the status change notifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {url} failed: {message}")]
    ConnectionFailed {
        url: String,
        message: String,
    },

    #[error("Observer has no live connection")]
    NotConnected,

    #[error("Connection closed")]
    Closed,

    /// A read or write failed; the message is the transport's own.
    #[error("{message}")]
    Frame {
        message: String,
    },
}

impl TransportError {
    /// Creates a frame error from any displayable transport failure.
    #[must_use]
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }
}

/// Errors converting events to and from wire frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode frame: {message}")]
    Encode {
        message: String,
    },

    #[error("Failed to decode frame: {message}")]
    Decode {
        message: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable '{name}' is not set")]
    MissingVar {
        name: String,
    },

    #[error("Invalid endpoint: {reason}")]
    InvalidEndpoint {
        reason: String,
    },
}

/// Top-level error type for the observer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl NotifyError {
    /// Returns true if this is a listener registry error.
    #[must_use]
    pub const fn is_listener(&self) -> bool {
        matches!(self, Self::Listener(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if calling the same operation again may succeed.
    ///
    /// Only transport failures qualify; the observer never retries on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !matches!(e, TransportError::NotConnected),
            Self::Listener(_) | Self::Codec(_) | Self::Config(_) => false,
        }
    }
}

/// Result type alias for observer operations.
pub type NotifyResult<T> = Result<T, NotifyError>;
