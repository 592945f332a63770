//! Build error types shared by the compiler and its collaborators.
//!
//! Every failure of a compile call is one of these. The `Display` form is the
//! user-facing error string; it never carries a class prefix so rejections
//! coming from protocol bundles or the asset service surface verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// High-level error classification for logging and reporting.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Missing profile/group/chain reference, nested chain, empty outbound set.
    Structural,
    /// The protocol cannot be realized natively or through a bridge.
    Capability,
    /// A launcher binary or a rule-set asset is unavailable.
    Resource,
    /// The requested mode needs privileges the process does not have.
    Permission,
    /// The protocol bundle rejected its own parameters.
    Policy,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Structural => "structural",
            Self::Capability => "capability",
            Self::Resource => "resource",
            Self::Permission => "permission",
            Self::Policy => "policy",
        };
        f.write_str(s)
    }
}

/// Error returned by a compile call.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildError {
    #[error("{message}")]
    Structural { message: String },

    #[error("{message}")]
    Capability { message: String },

    #[error("{message}")]
    Resource { message: String },

    #[error("{message}")]
    Permission { message: String },

    /// Rejection raised by a protocol bundle or an external service, kept verbatim.
    #[error("{message}")]
    Rejected { message: String },
}

impl BuildError {
    #[inline]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Structural { .. } => ErrorClass::Structural,
            Self::Capability { .. } => ErrorClass::Capability,
            Self::Resource { .. } => ErrorClass::Resource,
            Self::Permission { .. } => ErrorClass::Permission,
            Self::Rejected { .. } => ErrorClass::Policy,
        }
    }

    /// The descriptive error string.
    pub fn message(&self) -> &str {
        match self {
            Self::Structural { message }
            | Self::Capability { message }
            | Self::Resource { message }
            | Self::Permission { message }
            | Self::Rejected { message } => message,
        }
    }

    // Convenience constructors

    #[inline]
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    #[inline]
    pub fn capability(message: impl Into<String>) -> Self {
        Self::Capability {
            message: message.into(),
        }
    }

    #[inline]
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    #[inline]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}
