//! Error types for Tourplay Core

use crate::{surface::SurfaceError, types::VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    // Variant / catalog errors
    #[error("Variant {variant} failed to load: {kind}")]
    VariantLoad { variant: VariantId, kind: MediaErrorKind },

    #[error("All fallback variants failed ({attempted} attempted): {kind}")]
    FallbackExhausted { attempted: usize, kind: MediaErrorKind },

    #[error("Unknown variant: {0}")]
    UnknownVariant(VariantId),

    #[error("Quality catalog is empty")]
    EmptyCatalog,

    // Session errors
    #[error("Playback session has been torn down")]
    SessionClosed,

    #[error("Rendering surface error: {0}")]
    Surface(#[from] SurfaceError),

    // Telemetry errors
    #[error("Telemetry channel error: {0}")]
    TelemetryChannel(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid source locator: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a telemetry channel error
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Error::TelemetryChannel(msg.into())
    }

    /// Returns true if this error is handled without reaching the host
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::VariantLoad { .. }
                | Error::TelemetryChannel(_)
                | Error::Network(_)
        )
    }

    /// Returns true if this error ends playback until a manual retry
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::FallbackExhausted { .. })
    }

    /// Returns the error code for telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::VariantLoad { .. } => "VARIANT_LOAD",
            Error::FallbackExhausted { .. } => "FALLBACK_EXHAUSTED",
            Error::UnknownVariant(_) => "UNKNOWN_VARIANT",
            Error::EmptyCatalog => "EMPTY_CATALOG",
            Error::SessionClosed => "SESSION_CLOSED",
            Error::Surface(_) => "SURFACE",
            Error::TelemetryChannel(_) => "TELEMETRY",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Network(_) => "NETWORK",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}

/// Classification of a media error code reported by the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaErrorKind {
    /// Fetching was aborted by the user agent
    Aborted,
    /// A network error interrupted the download
    Network,
    /// The media could not be decoded
    Decode,
    /// The source format is not supported
    SourceNotSupported,
    /// Anything else
    Unknown,
}

impl MediaErrorKind {
    /// Map a numeric media error code (1-4) to a kind
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => MediaErrorKind::Aborted,
            2 => MediaErrorKind::Network,
            3 => MediaErrorKind::Decode,
            4 => MediaErrorKind::SourceNotSupported,
            _ => MediaErrorKind::Unknown,
        }
    }

    /// Numeric code as reported by the surface (0 for unknown)
    pub fn code(&self) -> u16 {
        match self {
            MediaErrorKind::Aborted => 1,
            MediaErrorKind::Network => 2,
            MediaErrorKind::Decode => 3,
            MediaErrorKind::SourceNotSupported => 4,
            MediaErrorKind::Unknown => 0,
        }
    }

    /// Human-readable message shown alongside a terminal error
    pub fn describe(&self) -> &'static str {
        match self {
            MediaErrorKind::Aborted => "Video loading was aborted",
            MediaErrorKind::Network => "Network error while loading video",
            MediaErrorKind::Decode => "Video format could not be decoded",
            MediaErrorKind::SourceNotSupported => "Video format not supported",
            MediaErrorKind::Unknown => "Unknown video error",
        }
    }
}

impl std::fmt::Display for MediaErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaErrorKind::Aborted => write!(f, "aborted"),
            MediaErrorKind::Network => write!(f, "network"),
            MediaErrorKind::Decode => write!(f, "decode"),
            MediaErrorKind::SourceNotSupported => write!(f, "source-not-supported"),
            MediaErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_codes() {
        assert_eq!(MediaErrorKind::from_code(2), MediaErrorKind::Network);
        assert_eq!(MediaErrorKind::from_code(3), MediaErrorKind::Decode);
        assert_eq!(MediaErrorKind::from_code(4), MediaErrorKind::SourceNotSupported);
        assert_eq!(MediaErrorKind::from_code(42), MediaErrorKind::Unknown);
        assert_eq!(MediaErrorKind::Decode.code(), 3);
    }

    #[test]
    fn test_error_classification() {
        let load = Error::VariantLoad {
            variant: VariantId::new("standard"),
            kind: MediaErrorKind::Network,
        };
        assert!(load.is_recoverable());
        assert!(!load.is_terminal());
        assert_eq!(load.error_code(), "VARIANT_LOAD");

        let exhausted = Error::FallbackExhausted {
            attempted: 3,
            kind: MediaErrorKind::Decode,
        };
        assert!(exhausted.is_terminal());
        assert!(!exhausted.is_recoverable());
    }

    #[test]
    fn test_surface_error_conversion() {
        let err = Error::from(SurfaceError::Detached);
        assert_eq!(err.error_code(), "SURFACE");
        assert!(!err.is_terminal());
        assert!(err.to_string().starts_with("Rendering surface error"));
    }
}
