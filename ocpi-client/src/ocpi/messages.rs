//! OCPI response envelope and error taxonomy
//!
//! Every OCPI response is wrapped in an envelope:
//! `{ "data": ..., "status_code": 1000, "status_message": "...", "timestamp": "..." }`
//!
//! A `status_code` of 1000 is the protocol success sentinel, independent of the
//! HTTP status. Anything else inside an HTTP 2xx envelope is a protocol error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{CountryCode, Credentials, ModuleId, PartyId, VersionId};
use crate::party::{PartyKey, StoreError};

/// Header carrying the bearer token
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Per-request identifier header
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Per-logical-operation correlation header
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// OCPI status codes
pub mod status {
    /// Generic success
    pub const SUCCESS: u16 = 1000;
    /// Generic client error
    pub const CLIENT_ERROR: u16 = 2000;
    /// Invalid or missing parameters
    pub const INVALID_PARAMETERS: u16 = 2001;
    /// Not enough information
    pub const NOT_ENOUGH_INFORMATION: u16 = 2002;
    /// Unknown location
    pub const UNKNOWN_LOCATION: u16 = 2003;
    /// Generic server error
    pub const SERVER_ERROR: u16 = 3000;
    /// Unable to use the client's API
    pub const UNABLE_TO_USE_CLIENT_API: u16 = 3001;
    /// Unsupported version
    pub const UNSUPPORTED_VERSION: u16 = 3002;
    /// No matching endpoints or expected endpoints missing
    pub const NO_MATCHING_ENDPOINTS: u16 = 3003;
}

/// OCPI response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcpiResponse<T> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl<T> OcpiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status_code == status::SUCCESS
    }

    /// Turn a non-success envelope into a protocol error, keep the data otherwise
    pub fn into_result(self) -> Result<Option<T>, OcpiError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(OcpiError::Protocol {
                code: self.status_code,
                message: self.status_message.unwrap_or_default(),
            })
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Classification of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Tls,
    Other,
}

/// Failure below the HTTP layer (connection, timeout, TLS)
#[derive(Debug, Clone, Error)]
#[error("{kind:?} transport failure: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(TransportErrorKind::Timeout, format!("no response within {:?}", after))
    }
}

/// A lookup that found nothing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Peer advertises no versions")]
    NoVersions,

    #[error("Unknown version: {0}")]
    UnknownVersion(VersionId),

    #[error("No endpoint for module '{module}' in version {version}")]
    NoEndpoint { module: ModuleId, version: VersionId },

    #[error("No registered remote party")]
    NoRemoteParty,
}

/// Peer sent something that contradicts the local trust record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Peer identity changed during rotation: expected {expected}, got {actual_country_code}*{actual_party_id}")]
    IdentityMismatch {
        expected: PartyKey,
        actual_country_code: CountryCode,
        actual_party_id: PartyId,
    },
}

/// Errors returned by client operations
#[derive(Debug, Error)]
pub enum OcpiError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        status_code: Option<u16>,
        message: String,
    },

    #[error("OCPI status {code}: {message}")]
    Protocol { code: u16, message: String },

    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Response carried no data")]
    MissingData,

    #[error("Request attempt panicked: {0}")]
    Panicked(String),

    #[error("Trust record store error: {0}")]
    Store(#[from] StoreError),

    /// The peer accepted new credentials but the trust record could not be
    /// written. `credentials` is what the peer returned; the previous token
    /// stays in use.
    #[error("Peer accepted credentials but the trust record was not stored: {source}")]
    Uncommitted {
        credentials: Box<Credentials>,
        #[source]
        source: StoreError,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl OcpiError {
    /// OCPI status code carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            OcpiError::Protocol { code, .. } => Some(*code),
            OcpiError::Http { status_code, .. } => *status_code,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OcpiError::Cancelled)
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self, OcpiError::Resolution(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, OcpiError::Validation(_))
    }

    /// Credentials the peer accepted but that were never stored locally
    pub fn uncommitted_credentials(&self) -> Option<&Credentials> {
        match self {
            OcpiError::Uncommitted { credentials, .. } => Some(&**credentials),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpi::types::{VersionDetail, VersionInformation};

    #[test]
    fn test_versions_envelope_parsing() {
        let json = r#"{
            "data": [
                {"version": "2.1.1", "url": "https://peer.example/ocpi/2.1.1"},
                {"version": "2.2", "url": "https://peer.example/ocpi/2.2"}
            ],
            "status_code": 1000,
            "status_message": "Success",
            "timestamp": "2026-01-20T12:00:00Z"
        }"#;

        let envelope: OcpiResponse<Vec<VersionInformation>> = serde_json::from_str(json).unwrap();
        assert!(envelope.is_success());

        let data = envelope.into_result().unwrap().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].version, VersionId::from("2.2"));
    }

    #[test]
    fn test_protocol_error_envelope() {
        let json = r#"{"status_code": 2001, "status_message": "Missing party_id"}"#;
        let envelope: OcpiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();

        match envelope.into_result() {
            Err(OcpiError::Protocol { code, message }) => {
                assert_eq!(code, status::INVALID_PARAMETERS);
                assert_eq!(message, "Missing party_id");
            }
            other => panic!("Expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_status_only_envelope() {
        let json = r#"{"status_code": 1000, "timestamp": "2026-01-20T12:00:00Z"}"#;
        let envelope: OcpiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(envelope.into_result().unwrap().is_none());
    }

    #[test]
    fn test_status_only_envelope_without_default_data() {
        // Credentials has no Default; a missing data field must still decode
        let json = r#"{"status_code": 1000}"#;
        let envelope: OcpiResponse<Credentials> = serde_json::from_str(json).unwrap();
        assert!(envelope.data.is_none());
        assert!(envelope.into_result().unwrap().is_none());

        let json = r#"{"status_code": 2000, "status_message": "Unknown token"}"#;
        let envelope: OcpiResponse<VersionDetail> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.into_result().unwrap_err().status_code(), Some(2000));
    }

    #[test]
    fn test_error_status_code() {
        let err = OcpiError::Http {
            status: 401,
            status_code: Some(status::CLIENT_ERROR),
            message: "Unauthorized".into(),
        };
        assert_eq!(err.status_code(), Some(2000));
        assert!(!err.is_cancelled());
        assert!(OcpiError::from(ResolutionError::NoVersions).is_resolution());
    }
}
