//! Hard failures raised by the certificate authorities.
//!
//! Soft validation problems never surface here; they are collected into a
//! [`ValidationResult`](crate::types::ValidationResult) instead.

use thiserror::Error;

use crate::approval::RequestStatus;
use crate::types::TrustLevel;

/// Errors that abort a CA operation
#[derive(Error, Debug)]
pub enum CaError {
    /// The CA has no signing identity yet
    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    /// A requested capability is outside the template's allowed set
    #[error("Requested capabilities exceed trust level permissions: {0}")]
    CapabilityExceeded(String),

    /// LOW trust agents are never issued certificates
    #[error("LOW trust level agents do not require certificates")]
    LowTrustLevel,

    /// No template is registered for the trust level
    #[error("No certificate template found for trust level: {0}")]
    TemplateNotFound(TrustLevel),

    /// Templates cannot be installed for LOW
    #[error("Cannot create template for LOW trust level")]
    LowTemplateUpdate,

    /// The serial number was never issued by this CA
    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    /// The serial number already has a revocation entry
    #[error("Certificate already revoked: {0}")]
    AlreadyRevoked(String),

    /// Only CRITICAL requests go through manual approval
    #[error("Only CRITICAL trust level certificates require manual approval (got {0})")]
    NotCriticalTrustLevel(TrustLevel),

    #[error("Critical certificate request not found: {0}")]
    CriticalRequestNotFound(String),

    #[error("Critical certificate request denied: {0}")]
    CriticalRequestDenied(String),

    #[error("Critical certificate request expired: {0}")]
    CriticalRequestExpired(String),

    /// The request already reached a terminal state
    #[error("Critical certificate request {id} is {status}, not pending approval")]
    RequestNotPending { id: String, status: RequestStatus },

    /// A validity period that is empty, over the limit, or past the representable date range
    #[error("Invalid validity period: {0} days")]
    InvalidValidityPeriod(u64),

    /// A template was offered for a trust level other than its own
    #[error("Template for trust level {template} cannot be installed as {requested}")]
    TemplateLevelMismatch {
        requested: TrustLevel,
        template: TrustLevel,
    },

    /// The envelope could not be decoded
    #[error("Invalid certificate envelope: {0}")]
    InvalidEnvelope(String),

    #[error("OCSP responder is disabled by configuration")]
    OcspDisabled,

    /// Key generation or signing failed inside OpenSSL
    #[error("Crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result alias for CA operations
pub type Result<T> = std::result::Result<T, CaError>;
