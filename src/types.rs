//! Core PKI data types shared by the template manager and both CAs.
//!
//! Serialized field names follow the camelCase JSON contract used by the
//! rest of the agent coordination system; enum values are SCREAMING_SNAKE_CASE.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use serde::{Deserialize, Serialize};

/// Ordered trust tier of an agent, CRITICAL highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl TrustLevel {
    /// Numeric rank used for sufficiency checks (CRITICAL=4 … LOW=1)
    pub fn rank(self) -> u8 {
        match self {
            TrustLevel::Critical => 4,
            TrustLevel::High => 3,
            TrustLevel::Medium => 2,
            TrustLevel::Low => 1,
        }
    }

    /// Whether a certificate at this level satisfies `required`
    pub fn is_sufficient_for(self, required: TrustLevel) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Critical => "CRITICAL",
            TrustLevel::High => "HIGH",
            TrustLevel::Medium => "MEDIUM",
            TrustLevel::Low => "LOW",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CRITICAL" => Ok(TrustLevel::Critical),
            "HIGH" => Ok(TrustLevel::High),
            "MEDIUM" => Ok(TrustLevel::Medium),
            "LOW" => Ok(TrustLevel::Low),
            _ => Err(format!("Invalid trust level: {}", s)),
        }
    }
}

/// RSA modulus sizes accepted by the PKI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum KeySize {
    Rsa2048,
    Rsa4096,
}

impl KeySize {
    pub fn bits(self) -> u32 {
        match self {
            KeySize::Rsa2048 => 2048,
            KeySize::Rsa4096 => 4096,
        }
    }
}

impl TryFrom<u32> for KeySize {
    type Error = String;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            2048 => Ok(KeySize::Rsa2048),
            4096 => Ok(KeySize::Rsa4096),
            other => Err(format!("Unsupported key size: {} (expected 2048 or 4096)", other)),
        }
    }
}

impl From<KeySize> for u32 {
    fn from(size: KeySize) -> Self {
        size.bits()
    }
}

/// Digest used for envelope, CRL and OCSP signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA256")]
    Sha256,
    #[serde(rename = "SHA384")]
    Sha384,
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    pub fn message_digest(self) -> MessageDigest {
        match self {
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
            HashAlgorithm::Sha384 => MessageDigest::sha384(),
            HashAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyUsage {
    DigitalSignature,
    KeyEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
}

/// Validation strength a trust tier demands from relying parties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationLevel {
    Strict,
    Enhanced,
    Standard,
    Basic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SanType {
    Dns,
    Ip,
    Email,
    Uri,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAltName {
    #[serde(rename = "type")]
    pub kind: SanType,
    pub value: String,
}

/// Subject or issuer name of a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistinguishedName {
    pub common_name: String,
    pub organizational_unit: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_or_province: Option<String>,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

impl DistinguishedName {
    pub fn new(
        common_name: impl Into<String>,
        organizational_unit: impl Into<String>,
        organization: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            common_name: common_name.into(),
            organizational_unit: organizational_unit.into(),
            organization: organization.into(),
            locality: None,
            state_or_province: None,
            country: country.into(),
            email_address: None,
        }
    }
}

impl fmt::Display for DistinguishedName {
    /// `CN=.., OU=.., O=..[, L=..][, ST=..], C=..[, emailAddress=..]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CN={}, OU={}, O={}",
            self.common_name, self.organizational_unit, self.organization
        )?;
        if let Some(locality) = &self.locality {
            write!(f, ", L={}", locality)?;
        }
        if let Some(state) = &self.state_or_province {
            write!(f, ", ST={}", state)?;
        }
        write!(f, ", C={}", self.country)?;
        if let Some(email) = &self.email_address {
            write!(f, ", emailAddress={}", email)?;
        }
        Ok(())
    }
}

/// Identity of the agent software embedded in issued certificates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

/// Certificate signing request submitted by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSigningRequest {
    pub subject: DistinguishedName,
    /// SPKI public key, PEM encoded
    pub public_key: String,
    pub trust_level: TrustLevel,
    pub requested_capabilities: Vec<String>,
    pub agent_metadata: AgentMetadata,
}

/// A certificate produced by one of the CAs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    pub certificate: String,
    pub serial_number: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Leaf first, root last
    pub certificate_chain: Vec<String>,
    /// Uppercase hex SHA-256 of the envelope
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedCertificateEntry {
    pub serial_number: String,
    pub revocation_date: DateTime<Utc>,
    pub reason: RevocationReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Valid,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationStatus {
    pub status: CertificateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RevocationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_date: Option<DateTime<Utc>>,
}

impl RevocationStatus {
    pub fn valid() -> Self {
        Self {
            status: CertificateStatus::Valid,
            reason: None,
            revocation_date: None,
        }
    }

    pub fn revoked(entry: &RevokedCertificateEntry) -> Self {
        Self {
            status: CertificateStatus::Revoked,
            reason: Some(entry.reason),
            revocation_date: Some(entry.revocation_date),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Machine-readable code of a soft validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    CertificateNotFound,
    CertificateExpired,
    CertificateRevoked,
    InsufficientTrustLevel,
    InvalidSignature,
    ValidationError,
    CertificateRecordMismatch,
    InvalidChainLength,
    InvalidCertificateFormat,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationCode::CertificateNotFound => "CERTIFICATE_NOT_FOUND",
            ValidationCode::CertificateExpired => "CERTIFICATE_EXPIRED",
            ValidationCode::CertificateRevoked => "CERTIFICATE_REVOKED",
            ValidationCode::InsufficientTrustLevel => "INSUFFICIENT_TRUST_LEVEL",
            ValidationCode::InvalidSignature => "INVALID_SIGNATURE",
            ValidationCode::ValidationError => "VALIDATION_ERROR",
            ValidationCode::CertificateRecordMismatch => "CERTIFICATE_RECORD_MISMATCH",
            ValidationCode::InvalidChainLength => "INVALID_CHAIN_LENGTH",
            ValidationCode::InvalidCertificateFormat => "INVALID_CERTIFICATE_FORMAT",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One soft failure found while validating a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn new(code: ValidationCode, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code,
            message: message.into(),
            severity,
        }
    }
}

/// Outcome of a validation call. Built fresh every time, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub trust_level: TrustLevel,
    pub validation_errors: Vec<ValidationError>,
    pub certificate_chain: Vec<String>,
    pub revocation_status: RevocationStatus,
    pub validation_timestamp: DateTime<Utc>,
}

impl ValidationResult {
    pub fn has_error(&self, code: ValidationCode) -> bool {
        self.validation_errors.iter().any(|e| e.code == code)
    }

    pub fn error_codes(&self) -> Vec<ValidationCode> {
        self.validation_errors.iter().map(|e| e.code).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_level_ordering() {
        assert!(TrustLevel::Critical.is_sufficient_for(TrustLevel::High));
        assert!(TrustLevel::Medium.is_sufficient_for(TrustLevel::Medium));
        assert!(!TrustLevel::High.is_sufficient_for(TrustLevel::Critical));
        assert!(!TrustLevel::Low.is_sufficient_for(TrustLevel::Medium));
    }

    #[test]
    fn test_trust_level_wire_format() {
        let json = serde_json::to_string(&TrustLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        assert_eq!("HIGH".parse::<TrustLevel>().unwrap(), TrustLevel::High);
        assert!("high".parse::<TrustLevel>().is_err());
    }

    #[test]
    fn test_key_size_rejects_unsupported_bits() {
        assert_eq!(KeySize::try_from(4096).unwrap(), KeySize::Rsa4096);
        assert!(KeySize::try_from(1024).is_err());
        assert_eq!(serde_json::to_string(&KeySize::Rsa2048).unwrap(), "2048");
    }

    #[test]
    fn test_distinguished_name_format() {
        let dn = DistinguishedName::new("agent-7", "Agent Systems", "Example Org", "US");
        assert_eq!(dn.to_string(), "CN=agent-7, OU=Agent Systems, O=Example Org, C=US");

        let mut full = dn.clone();
        full.locality = Some("Austin".to_string());
        full.state_or_province = Some("TX".to_string());
        full.email_address = Some("ops@example.org".to_string());
        assert_eq!(
            full.to_string(),
            "CN=agent-7, OU=Agent Systems, O=Example Org, L=Austin, ST=TX, C=US, emailAddress=ops@example.org"
        );
    }

    #[test]
    fn test_validation_code_serializes_screaming_case() {
        let err = ValidationError::new(
            ValidationCode::CertificateRecordMismatch,
            "mismatch",
            Severity::Warning,
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "CERTIFICATE_RECORD_MISMATCH");
        assert_eq!(json["severity"], "WARNING");
    }
}
