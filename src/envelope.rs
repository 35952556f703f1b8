//! Certificate Envelope Module
//!
//! Defines the signed certificate envelope exchanged with the rest of the
//! agent coordination system and the functions that build, seal, decode and
//! verify it.
//!
//! # Wire Format
//! ```text
//! -----BEGIN CERTIFICATE-----
//! base64(JSON{version, serialNumber, issuer, subject, validFrom, validTo,
//!             publicKey, trustLevel?, capabilities?, agentMetadata?,
//!             keyUsage?, basicConstraints?, signature})
//! -----END CERTIFICATE-----
//! ```
//!
//! The `signature` is computed over the same JSON object serialized without
//! the `signature` field. Field order is fixed by [`CertificateBody`], so the
//! payload re-serializes identically during verification.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CaError, Result};
use crate::key_store::{verify_signature, SigningKeyStore};
use crate::types::{
    AgentMetadata, CertificateSigningRequest, DistinguishedName, HashAlgorithm, KeyUsage,
    TrustLevel,
};

const PEM_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const PEM_FOOTER: &str = "-----END CERTIFICATE-----";
const ENVELOPE_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicConstraints {
    pub ca: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_len_constraint: Option<u32>,
}

/// JSON body of a certificate envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBody {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub valid_from: String,
    #[serde(default)]
    pub valid_to: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_metadata: Option<AgentMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_usage: Option<Vec<KeyUsage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_constraints: Option<BasicConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl CertificateBody {
    /// Body of a self-signed CA certificate
    pub fn self_signed(
        serial_number: &str,
        name: &DistinguishedName,
        public_key_pem: &str,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
        key_usage: Vec<KeyUsage>,
    ) -> Self {
        let name = name.to_string();
        Self {
            version: ENVELOPE_VERSION,
            serial_number: serial_number.to_string(),
            issuer: name.clone(),
            subject: name,
            valid_from: format_timestamp(valid_from),
            valid_to: format_timestamp(valid_to),
            public_key: public_key_pem.to_string(),
            trust_level: None,
            capabilities: None,
            agent_metadata: None,
            key_usage: Some(key_usage),
            basic_constraints: Some(BasicConstraints {
                ca: true,
                path_len_constraint: None,
            }),
            signature: None,
        }
    }

    /// Body of a certificate issued for an agent's signing request
    pub fn for_request(
        serial_number: &str,
        issuer: &DistinguishedName,
        request: &CertificateSigningRequest,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            serial_number: serial_number.to_string(),
            issuer: issuer.to_string(),
            subject: request.subject.to_string(),
            valid_from: format_timestamp(valid_from),
            valid_to: format_timestamp(valid_to),
            public_key: request.public_key.clone(),
            trust_level: Some(request.trust_level.as_str().to_string()),
            capabilities: Some(request.requested_capabilities.clone()),
            agent_metadata: Some(request.agent_metadata.clone()),
            key_usage: None,
            basic_constraints: None,
            signature: None,
        }
    }

    /// Sign the body and wrap it into an envelope string
    pub fn seal(mut self, key: &SigningKeyStore, hash: HashAlgorithm) -> Result<String> {
        self.signature = None;
        let payload = serde_json::to_vec(&self)?;
        self.signature = Some(key.sign(hash, &payload)?);

        let json = serde_json::to_vec(&self)?;
        Ok(format!(
            "{}\n{}\n{}",
            PEM_HEADER,
            STANDARD.encode(json),
            PEM_FOOTER
        ))
    }

    /// Decode an envelope string
    ///
    /// # Errors
    /// [`CaError::InvalidEnvelope`] if the armor, base64 or JSON is malformed
    pub fn decode(envelope: &str) -> Result<Self> {
        let inner = envelope
            .trim()
            .strip_prefix(PEM_HEADER)
            .and_then(|rest| rest.strip_suffix(PEM_FOOTER))
            .ok_or_else(|| CaError::InvalidEnvelope("missing certificate armor".to_string()))?;

        let encoded: String = inner.split_whitespace().collect();
        let json = STANDARD
            .decode(encoded)
            .map_err(|e| CaError::InvalidEnvelope(format!("invalid base64: {}", e)))?;

        serde_json::from_slice(&json)
            .map_err(|e| CaError::InvalidEnvelope(format!("invalid JSON body: {}", e)))
    }

    /// Bytes covered by the signature
    pub fn signed_payload(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Verify the embedded signature against the issuer's public key
    pub fn verify(&self, issuer_public_key_pem: &str, hash: HashAlgorithm) -> bool {
        let Some(signature) = self.signature.as_deref() else {
            return false;
        };
        match self.signed_payload() {
            Ok(payload) => verify_signature(issuer_public_key_pem, hash, &payload, signature),
            Err(_) => false,
        }
    }

    /// Embedded trust level; missing or unknown values resolve to MEDIUM
    pub fn resolved_trust_level(&self) -> TrustLevel {
        self.trust_level
            .as_deref()
            .and_then(|level| level.parse().ok())
            .unwrap_or(TrustLevel::Medium)
    }

    pub fn valid_to_time(&self) -> Result<DateTime<Utc>> {
        parse_timestamp(&self.valid_to)
    }

    pub fn valid_from_time(&self) -> Result<DateTime<Utc>> {
        parse_timestamp(&self.valid_from)
    }
}

/// Decode an envelope and make sure its validity timestamps are readable
pub fn parse_certificate(envelope: &str) -> Result<CertificateBody> {
    let body = CertificateBody::decode(envelope)?;
    body.valid_from_time()?;
    body.valid_to_time()?;
    Ok(body)
}

/// ISO-8601 UTC with millisecond precision, e.g. `2025-01-01T00:00:00.000Z`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CaError::InvalidEnvelope(format!("invalid timestamp '{}': {}", value, e)))
}

/// Uppercase hex SHA-256 of an envelope string
pub fn fingerprint(envelope: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(envelope.as_bytes());
    hex::encode_upper(hasher.finalize())
}
