//! Signed revocation artifacts: CRL snapshots and OCSP-style status responses.
//!
//! Both are recomputed on demand from a CA's ledger and never cached.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key_store::{verify_signature, SigningKeyStore};
use crate::types::{DistinguishedName, HashAlgorithm, RevocationReason, RevokedCertificateEntry};

/// Validity of a single OCSP response
pub const OCSP_RESPONSE_VALIDITY_HOURS: i64 = 1;

/// Signed snapshot of a CA's revocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRevocationList {
    pub issuer: DistinguishedName,
    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    pub revoked_certificates: Vec<RevokedCertificateEntry>,
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrlPayload<'a> {
    issuer: String,
    this_update: &'a DateTime<Utc>,
    next_update: &'a DateTime<Utc>,
    revoked_certificates: &'a [RevokedCertificateEntry],
}

impl CertificateRevocationList {
    /// Build and sign a CRL valid from `this_update` for `update_interval`
    pub fn build(
        issuer: &DistinguishedName,
        revoked_certificates: Vec<RevokedCertificateEntry>,
        this_update: DateTime<Utc>,
        update_interval: Duration,
        key: &SigningKeyStore,
        hash: HashAlgorithm,
    ) -> Result<Self> {
        let next_update = this_update + update_interval;
        let payload = Self::payload_bytes(issuer, &this_update, &next_update, &revoked_certificates)?;
        let signature = key.sign(hash, &payload)?;

        Ok(Self {
            issuer: issuer.clone(),
            this_update,
            next_update,
            revoked_certificates,
            signature,
        })
    }

    fn payload_bytes(
        issuer: &DistinguishedName,
        this_update: &DateTime<Utc>,
        next_update: &DateTime<Utc>,
        revoked_certificates: &[RevokedCertificateEntry],
    ) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&CrlPayload {
            issuer: issuer.to_string(),
            this_update,
            next_update,
            revoked_certificates,
        })?)
    }

    /// Check the CRL signature against the issuing CA's public key
    pub fn verify(&self, issuer_public_key_pem: &str, hash: HashAlgorithm) -> bool {
        match Self::payload_bytes(
            &self.issuer,
            &self.this_update,
            &self.next_update,
            &self.revoked_certificates,
        ) {
            Ok(payload) => verify_signature(issuer_public_key_pem, hash, &payload, &self.signature),
            Err(_) => false,
        }
    }

    pub fn contains(&self, serial_number: &str) -> bool {
        self.revoked_certificates
            .iter()
            .any(|e| e.serial_number == serial_number)
    }

    /// Whether relying parties may still use this CRL at `now`,
    /// allowing `grace` past `next_update`
    pub fn is_current_at(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        now >= self.this_update && now <= self.next_update + grace
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcspStatus {
    Good,
    Revoked,
    Unknown,
}

/// Point-in-time revocation status for one serial number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcspResponse {
    pub serial_number: String,
    pub status: OcspStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<RevocationReason>,
    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OcspPayload<'a> {
    serial_number: &'a str,
    status: OcspStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    revocation_time: Option<&'a DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revocation_reason: Option<RevocationReason>,
    this_update: &'a DateTime<Utc>,
    next_update: &'a DateTime<Utc>,
}

impl OcspResponse {
    /// Build a signed response
    ///
    /// `known` tells whether the serial was ever issued by the responding CA;
    /// `revocation` is its revocation entry, if any.
    pub fn build(
        serial_number: &str,
        known: bool,
        revocation: Option<&RevokedCertificateEntry>,
        this_update: DateTime<Utc>,
        key: &SigningKeyStore,
        hash: HashAlgorithm,
    ) -> Result<Self> {
        let (status, revocation_time, revocation_reason) = match (known, revocation) {
            (false, _) => (OcspStatus::Unknown, None, None),
            (true, Some(entry)) => (
                OcspStatus::Revoked,
                Some(entry.revocation_date),
                Some(entry.reason),
            ),
            (true, None) => (OcspStatus::Good, None, None),
        };

        let mut response = Self {
            serial_number: serial_number.to_string(),
            status,
            revocation_time,
            revocation_reason,
            this_update,
            next_update: this_update + Duration::hours(OCSP_RESPONSE_VALIDITY_HOURS),
            signature: String::new(),
        };
        response.signature = key.sign(hash, &response.payload_bytes()?)?;
        Ok(response)
    }

    fn payload_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&OcspPayload {
            serial_number: &self.serial_number,
            status: self.status,
            revocation_time: self.revocation_time.as_ref(),
            revocation_reason: self.revocation_reason,
            this_update: &self.this_update,
            next_update: &self.next_update,
        })?)
    }

    pub fn verify(&self, responder_public_key_pem: &str, hash: HashAlgorithm) -> bool {
        match self.payload_bytes() {
            Ok(payload) => {
                verify_signature(responder_public_key_pem, hash, &payload, &self.signature)
            }
            Err(_) => false,
        }
    }
}
