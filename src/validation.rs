//! Certificate validation shared by the Root and Intermediate CAs.
//!
//! Validation never fails hard: every problem becomes a [`ValidationError`]
//! inside the returned [`ValidationResult`]. A result is valid only when it
//! carries no errors at all, warnings included.

use chrono::{DateTime, Utc};

use crate::envelope::CertificateBody;
use crate::registry::CertificateRegistry;
use crate::types::{
    HashAlgorithm, RevocationStatus, Severity, TrustLevel, ValidationCode, ValidationError,
    ValidationResult,
};

/// Assemble a result; validity follows from the error list
pub fn finish(
    validation_errors: Vec<ValidationError>,
    trust_level: TrustLevel,
    certificate_chain: Vec<String>,
    revocation_status: RevocationStatus,
    at: DateTime<Utc>,
) -> ValidationResult {
    ValidationResult {
        is_valid: validation_errors.is_empty(),
        trust_level,
        validation_errors,
        certificate_chain,
        revocation_status,
        validation_timestamp: at,
    }
}

/// The envelope could not be decoded
pub fn parse_failure(
    required: TrustLevel,
    cause: impl std::fmt::Display,
    at: DateTime<Utc>,
) -> ValidationResult {
    finish(
        vec![ValidationError::new(
            ValidationCode::ValidationError,
            format!("Certificate validation failed: {}", cause),
            Severity::Critical,
        )],
        required,
        Vec::new(),
        RevocationStatus::valid(),
        at,
    )
}

pub fn empty_chain(at: DateTime<Utc>) -> ValidationResult {
    finish(
        vec![ValidationError::new(
            ValidationCode::InvalidChainLength,
            "Certificate chain must contain at least 1 certificate",
            Severity::Error,
        )],
        TrustLevel::Low,
        Vec::new(),
        RevocationStatus::valid(),
        at,
    )
}

/// One element of a multi-certificate chain did not parse
pub fn malformed_chain(
    chain: &[String],
    index: usize,
    cause: impl std::fmt::Display,
    at: DateTime<Utc>,
) -> ValidationResult {
    finish(
        vec![ValidationError::new(
            ValidationCode::InvalidCertificateFormat,
            format!("Certificate at position {} is malformed: {}", index, cause),
            Severity::Error,
        )],
        TrustLevel::Low,
        chain.to_vec(),
        RevocationStatus::valid(),
        at,
    )
}

/// Envelope names this CA as issuer but the serial is not on record
pub fn record_mismatch(
    envelope: &str,
    issuer_name: &str,
    required: TrustLevel,
    at: DateTime<Utc>,
) -> ValidationResult {
    finish(
        vec![ValidationError::new(
            ValidationCode::CertificateRecordMismatch,
            format!(
                "Certificate appears to be issued by {} but not found in records",
                issuer_name
            ),
            Severity::Warning,
        )],
        required,
        vec![envelope.to_string()],
        RevocationStatus::valid(),
        at,
    )
}

pub fn not_found_error() -> ValidationError {
    ValidationError::new(
        ValidationCode::CertificateNotFound,
        "Certificate not found in CA records",
        Severity::Error,
    )
}

pub fn not_initialized_error(ca_name: &str) -> ValidationError {
    ValidationError::new(
        ValidationCode::ValidationError,
        format!("{} not initialized", ca_name),
        Severity::Critical,
    )
}

/// Issuer key and digest used to check envelope signatures
pub struct SignatureCheck<'a> {
    pub public_key_pem: &'a str,
    pub hash: HashAlgorithm,
}

/// Expiry, revocation, trust level and signature checks, in that order.
///
/// Errors are appended to `errors`; the revocation status of the serial is
/// returned.
pub fn check_certificate(
    body: &CertificateBody,
    registry: &CertificateRegistry,
    required: TrustLevel,
    now: DateTime<Utc>,
    signature: &SignatureCheck<'_>,
    errors: &mut Vec<ValidationError>,
) -> RevocationStatus {
    match body.valid_to_time() {
        Ok(valid_to) if valid_to < now => errors.push(ValidationError::new(
            ValidationCode::CertificateExpired,
            "Certificate has expired",
            Severity::Error,
        )),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(
            ValidationCode::ValidationError,
            format!("Certificate validation failed: {}", e),
            Severity::Critical,
        )),
    }

    let revocation_status = registry.revocation_status(&body.serial_number);
    if registry.revocation_entry(&body.serial_number).is_some() {
        errors.push(ValidationError::new(
            ValidationCode::CertificateRevoked,
            "Certificate has been revoked",
            Severity::Error,
        ));
    }

    let actual = body.resolved_trust_level();
    if !actual.is_sufficient_for(required) {
        errors.push(ValidationError::new(
            ValidationCode::InsufficientTrustLevel,
            format!(
                "Certificate trust level {} insufficient for required {}",
                actual, required
            ),
            Severity::Error,
        ));
    }

    if !body.verify(signature.public_key_pem, signature.hash) {
        errors.push(ValidationError::new(
            ValidationCode::InvalidSignature,
            "Certificate signature verification failed",
            Severity::Error,
        ));
    }

    revocation_status
}

/// Code of the first error, used as the audit error code
pub fn first_error_code(result: &ValidationResult) -> Option<ValidationCode> {
    result.validation_errors.first().map(|e| e.code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_store::SigningKeyStore;
    use crate::types::{
        AgentMetadata, CertificateSigningRequest, CertificateStatus, DistinguishedName,
        IssuedCertificate, KeySize, RevocationReason,
    };
    use chrono::Duration;

    fn body_for(level: TrustLevel, from: DateTime<Utc>, to: DateTime<Utc>) -> CertificateBody {
        let csr = CertificateSigningRequest {
            subject: DistinguishedName::new("agent", "Agents", "Example Org", "US"),
            public_key: "pem".to_string(),
            trust_level: level,
            requested_capabilities: Vec::new(),
            agent_metadata: AgentMetadata {
                name: "agent".to_string(),
                version: "1.0.0".to_string(),
                capabilities: Vec::new(),
            },
        };
        CertificateBody::for_request(
            "0a0b",
            &DistinguishedName::new("Root CA", "CA", "Example Org", "US"),
            &csr,
            from,
            to,
        )
    }

    fn sealed(key: &SigningKeyStore, body: CertificateBody) -> CertificateBody {
        let envelope = body.seal(key, HashAlgorithm::Sha256).unwrap();
        CertificateBody::decode(&envelope).unwrap()
    }

    fn registry_with(body: &CertificateBody) -> CertificateRegistry {
        let mut registry = CertificateRegistry::new();
        registry.record(IssuedCertificate {
            certificate: String::new(),
            serial_number: body.serial_number.clone(),
            valid_from: body.valid_from_time().unwrap(),
            valid_to: body.valid_to_time().unwrap(),
            certificate_chain: Vec::new(),
            fingerprint: String::new(),
        });
        registry
    }

    #[test]
    fn test_clean_certificate_has_no_errors() {
        let key = SigningKeyStore::generate(KeySize::Rsa2048).unwrap();
        let now = Utc::now();
        let body = sealed(&key, body_for(TrustLevel::High, now, now + Duration::days(30)));
        let registry = registry_with(&body);

        let mut errors = Vec::new();
        let status = check_certificate(
            &body,
            &registry,
            TrustLevel::Medium,
            now,
            &SignatureCheck {
                public_key_pem: key.public_key_pem(),
                hash: HashAlgorithm::Sha256,
            },
            &mut errors,
        );
        assert!(errors.is_empty());
        assert_eq!(status.status, CertificateStatus::Valid);
    }

    #[test]
    fn test_errors_accumulate_in_order() {
        let key = SigningKeyStore::generate(KeySize::Rsa2048).unwrap();
        let other = SigningKeyStore::generate(KeySize::Rsa2048).unwrap();
        let now = Utc::now();
        let body = sealed(
            &key,
            body_for(TrustLevel::Medium, now - Duration::days(10), now - Duration::days(1)),
        );
        let mut registry = registry_with(&body);
        registry
            .revoke(&body.serial_number, RevocationReason::KeyCompromise, now)
            .unwrap();

        let mut errors = Vec::new();
        let status = check_certificate(
            &body,
            &registry,
            TrustLevel::Critical,
            now,
            &SignatureCheck {
                public_key_pem: other.public_key_pem(),
                hash: HashAlgorithm::Sha256,
            },
            &mut errors,
        );

        let codes: Vec<ValidationCode> = errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                ValidationCode::CertificateExpired,
                ValidationCode::CertificateRevoked,
                ValidationCode::InsufficientTrustLevel,
                ValidationCode::InvalidSignature,
            ]
        );
        assert_eq!(
            errors[2].message,
            "Certificate trust level MEDIUM insufficient for required CRITICAL"
        );
        assert!(errors.iter().all(|e| e.severity == Severity::Error));
        assert_eq!(status.reason, Some(RevocationReason::KeyCompromise));
    }

    #[test]
    fn test_warning_blocks_validity() {
        let now = Utc::now();
        let result = record_mismatch("envelope", "Intermediate CA", TrustLevel::Critical, now);
        assert!(!result.is_valid);
        assert_eq!(result.validation_errors[0].severity, Severity::Warning);
        assert_eq!(
            result.validation_errors[0].message,
            "Certificate appears to be issued by Intermediate CA but not found in records"
        );
        assert_eq!(result.trust_level, TrustLevel::Critical);
        assert_eq!(result.certificate_chain, vec!["envelope".to_string()]);
    }

    #[test]
    fn test_empty_chain_result() {
        let result = empty_chain(Utc::now());
        assert!(!result.is_valid);
        assert_eq!(result.trust_level, TrustLevel::Low);
        assert_eq!(result.error_codes(), vec![ValidationCode::InvalidChainLength]);
        assert_eq!(first_error_code(&result), Some(ValidationCode::InvalidChainLength));
        assert_eq!(result.validation_errors[0].severity, Severity::Error);
    }
}
