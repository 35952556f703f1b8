//! Intermediate Certificate Authority
//!
//! Issues HIGH and MEDIUM agent certificates under a certificate obtained from
//! the Root CA. Validation of certificates it did not issue is delegated to
//! the Root CA.
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed)
//!   └── Intermediate CA (signed by Root) ← This module
//!       └── HIGH / MEDIUM agent certificates
//! ```
//!
//! # Certificate Properties
//! - **Subject**: `CN=Intermediate CA, OU=Agent Systems, ...` (configurable)
//! - **Trust Level**: HIGH, capability `CERTIFICATE_SIGNING`
//! - **Key Usage**: KEY_CERT_SIGN, CRL_SIGN
//! - **Validity**: `intermediate_ca.validity_period_years` × 365 days
//! - **Chain of issued leaves**: `[leaf, intermediate, root]`

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::audit::{self, AuditLog, AuditResult, AuditSink, PkiAuditEntry, PkiOperation};
use crate::clock::{validity_end, Clock, DAYS_PER_YEAR};
use crate::configs::PkiConfig;
use crate::envelope::{fingerprint, parse_certificate, CertificateBody};
use crate::error::{CaError, Result};
use crate::key_store::SigningKeyStore;
use crate::registry::CertificateRegistry;
use crate::revocation::{CertificateRevocationList, OcspResponse};
use crate::root_ca::RootCertificateAuthority;
use crate::templates::{CertificateTemplate, CertificateTemplateManager};
use crate::types::{
    AgentMetadata, CertificateSigningRequest, DistinguishedName, IssuedCertificate, KeyUsage,
    RevocationReason, RevocationStatus, RevokedCertificateEntry, TrustLevel, ValidationResult,
};
use crate::validation::{self, SignatureCheck};

const CA_NAME: &str = "Intermediate CA";
const CERTIFICATE_SIGNING: &str = "CERTIFICATE_SIGNING";
const CRL_GENERATION: &str = "CRL_GENERATION";
const AGENT_NAME: &str = "intermediate-ca";
const AGENT_VERSION: &str = "1.0.0";

struct IntermediateIdentity {
    key: SigningKeyStore,
    certificate: IssuedCertificate,
}

#[derive(Default)]
struct IntermediateState {
    identity: Option<IntermediateIdentity>,
    registry: CertificateRegistry,
}

pub struct IntermediateCertificateAuthority {
    config: PkiConfig,
    subject: DistinguishedName,
    root: Arc<RootCertificateAuthority>,
    templates: CertificateTemplateManager,
    clock: Arc<dyn Clock>,
    state: Mutex<IntermediateState>,
    audit: AuditLog,
}

impl IntermediateCertificateAuthority {
    pub fn new(
        config: PkiConfig,
        root: Arc<RootCertificateAuthority>,
        templates: CertificateTemplateManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_audit_log(config, root, templates, clock, AuditLog::new())
    }

    pub fn with_sink(
        config: PkiConfig,
        root: Arc<RootCertificateAuthority>,
        templates: CertificateTemplateManager,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self::with_audit_log(config, root, templates, clock, AuditLog::with_sink(sink))
    }

    fn with_audit_log(
        config: PkiConfig,
        root: Arc<RootCertificateAuthority>,
        templates: CertificateTemplateManager,
        clock: Arc<dyn Clock>,
        audit: AuditLog,
    ) -> Self {
        let subject = config.intermediate_ca_identity.distinguished_name();
        Self {
            config,
            subject,
            root,
            templates,
            clock,
            state: Mutex::new(IntermediateState::default()),
            audit,
        }
    }

    /// Generate the intermediate key and obtain its certificate from the Root CA
    ///
    /// Idempotent: later calls return the stored certificate.
    ///
    /// # Errors
    /// - [`CaError::NotInitialized`] if the Root CA has no certificate yet
    /// - [`CaError::InvalidValidityPeriod`] if the configured years do not fit
    pub fn initialize(&self) -> Result<IssuedCertificate> {
        let mut state = self.state.lock();
        if let Some(identity) = &state.identity {
            return Ok(identity.certificate.clone());
        }

        let ca_config = &self.config.intermediate_ca;
        let validity_days = u64::from(ca_config.validity_period_years) * DAYS_PER_YEAR;
        let validity_period_days = u32::try_from(validity_days)
            .map_err(|_| CaError::InvalidValidityPeriod(validity_days))?;

        let key = SigningKeyStore::generate(ca_config.key_size)?;
        let csr = self.signing_request(&key);

        let mut template = self.templates.get_template(TrustLevel::High)?;
        template.key_usage = vec![KeyUsage::KeyCertSign, KeyUsage::CrlSign];
        template.validity_period_days = validity_period_days;
        template.allowed_capabilities = vec![CERTIFICATE_SIGNING.to_string()];
        template.max_path_length = Some(ca_config.path_len_constraint);

        let certificate = self.root.issue_certificate(&csr, &template)?;
        tracing::info!(
            serial = %certificate.serial_number,
            subject = %self.subject,
            "Intermediate CA initialized"
        );

        state.identity = Some(IntermediateIdentity {
            key,
            certificate: certificate.clone(),
        });
        Ok(certificate)
    }

    fn signing_request(&self, key: &SigningKeyStore) -> CertificateSigningRequest {
        CertificateSigningRequest {
            subject: self.subject.clone(),
            public_key: key.public_key_pem().to_string(),
            trust_level: TrustLevel::High,
            requested_capabilities: vec![CERTIFICATE_SIGNING.to_string()],
            agent_metadata: AgentMetadata {
                name: AGENT_NAME.to_string(),
                version: AGENT_VERSION.to_string(),
                capabilities: vec![CERTIFICATE_SIGNING.to_string(), CRL_GENERATION.to_string()],
            },
        }
    }

    /// Issue an agent certificate signed by the intermediate key
    ///
    /// # Returns
    /// The certificate with chain `[leaf, intermediate, root]`
    pub fn issue_certificate(
        &self,
        csr: &CertificateSigningRequest,
        template: &CertificateTemplate,
    ) -> Result<IssuedCertificate> {
        let mut state = self.state.lock();
        let IntermediateState { identity, registry } = &mut *state;
        let identity = identity.as_ref().ok_or(CaError::NotInitialized(CA_NAME))?;
        template.ensure_capabilities(&csr.requested_capabilities)?;

        let now = self.clock.now();
        let valid_to = validity_end(now, u64::from(template.validity_period_days))?;
        let serial_number = registry.allocate_serial()?;

        let envelope = CertificateBody::for_request(&serial_number, &self.subject, csr, now, valid_to)
            .seal(&identity.key, self.config.intermediate_ca.hash_algorithm)?;

        let mut certificate_chain = Vec::with_capacity(identity.certificate.certificate_chain.len() + 1);
        certificate_chain.push(envelope.clone());
        certificate_chain.extend(identity.certificate.certificate_chain.iter().cloned());

        let certificate = IssuedCertificate {
            fingerprint: fingerprint(&envelope),
            certificate: envelope,
            serial_number,
            valid_from: now,
            valid_to,
            certificate_chain,
        };
        registry.record(certificate.clone());

        self.audit.record(
            PkiAuditEntry::new(now, PkiOperation::CertificateIssued, AuditResult::Success)
                .serial(&certificate.serial_number)
                .subject(&csr.subject.common_name)
                .issuer(&self.subject.common_name)
                .trust_level(csr.trust_level),
        );
        Ok(certificate)
    }

    /// Validate an envelope, delegating to the Root CA for foreign serials
    ///
    /// An envelope that names this CA as issuer but whose serial is not on
    /// record is reported as a `CERTIFICATE_RECORD_MISMATCH` warning instead
    /// of being delegated.
    pub fn validate_certificate(
        &self,
        envelope: &str,
        required_trust_level: TrustLevel,
    ) -> ValidationResult {
        let now = self.clock.now();
        let body = match parse_certificate(envelope) {
            Ok(body) => body,
            Err(e) => {
                let result = validation::parse_failure(required_trust_level, e, now);
                self.audit_validation(PkiOperation::CertificateValidated, None, &result, now);
                return result;
            }
        };

        let result = {
            let state = self.state.lock();
            if let Some(record) = state.registry.get(&body.serial_number) {
                let mut errors = Vec::new();
                let revocation_status = match &state.identity {
                    Some(identity) => validation::check_certificate(
                        &body,
                        &state.registry,
                        required_trust_level,
                        now,
                        &SignatureCheck {
                            public_key_pem: identity.key.public_key_pem(),
                            hash: self.config.intermediate_ca.hash_algorithm,
                        },
                        &mut errors,
                    ),
                    None => {
                        errors.push(validation::not_initialized_error(CA_NAME));
                        RevocationStatus::valid()
                    }
                };
                Some(validation::finish(
                    errors,
                    body.resolved_trust_level(),
                    record.certificate_chain.clone(),
                    revocation_status,
                    now,
                ))
            } else if body.issuer == self.subject.to_string() {
                Some(validation::record_mismatch(
                    envelope,
                    &self.subject.common_name,
                    required_trust_level,
                    now,
                ))
            } else {
                None
            }
        };

        match result {
            Some(result) => {
                self.audit_validation(
                    PkiOperation::CertificateValidated,
                    Some(body.serial_number),
                    &result,
                    now,
                );
                result
            }
            None => {
                tracing::debug!(serial = %body.serial_number, "Delegating validation to Root CA");
                self.root.validate_certificate(envelope, required_trust_level)
            }
        }
    }

    fn audit_validation(
        &self,
        operation: PkiOperation,
        serial: Option<String>,
        result: &ValidationResult,
        now: DateTime<Utc>,
    ) {
        let mut entry = PkiAuditEntry::new(now, operation, AuditResult::of_validation(result))
            .issuer(&self.subject.common_name)
            .trust_level(result.trust_level)
            .validation_error(validation::first_error_code(result));
        if let Some(serial) = serial {
            entry = entry.serial(serial);
        }
        self.audit.record(entry);
    }

    /// Validate a chain ordered leaf first
    ///
    /// The leaf is validated here when its serial is on record, otherwise the
    /// whole chain goes to the Root CA.
    pub fn validate_certificate_chain(&self, chain: &[String]) -> ValidationResult {
        let now = self.clock.now();
        match chain {
            [] => {
                let result = validation::empty_chain(now);
                self.audit_validation(PkiOperation::TrustChainValidated, None, &result, now);
                result
            }
            [single] => self.validate_certificate(single, TrustLevel::Medium),
            [leaf, ..] => {
                for (index, element) in chain.iter().enumerate() {
                    if let Err(e) = parse_certificate(element) {
                        let result = validation::malformed_chain(chain, index, e, now);
                        self.audit_validation(PkiOperation::TrustChainValidated, None, &result, now);
                        return result;
                    }
                }
                let (serial, level) = match parse_certificate(leaf) {
                    Ok(body) => (body.serial_number.clone(), body.resolved_trust_level()),
                    Err(_) => (String::new(), TrustLevel::Medium),
                };
                if self.state.lock().registry.contains(&serial) {
                    self.validate_certificate(leaf, level)
                } else {
                    self.root.validate_certificate_chain(chain)
                }
            }
        }
    }

    /// Permanently revoke a certificate issued by this CA
    ///
    /// Fails with [`CaError::CertificateNotFound`] or
    /// [`CaError::AlreadyRevoked`]; every attempt is audited.
    pub fn revoke_certificate(
        &self,
        serial_number: &str,
        reason: RevocationReason,
    ) -> Result<RevokedCertificateEntry> {
        let now = self.clock.now();
        let outcome = self
            .state
            .lock()
            .registry
            .revoke(serial_number, reason, now);

        self.audit.record(audit::revocation_entry(
            now,
            serial_number,
            &self.subject.common_name,
            &outcome,
        ));
        if outcome.is_ok() {
            tracing::info!(serial = %serial_number, ?reason, "Certificate revoked by Intermediate CA");
        }
        outcome
    }

    pub fn generate_crl(&self) -> Result<CertificateRevocationList> {
        let now = self.clock.now();
        let state = self.state.lock();
        let identity = state
            .identity
            .as_ref()
            .ok_or(CaError::NotInitialized(CA_NAME))?;

        let crl = CertificateRevocationList::build(
            &self.subject,
            state.registry.revoked_entries(),
            now,
            self.config.revocation.crl_update_interval(),
            &identity.key,
            self.config.intermediate_ca.hash_algorithm,
        )?;

        self.audit.record(
            PkiAuditEntry::new(now, PkiOperation::CrlGenerated, AuditResult::Success)
                .issuer(&self.subject.common_name),
        );
        Ok(crl)
    }

    pub fn check_revocation_status(&self, serial_number: &str) -> Result<OcspResponse> {
        if !self.config.revocation.ocsp_enabled {
            return Err(CaError::OcspDisabled);
        }
        let now = self.clock.now();
        let state = self.state.lock();
        let identity = state
            .identity
            .as_ref()
            .ok_or(CaError::NotInitialized(CA_NAME))?;

        let response = OcspResponse::build(
            serial_number,
            state.registry.contains(serial_number),
            state.registry.revocation_entry(serial_number),
            now,
            &identity.key,
            self.config.intermediate_ca.hash_algorithm,
        )?;

        self.audit.record(
            PkiAuditEntry::new(now, PkiOperation::OcspRequest, AuditResult::Success)
                .serial(serial_number)
                .issuer(&self.subject.common_name),
        );
        Ok(response)
    }

    pub fn certificate(&self) -> Option<IssuedCertificate> {
        self.state
            .lock()
            .identity
            .as_ref()
            .map(|identity| identity.certificate.clone())
    }

    pub fn public_key_pem(&self) -> Option<String> {
        self.state
            .lock()
            .identity
            .as_ref()
            .map(|identity| identity.key.public_key_pem().to_string())
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn root(&self) -> &Arc<RootCertificateAuthority> {
        &self.root
    }

    pub fn templates(&self) -> &CertificateTemplateManager {
        &self.templates
    }

    pub fn issued_serials(&self) -> Vec<String> {
        self.state.lock().registry.serials()
    }

    pub fn issued_certificate(&self, serial_number: &str) -> Option<IssuedCertificate> {
        self.state.lock().registry.get(serial_number).cloned()
    }

    pub fn revoked_certificates(&self) -> Vec<RevokedCertificateEntry> {
        self.state.lock().registry.revoked_entries()
    }

    pub fn audit_log(&self) -> Vec<PkiAuditEntry> {
        self.audit.entries()
    }

    pub fn expiring_certificates(&self, within_days: u32) -> Vec<IssuedCertificate> {
        let now = self.clock.now();
        self.state
            .lock()
            .registry
            .expiring_within(now, Duration::days(i64::from(within_days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{KeySize, ValidationCode};

    const TEST_CONFIG: &str = r#"
[root_ca]
key_size = 2048
hash_algorithm = "SHA256"
validity_period_years = 10
key_usage = ["KEY_CERT_SIGN", "CRL_SIGN"]

[intermediate_ca]
key_size = 2048
hash_algorithm = "SHA256"
validity_period_years = 5
path_len_constraint = 1

[revocation]
crl_update_interval_hours = 24
ocsp_enabled = true
grace_period_hours = 1
"#;

    fn hierarchy() -> IntermediateCertificateAuthority {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let config = PkiConfig::from_toml_str(TEST_CONFIG).unwrap();
        let root = Arc::new(RootCertificateAuthority::new(config.clone(), clock.clone()));
        root.generate_root_certificate().unwrap();
        IntermediateCertificateAuthority::new(config, root, CertificateTemplateManager::new(), clock)
    }

    fn medium_csr(capabilities: &[&str]) -> CertificateSigningRequest {
        let caps: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
        CertificateSigningRequest {
            subject: DistinguishedName::new("reporter", "Agents", "Textile Showcase", "US"),
            public_key: SigningKeyStore::generate(KeySize::Rsa2048)
                .unwrap()
                .public_key_pem()
                .to_string(),
            trust_level: TrustLevel::Medium,
            requested_capabilities: caps.clone(),
            agent_metadata: AgentMetadata {
                name: "reporter".to_string(),
                version: "0.3.0".to_string(),
                capabilities: caps,
            },
        }
    }

    #[test]
    fn test_initialize_obtains_certificate_from_root() {
        let intermediate = hierarchy();
        let certificate = intermediate.initialize().unwrap();
        assert_eq!(intermediate.initialize().unwrap(), certificate);

        assert_eq!(certificate.certificate_chain.len(), 2);
        assert_eq!(certificate.valid_to - certificate.valid_from, Duration::days(5 * 365));
        assert!(intermediate
            .root()
            .issued_serials()
            .contains(&certificate.serial_number));

        let body = parse_certificate(&certificate.certificate).unwrap();
        assert_eq!(
            body.subject,
            "CN=Intermediate CA, OU=Agent Systems, O=Textile Showcase, C=US"
        );
        assert_eq!(body.resolved_trust_level(), TrustLevel::High);
        let metadata = body.agent_metadata.unwrap();
        assert_eq!(metadata.name, "intermediate-ca");
        assert_eq!(metadata.capabilities, vec!["CERTIFICATE_SIGNING", "CRL_GENERATION"]);
    }

    #[test]
    fn test_issue_before_initialize_fails() {
        let intermediate = hierarchy();
        let err = intermediate
            .issue_certificate(&medium_csr(&[]), &CertificateTemplate::medium())
            .unwrap_err();
        assert!(matches!(err, CaError::NotInitialized("Intermediate CA")));
        assert!(matches!(intermediate.generate_crl(), Err(CaError::NotInitialized(_))));
    }

    #[test]
    fn test_issued_chain_has_three_elements() {
        let intermediate = hierarchy();
        let own = intermediate.initialize().unwrap();
        let issued = intermediate
            .issue_certificate(&medium_csr(&["REPORTING"]), &CertificateTemplate::medium())
            .unwrap();

        assert_eq!(issued.certificate_chain.len(), 3);
        assert_eq!(issued.certificate_chain[1], own.certificate);
        assert_eq!(issued.certificate_chain[2], own.certificate_chain[1]);
    }

    #[test]
    fn test_foreign_envelope_with_own_issuer_is_mismatch() {
        let intermediate = hierarchy();
        intermediate.initialize().unwrap();

        let stray_key = SigningKeyStore::generate(KeySize::Rsa2048).unwrap();
        let now = Utc::now();
        let envelope = CertificateBody::for_request(
            "ffffffffffffffffffffffffffffffff",
            intermediate.subject(),
            &medium_csr(&[]),
            now,
            now + Duration::days(1),
        )
        .seal(&stray_key, crate::types::HashAlgorithm::Sha256)
        .unwrap();

        let result = intermediate.validate_certificate(&envelope, TrustLevel::High);
        assert!(!result.is_valid);
        assert_eq!(result.error_codes(), vec![ValidationCode::CertificateRecordMismatch]);
        // reported at the requested level, not the envelope's MEDIUM
        assert_eq!(result.trust_level, TrustLevel::High);

        let last = intermediate.audit_log().pop().unwrap();
        assert_eq!(last.result, AuditResult::Warning);
    }
}
