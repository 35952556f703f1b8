//! Root Certificate Authority
//!
//! The trust anchor of the agent PKI. The Root CA signs its own certificate,
//! issues CRITICAL certificates through a manual approval workflow, and
//! issues the Intermediate CA's certificate.
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed) ← This module
//!   ├── CRITICAL agent certificates (manual approval)
//!   └── Intermediate CA (signed by Root)
//!       └── HIGH / MEDIUM agent certificates
//! ```
//!
//! # State
//! The signing identity, the issuance ledger and pending critical requests
//! live behind one mutex, so serial allocation and record insertion happen
//! in a single critical section. The audit log has its own lock.
//!
//! # Example
//! ```rust,no_run
//! # use agent_pki::{CertificateTemplate, PkiConfig, RootCertificateAuthority, SystemClock, TrustLevel};
//! # use std::sync::Arc;
//! # fn example(csr: agent_pki::CertificateSigningRequest) -> anyhow::Result<()> {
//! let config = PkiConfig::load()?;
//! let root = RootCertificateAuthority::new(config, Arc::new(SystemClock));
//! root.generate_root_certificate()?;
//!
//! let issued = root.issue_certificate(&csr, &CertificateTemplate::high())?;
//! let result = root.validate_certificate(&issued.certificate, TrustLevel::High);
//! assert!(result.is_valid);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::approval::{ApprovalDecision, CriticalCertificateRequest};
use crate::audit::{self, AuditLog, AuditResult, AuditSink, PkiAuditEntry, PkiOperation};
use crate::clock::{validity_end, Clock, DAYS_PER_YEAR};
use crate::configs::PkiConfig;
use crate::envelope::{fingerprint, parse_certificate, CertificateBody};
use crate::error::{CaError, Result};
use crate::key_store::SigningKeyStore;
use crate::registry::{random_hex_id, CertificateRegistry};
use crate::revocation::{CertificateRevocationList, OcspResponse};
use crate::templates::CertificateTemplate;
use crate::types::{
    CertificateSigningRequest, DistinguishedName, IssuedCertificate, RevocationReason,
    RevocationStatus, RevokedCertificateEntry, TrustLevel, ValidationResult,
};
use crate::validation::{self, SignatureCheck};

const CA_NAME: &str = "Root CA";

struct RootIdentity {
    key: SigningKeyStore,
    certificate: IssuedCertificate,
}

#[derive(Default)]
struct RootState {
    identity: Option<RootIdentity>,
    registry: CertificateRegistry,
    critical_requests: HashMap<String, CriticalCertificateRequest>,
}

pub struct RootCertificateAuthority {
    config: PkiConfig,
    subject: DistinguishedName,
    clock: Arc<dyn Clock>,
    state: Mutex<RootState>,
    audit: AuditLog,
}

impl RootCertificateAuthority {
    pub fn new(config: PkiConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_audit_log(config, clock, AuditLog::new())
    }

    /// Same as [`new`](Self::new), forwarding every audit entry to `sink`
    pub fn with_sink(config: PkiConfig, clock: Arc<dyn Clock>, sink: Arc<dyn AuditSink>) -> Self {
        Self::with_audit_log(config, clock, AuditLog::with_sink(sink))
    }

    fn with_audit_log(config: PkiConfig, clock: Arc<dyn Clock>, audit: AuditLog) -> Self {
        let subject = config.root_ca_identity.distinguished_name();
        Self {
            config,
            subject,
            clock,
            state: Mutex::new(RootState::default()),
            audit,
        }
    }

    /// Generate the self-signed root certificate
    ///
    /// Idempotent: once the root exists every later call returns the same
    /// certificate without touching the key or the audit log.
    ///
    /// # Returns
    /// The root certificate with a one-element chain `[root]`
    pub fn generate_root_certificate(&self) -> Result<IssuedCertificate> {
        let mut state = self.state.lock();
        if let Some(identity) = &state.identity {
            return Ok(identity.certificate.clone());
        }

        let now = self.clock.now();
        let root_config = &self.config.root_ca;
        let valid_to = validity_end(
            now,
            u64::from(root_config.validity_period_years) * DAYS_PER_YEAR,
        )?;
        let key = SigningKeyStore::generate(root_config.key_size)?;
        let serial_number = state.registry.allocate_serial()?;

        let envelope = CertificateBody::self_signed(
            &serial_number,
            &self.subject,
            key.public_key_pem(),
            now,
            valid_to,
            root_config.key_usage.clone(),
        )
        .seal(&key, root_config.hash_algorithm)?;

        let certificate = IssuedCertificate {
            fingerprint: fingerprint(&envelope),
            certificate_chain: vec![envelope.clone()],
            certificate: envelope,
            serial_number,
            valid_from: now,
            valid_to,
        };

        tracing::info!(
            serial = %certificate.serial_number,
            subject = %self.subject,
            "Root CA certificate generated"
        );
        self.audit.record(
            PkiAuditEntry::new(now, PkiOperation::CertificateIssued, AuditResult::Success)
                .serial(&certificate.serial_number)
                .subject(&self.subject.common_name)
                .issuer(&self.subject.common_name)
                .trust_level(TrustLevel::Critical),
        );

        state.identity = Some(RootIdentity {
            key,
            certificate: certificate.clone(),
        });
        Ok(certificate)
    }

    /// Issue a certificate signed by the root key
    ///
    /// # Errors
    /// - [`CaError::NotInitialized`] before [`generate_root_certificate`](Self::generate_root_certificate)
    /// - [`CaError::CapabilityExceeded`] if the CSR asks for a capability the
    ///   template does not allow; no serial is consumed and nothing is audited
    /// - [`CaError::InvalidValidityPeriod`] if the template's validity cannot be
    ///   applied from now; no serial is consumed
    pub fn issue_certificate(
        &self,
        csr: &CertificateSigningRequest,
        template: &CertificateTemplate,
    ) -> Result<IssuedCertificate> {
        let mut state = self.state.lock();
        self.issue_locked(&mut state, csr, template)
    }

    fn issue_locked(
        &self,
        state: &mut RootState,
        csr: &CertificateSigningRequest,
        template: &CertificateTemplate,
    ) -> Result<IssuedCertificate> {
        let RootState {
            identity, registry, ..
        } = state;
        let identity = identity.as_ref().ok_or(CaError::NotInitialized(CA_NAME))?;
        template.ensure_capabilities(&csr.requested_capabilities)?;

        let now = self.clock.now();
        let valid_to = validity_end(now, u64::from(template.validity_period_days))?;
        let serial_number = registry.allocate_serial()?;

        let envelope = CertificateBody::for_request(&serial_number, &self.subject, csr, now, valid_to)
            .seal(&identity.key, self.config.root_ca.hash_algorithm)?;

        let certificate = IssuedCertificate {
            fingerprint: fingerprint(&envelope),
            certificate_chain: vec![envelope.clone(), identity.certificate.certificate.clone()],
            certificate: envelope,
            serial_number,
            valid_from: now,
            valid_to,
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

    /// Queue a CRITICAL request for manual approval
    pub fn submit_critical_certificate_request(
        &self,
        csr: CertificateSigningRequest,
    ) -> Result<CriticalCertificateRequest> {
        if csr.trust_level != TrustLevel::Critical {
            return Err(CaError::NotCriticalTrustLevel(csr.trust_level));
        }
        let template = CertificateTemplate::critical();
        template.ensure_capabilities(&csr.requested_capabilities)?;

        let now = self.clock.now();
        let request_id = random_hex_id()?;
        let subject = csr.subject.common_name.clone();
        let request = CriticalCertificateRequest::new(request_id.clone(), csr, template, now);

        self.state
            .lock()
            .critical_requests
            .insert(request_id.clone(), request.clone());

        tracing::info!(request_id = %request_id, subject = %subject, "Critical certificate request queued");
        self.audit.record(
            PkiAuditEntry::new(now, PkiOperation::CriticalApprovalRequested, AuditResult::Success)
                .subject(subject)
                .trust_level(TrustLevel::Critical),
        );
        Ok(request)
    }

    /// Approve or deny a pending CRITICAL request
    ///
    /// On approval the certificate is issued and returned; the request only
    /// moves to APPROVED once issuance succeeded. A denial fails the call with
    /// [`CaError::CriticalRequestDenied`] carrying `reason`.
    pub fn approve_critical_certificate(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
        reason: &str,
    ) -> Result<IssuedCertificate> {
        self.decide_critical_request(request_id, decision, reason, None)
    }

    /// [`approve_critical_certificate`](Self::approve_critical_certificate) recording who decided
    pub fn approve_critical_certificate_as(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
        reason: &str,
        approver: &str,
    ) -> Result<IssuedCertificate> {
        self.decide_critical_request(request_id, decision, reason, Some(approver))
    }

    fn decide_critical_request(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
        reason: &str,
        approver: Option<&str>,
    ) -> Result<IssuedCertificate> {
        let now = self.clock.now();
        let ttl = self.config.critical_requests.approval_ttl();
        let mut state = self.state.lock();
        if decision == ApprovalDecision::Approved && state.identity.is_none() {
            return Err(CaError::NotInitialized(CA_NAME));
        }

        let request = state
            .critical_requests
            .get_mut(request_id)
            .ok_or_else(|| CaError::CriticalRequestNotFound(request_id.to_string()))?;

        if request.is_stale(now, ttl) {
            request.expire()?;
            let subject = request.csr.subject.common_name.clone();
            self.audit.record(
                PkiAuditEntry::new(now, PkiOperation::CriticalApprovalExpired, AuditResult::Failure)
                    .subject(subject)
                    .trust_level(TrustLevel::Critical),
            );
            return Err(CaError::CriticalRequestExpired(request_id.to_string()));
        }

        match decision {
            ApprovalDecision::Denied => {
                request.deny(now, reason, approver)?;
                let subject = request.csr.subject.common_name.clone();
                self.audit.record(
                    PkiAuditEntry::new(now, PkiOperation::CriticalApprovalDenied, AuditResult::Success)
                        .subject(subject)
                        .trust_level(TrustLevel::Critical),
                );
                Err(CaError::CriticalRequestDenied(reason.to_string()))
            }
            ApprovalDecision::Approved => {
                request.ensure_pending()?;
                let csr = request.csr.clone();
                let template = request.template.clone();

                let certificate = self.issue_locked(&mut state, &csr, &template)?;
                if let Some(request) = state.critical_requests.get_mut(request_id) {
                    request.approve(now, reason, approver)?;
                }
                self.audit.record(
                    PkiAuditEntry::new(now, PkiOperation::CriticalApprovalGranted, AuditResult::Success)
                        .serial(&certificate.serial_number)
                        .subject(&csr.subject.common_name)
                        .trust_level(TrustLevel::Critical),
                );
                Ok(certificate)
            }
        }
    }

    /// Move every pending request older than the approval TTL to EXPIRED
    ///
    /// # Returns
    /// Ids of the requests that expired during this sweep
    pub fn expire_stale_critical_requests(&self) -> Vec<String> {
        let now = self.clock.now();
        let ttl = self.config.critical_requests.approval_ttl();
        let mut state = self.state.lock();

        let mut expired = Vec::new();
        for request in state.critical_requests.values_mut() {
            if request.is_stale(now, ttl) && request.expire().is_ok() {
                self.audit.record(
                    PkiAuditEntry::new(now, PkiOperation::CriticalApprovalExpired, AuditResult::Failure)
                        .subject(&request.csr.subject.common_name)
                        .trust_level(TrustLevel::Critical),
                );
                expired.push(request.request_id.clone());
            }
        }
        expired.sort();
        expired
    }

    pub fn critical_request(&self, request_id: &str) -> Option<CriticalCertificateRequest> {
        self.state.lock().critical_requests.get(request_id).cloned()
    }

    pub fn pending_critical_requests(&self) -> Vec<CriticalCertificateRequest> {
        let mut pending: Vec<CriticalCertificateRequest> = self
            .state
            .lock()
            .critical_requests
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.request_timestamp.cmp(&b.request_timestamp));
        pending
    }

    /// Validate an envelope issued by this CA
    ///
    /// Never fails hard. Every call appends one `CERTIFICATE_VALIDATED`
    /// audit entry whose result mirrors `is_valid`.
    pub fn validate_certificate(
        &self,
        envelope: &str,
        required_trust_level: TrustLevel,
    ) -> ValidationResult {
        let now = self.clock.now();
        let (result, serial) = match parse_certificate(envelope) {
            Ok(body) => (
                self.check_parsed(&body, envelope, required_trust_level, now),
                Some(body.serial_number),
            ),
            Err(e) => (validation::parse_failure(required_trust_level, e, now), None),
        };

        self.audit_validation(PkiOperation::CertificateValidated, serial, &result, now);
        result
    }

    fn check_parsed(
        &self,
        body: &CertificateBody,
        envelope: &str,
        required_trust_level: TrustLevel,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let state = self.state.lock();
        let mut errors = Vec::new();

        let record = state.registry.get(&body.serial_number);
        if record.is_none() {
            errors.push(validation::not_found_error());
        }

        let revocation_status = match &state.identity {
            Some(identity) => validation::check_certificate(
                body,
                &state.registry,
                required_trust_level,
                now,
                &SignatureCheck {
                    public_key_pem: identity.key.public_key_pem(),
                    hash: self.config.root_ca.hash_algorithm,
                },
                &mut errors,
            ),
            None => {
                errors.push(validation::not_initialized_error(CA_NAME));
                RevocationStatus::valid()
            }
        };

        // The root certificate itself is not in the ledger
        let chain = match (&state.identity, record) {
            (_, Some(record)) => record.certificate_chain.clone(),
            (Some(identity), None) if identity.certificate.serial_number == body.serial_number => {
                identity.certificate.certificate_chain.clone()
            }
            _ => vec![envelope.to_string()],
        };

        validation::finish(
            errors,
            body.resolved_trust_level(),
            chain,
            revocation_status,
            now,
        )
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
    /// A single envelope is validated at MEDIUM. Longer chains must parse
    /// element by element, then the leaf is validated at its own trust level.
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
                let level = match parse_certificate(leaf) {
                    Ok(body) => body.resolved_trust_level(),
                    Err(_) => TrustLevel::Medium,
                };
                self.validate_certificate(leaf, level)
            }
        }
    }

    /// Permanently revoke a certificate issued by this CA
    ///
    /// # Errors
    /// - [`CaError::CertificateNotFound`] for an unknown serial
    /// - [`CaError::AlreadyRevoked`] if the serial was revoked before; the
    ///   first entry is kept
    ///
    /// Both failures are audited.
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
            tracing::info!(serial = %serial_number, ?reason, "Certificate revoked by Root CA");
        }
        outcome
    }

    /// Signed snapshot of every revocation recorded by this CA
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
            self.config.root_ca.hash_algorithm,
        )?;

        self.audit.record(
            PkiAuditEntry::new(now, PkiOperation::CrlGenerated, AuditResult::Success)
                .issuer(&self.subject.common_name),
        );
        Ok(crl)
    }

    /// OCSP-style status of one serial number
    ///
    /// # Errors
    /// - [`CaError::OcspDisabled`] if `revocation.ocsp_enabled` is false
    /// - [`CaError::NotInitialized`] before the root certificate exists
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
            self.config.root_ca.hash_algorithm,
        )?;

        self.audit.record(
            PkiAuditEntry::new(now, PkiOperation::OcspRequest, AuditResult::Success)
                .serial(serial_number)
                .issuer(&self.subject.common_name),
        );
        Ok(response)
    }

    pub fn root_certificate(&self) -> Option<IssuedCertificate> {
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

    pub fn config(&self) -> &PkiConfig {
        &self.config
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

    /// Unrevoked certificates expiring within `within_days`
    pub fn expiring_certificates(&self, within_days: u32) -> Vec<IssuedCertificate> {
        let now = self.clock.now();
        self.state
            .lock()
            .registry
            .expiring_within(now, Duration::days(i64::from(within_days)))
    }
}
