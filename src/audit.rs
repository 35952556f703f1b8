//! PKI audit trail.
//!
//! Every state-changing CA operation appends one [`PkiAuditEntry`]. Entries
//! are kept in memory, emitted as `tracing` events under the `pki_audit`
//! target, and optionally forwarded to an [`AuditSink`] for persistence.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::envelope::format_timestamp;
use crate::error::{CaError, Result};
use crate::types::{Severity, TrustLevel, ValidationCode, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PkiOperation {
    CertificateIssued,
    CertificateValidated,
    CertificateRevoked,
    CrlGenerated,
    OcspRequest,
    TrustChainValidated,
    CriticalApprovalRequested,
    CriticalApprovalGranted,
    CriticalApprovalDenied,
    CriticalApprovalExpired,
}

impl PkiOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            PkiOperation::CertificateIssued => "CERTIFICATE_ISSUED",
            PkiOperation::CertificateValidated => "CERTIFICATE_VALIDATED",
            PkiOperation::CertificateRevoked => "CERTIFICATE_REVOKED",
            PkiOperation::CrlGenerated => "CRL_GENERATED",
            PkiOperation::OcspRequest => "OCSP_REQUEST",
            PkiOperation::TrustChainValidated => "TRUST_CHAIN_VALIDATED",
            PkiOperation::CriticalApprovalRequested => "CRITICAL_APPROVAL_REQUESTED",
            PkiOperation::CriticalApprovalGranted => "CRITICAL_APPROVAL_GRANTED",
            PkiOperation::CriticalApprovalDenied => "CRITICAL_APPROVAL_DENIED",
            PkiOperation::CriticalApprovalExpired => "CRITICAL_APPROVAL_EXPIRED",
        }
    }
}

impl fmt::Display for PkiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResult {
    Success,
    Failure,
    Warning,
}

impl AuditResult {
    /// SUCCESS when valid, WARNING when only warnings were raised, else FAILURE
    pub fn of_validation(result: &ValidationResult) -> Self {
        if result.is_valid {
            AuditResult::Success
        } else if result
            .validation_errors
            .iter()
            .all(|e| e.severity == Severity::Warning)
        {
            AuditResult::Warning
        } else {
            AuditResult::Failure
        }
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditResult::Success => "SUCCESS",
            AuditResult::Failure => "FAILURE",
            AuditResult::Warning => "WARNING",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: PkiOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<TrustLevel>,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl PkiAuditEntry {
    pub fn new(timestamp: DateTime<Utc>, operation: PkiOperation, result: AuditResult) -> Self {
        Self {
            timestamp,
            operation,
            certificate_serial_number: None,
            subject_common_name: None,
            issuer_common_name: None,
            trust_level: None,
            result,
            error_code: None,
        }
    }

    pub fn serial(mut self, serial_number: impl Into<String>) -> Self {
        self.certificate_serial_number = Some(serial_number.into());
        self
    }

    pub fn subject(mut self, common_name: impl Into<String>) -> Self {
        self.subject_common_name = Some(common_name.into());
        self
    }

    pub fn issuer(mut self, common_name: impl Into<String>) -> Self {
        self.issuer_common_name = Some(common_name.into());
        self
    }

    pub fn trust_level(mut self, level: TrustLevel) -> Self {
        self.trust_level = Some(level);
        self
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn validation_error(self, code: Option<ValidationCode>) -> Self {
        match code {
            Some(code) => self.error_code(code.as_str()),
            None => self,
        }
    }

    /// `[PKI-AUDIT] <timestamp> - <operation> - <serial or N/A> - <result>`
    pub fn log_line(&self) -> String {
        format!(
            "[PKI-AUDIT] {} - {} - {} - {}",
            format_timestamp(self.timestamp),
            self.operation,
            self.certificate_serial_number.as_deref().unwrap_or("N/A"),
            self.result
        )
    }
}

/// Entry describing a revocation attempt and its outcome
pub fn revocation_entry<T>(
    at: DateTime<Utc>,
    serial_number: &str,
    issuer_common_name: &str,
    outcome: &Result<T>,
) -> PkiAuditEntry {
    let result = if outcome.is_ok() {
        AuditResult::Success
    } else {
        AuditResult::Failure
    };
    let entry = PkiAuditEntry::new(at, PkiOperation::CertificateRevoked, result)
        .serial(serial_number)
        .issuer(issuer_common_name);
    match outcome {
        Err(CaError::CertificateNotFound(_)) => entry.error_code("CERTIFICATE_NOT_FOUND"),
        Err(CaError::AlreadyRevoked(_)) => entry.error_code("ALREADY_REVOKED"),
        _ => entry,
    }
}

/// Receiver for audit entries, e.g. a file or database writer
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &PkiAuditEntry);
}

/// Append-only audit log owned by a CA
#[derive(Default)]
pub struct AuditLog {
    entries: Mutex<Vec<PkiAuditEntry>>,
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sink: Some(sink),
        }
    }

    pub fn record(&self, entry: PkiAuditEntry) {
        match entry.result {
            AuditResult::Success => tracing::info!(target: "pki_audit", "{}", entry.log_line()),
            _ => tracing::warn!(
                target: "pki_audit",
                error_code = entry.error_code.as_deref().unwrap_or(""),
                "{}",
                entry.log_line()
            ),
        }

        if let Some(sink) = &self.sink {
            sink.record(&entry);
        }
        self.entries.lock().push(entry);
    }

    /// Snapshot of all entries in insertion order
    pub fn entries(&self) -> Vec<PkiAuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn count(&self, operation: PkiOperation) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.operation == operation)
            .count()
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("entries", &self.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
