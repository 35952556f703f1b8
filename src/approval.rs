//! Manual approval workflow for CRITICAL certificate requests.
//!
//! A request starts in `PENDING_APPROVAL` and moves exactly once into one of
//! the terminal states `APPROVED`, `DENIED` or `EXPIRED`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CaError, Result};
use crate::templates::CertificateTemplate;
use crate::types::CertificateSigningRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    PendingApproval,
    Approved,
    Denied,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::PendingApproval)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::PendingApproval => "PENDING_APPROVAL",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Denied => "DENIED",
            RequestStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision passed to the approval call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalCertificateRequest {
    pub request_id: String,
    pub csr: CertificateSigningRequest,
    pub template: CertificateTemplate,
    pub request_timestamp: DateTime<Utc>,
    pub status: RequestStatus,
    pub requires_manual_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_metadata: Option<ApprovalMetadata>,
}

impl CriticalCertificateRequest {
    pub fn new(
        request_id: String,
        csr: CertificateSigningRequest,
        template: CertificateTemplate,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            csr,
            template,
            request_timestamp: requested_at,
            status: RequestStatus::PendingApproval,
            requires_manual_approval: true,
            approval_metadata: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::PendingApproval
    }

    /// Pending for longer than `ttl` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.is_pending() && now - self.request_timestamp > ttl
    }

    /// Fail with [`CaError::RequestNotPending`] unless still awaiting a decision
    pub fn ensure_pending(&self) -> Result<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(CaError::RequestNotPending {
                id: self.request_id.clone(),
                status: self.status,
            })
        }
    }

    fn decide(
        &mut self,
        status: RequestStatus,
        at: DateTime<Utc>,
        reason: &str,
        approver: Option<&str>,
    ) -> Result<()> {
        self.ensure_pending()?;
        self.approval_metadata = Some(ApprovalMetadata {
            approved_by: approver.map(str::to_string),
            approval_timestamp: Some(at),
            approval_reason: Some(reason.to_string()),
        });
        self.status = status;
        Ok(())
    }

    pub fn approve(&mut self, at: DateTime<Utc>, reason: &str, approver: Option<&str>) -> Result<()> {
        self.decide(RequestStatus::Approved, at, reason, approver)
    }

    pub fn deny(&mut self, at: DateTime<Utc>, reason: &str, approver: Option<&str>) -> Result<()> {
        self.decide(RequestStatus::Denied, at, reason, approver)
    }

    pub fn expire(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = RequestStatus::Expired;
        Ok(())
    }
}
