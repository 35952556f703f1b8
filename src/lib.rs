//! Agent PKI - Certificate Authority for the agent coordination system
//!
//! Issues, validates and revokes certificates that bind agent identities to
//! trust levels. A Root CA and an Intermediate CA form a two-level hierarchy;
//! a manual approval workflow gates the CRITICAL tier, and revocation is
//! published as signed CRL snapshots and OCSP-style status responses.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed)
//!   ├── CRITICAL agent certificates (manual approval)
//!   └── Intermediate CA (signed by Root, HIGH trust)
//!       └── HIGH / MEDIUM agent certificates
//! ```
//!
//! LOW trust agents never receive certificates.
//!
//! # Certificate Format
//!
//! Certificates are PEM-armored, base64 encoded JSON envelopes signed with the
//! issuing CA's RSA key (see [`envelope`]). Full X.509 ASN.1 encoding is not
//! produced.
//!
//! # Features
//!
//! - 🔐 **Key Custody**: CA private keys held in zeroizing `secrecy` wrappers
//! - 🔗 **Two-Level Hierarchy**: Intermediate CA delegates unknown serials to the Root CA
//! - ✅ **Soft Validation**: every problem reported as a coded, severity-tagged error
//! - 🛑 **Revocation**: permanent revocation, signed CRLs and OCSP responses
//! - 📝 **Audit Trail**: one `[PKI-AUDIT]` entry per state-changing operation
//!
//! # Quick Start
//!
//! ```no_run
//! use agent_pki::{
//!     CertificateTemplateManager, IntermediateCertificateAuthority, PkiConfig,
//!     RootCertificateAuthority, SystemClock, TrustLevel,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PkiConfig::load()?;
//!     let clock = Arc::new(SystemClock);
//!
//!     let root = Arc::new(RootCertificateAuthority::new(config.clone(), clock.clone()));
//!     root.generate_root_certificate()?;
//!
//!     let templates = CertificateTemplateManager::new();
//!     let intermediate =
//!         IntermediateCertificateAuthority::new(config, root, templates.clone(), clock);
//!     intermediate.initialize()?;
//!
//!     let template = templates.get_template(TrustLevel::Medium)?;
//!     # let csr: agent_pki::CertificateSigningRequest = unimplemented!();
//!     let issued = intermediate.issue_certificate(&csr, &template)?;
//!     let result = intermediate.validate_certificate(&issued.certificate, TrustLevel::Medium);
//!     println!("valid: {}", result.is_valid);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`templates`]: trust level policy (key size, validity, allowed capabilities)
//! - [`root_ca`]: Root CA, CRITICAL approval workflow
//! - [`intermediate_ca`]: Intermediate CA, HIGH/MEDIUM issuance
//! - [`validation`]: validation checks and result builders
//! - [`revocation`]: CRL and OCSP responses
//! - [`audit`]: audit entries, log and sink
//! - [`configs`]: TOML configuration

pub mod approval;
pub mod audit;
pub mod clock;
pub mod configs;
pub mod envelope;
pub mod error;
pub mod intermediate_ca;
pub mod key_store;
pub mod registry;
pub mod revocation;
pub mod root_ca;
pub mod templates;
pub mod types;
pub mod validation;

pub use approval::{ApprovalDecision, ApprovalMetadata, CriticalCertificateRequest, RequestStatus};
pub use audit::{AuditResult, AuditSink, PkiAuditEntry, PkiOperation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use configs::PkiConfig;
pub use error::{CaError, Result};
pub use intermediate_ca::IntermediateCertificateAuthority;
pub use revocation::{CertificateRevocationList, OcspResponse, OcspStatus};
pub use root_ca::RootCertificateAuthority;
pub use templates::{CapabilityCheck, CertificateTemplate, CertificateTemplateManager};
pub use types::*;
