//! Certificate Template Manager
//!
//! Maps each certificate-bearing trust level to its issuance policy: key size,
//! validity period, key usages, allowed capabilities and the validation
//! strength relying parties must apply.
//!
//! # Canonical Policies
//! ```text
//! CRITICAL  RSA 4096  365 days   STRICT    pathlen=0
//! HIGH      RSA 2048  730 days   ENHANCED  pathlen=1 (may sign)
//! MEDIUM    RSA 2048  1095 days  STANDARD  pathlen=0
//! LOW       no certificate
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clock::MAX_VALIDITY_DAYS;
use crate::error::{CaError, Result};
use crate::types::{
    ExtendedKeyUsage, KeySize, KeyUsage, SubjectAltName, TrustLevel, ValidationLevel,
};

const CRITICAL_VALIDITY_DAYS: u32 = 365;
const HIGH_VALIDITY_DAYS: u32 = 730;
const MEDIUM_VALIDITY_DAYS: u32 = 1095;

pub const CRITICAL_CAPABILITIES: &[&str] = &[
    "SYSTEM_ADMIN",
    "KEY_MANAGEMENT",
    "SECURITY_AUDIT",
    "CERTIFICATE_SIGNING",
    "CRITICAL_OPERATIONS",
];

pub const HIGH_CAPABILITIES: &[&str] = &[
    "DATA_PROCESSING",
    "SECURE_COMMUNICATION",
    "MONITORING",
    "PERFORMANCE_ANALYSIS",
    "CERTIFICATE_SIGNING", // intermediate CA certificate
    "TESTING",
    "INTEGRATION_TESTING",
    "PERFORMANCE_TESTING",
];

pub const MEDIUM_CAPABILITIES: &[&str] = &[
    "BASIC_OPERATIONS",
    "STANDARD_COMMUNICATION",
    "READ_ONLY_ACCESS",
    "REPORTING",
    "TESTING",
    "PARALLEL_TESTING",
];

/// Issuance policy for one trust level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateTemplate {
    pub trust_level: TrustLevel,
    pub key_usage: Vec<KeyUsage>,
    pub extended_key_usage: Vec<ExtendedKeyUsage>,
    /// Days from issuance to expiry
    pub validity_period_days: u32,
    pub key_size: KeySize,
    #[serde(default)]
    pub subject_alt_names: Vec<SubjectAltName>,
    pub allowed_capabilities: Vec<String>,
    pub required_validation: ValidationLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_path_length: Option<u32>,
}

impl CertificateTemplate {
    /// The canonical CRITICAL template, also used for manual-approval requests
    pub fn critical() -> Self {
        Self {
            trust_level: TrustLevel::Critical,
            key_usage: vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment],
            extended_key_usage: vec![ExtendedKeyUsage::ClientAuth, ExtendedKeyUsage::CodeSigning],
            validity_period_days: CRITICAL_VALIDITY_DAYS,
            key_size: KeySize::Rsa4096,
            subject_alt_names: Vec::new(),
            allowed_capabilities: to_owned_list(CRITICAL_CAPABILITIES),
            required_validation: ValidationLevel::Strict,
            max_path_length: Some(0), // end entity only
        }
    }

    pub fn high() -> Self {
        Self {
            trust_level: TrustLevel::High,
            key_usage: vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment],
            extended_key_usage: vec![ExtendedKeyUsage::ClientAuth],
            validity_period_days: HIGH_VALIDITY_DAYS,
            key_size: KeySize::Rsa2048,
            subject_alt_names: Vec::new(),
            allowed_capabilities: to_owned_list(HIGH_CAPABILITIES),
            required_validation: ValidationLevel::Enhanced,
            max_path_length: Some(1),
        }
    }

    pub fn medium() -> Self {
        Self {
            trust_level: TrustLevel::Medium,
            key_usage: vec![KeyUsage::DigitalSignature],
            extended_key_usage: vec![ExtendedKeyUsage::ClientAuth],
            validity_period_days: MEDIUM_VALIDITY_DAYS,
            key_size: KeySize::Rsa2048,
            subject_alt_names: Vec::new(),
            allowed_capabilities: to_owned_list(MEDIUM_CAPABILITIES),
            required_validation: ValidationLevel::Standard,
            max_path_length: Some(0),
        }
    }

    pub fn allows(&self, capability: &str) -> bool {
        self.allowed_capabilities.iter().any(|c| c == capability)
    }

    /// Fail on the first requested capability outside the allowed set
    pub fn ensure_capabilities(&self, requested: &[String]) -> Result<()> {
        match requested.iter().find(|c| !self.allows(c)) {
            Some(capability) => Err(CaError::CapabilityExceeded(capability.clone())),
            None => Ok(()),
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Outcome of [`CertificateTemplateManager::validate_capabilities`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityCheck {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Owns the trust level → template policy table
#[derive(Debug, Clone)]
pub struct CertificateTemplateManager {
    templates: HashMap<TrustLevel, CertificateTemplate>,
}

impl Default for CertificateTemplateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateTemplateManager {
    /// Create a manager holding the three canonical templates
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert(TrustLevel::Critical, CertificateTemplate::critical());
        templates.insert(TrustLevel::High, CertificateTemplate::high());
        templates.insert(TrustLevel::Medium, CertificateTemplate::medium());
        Self { templates }
    }

    /// Look up the template for a trust level
    ///
    /// # Errors
    /// - [`CaError::LowTrustLevel`] for LOW
    /// - [`CaError::TemplateNotFound`] if nothing is registered
    pub fn get_template(&self, trust_level: TrustLevel) -> Result<CertificateTemplate> {
        if trust_level == TrustLevel::Low {
            return Err(CaError::LowTrustLevel);
        }
        self.templates
            .get(&trust_level)
            .cloned()
            .ok_or(CaError::TemplateNotFound(trust_level))
    }

    pub fn all_templates(&self) -> HashMap<TrustLevel, CertificateTemplate> {
        self.templates.clone()
    }

    /// Replace the template for a trust level
    ///
    /// # Errors
    /// - [`CaError::LowTemplateUpdate`] for LOW
    /// - [`CaError::TemplateLevelMismatch`] if the template belongs to another level
    /// - [`CaError::InvalidValidityPeriod`] for zero days or more than
    ///   [`MAX_VALIDITY_DAYS`]
    pub fn update_template(
        &mut self,
        trust_level: TrustLevel,
        template: CertificateTemplate,
    ) -> Result<()> {
        if trust_level == TrustLevel::Low {
            return Err(CaError::LowTemplateUpdate);
        }
        if template.trust_level != trust_level {
            return Err(CaError::TemplateLevelMismatch {
                requested: trust_level,
                template: template.trust_level,
            });
        }
        let days = u64::from(template.validity_period_days);
        if days == 0 || days > MAX_VALIDITY_DAYS {
            return Err(CaError::InvalidValidityPeriod(days));
        }
        self.templates.insert(trust_level, template);
        Ok(())
    }

    /// Report every requested capability the level does not allow
    pub fn validate_capabilities(
        &self,
        requested: &[String],
        trust_level: TrustLevel,
    ) -> Result<CapabilityCheck> {
        let template = self.get_template(trust_level)?;
        let errors: Vec<String> = requested
            .iter()
            .filter(|c| !template.allows(c))
            .map(|c| {
                format!(
                    "Capability '{}' not allowed for trust level '{}'",
                    c, trust_level
                )
            })
            .collect();

        Ok(CapabilityCheck {
            valid: errors.is_empty(),
            errors,
        })
    }

    pub fn validity_period_days(&self, trust_level: TrustLevel) -> Result<u32> {
        Ok(self.get_template(trust_level)?.validity_period_days)
    }

    pub fn required_key_size(&self, trust_level: TrustLevel) -> Result<KeySize> {
        Ok(self.get_template(trust_level)?.key_size)
    }

    pub fn validation_level(&self, trust_level: TrustLevel) -> Result<ValidationLevel> {
        Ok(self.get_template(trust_level)?.required_validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_match_requested_level() {
        let manager = CertificateTemplateManager::new();
        for level in [TrustLevel::Critical, TrustLevel::High, TrustLevel::Medium] {
            assert_eq!(manager.get_template(level).unwrap().trust_level, level);
        }
    }

    #[test]
    fn test_critical_template_policy() {
        let manager = CertificateTemplateManager::new();
        let template = manager.get_template(TrustLevel::Critical).unwrap();
        assert_eq!(template.key_size, KeySize::Rsa4096);
        assert_eq!(template.validity_period_days, 365);
        assert_eq!(template.required_validation, ValidationLevel::Strict);
        assert_eq!(template.max_path_length, Some(0));
        assert!(template.key_usage.contains(&KeyUsage::KeyEncipherment));
        assert!(template.allows("SYSTEM_ADMIN"));
        assert!(template.allows("CRITICAL_OPERATIONS"));
    }

    #[test]
    fn test_high_and_medium_policy() {
        let manager = CertificateTemplateManager::new();

        let high = manager.get_template(TrustLevel::High).unwrap();
        assert_eq!(high.key_size, KeySize::Rsa2048);
        assert_eq!(high.validity_period_days, 730);
        assert_eq!(high.max_path_length, Some(1));
        assert!(high.allows("CERTIFICATE_SIGNING"));
        assert!(high.extended_key_usage.contains(&ExtendedKeyUsage::ClientAuth));

        let medium = manager.get_template(TrustLevel::Medium).unwrap();
        assert_eq!(medium.validity_period_days, 1095);
        assert_eq!(medium.required_validation, ValidationLevel::Standard);
        assert!(medium.allows("BASIC_OPERATIONS"));
        assert!(!medium.allows("SYSTEM_ADMIN"));
    }

    #[test]
    fn test_low_trust_level_rejected() {
        let mut manager = CertificateTemplateManager::new();
        let err = manager.get_template(TrustLevel::Low).unwrap_err();
        assert_eq!(
            err.to_string(),
            "LOW trust level agents do not require certificates"
        );

        let result = manager.update_template(TrustLevel::Low, CertificateTemplate::medium());
        assert!(matches!(result, Err(CaError::LowTemplateUpdate)));
    }

    #[test]
    fn test_update_template_replaces_policy() {
        let mut manager = CertificateTemplateManager::new();
        let mut custom = CertificateTemplate::medium();
        custom.validity_period_days = 90;
        manager.update_template(TrustLevel::Medium, custom).unwrap();

        assert_eq!(manager.validity_period_days(TrustLevel::Medium).unwrap(), 90);
        assert_eq!(manager.all_templates().len(), 3);
    }

    #[test]
    fn test_update_template_rejects_foreign_level() {
        let mut manager = CertificateTemplateManager::new();
        let err = manager
            .update_template(TrustLevel::Medium, CertificateTemplate::critical())
            .unwrap_err();
        assert!(matches!(
            err,
            CaError::TemplateLevelMismatch {
                requested: TrustLevel::Medium,
                template: TrustLevel::Critical,
            }
        ));
        assert_eq!(
            manager.get_template(TrustLevel::Medium).unwrap().trust_level,
            TrustLevel::Medium
        );
    }

    #[test]
    fn test_update_template_bounds_validity() {
        let mut manager = CertificateTemplateManager::new();
        for days in [0, u32::MAX] {
            let mut custom = CertificateTemplate::high();
            custom.validity_period_days = days;
            let err = manager.update_template(TrustLevel::High, custom).unwrap_err();
            assert!(matches!(err, CaError::InvalidValidityPeriod(d) if d == u64::from(days)));
        }
        assert_eq!(manager.validity_period_days(TrustLevel::High).unwrap(), 730);
    }

    #[test]
    fn test_validate_capabilities_reports_each_violation() {
        let manager = CertificateTemplateManager::new();
        let requested = vec![
            "BASIC_OPERATIONS".to_string(),
            "SYSTEM_ADMIN".to_string(),
            "KEY_MANAGEMENT".to_string(),
        ];
        let check = manager
            .validate_capabilities(&requested, TrustLevel::Medium)
            .unwrap();
        assert!(!check.valid);
        assert_eq!(check.errors.len(), 2);
        assert_eq!(
            check.errors[0],
            "Capability 'SYSTEM_ADMIN' not allowed for trust level 'MEDIUM'"
        );

        let ok = manager
            .validate_capabilities(&["REPORTING".to_string()], TrustLevel::Medium)
            .unwrap();
        assert!(ok.valid);
        assert!(ok.errors.is_empty());
    }

    #[test]
    fn test_derived_accessors() {
        let manager = CertificateTemplateManager::new();
        assert_eq!(
            manager.required_key_size(TrustLevel::Critical).unwrap(),
            KeySize::Rsa4096
        );
        assert_eq!(
            manager.validation_level(TrustLevel::High).unwrap(),
            ValidationLevel::Enhanced
        );
        assert!(manager.validity_period_days(TrustLevel::Low).is_err());
    }

    #[test]
    fn test_ensure_capabilities_names_first_offender() {
        let template = CertificateTemplate::medium();
        let err = template
            .ensure_capabilities(&["REPORTING".to_string(), "SYSTEM_ADMIN".to_string()])
            .unwrap_err();
        assert!(matches!(err, CaError::CapabilityExceeded(ref c) if c == "SYSTEM_ADMIN"));
    }
}
