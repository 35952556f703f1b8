use anyhow::{ensure, Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fs;

use crate::clock::{DAYS_PER_YEAR, MAX_VALIDITY_DAYS};
use crate::types::{DistinguishedName, HashAlgorithm, KeySize, KeyUsage};

#[derive(Debug, Deserialize, Clone)]
pub struct PkiConfig {
    pub root_ca: RootCaConfig,
    pub intermediate_ca: IntermediateCaConfig,
    pub revocation: RevocationConfig,
    #[serde(default = "default_root_identity")]
    pub root_ca_identity: CaIdentity,
    #[serde(default = "default_intermediate_identity")]
    pub intermediate_ca_identity: CaIdentity,
    #[serde(default)]
    pub critical_requests: CriticalRequestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RootCaConfig {
    pub key_size: KeySize,
    pub hash_algorithm: HashAlgorithm,
    pub validity_period_years: u32,
    pub key_usage: Vec<KeyUsage>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntermediateCaConfig {
    pub key_size: KeySize,
    pub hash_algorithm: HashAlgorithm,
    pub validity_period_years: u32,
    pub path_len_constraint: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RevocationConfig {
    pub crl_update_interval_hours: u32,
    pub ocsp_enabled: bool,
    pub grace_period_hours: u32,
}

impl RevocationConfig {
    pub fn crl_update_interval(&self) -> Duration {
        Duration::hours(i64::from(self.crl_update_interval_hours))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::hours(i64::from(self.grace_period_hours))
    }
}

/// Distinguished name a CA uses as its subject
#[derive(Debug, Deserialize, Clone)]
pub struct CaIdentity {
    pub common_name: String,
    pub organizational_unit: String,
    pub organization: String,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub state_or_province: Option<String>,
    pub country: String,
}

impl CaIdentity {
    pub fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new(
            self.common_name.clone(),
            self.organizational_unit.clone(),
            self.organization.clone(),
            self.country.clone(),
        );
        dn.locality = self.locality.clone();
        dn.state_or_province = self.state_or_province.clone();
        dn
    }
}

fn default_root_identity() -> CaIdentity {
    CaIdentity {
        common_name: "Root CA".to_string(),
        organizational_unit: "Certificate Authority".to_string(),
        organization: "Textile Showcase".to_string(),
        locality: None,
        state_or_province: None,
        country: "US".to_string(),
    }
}

fn default_intermediate_identity() -> CaIdentity {
    CaIdentity {
        common_name: "Intermediate CA".to_string(),
        organizational_unit: "Agent Systems".to_string(),
        organization: "Textile Showcase".to_string(),
        locality: None,
        state_or_province: None,
        country: "US".to_string(),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CriticalRequestConfig {
    #[serde(default = "default_approval_ttl_hours")]
    pub approval_ttl_hours: u32,
}

impl CriticalRequestConfig {
    pub fn approval_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.approval_ttl_hours))
    }
}

impl Default for CriticalRequestConfig {
    fn default() -> Self {
        Self {
            approval_ttl_hours: default_approval_ttl_hours(),
        }
    }
}

fn default_approval_ttl_hours() -> u32 {
    72
}

impl PkiConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: PkiConfig =
            toml::from_str(config_str).context("Failed to parse config file")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject validity periods no certificate could be issued with
    fn validate(&self) -> Result<()> {
        let max_years = MAX_VALIDITY_DAYS / DAYS_PER_YEAR;
        for (section, years) in [
            ("root_ca", self.root_ca.validity_period_years),
            ("intermediate_ca", self.intermediate_ca.validity_period_years),
        ] {
            ensure!(
                (1..=max_years).contains(&u64::from(years)),
                "{}.validity_period_years must be between 1 and {} (got {})",
                section,
                max_years,
                years
            );
        }
        Ok(())
    }

    /// Load configuration with default path (config.toml)
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }
}
