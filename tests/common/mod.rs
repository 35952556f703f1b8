#![allow(dead_code)]

use std::sync::Arc;

use agent_pki::key_store::SigningKeyStore;
use agent_pki::{
    AgentMetadata, CertificateSigningRequest, CertificateTemplateManager, DistinguishedName,
    IntermediateCertificateAuthority, KeySize, ManualClock, PkiConfig, RootCertificateAuthority,
    TrustLevel,
};

pub const TEST_CONFIG: &str = r#"
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

pub struct Hierarchy {
    pub clock: Arc<ManualClock>,
    pub root: Arc<RootCertificateAuthority>,
    pub intermediate: IntermediateCertificateAuthority,
    pub templates: CertificateTemplateManager,
}

pub fn config() -> PkiConfig {
    PkiConfig::from_toml_str(TEST_CONFIG).unwrap()
}

/// Root generated and intermediate initialized
pub fn hierarchy() -> Hierarchy {
    let clock = Arc::new(ManualClock::starting_now());
    let config = config();
    let templates = CertificateTemplateManager::new();

    let root = Arc::new(RootCertificateAuthority::new(config.clone(), clock.clone()));
    root.generate_root_certificate().unwrap();

    let intermediate = IntermediateCertificateAuthority::new(
        config,
        root.clone(),
        templates.clone(),
        clock.clone(),
    );
    intermediate.initialize().unwrap();

    Hierarchy {
        clock,
        root,
        intermediate,
        templates,
    }
}

pub fn csr(name: &str, trust_level: TrustLevel, capabilities: &[&str]) -> CertificateSigningRequest {
    let capabilities: Vec<String> = capabilities.iter().map(|c| c.to_string()).collect();
    let key = SigningKeyStore::generate(KeySize::Rsa2048).unwrap();
    CertificateSigningRequest {
        subject: DistinguishedName::new(name, "Agent Systems", "Textile Showcase", "US"),
        public_key: key.public_key_pem().to_string(),
        trust_level,
        requested_capabilities: capabilities.clone(),
        agent_metadata: AgentMetadata {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            capabilities,
        },
    }
}
