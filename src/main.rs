//! Agent PKI - bootstrap binary
//!
//! Loads `config.toml` (or the path given as first argument), brings up the
//! Root CA and the Intermediate CA, and offers an interactive menu for
//! inspecting the hierarchy.
//!
//! Audit lines are printed through `tracing`; set `RUST_LOG=pki_audit=info`
//! to see them.

use agent_pki::{
    AgentMetadata, CertificateSigningRequest, CertificateTemplateManager, DistinguishedName,
    IntermediateCertificateAuthority, PkiConfig, RootCertificateAuthority, SystemClock,
    TrustLevel,
};
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEMO_CAPABILITY: &str = "BASIC_OPERATIONS";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Agent PKI ===\n");
    let config = match std::env::args().nth(1) {
        Some(path) => PkiConfig::from_file(&path)?,
        None => PkiConfig::load()?,
    };
    println!("✓ Configuration loaded");

    let clock = Arc::new(SystemClock);
    let templates = CertificateTemplateManager::new();

    let root = Arc::new(RootCertificateAuthority::new(config.clone(), clock.clone()));
    let root_cert = root
        .generate_root_certificate()
        .context("Failed to generate Root CA")?;
    println!("✓ Root CA generated (serial {})", root_cert.serial_number);

    let intermediate = IntermediateCertificateAuthority::new(config, root, templates, clock);
    let intermediate_cert = intermediate
        .initialize()
        .context("Failed to initialize Intermediate CA")?;
    println!(
        "✓ Intermediate CA initialized (serial {})",
        intermediate_cert.serial_number
    );

    loop {
        println!("\n=== Agent PKI Menu ===");
        println!("1. Show hierarchy status");
        println!("2. Issue demo MEDIUM certificate");
        println!("3. Generate CRLs");
        println!("4. Exit");
        print!("\nSelect an option: ");
        io::stdout().flush()?;

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;

        match choice.trim() {
            "1" => show_status(&intermediate),
            "2" => issue_demo_certificate(&intermediate)?,
            "3" => generate_crls(&intermediate)?,
            "4" => {
                println!("\nExiting Agent PKI...");
                break;
            }
            _ => println!("Invalid option. Please select 1-4."),
        }
    }

    Ok(())
}

fn show_status(intermediate: &IntermediateCertificateAuthority) {
    let root = intermediate.root();
    println!("\n=== Hierarchy Status ===");
    println!("Root CA:         {}", root.subject());
    println!("  issued:        {}", root.issued_serials().len());
    println!("  revoked:       {}", root.revoked_certificates().len());
    println!("  pending CRITICAL requests: {}", root.pending_critical_requests().len());
    println!("Intermediate CA: {}", intermediate.subject());
    println!("  issued:        {}", intermediate.issued_serials().len());
    println!("  revoked:       {}", intermediate.revoked_certificates().len());
    println!("  expiring in 30 days: {}", intermediate.expiring_certificates(30).len());
}

fn issue_demo_certificate(intermediate: &IntermediateCertificateAuthority) -> Result<()> {
    println!("\n=== Issue Demo Certificate ===");
    let template = intermediate.templates().get_template(TrustLevel::Medium)?;
    let agent_key = agent_pki::key_store::SigningKeyStore::generate(template.key_size)?;

    let csr = CertificateSigningRequest {
        subject: DistinguishedName::new("demo-agent", "Agent Systems", "Textile Showcase", "US"),
        public_key: agent_key.public_key_pem().to_string(),
        trust_level: TrustLevel::Medium,
        requested_capabilities: vec![DEMO_CAPABILITY.to_string()],
        agent_metadata: AgentMetadata {
            name: "demo-agent".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec![DEMO_CAPABILITY.to_string()],
        },
    };

    let issued = intermediate
        .issue_certificate(&csr, &template)
        .context("Failed to issue demo certificate")?;
    println!("✓ Issued serial {}", issued.serial_number);
    println!("  fingerprint: {}", issued.fingerprint);
    println!("  valid until: {}", issued.valid_to);

    let result = intermediate.validate_certificate(&issued.certificate, TrustLevel::Medium);
    if result.is_valid {
        println!("✓ Certificate validated (chain length {})", result.certificate_chain.len());
    } else {
        println!("✗ Certificate validation failed: {:?}", result.error_codes());
    }
    Ok(())
}

fn generate_crls(intermediate: &IntermediateCertificateAuthority) -> Result<()> {
    println!("\n=== Certificate Revocation Lists ===");
    for crl in [
        intermediate.root().generate_crl()?,
        intermediate.generate_crl()?,
    ] {
        println!(
            "✓ {}: {} revoked, next update {}",
            crl.issuer.common_name,
            crl.revoked_certificates.len(),
            crl.next_update
        );
    }
    Ok(())
}
