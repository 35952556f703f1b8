//! Issuance and revocation ledger kept by each CA instance.
//!
//! The ledger is never shared between CAs: the Root CA and the Intermediate
//! CA each own one, behind their own lock.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::error::{CaError, Result};
use crate::types::{IssuedCertificate, RevocationReason, RevocationStatus, RevokedCertificateEntry};

const RANDOM_ID_BYTES: usize = 16;

/// 128 random bits as 32 lowercase hex characters
pub fn random_hex_id() -> Result<String> {
    let mut buf = [0u8; RANDOM_ID_BYTES];
    openssl::rand::rand_bytes(&mut buf)?;
    Ok(hex::encode(buf))
}

#[derive(Debug, Default)]
pub struct CertificateRegistry {
    issued: HashMap<String, IssuedCertificate>,
    revoked: HashMap<String, RevokedCertificateEntry>,
    // every serial ever handed out, including the CA's own
    used_serials: HashSet<String>,
}

impl CertificateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a serial number that this ledger has never handed out
    pub fn allocate_serial(&mut self) -> Result<String> {
        loop {
            let candidate = random_hex_id()?;
            if self.used_serials.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
    }

    /// Store an issued certificate under its serial number
    pub fn record(&mut self, certificate: IssuedCertificate) {
        self.used_serials.insert(certificate.serial_number.clone());
        self.issued
            .insert(certificate.serial_number.clone(), certificate);
    }

    pub fn get(&self, serial_number: &str) -> Option<&IssuedCertificate> {
        self.issued.get(serial_number)
    }

    pub fn contains(&self, serial_number: &str) -> bool {
        self.issued.contains_key(serial_number)
    }

    /// Sorted list of issued serial numbers
    pub fn serials(&self) -> Vec<String> {
        let mut serials: Vec<String> = self.issued.keys().cloned().collect();
        serials.sort();
        serials
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    /// Record a revocation
    ///
    /// # Errors
    /// - [`CaError::CertificateNotFound`] if the serial was never issued here
    /// - [`CaError::AlreadyRevoked`] if an entry exists; the first one is kept
    pub fn revoke(
        &mut self,
        serial_number: &str,
        reason: RevocationReason,
        at: DateTime<Utc>,
    ) -> Result<RevokedCertificateEntry> {
        if !self.issued.contains_key(serial_number) {
            return Err(CaError::CertificateNotFound(serial_number.to_string()));
        }
        if self.revoked.contains_key(serial_number) {
            return Err(CaError::AlreadyRevoked(serial_number.to_string()));
        }

        let entry = RevokedCertificateEntry {
            serial_number: serial_number.to_string(),
            revocation_date: at,
            reason,
        };
        self.revoked
            .insert(serial_number.to_string(), entry.clone());
        Ok(entry)
    }

    pub fn revocation_entry(&self, serial_number: &str) -> Option<&RevokedCertificateEntry> {
        self.revoked.get(serial_number)
    }

    pub fn revocation_status(&self, serial_number: &str) -> RevocationStatus {
        match self.revoked.get(serial_number) {
            Some(entry) => RevocationStatus::revoked(entry),
            None => RevocationStatus::valid(),
        }
    }

    /// Revocation entries ordered by revocation date, then serial
    pub fn revoked_entries(&self) -> Vec<RevokedCertificateEntry> {
        let mut entries: Vec<RevokedCertificateEntry> = self.revoked.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.revocation_date
                .cmp(&b.revocation_date)
                .then_with(|| a.serial_number.cmp(&b.serial_number))
        });
        entries
    }

    /// Unrevoked certificates that are still valid at `now` but expire within `window`
    pub fn expiring_within(&self, now: DateTime<Utc>, window: Duration) -> Vec<IssuedCertificate> {
        // a window past the end of time covers everything
        let horizon = now
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut expiring: Vec<IssuedCertificate> = self
            .issued
            .values()
            .filter(|c| !self.revoked.contains_key(&c.serial_number))
            .filter(|c| c.valid_to >= now && c.valid_to <= horizon)
            .cloned()
            .collect();
        expiring.sort_by(|a, b| a.valid_to.cmp(&b.valid_to));
        expiring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CertificateStatus;

    fn issued(serial: &str, valid_to: DateTime<Utc>) -> IssuedCertificate {
        IssuedCertificate {
            certificate: format!("cert-{}", serial),
            serial_number: serial.to_string(),
            valid_from: valid_to - Duration::days(10),
            valid_to,
            certificate_chain: vec![format!("cert-{}", serial)],
            fingerprint: String::new(),
        }
    }

    #[test]
    fn test_random_hex_id_shape() {
        let id = random_hex_id().unwrap();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, random_hex_id().unwrap());
    }

    #[test]
    fn test_allocated_serials_are_unique() {
        let mut registry = CertificateRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(registry.allocate_serial().unwrap()));
        }
    }

    #[test]
    fn test_revoke_unknown_serial_fails() {
        let mut registry = CertificateRegistry::new();
        let result = registry.revoke("deadbeef", RevocationReason::Unspecified, Utc::now());
        assert!(matches!(result, Err(CaError::CertificateNotFound(_))));
        assert!(registry.revoked_entries().is_empty());
    }

    #[test]
    fn test_revocation_is_permanent_and_not_overwritten() {
        let now = Utc::now();
        let mut registry = CertificateRegistry::new();
        registry.record(issued("aa", now + Duration::days(5)));

        let entry = registry
            .revoke("aa", RevocationReason::KeyCompromise, now)
            .unwrap();
        assert_eq!(entry.reason, RevocationReason::KeyCompromise);

        let again = registry.revoke("aa", RevocationReason::Superseded, now + Duration::hours(1));
        assert!(matches!(again, Err(CaError::AlreadyRevoked(_))));

        let status = registry.revocation_status("aa");
        assert_eq!(status.status, CertificateStatus::Revoked);
        assert_eq!(status.reason, Some(RevocationReason::KeyCompromise));
        assert_eq!(status.revocation_date, Some(now));
    }

    #[test]
    fn test_revoked_entries_sorted_by_date() {
        let now = Utc::now();
        let mut registry = CertificateRegistry::new();
        registry.record(issued("bb", now + Duration::days(5)));
        registry.record(issued("aa", now + Duration::days(5)));
        registry
            .revoke("bb", RevocationReason::Superseded, now)
            .unwrap();
        registry
            .revoke("aa", RevocationReason::KeyCompromise, now + Duration::minutes(1))
            .unwrap();

        let serials: Vec<String> = registry
            .revoked_entries()
            .into_iter()
            .map(|e| e.serial_number)
            .collect();
        assert_eq!(serials, vec!["bb".to_string(), "aa".to_string()]);
    }

    #[test]
    fn test_expiring_within_skips_revoked_and_expired() {
        let now = Utc::now();
        let mut registry = CertificateRegistry::new();
        registry.record(issued("soon", now + Duration::days(3)));
        registry.record(issued("later", now + Duration::days(90)));
        registry.record(issued("gone", now - Duration::days(1)));
        registry.record(issued("revoked", now + Duration::days(2)));
        registry
            .revoke("revoked", RevocationReason::Unspecified, now)
            .unwrap();

        let expiring = registry.expiring_within(now, Duration::days(30));
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].serial_number, "soon");
        assert_eq!(registry.serials().len(), 4);
    }
}
