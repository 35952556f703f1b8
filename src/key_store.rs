//! Secure custody of CA signing keys using the secrecy crate
//!
//! Each CA keeps its RSA private key as DER bytes inside a [`Secret`], so the
//! key material is zeroized on drop and never shows up in debug output. The
//! key is only reconstructed for the duration of a signing operation.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use secrecy::{ExposeSecret, Secret, Zeroize};

use crate::error::{CaError, Result};
use crate::types::{HashAlgorithm, KeySize};

/// A securely stored private key that implements Zeroize
#[derive(Clone)]
struct SecurePrivateKey {
    der_bytes: Vec<u8>,
}

impl Zeroize for SecurePrivateKey {
    fn zeroize(&mut self) {
        self.der_bytes.zeroize();
    }
}

impl fmt::Debug for SecurePrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurePrivateKey")
            .field("der_bytes", &"<redacted>")
            .finish()
    }
}

/// Signing key of a certificate authority
///
/// The public half is kept in the clear as SPKI PEM, since it is embedded in
/// issued envelopes and used by relying parties.
pub struct SigningKeyStore {
    private_key: Secret<SecurePrivateKey>,
    public_key_pem: String,
}

impl SigningKeyStore {
    /// Generate a fresh RSA key pair of the given size
    pub fn generate(key_size: KeySize) -> Result<Self> {
        let rsa = Rsa::generate(key_size.bits())?;
        let key = PKey::from_rsa(rsa)?;
        Self::new(key)
    }

    /// Take custody of an existing private key
    pub fn new(key: PKey<Private>) -> Result<Self> {
        let der_bytes = key.private_key_to_der()?;
        let public_key_pem = String::from_utf8(key.public_key_to_pem()?)
            .map_err(|e| CaError::Encoding(format!("Public key PEM is not UTF-8: {}", e)))?;

        Ok(Self {
            private_key: Secret::new(SecurePrivateKey { der_bytes }),
            public_key_pem,
        })
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Sign `data` and return the base64 signature
    ///
    /// The key is rebuilt from the secret only for the duration of this call.
    pub fn sign(&self, hash: HashAlgorithm, data: &[u8]) -> Result<String> {
        let der_bytes = &self.private_key.expose_secret().der_bytes;
        let pkey = PKey::private_key_from_der(der_bytes)?;

        let mut signer = Signer::new(hash.message_digest(), &pkey)?;
        let signature = signer.sign_oneshot_to_vec(data)?;
        Ok(STANDARD.encode(signature))
    }
}

impl fmt::Debug for SigningKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyStore")
            .field("private_key", &"<securely stored>")
            .field("public_key_pem", &self.public_key_pem)
            .finish()
    }
}

/// Check a base64 signature over `data` against a PEM public key
///
/// Any decoding or OpenSSL failure counts as a failed verification.
pub fn verify_signature(
    public_key_pem: &str,
    hash: HashAlgorithm,
    data: &[u8],
    signature_b64: &str,
) -> bool {
    let Ok(signature) = STANDARD.decode(signature_b64) else {
        return false;
    };
    let Ok(public_key) = PKey::public_key_from_pem(public_key_pem.as_bytes()) else {
        return false;
    };
    let Ok(mut verifier) = Verifier::new(hash.message_digest(), &public_key) else {
        return false;
    };
    verifier.verify_oneshot(&signature, data).unwrap_or(false)
}
