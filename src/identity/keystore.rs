//! Keystore
//!
//! Loads or generates the agent's long-lived RSA keypair and derives its
//! DID. Private key material never leaves the process after load.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::Error;

/// DID method prefix for this fabric.
pub const DID_PREFIX: &str = "did:agentweb:";

/// RSA modulus size for generated keys.
pub const KEY_BITS: usize = 2048;

/// The agent's long-lived keypair together with its derived identity.
pub struct Keypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    public_pem: String,
    did: String,
}

impl Keypair {
    /// The private key half. Crate-internal; only the signing module
    /// touches it.
    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// X.509 SubjectPublicKeyInfo PEM of the public key. The DID digest
    /// is computed over exactly this string.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn did(&self) -> &str {
        &self.did
    }
}

/// Derive the DID for a public key PEM: `did:agentweb:<hex>` where hex is
/// the lower-case SHA-256 of the UTF-8 PEM string, header and footer
/// lines included.
pub fn did_for_pem(public_key_pem: &str) -> String {
    let digest = Sha256::digest(public_key_pem.as_bytes());
    format!("{}{}", DID_PREFIX, hex::encode(digest))
}

/// Check that a DID matches a public key PEM.
pub fn verify_did(did: &str, public_key_pem: &str) -> bool {
    did == did_for_pem(public_key_pem)
}

/// Load the keypair from `path`, or generate a fresh 2048-bit RSA key and
/// persist it there in unencrypted PKCS#1 PEM with mode 0600.
///
/// An existing file that cannot be parsed as a PEM private key (PKCS#1 or
/// PKCS#8) is `Error::KeyMaterial`, fatal at startup.
pub fn load_or_create(path: &Path) -> Result<Keypair, Error> {
    let private = if path.exists() {
        let pem = fs::read_to_string(path)
            .map_err(|e| Error::KeyMaterial(format!("failed to read {}: {}", path.display(), e)))?;
        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
            .map_err(|e| {
                Error::KeyMaterial(format!("failed to parse {}: {}", path.display(), e))
            })?;
        info!("Loaded existing key from {}", path.display());
        key
    } else {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
            .map_err(|e| Error::KeyMaterial(format!("key generation failed: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::KeyMaterial(format!("failed to create {}: {}", parent.display(), e))
                })?;
                let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
            }
        }

        let pem = key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::KeyMaterial(format!("failed to encode private key: {}", e)))?;
        fs::write(path, pem.as_bytes())
            .map_err(|e| Error::KeyMaterial(format!("failed to write {}: {}", path.display(), e)))?;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        info!("Generated new key at {}", path.display());
        key
    };

    let public = private.to_public_key();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::KeyMaterial(format!("failed to encode public key: {}", e)))?;
    let did = did_for_pem(&public_pem);

    Ok(Keypair {
        private,
        public,
        public_pem,
        did,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_for_known_digest() {
        // sha256("test") is a fixed vector.
        assert_eq!(
            did_for_pem("test"),
            "did:agentweb:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_did_shape() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = load_or_create(&dir.path().join("key.pem")).unwrap();

        let did = keypair.did();
        assert!(did.starts_with(DID_PREFIX));
        let tail = &did[DID_PREFIX.len()..];
        assert_eq!(tail.len(), 64);
        assert!(tail.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_did_binds_to_public_pem() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = load_or_create(&dir.path().join("key.pem")).unwrap();

        assert!(verify_did(keypair.did(), keypair.public_key_pem()));
        assert!(!verify_did(keypair.did(), "-----BEGIN PUBLIC KEY-----\nother\n-----END PUBLIC KEY-----\n"));
    }

    #[test]
    fn test_reload_preserves_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");

        let first = load_or_create(&path).unwrap();
        let second = load_or_create(&path).unwrap();

        assert_eq!(first.did(), second.did());
        assert_eq!(first.public_key_pem(), second.public_key_pem());
    }

    #[test]
    fn test_public_pem_is_spki_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let keypair = load_or_create(&dir.path().join("key.pem")).unwrap();

        let pem = keypair.public_key_pem();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        assert!(pem.ends_with("-----END PUBLIC KEY-----\n"));
        // 64-column base64 body.
        for line in pem.lines().filter(|l| !l.starts_with("-----")) {
            assert!(line.len() <= 64);
        }
    }

    #[test]
    fn test_garbage_key_file_is_key_material_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        fs::write(&path, "not a pem").unwrap();

        match load_or_create(&path) {
            Err(Error::KeyMaterial(_)) => {}
            other => panic!("expected KeyMaterial error, got {:?}", other.map(|_| ())),
        }
    }
}
