//! Message Signing
//!
//! RSA-PSS over SHA-256 with MGF1-SHA-256 and the maximum salt length the
//! key and hash permit. Verification collapses every failure mode to
//! `false`; callers treat `false` as an authentication failure, never as
//! a transport error.

use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::identity::keystore::Keypair;

/// Maximum PSS salt length for a key of `key_bytes` octets with SHA-256.
fn max_salt_len(key_bytes: usize) -> usize {
    key_bytes - <Sha256 as Digest>::output_size() - 2
}

/// Sign `message` with the agent's private key. Returns the raw signature
/// bytes.
pub fn sign(keypair: &Keypair, message: &[u8]) -> Result<Vec<u8>, Error> {
    let digest = Sha256::digest(message);
    let padding = Pss::new_with_salt::<Sha256>(max_salt_len(keypair.private_key().size()));
    keypair
        .private_key()
        .sign_with_rng(&mut rand::thread_rng(), padding, &digest)
        .map_err(|e| Error::KeyMaterial(format!("signing failed: {}", e)))
}

/// Verify `signature` over `message` against a public key PEM.
pub fn verify(public_key_pem: &str, message: &[u8], signature: &[u8]) -> bool {
    let public = match RsaPublicKey::from_public_key_pem(public_key_pem) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let digest = Sha256::digest(message);
    let padding = Pss::new_with_salt::<Sha256>(max_salt_len(public.size()));
    public.verify(padding, &digest, signature).is_ok()
}
