//! Agent Identity Module
//!
//! RSA keypair management and self-certifying DID derivation.
//! The key file IS the agent's identity: the DID is the SHA-256 digest
//! of the public key PEM, so any holder of a record can recompute and
//! check it without trusting the directory.

pub mod keystore;
pub mod signing;

pub use keystore::{did_for_pem, load_or_create, verify_did, Keypair};
pub use signing::{sign, verify};
