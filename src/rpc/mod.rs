//! Signed RPC Module
//!
//! The request/response protocol between agents: canonical-JSON payloads
//! signed with RSA-PSS, carried base64-encoded over HTTP POST, verified
//! against the sender's self-certifying identity before any application
//! code runs.

pub mod listener;
pub mod transport;

pub use listener::router;
pub use transport::RpcTransport;
