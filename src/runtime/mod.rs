//! Runtime Module
//!
//! Composes identity, overlay, registry, ranking, and RPC into a single
//! long-running agent process: one tokio runtime hosting the inbound
//! listener while outbound ranking and sends proceed concurrently.

pub mod agent;

pub use agent::AgentRuntime;
