//! Upstream domain-registry REST API client.

pub mod client;

pub use client::{ProxiedResponse, RegistryClient};
