//! Control-plane layer.
//!
//! Owns provider descriptors and the provider registry, client session lifecycle and
//! the authorization gate. Everything here is mutated from the broker loop only.

pub mod authorization;
pub mod descriptor;
pub(crate) mod provider_registry;
pub(crate) mod session_manager;
