//! Data-plane layer.
//!
//! Owns the per-provider subscriber sets whose guards activate and release sources,
//! and the per-session broadcast stream that carries provider-changed, value-changed
//! and active-changed events out to clients.

pub(crate) mod session_events;
pub(crate) mod subscription;
