//! Selection and relay policy.
//!
//! Decides which provider serves each session interface, when a provider status change
//! is worth a selection pass, and which provider values reach the client.

pub(crate) mod arbitration;
pub(crate) mod reselection;
pub mod threshold;
