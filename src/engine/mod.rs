//! Wallet engine integration module
//!
//! This module provides the traits and payload types describing the external wallet engine and
//! the lightning node. Both are opaque collaborators: the crate drives them but never implements
//! their cryptography, networking or consensus logic.

/// Engine, call-object and lightning node traits
mod client;
/// Payload types exchanged with the engine
mod types;

pub use client::*;
pub use types::*;
