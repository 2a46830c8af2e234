//! `ConsentKit` gates header-bidding auctions on the user's GDPR consent.
//!
//! This crate packages [`consentkit_core`] as a static and dynamic library
//! for hosts that consume the generated bindings.

pub use consentkit_core::*;
