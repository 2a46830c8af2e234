#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! `ConsentKit` gates a request pipeline (typically a header-bidding auction)
//! on the user's GDPR consent as reported by an IAB consent management
//! platform (CMP).
//!
//! The [`ConsentGate`] registers itself as a [`pipeline::Hook`], asks the
//! configured [`ConsentLookup`] strategy for consent, races the lookup
//! against a timeout and lets the request continue at most once.

pub mod config;
pub use config::{ConfigStore, GateConfig};

mod consent;
pub use consent::*;

mod error;
pub use error::*;

pub mod ffi;

mod gate;
pub use gate::{ConsentGate, GateDecision, LookupOutcome, LookupResponder, HOOK_NAME, HOOK_PRIORITY};

pub mod logger;

mod lookup;
pub use lookup::{ConsentLookup, IabLookup, LookupRegistry, IAB_PLATFORM_ID};

pub mod pipeline;

pub mod rpc;

uniffi::setup_scaffolding!("consentkit_core");
