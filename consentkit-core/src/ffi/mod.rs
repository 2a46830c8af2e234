//! FFI bindings for the consent gate.
//!
//! The host application implements [`ForeignFrame`] (and optionally
//! [`ForeignCmpSurface`]), forwards window `message` events to
//! [`ConsentManager::deliver_message`] and awaits
//! [`ConsentManager::request_consent`] before starting an auction.
//!
//! # Example (Kotlin)
//!
//! ```kotlin
//! val manager = ConsentManager(WebViewFrame(webView), null)
//! manager.setConfig("""{"cmpApi":"iab","timeout":8000,"allowAuctionWithoutConsent":false}""")
//! webView.onMessage { data -> manager.deliverMessage(data) }
//!
//! if (manager.requestConsent()) {
//!     startAuction(manager.consentData())
//! }
//! ```

mod error;
mod manager;
mod platform;

pub use error::PlatformError;
pub use manager::{ConsentManager, ConsentSnapshot};
pub use platform::{CmpResponder, ForeignCmpSurface, ForeignFrame};
