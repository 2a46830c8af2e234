use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::oneshot;

use super::platform::{ForeignCmpSurface, ForeignFrame, FrameAdapter, SurfaceAdapter};
use crate::config::{ConfigStore, GateConfig, CONFIG_SECTION};
use crate::consent::{ConsentData, ConsentStore};
use crate::error::ConsentError;
use crate::gate::ConsentGate;
use crate::lookup::{IabLookup, LookupRegistry};
use crate::pipeline::Pipeline;
use crate::rpc::InboundMessage;

/// Committed consent as exposed to host applications.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ConsentSnapshot {
    /// Encoded consent string.
    pub consent_string: Option<String>,
    /// The CMP's vendor consents object, JSON-encoded.
    pub vendor_data_json: Option<String>,
    /// Whether GDPR applies to the current user.
    pub gdpr_applies: Option<bool>,
}

impl From<ConsentData> for ConsentSnapshot {
    fn from(data: ConsentData) -> Self {
        Self {
            consent_string: data.consent_string,
            vendor_data_json: data.vendor_data.map(|value| value.to_string()),
            gdpr_applies: data.gdpr_applies,
        }
    }
}

/// Consent gate for host applications that start auctions themselves.
///
/// Until [`ConsentManager::set_config`] is called the gate is not part of the
/// pipeline and every request proceeds.
#[derive(uniffi::Object)]
pub struct ConsentManager {
    config: ConfigStore,
    pipeline: Arc<Pipeline<oneshot::Sender<()>>>,
    store: Arc<ConsentStore>,
    iab: Arc<IabLookup>,
}

#[uniffi::export]
impl ConsentManager {
    /// Creates a manager for the window the host code runs in.
    ///
    /// Pass `cmp_surface` when the CMP API is callable in place.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(window: Arc<dyn ForeignFrame>, cmp_surface: Option<Arc<dyn ForeignCmpSurface>>) -> Self {
        let mut iab = IabLookup::new(Arc::new(FrameAdapter(window)));
        if let Some(surface) = cmp_surface {
            iab = iab.with_direct_surface(Arc::new(SurfaceAdapter(surface)));
        }
        let iab = Arc::new(iab);

        let store = Arc::new(ConsentStore::new());
        let registry = Arc::new(LookupRegistry::with_defaults(Arc::clone(&iab)));
        let gate = Arc::new(ConsentGate::new(
            registry,
            Arc::clone(&store),
            GateConfig::default(),
        ));

        let pipeline = Arc::new(Pipeline::new(|proceed: oneshot::Sender<()>| {
            let _ = proceed.send(());
        }));
        let config = ConfigStore::new();
        gate.attach(&pipeline, &config);

        Self {
            config,
            pipeline,
            store,
            iab,
        }
    }

    /// Applies the `consentManagement` config section (`cmpApi`, `timeout`,
    /// `allowAuctionWithoutConsent`).
    ///
    /// # Errors
    ///
    /// Returns an error if `section_json` is not valid JSON.
    pub fn set_config(&self, section_json: String) -> Result<(), ConsentError> {
        let section: Value = serde_json::from_str(&section_json)?;
        self.config.set_config(json!({ CONFIG_SECTION: section }))
    }

    /// Forwards a window `message` event payload. Returns whether it answered
    /// a pending CMP call.
    #[must_use]
    pub fn deliver_message(&self, data: String) -> bool {
        self.iab.handle_message(&InboundMessage::Text(data))
    }

    /// Consent committed by the last pass, if any.
    #[must_use]
    pub fn consent_data(&self) -> Option<ConsentSnapshot> {
        self.store.consent_data().map(ConsentSnapshot::from)
    }

    /// Forgets committed consent so the next request looks it up again.
    pub fn reset_consent_data(&self) {
        self.store.reset();
    }
}

#[uniffi::export(async_runtime = "tokio")]
impl ConsentManager {
    /// Runs the request pipeline. Returns `true` if the auction may start and
    /// `false` if the gate cancelled it.
    pub async fn request_consent(&self) -> bool {
        let (proceed, proceeded) = oneshot::channel();
        self.pipeline.invoke(proceed).await;
        proceeded.await.is_ok()
    }
}
