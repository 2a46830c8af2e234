//! Resolved consent data and the process-wide store that holds it.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConsentError;

/// Consent resolved by a gate pass.
///
/// `None` fields mean the CMP did not answer, not that the user declined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentData {
    /// Encoded consent string (the CMP's `metadata` field).
    pub consent_string: Option<String>,
    /// The full vendor consents object returned by the CMP.
    pub vendor_data: Option<Value>,
    /// Whether GDPR applies to the current user.
    pub gdpr_applies: Option<bool>,
}

impl ConsentData {
    /// Interprets a `getVendorConsents` response.
    ///
    /// # Errors
    ///
    /// Returns [`ConsentError::UnexpectedResponse`] unless `response` is an
    /// object carrying a non-empty string `metadata`.
    pub fn from_cmp_response(response: Value) -> Result<Self, ConsentError> {
        let consent_string = response
            .as_object()
            .and_then(|object| object.get("metadata"))
            .and_then(Value::as_str)
            .filter(|metadata| !metadata.is_empty())
            .map(str::to_string);

        let Some(consent_string) = consent_string else {
            return Err(ConsentError::UnexpectedResponse {
                received: response.to_string(),
            });
        };

        Ok(Self {
            consent_string: Some(consent_string),
            gdpr_applies: response.get("gdprApplies").and_then(Value::as_bool),
            vendor_data: Some(response),
        })
    }

    /// Placeholder committed when the lookup failed but the auction continues.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Holder of the last committed [`ConsentData`]. Last write wins.
#[derive(Debug, Default)]
pub struct ConsentStore {
    data: RwLock<Option<ConsentData>>,
}

impl ConsentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the committed consent data.
    pub fn set_consent_data(&self, data: ConsentData) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(data);
    }

    /// Returns a copy of the committed consent data, if any.
    #[must_use]
    pub fn consent_data(&self) -> Option<ConsentData> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a previous pass already committed consent data.
    #[must_use]
    pub fn has_consent_data(&self) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Clears the committed data so the next pass performs a fresh lookup.
    pub fn reset(&self) {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Read-only view of a [`ConsentStore`] for downstream consumers.
#[derive(Debug, Clone)]
pub struct ConsentReader(Arc<ConsentStore>);

impl ConsentReader {
    /// Wraps a shared store.
    #[must_use]
    pub const fn new(store: Arc<ConsentStore>) -> Self {
        Self(store)
    }

    /// Returns the consent data committed so far.
    #[must_use]
    pub fn get(&self) -> Option<ConsentData> {
        self.0.consent_data()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_well_formed_response() {
        let response = json!({ "metadata": "CONSENT123", "gdprApplies": true });
        let data = ConsentData::from_cmp_response(response.clone()).unwrap();
        assert_eq!(data.consent_string.as_deref(), Some("CONSENT123"));
        assert_eq!(data.vendor_data, Some(response));
        assert_eq!(data.gdpr_applies, Some(true));
    }

    #[test]
    fn test_non_boolean_gdpr_applies_is_dropped() {
        let data =
            ConsentData::from_cmp_response(json!({ "metadata": "X", "gdprApplies": 1 })).unwrap();
        assert_eq!(data.gdpr_applies, None);
    }

    #[test_case(json!(null), "null" ; "null")]
    #[test_case(json!("BOstring"), "\"BOstring\"" ; "bare string")]
    #[test_case(json!({ "metadata": "" }), r#"{"metadata":""}"# ; "empty metadata")]
    #[test_case(json!({ "metadata": 42 }), r#"{"metadata":42}"# ; "numeric metadata")]
    fn test_malformed_response(response: Value, received: &str) {
        let err = ConsentData::from_cmp_response(response).unwrap_err();
        assert_eq!(
            err,
            ConsentError::UnexpectedResponse {
                received: received.to_string()
            }
        );
        assert!(err.to_string().contains(received));
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(ConsentData::empty()).unwrap();
        assert_eq!(
            value,
            json!({ "consentString": null, "vendorData": null, "gdprApplies": null })
        );
    }

    #[test]
    fn test_store_overwrite_and_reset() {
        let store = Arc::new(ConsentStore::new());
        let reader = ConsentReader::new(Arc::clone(&store));
        assert!(reader.get().is_none());

        store.set_consent_data(ConsentData::empty());
        store.set_consent_data(ConsentData {
            consent_string: Some("B".to_string()),
            ..ConsentData::default()
        });
        assert_eq!(reader.get().unwrap().consent_string.as_deref(), Some("B"));

        store.reset();
        assert!(!store.has_consent_data());
    }
}
