// API request models
// Bodies sent to the uShadow backend.

use serde::{Deserialize, Serialize};

use crate::utils::validation::is_masked_value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

/// Provider API keys as exchanged with `/api/wizard/api-keys`. On the way back the
/// backend masks every value (`***1234`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepgram_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mistral_api_key: Option<String>,
}

fn keep_new(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && !is_masked_value(v))
}

impl ApiKeys {
    /// Drop blank and masked values so an update only carries keys the user typed.
    pub fn into_update(self) -> ApiKeys {
        ApiKeys {
            openai_api_key: keep_new(self.openai_api_key),
            anthropic_api_key: keep_new(self.anthropic_api_key),
            deepgram_api_key: keep_new(self.deepgram_api_key),
            mistral_api_key: keep_new(self.mistral_api_key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.openai_api_key.is_none()
            && self.anthropic_api_key.is_none()
            && self.deepgram_api_key.is_none()
            && self.mistral_api_key.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_skips_masked_and_blank_keys() {
        let keys = ApiKeys {
            openai_api_key: Some("***abcd".to_string()),
            anthropic_api_key: Some("  ".to_string()),
            deepgram_api_key: Some("dg-new".to_string()),
            mistral_api_key: None,
        };
        let update = keys.into_update();
        assert_eq!(update.deepgram_api_key.as_deref(), Some("dg-new"));
        assert!(update.openai_api_key.is_none());
        assert!(update.anthropic_api_key.is_none());

        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, serde_json::json!({ "deepgram_api_key": "dg-new" }));
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(ApiKeys::default().into_update().is_empty());
    }
}
