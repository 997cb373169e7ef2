// API response models
// Shapes returned by the uShadow backend (`/api/...`). Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::requests::ApiKeys;
use crate::reconciler::jobs::Job;

// =========================
// Errors
// =========================

/// FastAPI error body. `detail` is usually a string but validation errors send a list.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Value,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| {
                        item.get("msg")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .or_else(|| item.as_str().map(str::to_string))
                    })
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("; "))
                }
            }
            _ => None,
        }
    }
}

/// `/health` body. Only `status` is relied on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =========================
// Queue dashboard
// =========================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobBuckets {
    #[serde(default)]
    pub queued: Vec<Job>,
    #[serde(default)]
    pub processing: Vec<Job>,
    #[serde(default)]
    pub completed: Vec<Job>,
}

impl JobBuckets {
    /// All jobs in bucket order (queued, processing, completed).
    pub fn all(&self) -> Vec<Job> {
        self.queued
            .iter()
            .chain(self.processing.iter())
            .chain(self.completed.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queued.len() + self.processing.len() + self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamingSession {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamingStatus {
    #[serde(default)]
    pub active_sessions: Vec<StreamingSession>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardResponse {
    #[serde(default)]
    pub jobs: JobBuckets,
    #[serde(default)]
    pub streaming_status: StreamingStatus,
    #[serde(default)]
    pub session_jobs: Option<HashMap<String, Vec<Job>>>,
}

// =========================
// Services
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(alias = "name")]
    pub service_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub health: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ServiceInfo {
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceActionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnabledResponse {
    #[serde(default)]
    pub service_id: Option<String>,
    pub service_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResponse {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// =========================
// Wizard
// =========================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardStatusResponse {
    pub wizard_completed: bool,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub completed_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeysUpdateResponse {
    /// Masked values after the update.
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedKeys {
    #[serde(default)]
    pub openai_api_key: bool,
    #[serde(default)]
    pub anthropic_api_key: bool,
    #[serde(default)]
    pub deepgram_api_key: bool,
    #[serde(default)]
    pub mistral_api_key: bool,
}

impl DetectedKeys {
    pub fn has_llm(&self) -> bool {
        self.openai_api_key || self.anthropic_api_key
    }

    pub fn has_transcription(&self) -> bool {
        self.deepgram_api_key || self.mistral_api_key
    }

    /// Keys count as configured once both an LLM and a transcription provider are set.
    pub fn is_complete(&self) -> bool {
        self.has_llm() && self.has_transcription()
    }
}

// =========================
// Tailscale (mobile remote access)
// =========================

/// `{status, message}` acknowledgement returned by tunnel container actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelStatus {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelAuthUrl {
    pub auth_url: String,
    #[serde(default)]
    pub web_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateStatus {
    #[serde(default)]
    pub provisioned: bool,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Connection details the phone app scans. The QR image itself is not kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileConnection {
    pub hostname: String,
    #[serde(default)]
    pub tailscale_ip: String,
    #[serde(default)]
    pub api_port: u16,
    pub api_url: String,
    #[serde(default)]
    pub auth_token: String,
}
