// Service status models
//
// The per-capability status snapshot is the single input of setup-level derivation and
// is persisted as part of the wizard session record.

use serde::{Deserialize, Serialize};

/// Tracked backend capabilities plus the API keys scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceKey {
    ApiKeys,
    Memory,
    Chronicle,
    Tunnel,
    Speaker,
}

impl ServiceKey {
    pub const CAPABILITIES: [ServiceKey; 4] = [
        ServiceKey::Memory,
        ServiceKey::Chronicle,
        ServiceKey::Tunnel,
        ServiceKey::Speaker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKey::ApiKeys => "apiKeys",
            ServiceKey::Memory => "memory",
            ServiceKey::Chronicle => "chronicle",
            ServiceKey::Tunnel => "tunnel",
            ServiceKey::Speaker => "speaker",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceKey::ApiKeys => "API Keys",
            ServiceKey::Memory => "Memory Store",
            ServiceKey::Chronicle => "Chronicle",
            ServiceKey::Tunnel => "Remote Access (Tailscale)",
            ServiceKey::Speaker => "Speaker Recognition",
        }
    }

    pub fn parse(s: &str) -> Option<ServiceKey> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apikeys" | "api_keys" | "api-keys" => Some(ServiceKey::ApiKeys),
            "memory" | "mem0" | "openmemory" => Some(ServiceKey::Memory),
            "chronicle" => Some(ServiceKey::Chronicle),
            "tunnel" | "tailscale" => Some(ServiceKey::Tunnel),
            "speaker" | "speaker-recognition" => Some(ServiceKey::Speaker),
            _ => None,
        }
    }

    /// Map a backend container/service name onto a tracked capability.
    ///
    /// Names follow compose conventions (`ushadow-chronicle-backend-1`,
    /// `mem0`, `tailscale`) and are matched token by token. Only the
    /// backend container of a capability counts; companion UI containers
    /// (`mem0-ui`, `chronicle-webui`) map to nothing.
    pub fn from_container_name(name: &str) -> Option<ServiceKey> {
        let lower = name.to_ascii_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| c == '-' || c == '_' || c == '.')
            .filter(|t| !t.is_empty())
            .collect();
        let has = |t: &str| tokens.iter().any(|tok| *tok == t);

        if ["ui", "webui", "web", "frontend"].iter().any(|t| has(t)) {
            return None;
        }
        if has("speaker") && has("recognition") {
            Some(ServiceKey::Speaker)
        } else if has("chronicle") && has("backend") {
            Some(ServiceKey::Chronicle)
        } else if has("mem0") || has("openmemory") {
            Some(ServiceKey::Memory)
        } else if has("tailscale") {
            Some(ServiceKey::Tunnel)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    #[serde(default)]
    pub configured: bool,
    #[serde(default)]
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial status update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStatusPatch {
    pub configured: Option<bool>,
    pub running: Option<bool>,
    /// `Some(None)` clears a previous error.
    pub error: Option<Option<String>>,
}

impl ServiceStatusPatch {
    pub fn running(running: bool) -> Self {
        Self {
            running: Some(running),
            ..Default::default()
        }
    }

    pub fn configured(configured: bool) -> Self {
        Self {
            configured: Some(configured),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(Some(message.into())),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, status: &mut ServiceStatus) {
        if let Some(configured) = self.configured {
            status.configured = configured;
        }
        if let Some(running) = self.running {
            status.running = running;
        }
        if let Some(error) = &self.error {
            status.error = error.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesSnapshot {
    #[serde(default)]
    pub api_keys: bool,
    #[serde(default)]
    pub memory: ServiceStatus,
    #[serde(default)]
    pub chronicle: ServiceStatus,
    #[serde(default)]
    pub tunnel: ServiceStatus,
    #[serde(default)]
    pub speaker: ServiceStatus,
}

impl ServicesSnapshot {
    /// Status for a capability key. `ApiKeys` has no object shape and returns `None`.
    pub fn status(&self, key: ServiceKey) -> Option<&ServiceStatus> {
        match key {
            ServiceKey::ApiKeys => None,
            ServiceKey::Memory => Some(&self.memory),
            ServiceKey::Chronicle => Some(&self.chronicle),
            ServiceKey::Tunnel => Some(&self.tunnel),
            ServiceKey::Speaker => Some(&self.speaker),
        }
    }

    pub fn status_mut(&mut self, key: ServiceKey) -> Option<&mut ServiceStatus> {
        match key {
            ServiceKey::ApiKeys => None,
            ServiceKey::Memory => Some(&mut self.memory),
            ServiceKey::Chronicle => Some(&mut self.chronicle),
            ServiceKey::Tunnel => Some(&mut self.tunnel),
            ServiceKey::Speaker => Some(&mut self.speaker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_map_to_capabilities() {
        assert_eq!(
            ServiceKey::from_container_name("ushadow-chronicle-backend-1"),
            Some(ServiceKey::Chronicle)
        );
        assert_eq!(
            ServiceKey::from_container_name("ushadow-mem0-1"),
            Some(ServiceKey::Memory)
        );
        assert_eq!(
            ServiceKey::from_container_name("speaker_recognition"),
            Some(ServiceKey::Speaker)
        );
        assert_eq!(
            ServiceKey::from_container_name("ushadow-speaker-recognition"),
            Some(ServiceKey::Speaker)
        );
        assert_eq!(
            ServiceKey::from_container_name("tailscale"),
            Some(ServiceKey::Tunnel)
        );
        assert_eq!(ServiceKey::from_container_name("mongo"), None);
    }

    #[test]
    fn ui_containers_do_not_count_as_capabilities() {
        for name in [
            "mem0-ui",
            "openmemory-ui",
            "ushadow-chronicle-webui-1",
            "speaker-recognition-frontend",
            "chronicle",
            "my-speaker",
        ] {
            assert_eq!(ServiceKey::from_container_name(name), None, "{}", name);
        }
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut status = ServiceStatus {
            configured: true,
            running: false,
            error: Some("boom".to_string()),
        };
        let patch = ServiceStatusPatch {
            running: Some(true),
            error: Some(None),
            ..Default::default()
        };
        patch.apply_to(&mut status);
        assert!(status.configured);
        assert!(status.running);
        assert!(status.error.is_none());
    }

    #[test]
    fn snapshot_serializes_with_camel_case_keys() {
        let snapshot = ServicesSnapshot {
            api_keys: true,
            ..Default::default()
        };
        let v = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(v["apiKeys"], serde_json::json!(true));
        assert_eq!(v["memory"]["running"], serde_json::json!(false));
        assert!(v["memory"].get("error").is_none());
    }
}
