// Wizard session store
//
// Single owner of the persisted wizard progress. Every mutation is a full
// read-modify-write followed by a synchronous save of the whole record.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::models::services::{ServiceKey, ServiceStatusPatch, ServicesSnapshot};
use crate::wizard::level::{self, SetupLabel, SetupLevel};
use crate::wizard::storage::SessionPersistence;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardMode {
    Quickstart,
    Local,
    Custom,
    #[default]
    None,
}

impl WizardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardMode::Quickstart => "quickstart",
            WizardMode::Local => "local",
            WizardMode::Custom => "custom",
            WizardMode::None => "none",
        }
    }
}

/// Persisted record. Every field defaults, so records written before `services` existed
/// load with the all-false snapshot and keep their other fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardSessionState {
    #[serde(default)]
    pub mode: WizardMode,
    #[serde(default)]
    pub completed_phases: Vec<String>,
    #[serde(default)]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub services: ServicesSnapshot,
}

/// The two update shapes a caller can send for one service key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceUpdate {
    /// `ApiKeys`: stored as-is. Capabilities: sets both `configured` and `running`.
    Flag(bool),
    /// Merge present fields. `ApiKeys` has no object shape and is coerced to `true`.
    Merge(ServiceStatusPatch),
}

pub struct WizardSessionStore<P: SessionPersistence> {
    storage: P,
    state: WizardSessionState,
}

impl<P: SessionPersistence> WizardSessionStore<P> {
    /// Rehydrate from storage. Missing, unreadable or unparsable records fall back to
    /// the default state; the failure is only logged.
    pub fn load(storage: P) -> Self {
        let state = match storage.load() {
            Ok(Some(raw)) => match serde_json::from_str::<WizardSessionState>(&raw) {
                Ok(state) => {
                    debug!(
                        "[PHASE: wizard] [STEP: load] Restored session (mode={}, phases={})",
                        state.mode.as_str(),
                        state.completed_phases.len()
                    );
                    state
                }
                Err(e) => {
                    warn!(
                        "[PHASE: wizard] [STEP: load] Stored session is not valid JSON, starting fresh: {}",
                        e
                    );
                    WizardSessionState::default()
                }
            },
            Ok(None) => WizardSessionState::default(),
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: load] Failed to read stored session, starting fresh: {:#}",
                    e
                );
                WizardSessionState::default()
            }
        };
        Self { storage, state }
    }

    pub fn state(&self) -> &WizardSessionState {
        &self.state
    }

    pub fn storage(&self) -> &P {
        &self.storage
    }

    pub fn set_mode(&mut self, mode: WizardMode) {
        self.state.mode = mode;
        self.persist();
    }

    pub fn mark_phase_complete(&mut self, phase: &str) {
        if !self.is_phase_complete(phase) {
            self.state.completed_phases.push(phase.to_string());
            info!(
                "[PHASE: wizard] [STEP: phase_complete] Phase '{}' marked complete",
                phase
            );
        }
        self.persist();
    }

    pub fn set_current_phase(&mut self, phase: Option<&str>) {
        self.state.current_phase = phase.map(str::to_string);
        self.persist();
    }

    pub fn update_service_status(&mut self, key: ServiceKey, update: ServiceUpdate) {
        let services = &mut self.state.services;
        match (key, update) {
            (ServiceKey::ApiKeys, ServiceUpdate::Flag(value)) => services.api_keys = value,
            (ServiceKey::ApiKeys, ServiceUpdate::Merge(_)) => services.api_keys = true,
            (key, ServiceUpdate::Flag(value)) => {
                if let Some(status) = services.status_mut(key) {
                    status.configured = value;
                    status.running = value;
                }
            }
            (key, ServiceUpdate::Merge(patch)) => {
                if let Some(status) = services.status_mut(key) {
                    patch.apply_to(status);
                }
            }
        }
        self.persist();
    }

    pub fn set_service_flag(&mut self, key: ServiceKey, value: bool) {
        self.update_service_status(key, ServiceUpdate::Flag(value));
    }

    pub fn merge_service_status(&mut self, key: ServiceKey, patch: ServiceStatusPatch) {
        self.update_service_status(key, ServiceUpdate::Merge(patch));
    }

    pub fn reset_wizard(&mut self) {
        if let Err(e) = self.storage.clear() {
            warn!(
                "[PHASE: wizard] [STEP: reset] Failed to clear stored session: {:#}",
                e
            );
        }
        self.state = WizardSessionState::default();
        info!("[PHASE: wizard] [STEP: reset] Wizard session reset");
    }

    pub fn is_phase_complete(&self, phase: &str) -> bool {
        self.state.completed_phases.iter().any(|p| p == phase)
    }

    pub fn setup_level(&self) -> SetupLevel {
        level::derive_level(&self.state.services)
    }

    pub fn setup_label(&self) -> SetupLabel {
        level::setup_label(self.setup_level())
    }

    pub fn is_first_time_user(&self) -> bool {
        level::is_first_time_user(&self.state)
    }

    // A failed write leaves the in-memory state ahead of storage; the UI keeps working.
    fn persist(&self) {
        let raw = match serde_json::to_string(&self.state) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: persist] Failed to serialize session: {}",
                    e
                );
                return;
            }
        };
        if let Err(e) = self.storage.save(&raw) {
            warn!(
                "[PHASE: wizard] [STEP: persist] Failed to save session: {:#}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::storage::{FileSessionStorage, MemorySessionStorage};
    use anyhow::Result;

    struct FailingStorage;

    impl SessionPersistence for FailingStorage {
        fn load(&self) -> Result<Option<String>> {
            anyhow::bail!("disk on fire")
        }
        fn save(&self, _raw: &str) -> Result<()> {
            anyhow::bail!("read-only filesystem")
        }
        fn clear(&self) -> Result<()> {
            anyhow::bail!("read-only filesystem")
        }
    }

    #[test]
    fn mark_phase_complete_is_idempotent() {
        let mut store = WizardSessionStore::load(MemorySessionStorage::new());
        store.mark_phase_complete("quickstart");
        store.mark_phase_complete("memory");
        store.mark_phase_complete("quickstart");
        assert_eq!(
            store.state().completed_phases,
            vec!["quickstart".to_string(), "memory".to_string()]
        );
        assert!(store.is_phase_complete("memory"));
        assert!(!store.is_phase_complete("speaker"));
    }

    #[test]
    fn state_round_trips_through_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WizardSessionStore::load(FileSessionStorage::new(dir.path()));
        store.set_mode(WizardMode::Local);
        store.mark_phase_complete("quickstart");
        store.set_current_phase(Some("mobile"));
        store.set_service_flag(ServiceKey::ApiKeys, true);
        store.merge_service_status(ServiceKey::Chronicle, ServiceStatusPatch::running(true));
        let before = store.state().clone();

        let reloaded = WizardSessionStore::load(FileSessionStorage::new(dir.path()));
        assert_eq!(reloaded.state(), &before);
    }

    #[test]
    fn record_without_services_loads_default_snapshot() {
        let raw = r#"{"mode":"quickstart","completedPhases":["quickstart"],"currentPhase":"memory"}"#;
        let store = WizardSessionStore::load(MemorySessionStorage::with_raw(raw));
        let state = store.state();
        assert_eq!(state.mode, WizardMode::Quickstart);
        assert_eq!(state.completed_phases, vec!["quickstart".to_string()]);
        assert_eq!(state.current_phase.as_deref(), Some("memory"));
        assert_eq!(state.services, ServicesSnapshot::default());
    }

    #[test]
    fn corrupted_record_yields_default_state() {
        let store = WizardSessionStore::load(MemorySessionStorage::with_raw("{not json"));
        assert_eq!(store.state(), &WizardSessionState::default());
        assert!(store.is_first_time_user());
    }

    #[test]
    fn unreadable_storage_and_failed_saves_keep_in_memory_state() {
        let mut store = WizardSessionStore::load(FailingStorage);
        assert_eq!(store.state(), &WizardSessionState::default());
        store.set_mode(WizardMode::Custom);
        assert_eq!(store.state().mode, WizardMode::Custom);
        store.reset_wizard();
        assert_eq!(store.state().mode, WizardMode::None);
    }

    #[test]
    fn flag_update_sets_configured_and_running() {
        let mut store = WizardSessionStore::load(MemorySessionStorage::new());
        store.set_service_flag(ServiceKey::Memory, true);
        let memory = &store.state().services.memory;
        assert!(memory.configured && memory.running);

        store.set_service_flag(ServiceKey::Memory, false);
        let memory = &store.state().services.memory;
        assert!(!memory.configured && !memory.running);
    }

    #[test]
    fn merge_on_api_keys_coerces_to_true() {
        let mut store = WizardSessionStore::load(MemorySessionStorage::new());
        store.merge_service_status(ServiceKey::ApiKeys, ServiceStatusPatch::running(false));
        assert!(store.state().services.api_keys);
    }

    #[test]
    fn merge_keeps_fields_not_in_patch() {
        let mut store = WizardSessionStore::load(MemorySessionStorage::new());
        store.merge_service_status(ServiceKey::Tunnel, ServiceStatusPatch::configured(true));
        store.merge_service_status(ServiceKey::Tunnel, ServiceStatusPatch::running(true));
        let tunnel = &store.state().services.tunnel;
        assert!(tunnel.configured);
        assert!(tunnel.running);
    }

    #[test]
    fn every_mutation_is_written_through() {
        let storage = MemorySessionStorage::new();
        let mut store = WizardSessionStore::load(storage.clone());
        store.set_mode(WizardMode::Quickstart);
        let raw = storage.raw().unwrap();
        let saved: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved["mode"], "quickstart");
        assert_eq!(saved["services"]["apiKeys"], false);
        assert!(saved.get("completedPhases").is_some());
    }

    #[test]
    fn reset_clears_storage_and_state() {
        let storage = MemorySessionStorage::new();
        let mut store = WizardSessionStore::load(storage.clone());
        store.set_mode(WizardMode::Local);
        store.mark_phase_complete("local");
        store.reset_wizard();
        assert!(storage.raw().is_none());
        assert!(store.is_first_time_user());
    }

    #[test]
    fn level_queries_follow_services() {
        let mut store = WizardSessionStore::load(MemorySessionStorage::new());
        assert_eq!(store.setup_label().label, "Get Started");
        store.set_service_flag(ServiceKey::ApiKeys, true);
        store.set_service_flag(ServiceKey::Memory, true);
        store.set_service_flag(ServiceKey::Chronicle, true);
        assert_eq!(store.setup_level(), SetupLevel::Level1);
        assert_eq!(store.setup_label().label, "Add Mobile");
        assert!(!store.is_first_time_user());
    }
}
