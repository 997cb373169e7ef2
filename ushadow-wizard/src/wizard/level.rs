// Setup level derivation
//
// Onboarding is linear: features are surfaced in a fixed order, so the level is a strict
// AND-ladder over the service snapshot. Speaker recognition without the tunnel still
// reports level 1.

use crate::models::services::ServicesSnapshot;
use crate::wizard::session::{WizardMode, WizardSessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetupLevel {
    Level0,
    Level1,
    Level2,
    Level3,
}

impl SetupLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            SetupLevel::Level0 => 0,
            SetupLevel::Level1 => 1,
            SetupLevel::Level2 => 2,
            SetupLevel::Level3 => 3,
        }
    }
}

impl std::fmt::Display for SetupLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Suggested next action for a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupLabel {
    pub label: &'static str,
    pub description: &'static str,
    pub path: &'static str,
}

const SETUP_LABELS: [SetupLabel; 4] = [
    SetupLabel {
        label: "Get Started",
        description: "Add your API keys and start the memory store and Chronicle.",
        path: "/wizard/quickstart",
    },
    SetupLabel {
        label: "Add Mobile",
        description: "Set up remote access so the mobile app can reach uShadow.",
        path: "/wizard/mobile",
    },
    SetupLabel {
        label: "Add Speaker Recognition",
        description: "Identify who is speaking in your conversations.",
        path: "/wizard/speaker",
    },
    SetupLabel {
        label: "All Set",
        description: "Every core feature is configured.",
        path: "/",
    },
];

fn core_running(s: &ServicesSnapshot) -> bool {
    s.api_keys && s.memory.running && s.chronicle.running
}

/// Highest level whose full condition set holds. Pure and total.
pub fn derive_level(snapshot: &ServicesSnapshot) -> SetupLevel {
    let core = core_running(snapshot);
    if core && snapshot.tunnel.configured && snapshot.speaker.configured {
        SetupLevel::Level3
    } else if core && snapshot.tunnel.configured {
        SetupLevel::Level2
    } else if core {
        SetupLevel::Level1
    } else {
        SetupLevel::Level0
    }
}

pub fn setup_label(level: SetupLevel) -> SetupLabel {
    SETUP_LABELS[level.as_u8() as usize]
}

/// Reset users are indistinguishable from users who never started.
pub fn is_first_time_user(state: &WizardSessionState) -> bool {
    derive_level(&state.services) == SetupLevel::Level0
        && state.mode == WizardMode::None
        && state.completed_phases.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::services::ServiceStatus;

    fn running() -> ServiceStatus {
        ServiceStatus {
            configured: true,
            running: true,
            error: None,
        }
    }

    fn configured() -> ServiceStatus {
        ServiceStatus {
            configured: true,
            running: false,
            error: None,
        }
    }

    fn level_one_snapshot() -> ServicesSnapshot {
        ServicesSnapshot {
            api_keys: true,
            memory: running(),
            chronicle: running(),
            ..Default::default()
        }
    }

    #[test]
    fn core_services_reach_level_one_with_add_mobile_next() {
        let snapshot = level_one_snapshot();
        let level = derive_level(&snapshot);
        assert_eq!(level, SetupLevel::Level1);
        assert_eq!(setup_label(level).label, "Add Mobile");
    }

    #[test]
    fn all_conditions_reach_level_three() {
        let mut snapshot = level_one_snapshot();
        snapshot.tunnel = configured();
        snapshot.speaker = configured();
        assert_eq!(derive_level(&snapshot), SetupLevel::Level3);

        snapshot.tunnel.configured = false;
        assert_eq!(derive_level(&snapshot), SetupLevel::Level1);
    }

    #[test]
    fn tunnel_without_speaker_is_level_two() {
        let mut snapshot = level_one_snapshot();
        snapshot.tunnel = configured();
        assert_eq!(derive_level(&snapshot), SetupLevel::Level2);
        assert_eq!(setup_label(SetupLevel::Level2).path, "/wizard/speaker");
    }

    #[test]
    fn configured_but_stopped_core_is_level_zero() {
        let mut snapshot = level_one_snapshot();
        snapshot.memory.running = false;
        snapshot.tunnel = configured();
        snapshot.speaker = configured();
        assert_eq!(derive_level(&snapshot), SetupLevel::Level0);
    }

    fn snapshot_from_bits(bits: u8) -> ServicesSnapshot {
        let bit = |n: u8| bits & (1 << n) != 0;
        ServicesSnapshot {
            api_keys: bit(0),
            memory: ServiceStatus {
                configured: false,
                running: bit(1),
                error: None,
            },
            chronicle: ServiceStatus {
                configured: false,
                running: bit(2),
                error: None,
            },
            tunnel: ServiceStatus {
                configured: bit(3),
                running: false,
                error: None,
            },
            speaker: ServiceStatus {
                configured: bit(4),
                running: false,
                error: None,
            },
        }
    }

    #[test]
    fn derivation_is_monotone_over_all_inputs() {
        // Every pair (a, b) where a's bits are a subset of b's bits.
        for a in 0u8..32 {
            for b in 0u8..32 {
                if a & b != a {
                    continue;
                }
                let la = derive_level(&snapshot_from_bits(a));
                let lb = derive_level(&snapshot_from_bits(b));
                assert!(la <= lb, "a={:05b} ({}) b={:05b} ({})", a, la, b, lb);
            }
        }
    }

    #[test]
    fn labels_cover_every_level() {
        let levels = [
            SetupLevel::Level0,
            SetupLevel::Level1,
            SetupLevel::Level2,
            SetupLevel::Level3,
        ];
        for level in levels {
            assert!(!setup_label(level).label.is_empty());
        }
        assert_eq!(setup_label(SetupLevel::Level0).path, "/wizard/quickstart");
    }

    #[test]
    fn first_time_user_requires_default_mode_and_no_phases() {
        let mut state = WizardSessionState::default();
        assert!(is_first_time_user(&state));

        state.mode = WizardMode::Quickstart;
        assert!(!is_first_time_user(&state));

        state.mode = WizardMode::None;
        state.completed_phases.push("memory".to_string());
        assert!(!is_first_time_user(&state));

        state.completed_phases.clear();
        state.services = level_one_snapshot();
        assert!(!is_first_time_user(&state));
    }
}
