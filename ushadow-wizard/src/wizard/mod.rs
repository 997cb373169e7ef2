// Wizard core: step navigation, setup level, persisted session.

pub mod confirm;
pub mod flows;
pub mod level;
pub mod session;
pub mod steps;
pub mod storage;

pub use level::{derive_level, setup_label, SetupLabel, SetupLevel};
pub use session::{ServiceUpdate, WizardMode, WizardSessionState, WizardSessionStore};
