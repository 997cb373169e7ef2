// Wizard flows
//
// Static step tables for every wizard in the product, plus the navigation policy the
// sequencer leaves to its caller: forward jumps only to visited steps, a validation
// gate on Next, and "Back on the first step" meaning leave the wizard.

use log::debug;

use crate::wizard::steps::{StepDescriptor, StepSequencer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Quickstart,
    Memory,
    Chronicle,
    Speaker,
    Mobile,
    Local,
}

const QUICKSTART_STEPS: [StepDescriptor; 3] = [
    StepDescriptor::new("api_keys", "API Keys"),
    StepDescriptor::new("start_services", "Start Services"),
    StepDescriptor::new("complete", "Complete"),
];

const MEMORY_STEPS: [StepDescriptor; 3] = [
    StepDescriptor::new("configure", "Configure"),
    StepDescriptor::new("start", "Start"),
    StepDescriptor::new("verify", "Verify"),
];

const CHRONICLE_STEPS: [StepDescriptor; 3] = [
    StepDescriptor::new("api_keys", "API Keys"),
    StepDescriptor::new("start", "Start"),
    StepDescriptor::new("verify", "Verify"),
];

const SPEAKER_STEPS: [StepDescriptor; 3] = [
    StepDescriptor::new("token", "HuggingFace Token"),
    StepDescriptor::new("start", "Start"),
    StepDescriptor::new("complete", "Complete"),
];

const MOBILE_STEPS: [StepDescriptor; 4] = [
    StepDescriptor::new("tunnel_auth", "Tailscale Login"),
    StepDescriptor::new("provision_cert", "Provision Certificate"),
    StepDescriptor::new("connect_phone", "Connect Phone"),
    StepDescriptor::new("complete", "Complete"),
];

const LOCAL_STEPS: [StepDescriptor; 4] = [
    StepDescriptor::new("llm", "Local LLM"),
    StepDescriptor::new("transcription", "Transcription"),
    StepDescriptor::new("start", "Start Services"),
    StepDescriptor::new("complete", "Complete"),
];

impl FlowKind {
    pub const ALL: [FlowKind; 6] = [
        FlowKind::Quickstart,
        FlowKind::Memory,
        FlowKind::Chronicle,
        FlowKind::Speaker,
        FlowKind::Mobile,
        FlowKind::Local,
    ];

    pub fn steps(&self) -> &'static [StepDescriptor] {
        match self {
            FlowKind::Quickstart => &QUICKSTART_STEPS,
            FlowKind::Memory => &MEMORY_STEPS,
            FlowKind::Chronicle => &CHRONICLE_STEPS,
            FlowKind::Speaker => &SPEAKER_STEPS,
            FlowKind::Mobile => &MOBILE_STEPS,
            FlowKind::Local => &LOCAL_STEPS,
        }
    }

    /// Session phase id recorded when the flow finishes.
    pub fn phase_id(&self) -> &'static str {
        match self {
            FlowKind::Quickstart => "quickstart",
            FlowKind::Memory => "memory",
            FlowKind::Chronicle => "chronicle",
            FlowKind::Speaker => "speaker",
            FlowKind::Mobile => "mobile",
            FlowKind::Local => "local",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            FlowKind::Quickstart => "Quickstart",
            FlowKind::Memory => "Memory Store",
            FlowKind::Chronicle => "Chronicle",
            FlowKind::Speaker => "Speaker Recognition",
            FlowKind::Mobile => "Mobile App",
            FlowKind::Local => "Local Services",
        }
    }

    /// Resolve a route path such as `/wizard/mobile` (or a bare id) to a flow.
    pub fn from_path(path: &str) -> Option<FlowKind> {
        let id = path.trim_end_matches('/').rsplit('/').next()?;
        FlowKind::ALL.into_iter().find(|k| k.phase_id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retreat {
    /// Back on the first step: the caller leaves the wizard.
    Exit,
    Moved,
}

#[derive(Debug, Clone)]
pub struct WizardFlow {
    kind: FlowKind,
    sequencer: StepSequencer,
    highest_visited: usize,
    message: Option<String>,
}

impl WizardFlow {
    pub fn new(kind: FlowKind) -> Self {
        // Flow tables are non-empty constants.
        let sequencer = match StepSequencer::new(kind.steps()) {
            Some(seq) => seq,
            None => unreachable!("flow {:?} has no steps", kind),
        };
        Self {
            kind,
            sequencer,
            highest_visited: 0,
            message: None,
        }
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn sequencer(&self) -> &StepSequencer {
        &self.sequencer
    }

    pub fn current(&self) -> &StepDescriptor {
        self.sequencer.current()
    }

    pub fn progress(&self) -> u8 {
        self.sequencer.progress()
    }

    pub fn highest_visited(&self) -> usize {
        self.highest_visited
    }

    /// Inline validation or action error for the current step.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    pub fn is_visited(&self, step_id: &str) -> bool {
        self.sequencer
            .index_of(step_id)
            .map(|idx| idx <= self.highest_visited)
            .unwrap_or(false)
    }

    /// Run the step's validation result through the gate. An error blocks navigation
    /// and is kept as the inline message. Returns whether the flow moved.
    pub fn advance(&mut self, validation: Result<(), String>) -> bool {
        if let Err(msg) = validation {
            debug!(
                "[PHASE: wizard] [STEP: {}] Validation blocked Next: {}",
                self.current().id,
                msg
            );
            self.message = Some(msg);
            return false;
        }
        self.message = None;
        if self.sequencer.is_last() {
            return false;
        }
        self.sequencer.next();
        self.highest_visited = self.highest_visited.max(self.sequencer.current_index());
        true
    }

    pub fn retreat(&mut self) -> Retreat {
        self.message = None;
        if self.sequencer.is_first() {
            return Retreat::Exit;
        }
        self.sequencer.back();
        Retreat::Moved
    }

    /// Jump to a step the user has already reached. Unknown ids and unvisited steps
    /// are refused.
    pub fn jump_to(&mut self, step_id: &str) -> bool {
        match self.sequencer.index_of(step_id) {
            Some(idx) if idx <= self.highest_visited => {
                self.message = None;
                self.sequencer.go_to(step_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.sequencer.is_last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flow_has_unique_step_ids() {
        for kind in FlowKind::ALL {
            let steps = kind.steps();
            assert!(!steps.is_empty());
            for (i, a) in steps.iter().enumerate() {
                for b in &steps[i + 1..] {
                    assert_ne!(a.id, b.id, "duplicate step in {:?}", kind);
                }
            }
        }
    }

    #[test]
    fn validation_error_blocks_advance() {
        let mut flow = WizardFlow::new(FlowKind::Quickstart);
        assert!(!flow.advance(Err("OpenAI API key is required".to_string())));
        assert_eq!(flow.current().id, "api_keys");
        assert_eq!(flow.message(), Some("OpenAI API key is required"));

        // The error never locks the flow.
        assert!(flow.advance(Ok(())));
        assert_eq!(flow.current().id, "start_services");
        assert!(flow.message().is_none());
    }

    #[test]
    fn retreat_on_first_step_exits() {
        let mut flow = WizardFlow::new(FlowKind::Mobile);
        assert_eq!(flow.retreat(), Retreat::Exit);
        flow.advance(Ok(()));
        assert_eq!(flow.retreat(), Retreat::Moved);
        assert_eq!(flow.current().id, "tunnel_auth");
    }

    #[test]
    fn jump_forward_is_limited_to_visited_steps() {
        let mut flow = WizardFlow::new(FlowKind::Local);
        assert!(!flow.jump_to("start"));
        flow.advance(Ok(()));
        flow.advance(Ok(()));
        assert_eq!(flow.highest_visited(), 2);

        assert!(flow.jump_to("llm"));
        assert_eq!(flow.current().id, "llm");
        assert!(flow.jump_to("start"));
        assert_eq!(flow.current().id, "start");
        assert!(!flow.jump_to("complete"));
        assert!(!flow.jump_to("missing"));
    }

    #[test]
    fn advance_on_last_step_stays_put() {
        let mut flow = WizardFlow::new(FlowKind::Speaker);
        while flow.advance(Ok(())) {}
        assert!(flow.is_complete());
        assert_eq!(flow.progress(), 100);
        assert!(!flow.advance(Ok(())));
    }

    #[test]
    fn flows_resolve_from_route_paths() {
        assert_eq!(FlowKind::from_path("/wizard/mobile"), Some(FlowKind::Mobile));
        assert_eq!(FlowKind::from_path("speaker"), Some(FlowKind::Speaker));
        assert_eq!(FlowKind::from_path("/"), None);
    }
}
