// Wizard step sequencer
//
// A dumb pointer over a fixed, ordered list of steps. It never errors: moving past either
// end is a no-op and unknown step ids are ignored. Whether a user may jump forward, and what
// "back on the first step" means, is decided by the caller (see `flows::WizardFlow`).

/// Immutable step definition. Ids are unique within one wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDescriptor {
    pub id: &'static str,
    pub label: &'static str,
}

impl StepDescriptor {
    pub const fn new(id: &'static str, label: &'static str) -> Self {
        Self { id, label }
    }
}

#[derive(Debug, Clone)]
pub struct StepSequencer {
    steps: Vec<StepDescriptor>,
    current_index: usize,
}

impl StepSequencer {
    /// Returns `None` for an empty step list; a sequencer always points at a valid step.
    pub fn new(steps: &[StepDescriptor]) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }
        Some(Self {
            steps: steps.to_vec(),
            current_index: 0,
        })
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &StepDescriptor {
        &self.steps[self.current_index]
    }

    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn is_first(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 == self.steps.len()
    }

    /// Percentage through the wizard, rounded. A single-step wizard is always 100.
    pub fn progress(&self) -> u8 {
        progress_for(self.current_index, self.steps.len())
    }

    pub fn next(&mut self) {
        if !self.is_last() {
            self.current_index += 1;
        }
    }

    pub fn back(&mut self) {
        if !self.is_first() {
            self.current_index -= 1;
        }
    }

    pub fn go_to(&mut self, step_id: &str) {
        if let Some(idx) = self.index_of(step_id) {
            self.current_index = idx;
        }
    }
}

/// `round(100 * index / (len - 1))` clamped to `[0, 100]`.
pub fn progress_for(index: usize, len: usize) -> u8 {
    if len <= 1 {
        return 100;
    }
    let pct = (100.0 * index as f64 / (len - 1) as f64).round();
    pct.clamp(0.0, 100.0) as u8
}
