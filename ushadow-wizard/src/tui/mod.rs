//! Headless terminal front end for the uShadow setup wizards.
//!
//! Layout:
//! - Centered window titled "uShadow Setup"
//! - Left panel with the setup level and the tracked service status
//! - Main content panel: the wizard launcher (Home) or the active wizard step
//! - Bottom button row: [ Back ] [ Next ] [ Cancel ]
//!
//! Key handling never touches the network. It queues `Command`s that `run_loop` hands to
//! the tokio runtime; results come back as `UiMsg`s drained once per loop iteration.
//!
//! Note: logging is file-only in TUI mode (stdout logging is disabled) so the screen is not corrupted.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{info, warn};
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Terminal;
use serde_json::json;
use std::io::{self, Stdout};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, ApiError};
use crate::config::WizardConfig;
use crate::models::requests::ApiKeys;
use crate::models::responses::{CertificateStatus, DetectedKeys, MobileConnection, TunnelStatus};
use crate::models::services::{ServiceKey, ServiceStatusPatch};
use crate::reconciler::jobs::JobStatus;
use crate::reconciler::{Reconciler, ReconcilerSettings, ReconcilerState, ReconcilerUpdate};
use crate::wizard::confirm::{confirm_running, ConfirmOutcome};
use crate::wizard::flows::{FlowKind, Retreat, WizardFlow};
use crate::wizard::storage::{FileSessionStorage, MemorySessionStorage, SessionPersistence};
use crate::wizard::{WizardMode, WizardSessionStore};
use crate::utils::validation::{
    validate_any_required, validate_hf_token, validate_required,
};

type SessionStore = WizardSessionStore<Box<dyn SessionPersistence>>;

const DEFAULT_LLM_MODEL: &str = "llama3.1:8b";
const DEFAULT_WHISPER_MODEL: &str = "base";

// Backend service names started by each wizard
const QUICKSTART_SERVICES: [&str; 2] = ["mem0", "chronicle-backend"];
const MEMORY_SERVICES: [&str; 1] = ["mem0"];
const CHRONICLE_SERVICES: [&str; 1] = ["chronicle-backend"];
const SPEAKER_SERVICES: [&str; 1] = ["speaker-recognition"];
const LOCAL_SERVICES: [&str; 3] = ["ollama", "mem0", "chronicle-backend"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Home,
    Wizard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Next,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusTarget {
    Field(usize),
    Button(ButtonFocus),
}

#[derive(Debug, Clone)]
enum Modal {
    ConfirmQuit,
    ConfirmLeave,
    ConfirmReset,
    Message { title: String, body: String },
    AuthRequired { token: TextInput, error: Option<String> },
}

/// What pressing Next on a step does before the flow may move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepAction {
    None,
    SaveApiKeys,
    SaveHfToken,
    SaveLocalLlm,
    SaveLocalTranscription,
    StartServices(&'static [&'static str]),
    VerifyServices(&'static [&'static str]),
    TunnelAuth,
    ProvisionCert,
    MobileConnect,
}

fn step_action(kind: FlowKind, step_id: &str) -> StepAction {
    match (kind, step_id) {
        (FlowKind::Quickstart, "api_keys") | (FlowKind::Chronicle, "api_keys") => {
            StepAction::SaveApiKeys
        }
        (FlowKind::Quickstart, "start_services") => StepAction::StartServices(&QUICKSTART_SERVICES),
        (FlowKind::Memory, "start") => StepAction::StartServices(&MEMORY_SERVICES),
        (FlowKind::Memory, "verify") => StepAction::VerifyServices(&MEMORY_SERVICES),
        (FlowKind::Chronicle, "start") => StepAction::StartServices(&CHRONICLE_SERVICES),
        (FlowKind::Chronicle, "verify") => StepAction::VerifyServices(&CHRONICLE_SERVICES),
        (FlowKind::Speaker, "token") => StepAction::SaveHfToken,
        (FlowKind::Speaker, "start") => StepAction::StartServices(&SPEAKER_SERVICES),
        (FlowKind::Mobile, "tunnel_auth") => StepAction::TunnelAuth,
        (FlowKind::Mobile, "provision_cert") => StepAction::ProvisionCert,
        (FlowKind::Mobile, "connect_phone") => StepAction::MobileConnect,
        (FlowKind::Local, "llm") => StepAction::SaveLocalLlm,
        (FlowKind::Local, "transcription") => StepAction::SaveLocalTranscription,
        (FlowKind::Local, "start") => StepAction::StartServices(&LOCAL_SERVICES),
        _ => StepAction::None,
    }
}

fn field_labels(action: StepAction) -> &'static [&'static str] {
    match action {
        StepAction::SaveApiKeys => &[
            "OpenAI API key",
            "Anthropic API key",
            "Deepgram API key",
            "Mistral API key",
        ],
        StepAction::SaveHfToken => &["HuggingFace token"],
        StepAction::SaveLocalLlm => &["Ollama model"],
        StepAction::SaveLocalTranscription => &["Whisper model"],
        StepAction::ProvisionCert => &["Tailscale hostname"],
        _ => &[],
    }
}

/// Values captured from the step's fields when Next is pressed.
#[derive(Debug, Clone, PartialEq)]
enum StepInput {
    None,
    ApiKeys(ApiKeys),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    DetectKeys,
    RunStep { action: StepAction, input: StepInput },
    CompleteWizard,
    Login(String),
    RefreshServices,
}

#[derive(Debug, Clone)]
enum ActionOutput {
    Saved,
    Services(Vec<(&'static str, ConfirmOutcome)>),
    Tunnel {
        status: TunnelStatus,
        auth_url: Option<String>,
    },
    Certificate(CertificateStatus),
    Mobile(MobileConnection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ActionError {
    Unauthorized,
    Failed(String),
}

impl From<ApiError> for ActionError {
    fn from(e: ApiError) -> Self {
        if e.is_unauthorized() {
            ActionError::Unauthorized
        } else {
            ActionError::Failed(e.user_message())
        }
    }
}

#[derive(Debug, Clone)]
enum UiMsg {
    KeysDetected(DetectedKeys),
    StepFinished {
        action: StepAction,
        result: std::result::Result<ActionOutput, ActionError>,
    },
    Dashboard(DashboardSummary),
    Reconciler(ReconcilerUpdate),
}

/// Queue dashboard numbers shown on the Home page.
#[derive(Debug, Clone, Default, PartialEq)]
struct DashboardSummary {
    queued: usize,
    processing: usize,
    completed: usize,
    conversations: usize,
    failed_conversations: usize,
    active_sessions: usize,
    session_jobs: usize,
    fetched_at: Option<String>,
    events_connected: bool,
    last_error: Option<String>,
}

impl DashboardSummary {
    fn from_state(s: &ReconcilerState) -> Self {
        let mut summary = DashboardSummary {
            events_connected: s.events_connected,
            last_error: s.last_error.clone(),
            ..Default::default()
        };
        if let Some(snapshot) = s.snapshot.as_ref() {
            let jobs = &snapshot.dashboard.jobs;
            summary.queued = jobs.queued.len();
            summary.processing = jobs.processing.len();
            summary.completed = jobs.completed.len();
            summary.conversations = snapshot.grouping.conversations.len();
            summary.failed_conversations = snapshot
                .grouping
                .conversations
                .iter()
                .filter(|g| g.disposition() == JobStatus::Failed)
                .count();
            summary.active_sessions = snapshot.dashboard.streaming_status.active_sessions.len();
            summary.session_jobs = snapshot
                .grouping
                .session_timelines
                .iter()
                .map(|t| t.jobs.len())
                .sum();
            summary.fetched_at = Some(
                snapshot
                    .fetched_at
                    .with_timezone(&chrono::Local)
                    .format("%H:%M:%S")
                    .to_string(),
            );
        }
        summary
    }
}

#[derive(Debug, Clone)]
struct TextInput {
    value: String,
    /// Cursor position in characters, not bytes.
    cursor: usize,
    masked: bool,
}

impl TextInput {
    fn new(value: impl Into<String>, masked: bool) -> Self {
        let value = value.into();
        Self {
            cursor: value.chars().count(),
            value,
            masked,
        }
    }

    fn char_len(&self) -> usize {
        self.value.chars().count()
    }

    fn byte_offset(&self, char_idx: usize) -> usize {
        self.value
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len())
    }

    fn display(&self) -> String {
        if self.masked {
            "*".repeat(self.char_len())
        } else {
            self.value.clone()
        }
    }

    fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.char_len();
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char(c) => {
                let at = self.byte_offset(self.cursor);
                self.value.insert(at, c);
                self.cursor += 1;
                true
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    let at = self.byte_offset(self.cursor - 1);
                    self.value.remove(at);
                    self.cursor -= 1;
                }
                true
            }
            KeyCode::Delete => {
                if self.cursor < self.char_len() {
                    let at = self.byte_offset(self.cursor);
                    self.value.remove(at);
                }
                true
            }
            KeyCode::Left => {
                self.cursor = self.cursor.saturating_sub(1);
                true
            }
            KeyCode::Right => {
                self.cursor = (self.cursor + 1).min(self.char_len());
                true
            }
            KeyCode::Home => {
                self.cursor = 0;
                true
            }
            KeyCode::End => {
                self.cursor = self.char_len();
                true
            }
            _ => false,
        }
    }
}

struct WizardState {
    page: Page,
    flow: Option<WizardFlow>,
    modal: Option<Modal>,
    focus: FocusTarget,
    quit: bool,
    session: SessionStore,
    /// Commands produced by key handling, dispatched by the run loop.
    pending: Vec<Command>,
    /// Set while a step action runs; Next and Back are disabled meanwhile.
    busy: Option<String>,
    notice: Option<String>,
    home_index: usize,

    // Step inputs
    openai_key: TextInput,
    anthropic_key: TextInput,
    deepgram_key: TextInput,
    mistral_key: TextInput,
    hf_token: TextInput,
    llm_model: TextInput,
    whisper_model: TextInput,
    cert_hostname: TextInput,

    // Backend facts gathered along the way
    detected: Option<DetectedKeys>,
    tunnel: Option<TunnelStatus>,
    auth_url: Option<String>,
    certificate: Option<CertificateStatus>,
    mobile: Option<MobileConnection>,

    dashboard: DashboardSummary,
    auth_required: bool,
    last_event: Option<String>,
}

impl WizardState {
    fn new(session: SessionStore) -> Self {
        let mut state = Self {
            page: Page::Home,
            flow: None,
            modal: None,
            focus: FocusTarget::Field(0),
            quit: false,
            session,
            pending: Vec::new(),
            busy: None,
            notice: None,
            home_index: 0,

            openai_key: TextInput::new("", true),
            anthropic_key: TextInput::new("", true),
            deepgram_key: TextInput::new("", true),
            mistral_key: TextInput::new("", true),
            hf_token: TextInput::new("", true),
            llm_model: TextInput::new(DEFAULT_LLM_MODEL, false),
            whisper_model: TextInput::new(DEFAULT_WHISPER_MODEL, false),
            cert_hostname: TextInput::new("", false),

            detected: None,
            tunnel: None,
            auth_url: None,
            certificate: None,
            mobile: None,

            dashboard: DashboardSummary::default(),
            auth_required: false,
            last_event: None,
        };
        state.home_index = suggested_flow_index(&state);
        state
    }
}

fn suggested_flow_index(state: &WizardState) -> usize {
    FlowKind::from_path(state.session.setup_label().path)
        .and_then(|kind| FlowKind::ALL.iter().position(|k| *k == kind))
        .unwrap_or(0)
}

fn current_action(state: &WizardState) -> StepAction {
    state
        .flow
        .as_ref()
        .map(|flow| step_action(flow.kind(), flow.current().id))
        .unwrap_or(StepAction::None)
}

fn page_field_count(state: &WizardState) -> usize {
    match state.page {
        Page::Home => 1,
        Page::Wizard => field_labels(current_action(state)).len(),
    }
}

fn field_input(state: &WizardState, action: StepAction, idx: usize) -> Option<&TextInput> {
    match (action, idx) {
        (StepAction::SaveApiKeys, 0) => Some(&state.openai_key),
        (StepAction::SaveApiKeys, 1) => Some(&state.anthropic_key),
        (StepAction::SaveApiKeys, 2) => Some(&state.deepgram_key),
        (StepAction::SaveApiKeys, 3) => Some(&state.mistral_key),
        (StepAction::SaveHfToken, 0) => Some(&state.hf_token),
        (StepAction::SaveLocalLlm, 0) => Some(&state.llm_model),
        (StepAction::SaveLocalTranscription, 0) => Some(&state.whisper_model),
        (StepAction::ProvisionCert, 0) => Some(&state.cert_hostname),
        _ => None,
    }
}

fn focused_text_input_mut(state: &mut WizardState) -> Option<&mut TextInput> {
    if state.page != Page::Wizard {
        return None;
    }
    let FocusTarget::Field(idx) = state.focus else {
        return None;
    };
    match (current_action(state), idx) {
        (StepAction::SaveApiKeys, 0) => Some(&mut state.openai_key),
        (StepAction::SaveApiKeys, 1) => Some(&mut state.anthropic_key),
        (StepAction::SaveApiKeys, 2) => Some(&mut state.deepgram_key),
        (StepAction::SaveApiKeys, 3) => Some(&mut state.mistral_key),
        (StepAction::SaveHfToken, 0) => Some(&mut state.hf_token),
        (StepAction::SaveLocalLlm, 0) => Some(&mut state.llm_model),
        (StepAction::SaveLocalTranscription, 0) => Some(&mut state.whisper_model),
        (StepAction::ProvisionCert, 0) => Some(&mut state.cert_hostname),
        _ => None,
    }
}

fn page_title(state: &WizardState) -> String {
    match (state.page, state.flow.as_ref()) {
        (Page::Wizard, Some(flow)) => format!("{}: {}", flow.kind().title(), flow.current().label),
        _ => "Home".to_string(),
    }
}

fn back_label(page: Page) -> &'static str {
    match page {
        Page::Home => "Reset",
        Page::Wizard => "Back",
    }
}

fn next_label(state: &WizardState) -> &'static str {
    match (state.page, state.flow.as_ref()) {
        (Page::Home, _) => "Open",
        (Page::Wizard, Some(flow)) if flow.is_complete() => "Finish",
        _ => "Next",
    }
}

fn cancel_label(page: Page) -> &'static str {
    match page {
        Page::Home => "Quit",
        Page::Wizard => "Cancel",
    }
}

fn can_go_back(state: &WizardState) -> bool {
    state.busy.is_none()
}

fn can_go_next(state: &WizardState) -> bool {
    state.busy.is_none()
}

fn focused_button(state: &WizardState) -> ButtonFocus {
    match state.focus {
        FocusTarget::Button(b) => b,
        _ => ButtonFocus::Next,
    }
}

fn set_focused_button(state: &mut WizardState, b: ButtonFocus) {
    state.focus = FocusTarget::Button(b);
}

fn reset_focus(state: &mut WizardState) {
    if page_field_count(state) > 0 {
        state.focus = FocusTarget::Field(0);
    } else {
        set_focused_button(state, ButtonFocus::Next);
    }
}

// Tab order: fields first, then Back / Next / Cancel.
fn cycle_focus(state: &mut WizardState) {
    let fields = page_field_count(state);
    state.focus = match state.focus {
        FocusTarget::Field(i) if i + 1 < fields => FocusTarget::Field(i + 1),
        FocusTarget::Field(_) => FocusTarget::Button(ButtonFocus::Back),
        FocusTarget::Button(ButtonFocus::Back) => FocusTarget::Button(ButtonFocus::Next),
        FocusTarget::Button(ButtonFocus::Next) => FocusTarget::Button(ButtonFocus::Cancel),
        FocusTarget::Button(ButtonFocus::Cancel) if fields > 0 => FocusTarget::Field(0),
        FocusTarget::Button(ButtonFocus::Cancel) => FocusTarget::Button(ButtonFocus::Back),
    };
}

fn open_wizard(state: &mut WizardState, kind: FlowKind) {
    info!(
        "[PHASE: wizard] [STEP: open] Opening {} wizard",
        kind.phase_id()
    );
    state.flow = Some(WizardFlow::new(kind));
    state.page = Page::Wizard;
    state.notice = None;
    state.session.set_current_phase(Some(kind.phase_id()));
    if step_action(kind, kind.steps()[0].id) == StepAction::SaveApiKeys {
        state.pending.push(Command::DetectKeys);
    }
    reset_focus(state);
}

fn leave_wizard(state: &mut WizardState) {
    if let Some(flow) = state.flow.take() {
        info!(
            "[PHASE: wizard] [STEP: leave] Left {} wizard at step {}",
            flow.kind().phase_id(),
            flow.current().id
        );
    }
    state.session.set_current_phase(None);
    state.page = Page::Home;
    state.busy = None;
    state.home_index = suggested_flow_index(state);
    reset_focus(state);
}

fn open_auth_modal(state: &mut WizardState) {
    state.auth_required = true;
    if !matches!(state.modal, Some(Modal::AuthRequired { .. })) {
        state.modal = Some(Modal::AuthRequired {
            token: TextInput::new("", true),
            error: None,
        });
    }
}

fn step_input(state: &WizardState, action: StepAction) -> StepInput {
    match action {
        StepAction::SaveApiKeys => StepInput::ApiKeys(
            ApiKeys {
                openai_api_key: Some(state.openai_key.value.trim().to_string()),
                anthropic_api_key: Some(state.anthropic_key.value.trim().to_string()),
                deepgram_api_key: Some(state.deepgram_key.value.trim().to_string()),
                mistral_api_key: Some(state.mistral_key.value.trim().to_string()),
            }
            .into_update(),
        ),
        StepAction::SaveHfToken => StepInput::Text(state.hf_token.value.trim().to_string()),
        StepAction::SaveLocalLlm => StepInput::Text(state.llm_model.value.trim().to_string()),
        StepAction::SaveLocalTranscription => {
            StepInput::Text(state.whisper_model.value.trim().to_string())
        }
        StepAction::ProvisionCert => StepInput::Text(state.cert_hostname.value.trim().to_string()),
        _ => StepInput::None,
    }
}

/// Field checks run before any request. Keys the backend already holds count as filled.
fn validate_step(state: &WizardState, action: StepAction) -> std::result::Result<(), String> {
    match action {
        StepAction::SaveApiKeys => {
            let detected = state.detected.unwrap_or_default();
            if !detected.has_llm() {
                validate_any_required(
                    "An LLM API key (OpenAI or Anthropic)",
                    &[state.openai_key.value.as_str(), state.anthropic_key.value.as_str()],
                )?;
            }
            if !detected.has_transcription() {
                validate_any_required(
                    "A transcription API key (Deepgram or Mistral)",
                    &[
                        state.deepgram_key.value.as_str(),
                        state.mistral_key.value.as_str(),
                    ],
                )?;
            }
            Ok(())
        }
        StepAction::SaveHfToken => validate_hf_token(&state.hf_token.value),
        StepAction::SaveLocalLlm => validate_required("Ollama model", &state.llm_model.value),
        StepAction::SaveLocalTranscription => {
            validate_required("Whisper model", &state.whisper_model.value)
        }
        StepAction::ProvisionCert => {
            validate_required("Tailscale hostname", &state.cert_hostname.value)
        }
        _ => Ok(()),
    }
}

fn press_next(state: &mut WizardState) {
    if !can_go_next(state) {
        return;
    }
    if state.page == Page::Home {
        if let Some(kind) = FlowKind::ALL.get(state.home_index).copied() {
            open_wizard(state, kind);
        }
        return;
    }

    let action = current_action(state);
    if let Err(msg) = validate_step(state, action) {
        if let Some(flow) = state.flow.as_mut() {
            flow.advance(Err(msg));
        }
        return;
    }

    let input = step_input(state, action);
    let nothing_to_save = matches!(&input, StepInput::ApiKeys(keys) if keys.is_empty());
    if action == StepAction::None || nothing_to_save {
        if action == StepAction::SaveApiKeys {
            state.session.set_service_flag(ServiceKey::ApiKeys, true);
        }
        step_succeeded(state, Ok(()));
        return;
    }

    state.notice = None;
    state.busy = Some(busy_label(action).to_string());
    state.pending.push(Command::RunStep { action, input });
}

fn busy_label(action: StepAction) -> &'static str {
    match action {
        StepAction::SaveApiKeys | StepAction::SaveHfToken => "Saving keys...",
        StepAction::SaveLocalLlm | StepAction::SaveLocalTranscription => "Saving settings...",
        StepAction::StartServices(_) => "Starting services, waiting for them to report running...",
        StepAction::VerifyServices(_) => "Checking service status...",
        StepAction::TunnelAuth => "Starting Tailscale...",
        StepAction::ProvisionCert => "Provisioning certificate...",
        StepAction::MobileConnect => "Fetching connection details...",
        StepAction::None => "Working...",
    }
}

fn press_back(state: &mut WizardState) {
    if !can_go_back(state) {
        return;
    }
    match state.page {
        Page::Home => {
            state.modal = Some(Modal::ConfirmReset);
            set_focused_button(state, ButtonFocus::Next);
        }
        Page::Wizard => {
            let retreat = state.flow.as_mut().map(|flow| flow.retreat());
            match retreat {
                Some(Retreat::Moved) => {
                    state.notice = None;
                    reset_focus(state);
                }
                _ => leave_wizard(state),
            }
        }
    }
}

fn press_cancel(state: &mut WizardState) {
    state.modal = Some(match state.page {
        Page::Home => Modal::ConfirmQuit,
        Page::Wizard => Modal::ConfirmLeave,
    });
    set_focused_button(state, ButtonFocus::Next);
}

/// Gate result for the current step after its action finished.
fn step_succeeded(state: &mut WizardState, gate: std::result::Result<(), String>) {
    let Some(flow) = state.flow.as_mut() else {
        return;
    };
    if gate.is_ok() && flow.is_complete() {
        finish_flow(state);
        return;
    }
    if flow.advance(gate) {
        reset_focus(state);
    }
}

fn finish_flow(state: &mut WizardState) {
    let Some(flow) = state.flow.take() else {
        return;
    };
    let kind = flow.kind();
    match kind {
        FlowKind::Quickstart => {
            state.session.set_mode(WizardMode::Quickstart);
            state.pending.push(Command::CompleteWizard);
        }
        FlowKind::Local => {
            state.session.set_mode(WizardMode::Local);
            state.pending.push(Command::CompleteWizard);
        }
        FlowKind::Memory => state
            .session
            .merge_service_status(ServiceKey::Memory, ServiceStatusPatch::configured(true)),
        FlowKind::Chronicle => state
            .session
            .merge_service_status(ServiceKey::Chronicle, ServiceStatusPatch::configured(true)),
        FlowKind::Speaker => state
            .session
            .merge_service_status(ServiceKey::Speaker, ServiceStatusPatch::configured(true)),
        FlowKind::Mobile => state.session.set_service_flag(ServiceKey::Tunnel, true),
    }
    if state.session.state().mode == WizardMode::None {
        state.session.set_mode(WizardMode::Custom);
    }
    state.session.mark_phase_complete(kind.phase_id());
    state.session.set_current_phase(None);
    info!(
        "[PHASE: wizard] [STEP: finish] {} wizard finished (level={})",
        kind.phase_id(),
        state.session.setup_level()
    );

    let label = state.session.setup_label();
    state.modal = Some(Modal::Message {
        title: format!("{} Ready", kind.title()),
        body: format!(
            "Setup level is now {} of 3.\n\nSuggested next: {}\n{}",
            state.session.setup_level(),
            label.label,
            label.description
        ),
    });
    state.page = Page::Home;
    state.busy = None;
    state.notice = Some(format!("{} setup complete.", kind.title()));
    state.home_index = suggested_flow_index(state);
    state.pending.push(Command::RefreshServices);
    reset_focus(state);
}

fn apply_step_output(
    state: &mut WizardState,
    action: StepAction,
    output: ActionOutput,
) -> std::result::Result<(), String> {
    match output {
        ActionOutput::Saved => {
            if action == StepAction::SaveApiKeys {
                state.session.set_service_flag(ServiceKey::ApiKeys, true);
                for input in [
                    &mut state.openai_key,
                    &mut state.anthropic_key,
                    &mut state.deepgram_key,
                    &mut state.mistral_key,
                ] {
                    input.set("");
                }
            }
            Ok(())
        }
        ActionOutput::Services(outcomes) => {
            let mut failures = Vec::new();
            let mut assumed = Vec::new();
            for (name, outcome) in outcomes {
                let patch = match &outcome {
                    ConfirmOutcome::Confirmed => ServiceStatusPatch {
                        configured: Some(true),
                        running: Some(true),
                        error: Some(None),
                    },
                    ConfirmOutcome::Assumed => {
                        assumed.push(name);
                        ServiceStatusPatch {
                            configured: Some(true),
                            error: Some(None),
                            ..Default::default()
                        }
                    }
                    ConfirmOutcome::Failed(msg) => {
                        failures.push(format!("{}: {}", name, msg));
                        ServiceStatusPatch::error(msg.clone())
                    }
                };
                if let Some(key) = ServiceKey::from_container_name(name) {
                    state.session.merge_service_status(key, patch);
                }
            }
            if !failures.is_empty() {
                return Err(failures.join("; "));
            }
            if !assumed.is_empty() {
                state.notice = Some(format!(
                    "{} did not report running yet. The dashboard will update once it does.",
                    assumed.join(", ")
                ));
            }
            Ok(())
        }
        ActionOutput::Tunnel { status, auth_url } => {
            if let Some(host) = status.hostname.as_deref().filter(|h| !h.is_empty()) {
                if state.cert_hostname.value.trim().is_empty() {
                    state.cert_hostname.set(host);
                }
            }
            let authenticated = status.authenticated;
            state.tunnel = Some(status);
            state.auth_url = auth_url.clone();
            if authenticated {
                state.session.merge_service_status(
                    ServiceKey::Tunnel,
                    ServiceStatusPatch::running(true),
                );
                Ok(())
            } else {
                Err(match auth_url {
                    Some(url) => format!(
                        "Log in to Tailscale at {} then press Next again.",
                        url
                    ),
                    None => "Tailscale is not logged in yet. Press Next to check again.".to_string(),
                })
            }
        }
        ActionOutput::Certificate(cert) => {
            let provisioned = cert.provisioned;
            let error = cert.error.clone();
            state.certificate = Some(cert);
            if provisioned {
                Ok(())
            } else {
                Err(error.unwrap_or_else(|| "Certificate was not provisioned".to_string()))
            }
        }
        ActionOutput::Mobile(connection) => {
            state.mobile = Some(connection);
            Ok(())
        }
    }
}

fn drain_messages(state: &mut WizardState, rx: &mpsc::Receiver<UiMsg>) {
    while let Ok(msg) = rx.try_recv() {
        apply_message(state, msg);
    }
}

fn apply_message(state: &mut WizardState, msg: UiMsg) {
    match msg {
        UiMsg::KeysDetected(keys) => {
            if keys.is_complete() {
                state.session.set_service_flag(ServiceKey::ApiKeys, true);
            }
            state.detected = Some(keys);
        }
        UiMsg::StepFinished { action, result } => {
            state.busy = None;
            // The user may have left the wizard or step while the action ran.
            if state.flow.is_none() || current_action(state) != action {
                return;
            }
            match result {
                Ok(output) => {
                    let gate = apply_step_output(state, action, output);
                    step_succeeded(state, gate);
                }
                Err(ActionError::Unauthorized) => {
                    if let Some(flow) = state.flow.as_mut() {
                        flow.set_message("Your session expired. Log in again and press Next.");
                    }
                    open_auth_modal(state);
                }
                Err(ActionError::Failed(message)) => {
                    if let Some(flow) = state.flow.as_mut() {
                        flow.advance(Err(message));
                    }
                }
            }
        }
        UiMsg::Dashboard(summary) => state.dashboard = summary,
        UiMsg::Reconciler(update) => match update {
            ReconcilerUpdate::Services(reports) => {
                for report in reports {
                    state
                        .session
                        .merge_service_status(report.key, report.patch());
                }
            }
            ReconcilerUpdate::Container(ev) => {
                state.last_event = Some(format!("{} {}", ev.container_name, ev.action));
            }
            ReconcilerUpdate::AuthRequired => open_auth_modal(state),
            ReconcilerUpdate::Error(message) => state.dashboard.last_error = Some(message),
            ReconcilerUpdate::DashboardRefreshed => {}
        },
    }
}

fn handle_key(state: &mut WizardState, code: KeyCode) {
    if let Some(modal) = state.modal.take() {
        state.modal = handle_modal_key(state, modal, code);
        return;
    }

    match code {
        KeyCode::Tab => cycle_focus(state),
        KeyCode::Esc => press_cancel(state),
        KeyCode::Up if state.page == Page::Home => {
            state.home_index = state.home_index.saturating_sub(1);
        }
        KeyCode::Down if state.page == Page::Home => {
            state.home_index = (state.home_index + 1).min(FlowKind::ALL.len() - 1);
        }
        KeyCode::Enter => match state.focus {
            FocusTarget::Field(_) => press_next(state),
            FocusTarget::Button(ButtonFocus::Back) => press_back(state),
            FocusTarget::Button(ButtonFocus::Next) => press_next(state),
            FocusTarget::Button(ButtonFocus::Cancel) => press_cancel(state),
        },
        KeyCode::Left | KeyCode::Right if matches!(state.focus, FocusTarget::Button(_)) => {
            let order = [ButtonFocus::Back, ButtonFocus::Next, ButtonFocus::Cancel];
            let idx = order
                .iter()
                .position(|b| *b == focused_button(state))
                .unwrap_or(1);
            let idx = if code == KeyCode::Left {
                idx.saturating_sub(1)
            } else {
                (idx + 1).min(order.len() - 1)
            };
            set_focused_button(state, order[idx]);
        }
        KeyCode::Char(c) if state.page == Page::Home => match c {
            'r' | 'R' => {
                state.notice = Some("Refreshing service status...".to_string());
                state.pending.push(Command::RefreshServices);
            }
            'q' | 'Q' => press_cancel(state),
            _ => {}
        },
        // Digits jump to an already visited step while a button has focus.
        KeyCode::Char(c) if matches!(state.focus, FocusTarget::Button(_)) => {
            if let (Some(digit), true) = (c.to_digit(10), state.busy.is_none()) {
                let target = state.flow.as_ref().and_then(|flow| {
                    flow.sequencer()
                        .steps()
                        .get((digit as usize).saturating_sub(1))
                        .map(|s| s.id)
                });
                let jumped = match (target, state.flow.as_mut()) {
                    (Some(id), Some(flow)) => flow.jump_to(id),
                    _ => false,
                };
                if jumped {
                    reset_focus(state);
                }
            }
        }
        _ => {
            if let Some(input) = focused_text_input_mut(state) {
                input.handle_key(code);
            }
        }
    }
}

/// Returns the modal to keep open, if any.
fn handle_modal_key(state: &mut WizardState, modal: Modal, code: KeyCode) -> Option<Modal> {
    match modal {
        Modal::ConfirmQuit | Modal::ConfirmLeave | Modal::ConfirmReset => match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                let next = match focused_button(state) {
                    ButtonFocus::Cancel => ButtonFocus::Next,
                    _ => ButtonFocus::Cancel,
                };
                set_focused_button(state, next);
                Some(modal)
            }
            KeyCode::Enter => {
                let confirmed = focused_button(state) == ButtonFocus::Cancel;
                reset_focus(state);
                if confirmed {
                    match modal {
                        Modal::ConfirmQuit => state.quit = true,
                        Modal::ConfirmLeave => leave_wizard(state),
                        _ => {
                            state.session.reset_wizard();
                            state.home_index = suggested_flow_index(state);
                            state.notice = Some("Wizard progress has been reset.".to_string());
                        }
                    }
                }
                None
            }
            KeyCode::Esc => {
                reset_focus(state);
                None
            }
            _ => Some(modal),
        },
        Modal::Message { .. } => match code {
            KeyCode::Enter | KeyCode::Esc => None,
            _ => Some(modal),
        },
        Modal::AuthRequired { mut token, error } => match code {
            KeyCode::Enter => {
                if token.value.trim().is_empty() {
                    return Some(Modal::AuthRequired {
                        token,
                        error: Some("Token is required".to_string()),
                    });
                }
                state.auth_required = false;
                state.pending.push(Command::Login(token.value.trim().to_string()));
                state.notice = Some("Token updated. Status polling resumed.".to_string());
                None
            }
            KeyCode::Esc => {
                state.modal = None;
                state.quit = true;
                None
            }
            other => {
                token.handle_key(other);
                Some(Modal::AuthRequired { token, error })
            }
        },
    }
}

// =========================
// Runtime side
// =========================

#[derive(Debug, Clone, Copy)]
struct ConfirmSettings {
    attempts: u32,
    interval: Duration,
}

/// Owns the async half of the TUI: backend client, reconciler and the tokio runtime
/// every command runs on.
struct Backend {
    runtime: tokio::runtime::Runtime,
    client: ApiClient,
    reconciler: Reconciler<ApiClient>,
    /// Reconciler updates, already converted for the UI thread.
    updates: mpsc::Receiver<UiMsg>,
    cancel: CancellationToken,
    confirm: ConfirmSettings,
}

impl Backend {
    fn new(cfg: &WizardConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        let client = ApiClient::new(cfg).context("Failed to create backend client")?;
        let (reconciler, updates) = Reconciler::new(
            client.clone(),
            ReconcilerSettings {
                poll_interval: cfg.poll_interval(),
                reconnect_delay: cfg.reconnect_delay(),
            },
        );
        let forwarded = spawn_forwarder(&runtime, reconciler.clone(), updates);
        Ok(Self {
            runtime,
            client,
            reconciler,
            updates: forwarded,
            cancel: CancellationToken::new(),
            confirm: ConfirmSettings {
                attempts: cfg.confirm_attempts,
                interval: cfg.confirm_interval(),
            },
        })
    }

    fn start(&self, tx: &mpsc::Sender<UiMsg>) {
        let poll = self.reconciler.clone();
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move { poll.run(cancel).await });

        let events = self.reconciler.clone();
        let cancel = self.cancel.clone();
        self.runtime
            .spawn(async move { events.run_events(cancel).await });

        self.dispatch(Command::RefreshServices, tx);
    }

    fn dispatch(&self, cmd: Command, tx: &mpsc::Sender<UiMsg>) {
        let tx = tx.clone();
        match cmd {
            Command::DetectKeys => {
                let client = self.client.clone();
                self.runtime.spawn(async move {
                    match client.detect_keys().await {
                        Ok(keys) => {
                            let _ = tx.send(UiMsg::KeysDetected(keys));
                        }
                        Err(e) => warn!(
                            "[PHASE: wizard] [STEP: detect_keys] Key detection failed: {}",
                            e
                        ),
                    }
                });
            }
            Command::RunStep { action, input } => {
                let client = self.client.clone();
                let confirm = self.confirm;
                self.runtime.spawn(async move {
                    let result = run_step(&client, action, input, confirm).await;
                    if let Err(ActionError::Failed(msg)) = &result {
                        warn!("[PHASE: wizard] [STEP: action] Step action failed: {}", msg);
                    }
                    let _ = tx.send(UiMsg::StepFinished { action, result });
                });
            }
            Command::CompleteWizard => {
                let client = self.client.clone();
                self.runtime.spawn(async move {
                    if let Err(e) = client.complete_wizard().await {
                        warn!(
                            "[PHASE: wizard] [STEP: complete] Backend did not record completion: {}",
                            e
                        );
                    }
                });
            }
            Command::Login(token) => {
                self.client.set_token(Some(token));
                self.reconciler.resume();
                self.refresh_services();
            }
            Command::RefreshServices => self.refresh_services(),
        }
    }

    fn refresh_services(&self) {
        let reconciler = self.reconciler.clone();
        self.runtime.spawn(async move {
            // Failures are logged by the reconciler; 401 raises AuthRequired.
            let _ = reconciler.refresh_services().await;
        });
    }

    fn shutdown(self) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(Duration::from_secs(2));
    }
}

// Reconciler updates arrive on a tokio channel; the UI thread only reads std mpsc.
fn spawn_forwarder(
    runtime: &tokio::runtime::Runtime,
    reconciler: Reconciler<ApiClient>,
    mut updates: tokio::sync::mpsc::UnboundedReceiver<ReconcilerUpdate>,
) -> mpsc::Receiver<UiMsg> {
    let (tx, rx) = mpsc::channel();
    runtime.spawn(async move {
        while let Some(update) = updates.recv().await {
            let msg = match update {
                ReconcilerUpdate::DashboardRefreshed => {
                    reconciler.expand_active_sessions();
                    UiMsg::Dashboard(DashboardSummary::from_state(&reconciler.state()))
                }
                other => UiMsg::Reconciler(other),
            };
            if tx.send(msg).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_step(
    client: &ApiClient,
    action: StepAction,
    input: StepInput,
    confirm: ConfirmSettings,
) -> std::result::Result<ActionOutput, ActionError> {
    match (action, input) {
        (StepAction::SaveApiKeys, StepInput::ApiKeys(keys)) => {
            let resp = client.update_api_keys(keys).await?;
            if !resp.success {
                return Err(ActionError::Failed("Backend did not save the API keys".to_string()));
            }
            Ok(ActionOutput::Saved)
        }
        (StepAction::SaveHfToken, StepInput::Text(token)) => {
            client
                .update_config(&json!({ "api_keys.hf_token": token }))
                .await?;
            Ok(ActionOutput::Saved)
        }
        (StepAction::SaveLocalLlm, StepInput::Text(model)) => {
            client
                .update_config(&json!({ "llm.provider": "ollama", "llm.model": model }))
                .await?;
            Ok(ActionOutput::Saved)
        }
        (StepAction::SaveLocalTranscription, StepInput::Text(model)) => {
            client
                .update_config(&json!({
                    "transcription.provider": "whisper",
                    "transcription.model": model
                }))
                .await?;
            Ok(ActionOutput::Saved)
        }
        (StepAction::StartServices(names), _) => {
            let mut outcomes = Vec::with_capacity(names.len());
            for name in names.iter().copied() {
                client.start_service(name).await?;
                let outcome = confirm_running(
                    name,
                    || client.check_service(name),
                    confirm.attempts,
                    confirm.interval,
                )
                .await;
                outcomes.push((name, outcome));
            }
            Ok(ActionOutput::Services(outcomes))
        }
        (StepAction::VerifyServices(names), _) => {
            let mut outcomes = Vec::with_capacity(names.len());
            for name in names.iter().copied() {
                let outcome = confirm_running(
                    name,
                    || client.check_service(name),
                    confirm.attempts,
                    confirm.interval,
                )
                .await;
                outcomes.push((name, outcome));
            }
            Ok(ActionOutput::Services(outcomes))
        }
        (StepAction::TunnelAuth, _) => {
            let mut status = client.tunnel_status().await?;
            if !status.running {
                client.tunnel_start().await?;
                status = client.tunnel_status().await?;
            }
            let auth_url = if status.authenticated {
                None
            } else {
                client.tunnel_auth_url().await.ok().map(|u| u.auth_url)
            };
            Ok(ActionOutput::Tunnel { status, auth_url })
        }
        (StepAction::ProvisionCert, StepInput::Text(hostname)) => Ok(ActionOutput::Certificate(
            client.provision_certificate(&hostname).await?,
        )),
        (StepAction::MobileConnect, _) => Ok(ActionOutput::Mobile(client.mobile_connection().await?)),
        (action, input) => Err(ActionError::Failed(format!(
            "Internal error: step {:?} received {:?}",
            action, input
        ))),
    }
}

// =========================
// Entry points
// =========================

pub fn run(cfg: &WizardConfig) -> Result<()> {
    info!("[PHASE: tui] [STEP: start] Starting TUI wizard");

    let state_dir = cfg.state_dir();
    let storage: Box<dyn SessionPersistence> = Box::new(FileSessionStorage::new(&state_dir));
    let state = WizardState::new(WizardSessionStore::load(storage));

    let backend = Backend::new(cfg)?;
    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, state, &backend);
    restore_terminal(&mut terminal)?;
    backend.shutdown();

    result
}

fn new_smoke_wizard_state(target: &str) -> WizardState {
    // Smoke-only: seeded in-memory session for deterministic rendering.
    let storage: Box<dyn SessionPersistence> = Box::new(MemorySessionStorage::new());
    let mut state = WizardState::new(WizardSessionStore::load(storage));
    state.dashboard = DashboardSummary {
        queued: 1,
        processing: 2,
        completed: 12,
        conversations: 5,
        failed_conversations: 0,
        active_sessions: 1,
        session_jobs: 3,
        fetched_at: Some("12:00:00".to_string()),
        events_connected: true,
        last_error: None,
    };

    match target {
        "auth" => open_auth_modal(&mut state),
        "reset" => state.modal = Some(Modal::ConfirmReset),
        "home" | "" => {}
        other => {
            if let Some(kind) = FlowKind::from_path(other) {
                open_wizard(&mut state, kind);
                state.pending.clear();
            }
        }
    }
    state
}

/// Non-interactive smoke mode: render a single frame and exit.
/// Targets: home|quickstart|memory|chronicle|speaker|mobile|local|auth|reset
pub fn smoke(target: &str) -> Result<()> {
    info!(
        "[PHASE: tui] [STEP: smoke] Rendering single-frame TUI smoke target={}",
        target
    );

    let t = target.trim().to_ascii_lowercase();
    let state = new_smoke_wizard_state(t.as_str());

    let backend = TestBackend::new(100, 30);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| draw(f.size(), f, &state))?;

    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut state: WizardState,
    backend: &Backend,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let (tx, rx) = mpsc::channel::<UiMsg>();
    backend.start(&tx);

    while !state.quit {
        drain_messages(&mut state, &rx);
        drain_messages(&mut state, &backend.updates);
        for cmd in std::mem::take(&mut state.pending) {
            backend.dispatch(cmd, &tx);
        }
        terminal.draw(|f| draw(f.size(), f, &state))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                handle_key(&mut state, key.code);
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    info!("[PHASE: tui] [STEP: exit] TUI closed");
    Ok(())
}

// =========================
// Drawing
// =========================

fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &WizardState) {
    let window_area = centered_window(area, 100, 30);

    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title("uShadow Setup");
    f.render_widget(outer_block, window_area);

    let inner = window_area.inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(inner);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(0)].as_ref())
        .split(rows[0]);

    draw_status_panel(f, cols[0], state);

    let content_block = Block::default()
        .borders(Borders::ALL)
        .title(page_title(state));
    f.render_widget(content_block, cols[1]);
    let content_inner = cols[1].inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });

    let content_text = match state.page {
        Page::Home => home_text(state),
        Page::Wizard => wizard_text(state),
    };
    let content = Paragraph::new(content_text)
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: false });
    f.render_widget(content, content_inner);

    draw_buttons(f, rows[1], state);

    if let Some(modal) = state.modal.as_ref() {
        match modal {
            Modal::ConfirmQuit => draw_confirm_modal(
                f,
                window_area,
                state,
                "Quit Setup?",
                "Your progress is saved. Running services keep running.",
                "Yes, quit",
            ),
            Modal::ConfirmLeave => draw_confirm_modal(
                f,
                window_area,
                state,
                "Leave Wizard?",
                "Steps already saved on the backend stay saved.",
                "Yes, leave",
            ),
            Modal::ConfirmReset => draw_confirm_modal(
                f,
                window_area,
                state,
                "Reset Wizard?",
                "Clears local wizard progress. Backend services and keys are not touched.",
                "Yes, reset",
            ),
            Modal::Message { title, body } => draw_message_modal(f, window_area, title, body),
            Modal::AuthRequired { token, error } => {
                draw_auth_modal(f, window_area, token, error.as_deref())
            }
        }
    }
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width.saturating_sub(2)).max(60).min(area.width);
    let h = height.min(area.height.saturating_sub(2)).max(20).min(area.height);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect {
        x,
        y,
        width: w,
        height: h,
    }
}

fn draw_status_panel(f: &mut ratatui::Frame<'_>, area: Rect, state: &WizardState) {
    let services = &state.session.state().services;
    let level = state.session.setup_level();
    let label = state.session.setup_label();

    let mut lines = vec![
        Line::from(Span::styled(
            format!("Setup level {} of 3", level),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("Next: {}", label.label)),
        Line::from(""),
        Line::from(vec![
            Span::styled(
                if services.api_keys { "● " } else { "· " },
                Style::default().fg(if services.api_keys {
                    Color::Green
                } else {
                    Color::DarkGray
                }),
            ),
            Span::raw(ServiceKey::ApiKeys.display_name()),
        ]),
    ];

    for key in ServiceKey::CAPABILITIES {
        let Some(status) = services.status(key) else {
            continue;
        };
        let (marker, color) = if status.error.is_some() {
            ("! ", Color::Red)
        } else if status.running {
            ("● ", Color::Green)
        } else if status.configured {
            ("○ ", Color::Yellow)
        } else {
            ("· ", Color::DarkGray)
        };
        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(color)),
            Span::raw(key.display_name()),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(format!(
        "Events: {}",
        if state.dashboard.events_connected {
            "live"
        } else {
            "offline"
        }
    )));
    if let Some(ev) = state.last_event.as_ref() {
        lines.push(Line::from(format!("Last: {}", ev)));
    }
    if state.auth_required {
        lines.push(Line::from(Span::styled(
            "Login required",
            Style::default().fg(Color::Red),
        )));
    } else if let Some(err) = state.dashboard.last_error.as_ref() {
        lines.push(Line::from(Span::styled(
            format!("Poll failed: {}", err),
            Style::default().fg(Color::Yellow),
        )));
    }

    let panel = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: true });
    f.render_widget(panel, area);
}

fn home_text(state: &WizardState) -> Text<'static> {
    let label = state.session.setup_label();
    let mut lines = vec![
        Line::from(if state.session.is_first_time_user() {
            "Welcome to uShadow. Let's get your services running."
        } else {
            "Welcome back."
        }),
        Line::from(format!("Suggested: {} - {}", label.label, label.description)),
        Line::from(""),
        Line::from("Wizards:"),
    ];

    let list_focused = matches!(state.focus, FocusTarget::Field(_));
    for (i, kind) in FlowKind::ALL.iter().enumerate() {
        let done = if state.session.is_phase_complete(kind.phase_id()) {
            "[x]"
        } else {
            "[ ]"
        };
        let selected = i == state.home_index;
        let style = if selected && list_focused {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!(
                "{} {} {}",
                if selected { ">" } else { " " },
                done,
                kind.title()
            ),
            style,
        )));
    }

    let d = &state.dashboard;
    lines.push(Line::from(""));
    match d.fetched_at.as_ref() {
        Some(at) => {
            lines.push(Line::from(format!(
                "Queue: {} queued, {} processing, {} completed",
                d.queued, d.processing, d.completed
            )));
            lines.push(Line::from(format!(
                "Conversations: {} ({} failed), live sessions: {} ({} jobs)  (updated {})",
                d.conversations, d.failed_conversations, d.active_sessions, d.session_jobs, at
            )));
        }
        None => lines.push(Line::from("Queue: waiting for first update...")),
    }

    if let Some(notice) = state.notice.as_ref() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Up/Down select, Enter opens, R refreshes, Tab moves to the buttons.",
    ));
    Text::from(lines)
}

fn progress_bar(pct: u8) -> String {
    let width = 30usize;
    let filled = ((pct as usize) * width) / 100;
    format!(
        "[{}{}] {}%",
        "#".repeat(filled),
        " ".repeat(width.saturating_sub(filled)),
        pct
    )
}

fn wizard_text(state: &WizardState) -> Text<'static> {
    let Some(flow) = state.flow.as_ref() else {
        return Text::from("");
    };
    let seq = flow.sequencer();
    let mut lines = vec![
        Line::from(format!(
            "Step {} of {}  {}",
            seq.current_index() + 1,
            seq.len(),
            progress_bar(flow.progress())
        )),
        Line::from(
            seq.steps()
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let style = if i == seq.current_index() {
                        Style::default().add_modifier(Modifier::BOLD)
                    } else if flow.is_visited(s.id) {
                        Style::default()
                    } else {
                        Style::default().fg(Color::DarkGray)
                    };
                    Span::styled(format!("{}.{}  ", i + 1, s.label), style)
                })
                .collect::<Vec<_>>(),
        ),
        Line::from(""),
    ];

    lines.extend(step_body(state, flow));

    let action = current_action(state);
    let labels = field_labels(action);
    if !labels.is_empty() {
        lines.push(Line::from(""));
    }
    for (i, label) in labels.iter().enumerate() {
        let Some(input) = field_input(state, action, i) else {
            continue;
        };
        let focused = state.focus == FocusTarget::Field(i);
        let hint = match (action, i, state.detected) {
            (StepAction::SaveApiKeys, 0, Some(k)) if k.openai_api_key => "  (saved)",
            (StepAction::SaveApiKeys, 1, Some(k)) if k.anthropic_api_key => "  (saved)",
            (StepAction::SaveApiKeys, 2, Some(k)) if k.deepgram_api_key => "  (saved)",
            (StepAction::SaveApiKeys, 3, Some(k)) if k.mistral_api_key => "  (saved)",
            _ => "",
        };
        let value_style = if focused {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::raw(format!("{:<20}", label)),
            Span::styled(format!("[{:<36}]", input.display()), value_style),
            Span::styled(hint, Style::default().fg(Color::Green)),
        ]));
    }

    if let Some(busy) = state.busy.as_ref() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            busy.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }
    if let Some(msg) = flow.message() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            msg.to_string(),
            Style::default().fg(Color::Red),
        )));
    }
    if let Some(notice) = state.notice.as_ref() {
        lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }
    Text::from(lines)
}

fn service_lines(names: &[&str]) -> Vec<Line<'static>> {
    names
        .iter()
        .map(|n| Line::from(format!("  - {}", n)))
        .collect()
}

fn step_body(state: &WizardState, flow: &WizardFlow) -> Vec<Line<'static>> {
    let kind = flow.kind();
    match step_action(kind, flow.current().id) {
        StepAction::SaveApiKeys => vec![
            Line::from("uShadow needs one LLM provider and one transcription provider."),
            Line::from("Keys already saved on the backend can be left blank."),
        ],
        StepAction::SaveHfToken => vec![
            Line::from("Speaker recognition downloads pyannote models from HuggingFace."),
            Line::from("Create a read token at huggingface.co/settings/tokens."),
        ],
        StepAction::SaveLocalLlm => vec![
            Line::from("Chat and memory extraction run on a local Ollama server."),
            Line::from("Pick the model to pull on first start."),
        ],
        StepAction::SaveLocalTranscription => vec![
            Line::from("Transcription runs locally with Whisper."),
            Line::from("Smaller models are faster; larger ones are more accurate."),
        ],
        StepAction::StartServices(names) => {
            let mut lines = vec![Line::from("Next starts these services and waits for them:")];
            lines.extend(service_lines(names));
            lines
        }
        StepAction::VerifyServices(names) => {
            let mut lines = vec![Line::from("Next checks that these services report running:")];
            lines.extend(service_lines(names));
            lines
        }
        StepAction::TunnelAuth => {
            let mut lines = vec![
                Line::from("Remote access uses a Tailscale container on this machine."),
                Line::from("Next starts it and checks whether it is logged in."),
            ];
            if let Some(url) = state.auth_url.as_ref() {
                lines.push(Line::from(""));
                lines.push(Line::from(format!("Login URL: {}", url)));
            }
            lines
        }
        StepAction::ProvisionCert => {
            let mut lines = vec![Line::from(
                "Provision an HTTPS certificate for this machine's tailnet name.",
            )];
            if let Some(ip) = state.tunnel.as_ref().and_then(|t| t.ip_address.as_ref()) {
                lines.push(Line::from(format!("Tailscale IP: {}", ip)));
            }
            lines
        }
        StepAction::MobileConnect => vec![
            Line::from("Next fetches the connection details for the uShadow mobile app."),
            Line::from("Make sure the phone is logged in to the same tailnet."),
        ],
        StepAction::None => match (kind, flow.current().id) {
            (FlowKind::Memory, "configure") => vec![
                Line::from("The memory store keeps facts extracted from your conversations."),
                Line::from("It uses the bundled OpenMemory server with Qdrant."),
            ],
            (FlowKind::Mobile, "complete") => {
                let mut lines = vec![Line::from("Connect the mobile app with these details:")];
                if let Some(m) = state.mobile.as_ref() {
                    lines.push(Line::from(format!("  Host:     {}", m.hostname)));
                    lines.push(Line::from(format!("  API URL:  {}", m.api_url)));
                    lines.push(Line::from(format!(
                        "  Tailnet:  {}:{}",
                        m.tailscale_ip, m.api_port
                    )));
                }
                if let Some(path) = state.certificate.as_ref().and_then(|c| c.cert_path.as_ref()) {
                    lines.push(Line::from(format!("  Cert:     {}", path)));
                }
                lines.push(Line::from(""));
                lines.push(Line::from("Select Finish to return to the dashboard."));
                lines
            }
            _ => vec![
                Line::from(format!("{} setup is ready.", kind.title())),
                Line::from(""),
                Line::from("Select Finish to return to the dashboard."),
            ],
        },
    }
}

fn draw_buttons(f: &mut ratatui::Frame<'_>, area: Rect, state: &WizardState) {
    let back = button_text(
        back_label(state.page),
        matches!(state.focus, FocusTarget::Button(ButtonFocus::Back)),
        can_go_back(state),
    );
    let next = button_text(
        next_label(state),
        matches!(state.focus, FocusTarget::Button(ButtonFocus::Next)),
        can_go_next(state),
    );
    let cancel = button_text(
        cancel_label(state.page),
        matches!(state.focus, FocusTarget::Button(ButtonFocus::Cancel)),
        true,
    );

    let line = Line::from(vec![back, Span::raw(" "), next, Span::raw(" "), cancel]);
    let p = Paragraph::new(Text::from(line)).alignment(Alignment::Right);
    f.render_widget(p, area);
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(format!("[ {} ]", label), style)
}

fn modal_area(window_area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(window_area.width.saturating_sub(4)).max(40);
    let h = height.min(window_area.height.saturating_sub(4));
    Rect {
        x: window_area.x + (window_area.width.saturating_sub(w)) / 2,
        y: window_area.y + (window_area.height.saturating_sub(h)) / 2,
        width: w,
        height: h,
    }
}

fn modal_buttons_area(area: Rect) -> Rect {
    Rect {
        x: area.x + 1,
        y: area.y + area.height.saturating_sub(2),
        width: area.width.saturating_sub(2),
        height: 1,
    }
}

fn draw_confirm_modal(
    f: &mut ratatui::Frame<'_>,
    window_area: Rect,
    state: &WizardState,
    title: &str,
    body: &str,
    yes_label: &str,
) {
    let area = modal_area(window_area, 60, 7);
    f.render_widget(Clear, area);
    let p = Paragraph::new(Text::from(vec![Line::from(body.to_string())]))
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);

    // [ Yes ] [ No ], primary on the right
    let yes = button_text(yes_label, focused_button(state) == ButtonFocus::Cancel, true);
    let no = button_text("No", focused_button(state) == ButtonFocus::Next, true);
    let line = Line::from(vec![yes, Span::raw(" "), no]);
    f.render_widget(
        Paragraph::new(Text::from(line)).alignment(Alignment::Right),
        modal_buttons_area(area),
    );
}

fn draw_message_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, title: &str, body: &str) {
    let area = modal_area(window_area, 70, 10);
    f.render_widget(Clear, area);
    let p = Paragraph::new(Text::from(body.to_string()))
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
    f.render_widget(
        Paragraph::new(Text::from(Line::from(button_text("OK", true, true))))
            .alignment(Alignment::Right),
        modal_buttons_area(area),
    );
}

fn draw_auth_modal(
    f: &mut ratatui::Frame<'_>,
    window_area: Rect,
    token: &TextInput,
    error: Option<&str>,
) {
    let area = modal_area(window_area, 70, 10);
    f.render_widget(Clear, area);
    let mut lines = vec![
        Line::from("The backend rejected the current token (401)."),
        Line::from("Paste a new access token to resume status polling."),
        Line::from(""),
        Line::from(vec![
            Span::raw("Token: "),
            Span::styled(
                format!("[{:<40}]", token.display()),
                Style::default().add_modifier(Modifier::REVERSED),
            ),
        ]),
    ];
    if let Some(err) = error {
        lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(Color::Red),
        )));
    }
    let p = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title("Login Required"))
        .wrap(Wrap { trim: false });
    f.render_widget(p, area);
    f.render_widget(
        Paragraph::new(Text::from("Enter=save  Esc=quit")).alignment(Alignment::Right),
        modal_buttons_area(area),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::ServiceReport;

    fn state() -> WizardState {
        let storage: Box<dyn SessionPersistence> = Box::new(MemorySessionStorage::new());
        WizardState::new(WizardSessionStore::load(storage))
    }

    fn type_text(state: &mut WizardState, text: &str) {
        for c in text.chars() {
            handle_key(state, KeyCode::Char(c));
        }
    }

    fn render(state: &WizardState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| draw(f.size(), f, state)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn text_input_edits_by_character() {
        let mut input = TextInput::new("hé", false);
        input.handle_key(KeyCode::Left);
        input.handle_key(KeyCode::Char('x'));
        assert_eq!(input.value, "hxé");
        input.handle_key(KeyCode::End);
        input.handle_key(KeyCode::Backspace);
        assert_eq!(input.value, "hx");
        assert_eq!(TextInput::new("abc", true).display(), "***");
    }

    #[test]
    fn home_suggests_quickstart_for_first_time_user() {
        let s = state();
        assert_eq!(FlowKind::ALL[s.home_index], FlowKind::Quickstart);
        assert!(render(&s).contains("Get Started"));
    }

    #[test]
    fn opening_quickstart_requests_key_detection() {
        let mut s = state();
        handle_key(&mut s, KeyCode::Enter);
        assert_eq!(s.page, Page::Wizard);
        assert_eq!(s.pending, vec![Command::DetectKeys]);
        assert_eq!(
            s.session.state().current_phase.as_deref(),
            Some("quickstart")
        );
        assert_eq!(s.focus, FocusTarget::Field(0));
    }

    #[test]
    fn blank_api_keys_block_next_without_a_request() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Quickstart);
        s.pending.clear();
        handle_key(&mut s, KeyCode::Enter);

        let flow = s.flow.as_ref().unwrap();
        assert_eq!(flow.current().id, "api_keys");
        assert!(flow.message().unwrap().contains("LLM"));
        assert!(s.pending.is_empty());
    }

    #[test]
    fn filled_keys_queue_a_save_and_advance_when_it_succeeds() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Quickstart);
        s.pending.clear();
        type_text(&mut s, "sk-openai");
        handle_key(&mut s, KeyCode::Tab);
        handle_key(&mut s, KeyCode::Tab);
        type_text(&mut s, "dg-key");
        handle_key(&mut s, KeyCode::Enter);

        assert!(s.busy.is_some());
        match s.pending.as_slice() {
            [Command::RunStep {
                action: StepAction::SaveApiKeys,
                input: StepInput::ApiKeys(keys),
            }] => {
                let update = keys.clone().into_update();
                assert_eq!(update.openai_api_key.as_deref(), Some("sk-openai"));
                assert_eq!(update.deepgram_api_key.as_deref(), Some("dg-key"));
                assert!(update.anthropic_api_key.is_none());
            }
            other => panic!("unexpected commands: {:?}", other),
        }

        apply_message(
            &mut s,
            UiMsg::StepFinished {
                action: StepAction::SaveApiKeys,
                result: Ok(ActionOutput::Saved),
            },
        );
        assert!(s.busy.is_none());
        assert!(s.session.state().services.api_keys);
        assert_eq!(s.flow.as_ref().unwrap().current().id, "start_services");
        assert!(s.openai_key.value.is_empty());
    }

    #[test]
    fn detected_keys_allow_skipping_the_key_step() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Quickstart);
        s.pending.clear();
        apply_message(
            &mut s,
            UiMsg::KeysDetected(DetectedKeys {
                openai_api_key: true,
                deepgram_api_key: true,
                ..Default::default()
            }),
        );
        handle_key(&mut s, KeyCode::Enter);
        assert!(s.pending.is_empty());
        assert_eq!(s.flow.as_ref().unwrap().current().id, "start_services");
        assert!(s.session.state().services.api_keys);
    }

    #[test]
    fn failed_service_start_keeps_the_step_and_records_the_error() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Memory);
        handle_key(&mut s, KeyCode::Enter);
        assert_eq!(s.flow.as_ref().unwrap().current().id, "start");

        apply_message(
            &mut s,
            UiMsg::StepFinished {
                action: StepAction::StartServices(&MEMORY_SERVICES),
                result: Ok(ActionOutput::Services(vec![(
                    "mem0",
                    ConfirmOutcome::Failed("port in use".to_string()),
                )])),
            },
        );
        let flow = s.flow.as_ref().unwrap();
        assert_eq!(flow.current().id, "start");
        assert!(flow.message().unwrap().contains("port in use"));
        assert_eq!(
            s.session.state().services.memory.error.as_deref(),
            Some("port in use")
        );
    }

    #[test]
    fn assumed_start_moves_on_with_a_notice() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Memory);
        handle_key(&mut s, KeyCode::Enter);
        apply_message(
            &mut s,
            UiMsg::StepFinished {
                action: StepAction::StartServices(&MEMORY_SERVICES),
                result: Ok(ActionOutput::Services(vec![("mem0", ConfirmOutcome::Assumed)])),
            },
        );
        assert_eq!(s.flow.as_ref().unwrap().current().id, "verify");
        assert!(s.notice.as_deref().unwrap().contains("mem0"));
        let memory = &s.session.state().services.memory;
        assert!(memory.configured);
        assert!(!memory.running);
    }

    #[test]
    fn stale_results_are_ignored_after_leaving() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Speaker);
        type_text(&mut s, "hf_token");
        handle_key(&mut s, KeyCode::Enter);
        leave_wizard(&mut s);

        apply_message(
            &mut s,
            UiMsg::StepFinished {
                action: StepAction::SaveHfToken,
                result: Ok(ActionOutput::Saved),
            },
        );
        assert_eq!(s.page, Page::Home);
        assert!(s.flow.is_none());
        assert!(s.busy.is_none());
    }

    #[test]
    fn back_on_first_step_returns_home() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Memory);
        press_back(&mut s);
        assert_eq!(s.page, Page::Home);
        assert!(s.session.state().current_phase.is_none());
    }

    #[test]
    fn finishing_quickstart_records_phase_and_mode() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Quickstart);
        s.flow.as_mut().unwrap().advance(Ok(()));
        s.flow.as_mut().unwrap().advance(Ok(()));
        s.pending.clear();

        press_next(&mut s);
        assert_eq!(s.page, Page::Home);
        assert!(s.session.is_phase_complete("quickstart"));
        assert_eq!(s.session.state().mode, WizardMode::Quickstart);
        assert!(s.pending.contains(&Command::CompleteWizard));
        assert!(s.pending.contains(&Command::RefreshServices));
        assert!(matches!(s.modal, Some(Modal::Message { .. })));
        handle_key(&mut s, KeyCode::Enter);
        assert!(s.modal.is_none());
    }

    #[test]
    fn finishing_mobile_marks_tunnel_configured() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Mobile);
        for _ in 0..3 {
            s.flow.as_mut().unwrap().advance(Ok(()));
        }
        press_next(&mut s);
        let state = s.session.state();
        assert!(state.services.tunnel.configured);
        assert_eq!(state.mode, WizardMode::Custom);
        assert!(s.session.is_phase_complete("mobile"));
    }

    #[test]
    fn unauthenticated_tunnel_shows_login_url() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Mobile);
        handle_key(&mut s, KeyCode::Enter);
        apply_message(
            &mut s,
            UiMsg::StepFinished {
                action: StepAction::TunnelAuth,
                result: Ok(ActionOutput::Tunnel {
                    status: TunnelStatus {
                        exists: true,
                        running: true,
                        hostname: Some("ushadow.tail1.ts.net".to_string()),
                        ..Default::default()
                    },
                    auth_url: Some("https://login.tailscale.com/a/xyz".to_string()),
                }),
            },
        );
        let flow = s.flow.as_ref().unwrap();
        assert_eq!(flow.current().id, "tunnel_auth");
        assert!(flow.message().unwrap().contains("login.tailscale.com"));
        assert_eq!(s.cert_hostname.value, "ushadow.tail1.ts.net");
    }

    #[test]
    fn service_reports_update_session_and_level() {
        let mut s = state();
        s.session.set_service_flag(ServiceKey::ApiKeys, true);
        apply_message(
            &mut s,
            UiMsg::Reconciler(ReconcilerUpdate::Services(vec![
                ServiceReport {
                    key: ServiceKey::Memory,
                    running: true,
                    containers: vec!["mem0".to_string()],
                },
                ServiceReport {
                    key: ServiceKey::Chronicle,
                    running: true,
                    containers: vec!["chronicle-backend".to_string()],
                },
            ])),
        );
        assert_eq!(s.session.setup_label().label, "Add Mobile");
    }

    #[test]
    fn auth_required_prompts_for_token_and_queues_login() {
        let mut s = state();
        apply_message(&mut s, UiMsg::Reconciler(ReconcilerUpdate::AuthRequired));
        assert!(matches!(s.modal, Some(Modal::AuthRequired { .. })));

        handle_key(&mut s, KeyCode::Enter);
        assert!(matches!(
            s.modal,
            Some(Modal::AuthRequired { error: Some(_), .. })
        ));

        type_text(&mut s, "new-token");
        handle_key(&mut s, KeyCode::Enter);
        assert!(s.modal.is_none());
        assert_eq!(s.pending, vec![Command::Login("new-token".to_string())]);
    }

    #[test]
    fn digits_jump_only_to_visited_steps() {
        let mut s = state();
        open_wizard(&mut s, FlowKind::Local);
        handle_key(&mut s, KeyCode::Enter);
        apply_message(
            &mut s,
            UiMsg::StepFinished {
                action: StepAction::SaveLocalLlm,
                result: Ok(ActionOutput::Saved),
            },
        );
        set_focused_button(&mut s, ButtonFocus::Next);
        handle_key(&mut s, KeyCode::Char('4'));
        assert_eq!(s.flow.as_ref().unwrap().current().id, "transcription");
        handle_key(&mut s, KeyCode::Char('1'));
        assert_eq!(s.flow.as_ref().unwrap().current().id, "llm");
    }

    #[test]
    fn reset_modal_clears_progress() {
        let mut s = state();
        s.session.mark_phase_complete("quickstart");
        press_back(&mut s);
        assert!(matches!(s.modal, Some(Modal::ConfirmReset)));
        handle_key(&mut s, KeyCode::Right);
        handle_key(&mut s, KeyCode::Enter);
        assert!(s.session.is_first_time_user());
        assert!(s.modal.is_none());
    }

    #[test]
    fn smoke_renders_every_target() {
        for target in [
            "home",
            "quickstart",
            "memory",
            "chronicle",
            "speaker",
            "mobile",
            "local",
            "auth",
            "reset",
        ] {
            smoke(target).unwrap();
        }
        let s = new_smoke_wizard_state("mobile");
        assert!(render(&s).contains("Tailscale"));
    }
}
