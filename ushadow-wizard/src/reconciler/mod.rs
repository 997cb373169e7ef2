// Service status reconciler
//
// Merges two sources of backend truth into local state: a periodic queue-dashboard
// poll and the container lifecycle event stream. A lifecycle event never patches state
// locally; it triggers a full service-status re-fetch.

pub mod events;
pub mod jobs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::error::ApiError;
use crate::models::responses::{DashboardResponse, ServiceInfo};
use crate::models::services::{ServiceKey, ServiceStatusPatch};
use events::{classify, ContainerEvent, SseDecoder, StreamEvent};
use jobs::{group_dashboard, JobGrouping};

/// Raw body chunks of the container event stream.
pub type EventByteStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

/// Backend seam. Production uses `api::client::ApiClient`; tests use stubs.
#[async_trait]
pub trait StatusBackend: Send + Sync {
    async fn fetch_dashboard(
        &self,
        expanded_session_ids: &[String],
    ) -> Result<DashboardResponse, ApiError>;

    async fn fetch_services(&self) -> Result<Vec<ServiceInfo>, ApiError>;

    async fn open_events(&self) -> Result<EventByteStream, ApiError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcilerSettings {
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(3000),
            reconnect_delay: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub dashboard: DashboardResponse,
    pub grouping: JobGrouping,
    pub fetched_at: DateTime<Utc>,
}

/// Running state of one tracked capability, aggregated over its containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReport {
    pub key: ServiceKey,
    pub running: bool,
    pub containers: Vec<String>,
}

impl ServiceReport {
    /// Only `running` is reported; `configured` belongs to the wizards.
    pub fn patch(&self) -> ServiceStatusPatch {
        ServiceStatusPatch::running(self.running)
    }
}

/// Map the backend service list onto tracked capabilities. A capability backed by
/// several containers counts as running when any of them runs. Every tracked
/// capability gets a report; one with no container in the list reports not running,
/// so a container that disappears between fetches clears the flag. Unmapped services
/// are skipped.
pub fn service_reports(services: &[ServiceInfo]) -> Vec<ServiceReport> {
    let mut reports: Vec<ServiceReport> = ServiceKey::CAPABILITIES
        .iter()
        .map(|key| ServiceReport {
            key: *key,
            running: false,
            containers: Vec::new(),
        })
        .collect();
    for svc in services {
        let key = ServiceKey::from_container_name(&svc.service_name).or_else(|| {
            svc.container_name
                .as_deref()
                .and_then(ServiceKey::from_container_name)
        });
        let Some(report) = key.and_then(|k| reports.iter_mut().find(|r| r.key == k)) else {
            continue;
        };
        report.running |= svc.is_running();
        report.containers.push(svc.service_name.clone());
    }
    reports
}

/// Notifications for the host (TUI loop, watch mode).
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerUpdate {
    DashboardRefreshed,
    Services(Vec<ServiceReport>),
    Container(ContainerEvent),
    /// Sent once per 401; polling stays halted until `resume()`.
    AuthRequired,
    Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilerState {
    pub snapshot: Option<DashboardSnapshot>,
    pub services: Vec<ServiceReport>,
    /// Non-blocking indicator for the last failed poll.
    pub last_error: Option<String>,
    pub auth_required: bool,
    pub expanded_sessions: Vec<String>,
    pub events_connected: bool,
}

struct Inner<B> {
    backend: B,
    settings: ReconcilerSettings,
    state: Mutex<ReconcilerState>,
    in_flight: AtomicBool,
    auth_notified: AtomicBool,
    updates: mpsc::UnboundedSender<ReconcilerUpdate>,
}

pub struct Reconciler<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for Reconciler<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StatusBackend + 'static> Reconciler<B> {
    pub fn new(
        backend: B,
        settings: ReconcilerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ReconcilerUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            backend,
            settings,
            state: Mutex::new(ReconcilerState::default()),
            in_flight: AtomicBool::new(false),
            auth_notified: AtomicBool::new(false),
            updates: tx,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    pub fn state(&self) -> ReconcilerState {
        self.with_state(|s| s.clone())
    }

    pub fn is_auth_required(&self) -> bool {
        self.with_state(|s| s.auth_required)
    }

    pub fn set_expanded_sessions(&self, session_ids: Vec<String>) {
        self.with_state(|s| s.expanded_sessions = session_ids);
    }

    /// Expand every streaming session listed in the latest snapshot so the next poll
    /// returns their job timelines. Returns whether the expanded set changed.
    pub fn expand_active_sessions(&self) -> bool {
        self.with_state(|s| {
            let Some(snapshot) = s.snapshot.as_ref() else {
                return false;
            };
            let mut active: Vec<String> = snapshot
                .dashboard
                .streaming_status
                .active_sessions
                .iter()
                .map(|session| session.session_id.clone())
                .filter(|id| !id.is_empty())
                .collect();
            active.sort();
            active.dedup();
            if active == s.expanded_sessions {
                return false;
            }
            debug!(
                "[PHASE: reconciler] [STEP: sessions] Expanding {} active sessions",
                active.len()
            );
            s.expanded_sessions = active;
            true
        })
    }

    /// Start one poll unless a poll is still outstanding or auth is required. The poll
    /// runs as its own task so a hung request never blocks later ticks.
    pub fn tick(&self) -> Option<JoinHandle<()>> {
        self.spawn_poll(CancellationToken::new())
    }

    /// Like `tick`, but the spawned poll is dropped as soon as `cancel` fires. A dropped
    /// poll never touches state and always releases the in-flight guard.
    fn spawn_poll(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.is_auth_required() {
            return None;
        }
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("[PHASE: reconciler] [STEP: poll] Previous poll still running; skipping tick");
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("[PHASE: reconciler] [STEP: poll] Outstanding poll dropped on shutdown");
                }
                _ = this.poll_once() => {}
            }
            this.inner.in_flight.store(false, Ordering::SeqCst);
        }))
    }

    /// One dashboard poll. Success replaces the snapshot wholesale and recomputes the
    /// grouping; a transient failure keeps the previous snapshot.
    pub async fn poll_once(&self) {
        let expanded = self.with_state(|s| s.expanded_sessions.clone());
        match self.inner.backend.fetch_dashboard(&expanded).await {
            Ok(dashboard) => {
                let grouping = group_dashboard(&dashboard);
                debug!(
                    "[PHASE: reconciler] [STEP: poll] Dashboard refreshed (jobs={}, conversations={}, sessions={}, timelines={})",
                    dashboard.jobs.len(),
                    grouping.conversations.len(),
                    dashboard.streaming_status.active_sessions.len(),
                    grouping.session_timelines.len()
                );
                self.with_state(|s| {
                    s.snapshot = Some(DashboardSnapshot {
                        dashboard,
                        grouping,
                        fetched_at: Utc::now(),
                    });
                    s.last_error = None;
                });
                self.notify(ReconcilerUpdate::DashboardRefreshed);
            }
            Err(e) if e.is_unauthorized() => self.halt_for_auth(),
            Err(e) => {
                warn!(
                    "[PHASE: reconciler] [STEP: poll] Dashboard poll failed: {}",
                    e
                );
                let msg = e.user_message();
                self.with_state(|s| s.last_error = Some(msg.clone()));
                self.notify(ReconcilerUpdate::Error(msg));
            }
        }
    }

    /// Full service-status re-fetch.
    pub async fn refresh_services(&self) -> Result<Vec<ServiceReport>, ApiError> {
        match self.inner.backend.fetch_services().await {
            Ok(services) => {
                let reports = service_reports(&services);
                debug!(
                    "[PHASE: reconciler] [STEP: services] {} services listed, {} tracked",
                    services.len(),
                    reports.len()
                );
                self.with_state(|s| s.services = reports.clone());
                self.notify(ReconcilerUpdate::Services(reports.clone()));
                Ok(reports)
            }
            Err(e) => {
                if e.is_unauthorized() {
                    self.halt_for_auth();
                } else {
                    warn!(
                        "[PHASE: reconciler] [STEP: services] Service re-fetch failed: {}",
                        e
                    );
                }
                Err(e)
            }
        }
    }

    /// Returns whether the event triggered a re-fetch.
    pub async fn handle_container_event(&self, event: &ContainerEvent) -> bool {
        self.notify(ReconcilerUpdate::Container(event.clone()));
        if !event.is_lifecycle() {
            debug!(
                "[PHASE: events] [STEP: container] Ignoring '{}' on {}",
                event.action, event.container_name
            );
            return false;
        }
        info!(
            "[PHASE: events] [STEP: container] {} {} -> refreshing services",
            event.action, event.container_name
        );
        let _ = self.refresh_services().await;
        true
    }

    /// Clear the auth halt after the user has logged in again.
    pub fn resume(&self) {
        self.with_state(|s| {
            s.auth_required = false;
            s.last_error = None;
        });
        self.inner.auth_notified.store(false, Ordering::SeqCst);
        info!("[PHASE: reconciler] [STEP: auth] Polling resumed");
    }

    /// Poll loop. Runs until cancelled; a poll still outstanding at cancellation is
    /// dropped with it.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.inner.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "[PHASE: reconciler] [STEP: start] Polling every {:?}",
            self.inner.settings.poll_interval
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let _ = self.spawn_poll(cancel.clone());
                }
            }
        }
        info!("[PHASE: reconciler] [STEP: stop] Poll loop stopped");
    }

    /// Event stream loop. Reconnects after a fixed delay until cancelled.
    pub async fn run_events(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !self.is_auth_required() {
                match self.inner.backend.open_events().await {
                    Ok(stream) => {
                        self.with_state(|s| s.events_connected = true);
                        self.consume_events(stream, &cancel).await;
                        self.with_state(|s| s.events_connected = false);
                    }
                    Err(e) if e.is_unauthorized() => self.halt_for_auth(),
                    Err(e) => warn!(
                        "[PHASE: events] [STEP: connect] Event stream unavailable: {}",
                        e
                    ),
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.inner.settings.reconnect_delay) => {}
            }
        }
        info!("[PHASE: events] [STEP: stop] Event stream loop stopped");
    }

    async fn consume_events(&self, mut stream: EventByteStream, cancel: &CancellationToken) {
        let mut decoder = SseDecoder::new();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return,
                next = stream.next() => next,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    for raw in decoder.feed(&bytes) {
                        match classify(&raw) {
                            Some(StreamEvent::Connected(msg)) => {
                                info!("[PHASE: events] [STEP: connect] {}", msg)
                            }
                            Some(StreamEvent::Error(msg)) => {
                                warn!("[PHASE: events] [STEP: stream] Backend reported: {}", msg)
                            }
                            Some(StreamEvent::Container(ev)) => {
                                self.handle_container_event(&ev).await;
                            }
                            None => {}
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("[PHASE: events] [STEP: stream] Event stream error: {}", e);
                    return;
                }
                None => {
                    info!("[PHASE: events] [STEP: stream] Event stream ended; reconnecting");
                    return;
                }
            }
        }
    }

    fn halt_for_auth(&self) {
        self.with_state(|s| s.auth_required = true);
        if !self.inner.auth_notified.swap(true, Ordering::SeqCst) {
            warn!("[PHASE: reconciler] [STEP: auth] Backend returned 401; polling halted");
            self.notify(ReconcilerUpdate::AuthRequired);
        }
    }

    fn notify(&self, update: ReconcilerUpdate) {
        // Receiver dropped means the host is shutting down.
        let _ = self.inner.updates.send(update);
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ReconcilerState) -> T) -> T {
        let mut guard = match self.inner.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::responses::StreamingSession;
    use crate::reconciler::jobs::{Job, JobStatus};
    use crate::wizard::level::SetupLevel;
    use crate::wizard::session::WizardSessionStore;
    use crate::wizard::storage::MemorySessionStorage;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    /// Stub backend with scripted dashboard results and call counters.
    struct StubBackend {
        dashboard_calls: AtomicU32,
        services_calls: AtomicU32,
        events_calls: AtomicU32,
        dashboards: Mutex<VecDeque<Result<DashboardResponse, ApiError>>>,
        gate: Option<Arc<Notify>>,
        event_chunks: Mutex<Option<Vec<Vec<u8>>>>,
        services: Mutex<VecDeque<Vec<ServiceInfo>>>,
        expanded_seen: Mutex<Vec<Vec<String>>>,
    }

    impl StubBackend {
        fn new() -> Self {
            Self {
                dashboard_calls: AtomicU32::new(0),
                services_calls: AtomicU32::new(0),
                events_calls: AtomicU32::new(0),
                dashboards: Mutex::new(VecDeque::new()),
                gate: None,
                event_chunks: Mutex::new(None),
                services: Mutex::new(VecDeque::new()),
                expanded_seen: Mutex::new(Vec::new()),
            }
        }

        fn with_dashboards(results: Vec<Result<DashboardResponse, ApiError>>) -> Self {
            let stub = Self::new();
            *stub.dashboards.lock().unwrap() = results.into();
            stub
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl StatusBackend for StubBackend {
        async fn fetch_dashboard(
            &self,
            expanded_session_ids: &[String],
        ) -> Result<DashboardResponse, ApiError> {
            self.dashboard_calls.fetch_add(1, Ordering::SeqCst);
            self.expanded_seen
                .lock()
                .unwrap()
                .push(expanded_session_ids.to_vec());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.dashboards
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(DashboardResponse::default()))
        }

        async fn fetch_services(&self) -> Result<Vec<ServiceInfo>, ApiError> {
            self.services_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(scripted) = self.services.lock().unwrap().pop_front() {
                return Ok(scripted);
            }
            Ok(vec![
                service("chronicle-backend", "running"),
                service("mem0", "running"),
                service("tailscale", "exited"),
                service("mongo", "running"),
            ])
        }

        async fn open_events(&self) -> Result<EventByteStream, ApiError> {
            self.events_calls.fetch_add(1, Ordering::SeqCst);
            match self.event_chunks.lock().unwrap().take() {
                Some(chunks) => Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed()),
                None => Err(ApiError::Status {
                    status: 503,
                    detail: "Docker not available".to_string(),
                }),
            }
        }
    }

    fn service(name: &str, status: &str) -> ServiceInfo {
        ServiceInfo {
            service_name: name.to_string(),
            status: status.to_string(),
            health: None,
            container_name: None,
            description: None,
        }
    }

    fn dashboard_with_job(id: &str) -> DashboardResponse {
        let mut dashboard = DashboardResponse::default();
        dashboard.jobs.queued.push(Job {
            job_id: id.to_string(),
            job_type: "transcribe".to_string(),
            status: JobStatus::Queued,
            meta: serde_json::json!({ "conversation_id": "c1" })
                .as_object()
                .cloned()
                .unwrap(),
            created_at: None,
            started_at: None,
            ended_at: None,
        });
        dashboard
    }

    fn container_event(action: &str) -> ContainerEvent {
        ContainerEvent {
            action: action.to_string(),
            container_name: "ushadow-chronicle-backend-1".to_string(),
            container_id: "abc".to_string(),
            status: None,
            timestamp: None,
        }
    }

    fn settings() -> ReconcilerSettings {
        ReconcilerSettings {
            poll_interval: Duration::from_millis(10),
            reconnect_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn pending_poll_blocks_further_ticks() {
        let gate = Arc::new(Notify::new());
        let (reconciler, _rx) = Reconciler::new(StubBackend::gated(gate.clone()), settings());

        let first = reconciler.tick().expect("first tick should start a poll");
        for _ in 0..5 {
            assert!(reconciler.tick().is_none());
            tokio::task::yield_now().await;
        }
        assert_eq!(reconciler.backend().dashboard_calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        first.await.unwrap();

        let second = reconciler.tick().expect("tick after completion should poll");
        gate.notify_one();
        second.await.unwrap();
        assert_eq!(reconciler.backend().dashboard_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unauthorized_halts_polling_and_notifies_once() {
        let backend = StubBackend::with_dashboards(vec![
            Err(ApiError::Unauthorized),
            Ok(DashboardResponse::default()),
        ]);
        let (reconciler, mut rx) = Reconciler::new(backend, settings());

        reconciler.tick().unwrap().await.unwrap();
        assert!(reconciler.is_auth_required());
        assert!(reconciler.tick().is_none());
        // A second 401 from another endpoint must not notify again.
        reconciler.halt_for_auth();

        assert_eq!(rx.try_recv().unwrap(), ReconcilerUpdate::AuthRequired);
        assert!(rx.try_recv().is_err());
        assert_eq!(reconciler.backend().dashboard_calls.load(Ordering::SeqCst), 1);

        reconciler.resume();
        reconciler.tick().expect("resume restarts polling").await.unwrap();
        assert!(!reconciler.is_auth_required());
        assert_eq!(reconciler.backend().dashboard_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_error_keeps_previous_snapshot() {
        let backend = StubBackend::with_dashboards(vec![
            Ok(dashboard_with_job("j1")),
            Err(ApiError::Status {
                status: 503,
                detail: String::new(),
            }),
            Ok(DashboardResponse::default()),
        ]);
        let (reconciler, _rx) = Reconciler::new(backend, settings());

        reconciler.poll_once().await;
        reconciler.poll_once().await;
        let state = reconciler.state();
        let snapshot = state.snapshot.expect("snapshot kept");
        assert_eq!(snapshot.dashboard.jobs.len(), 1);
        assert!(snapshot.grouping.conversation("c1").is_some());
        assert_eq!(state.last_error.as_deref(), Some("Request failed (503)"));
        assert!(!state.auth_required);

        // Next success replaces the snapshot wholesale and clears the indicator.
        reconciler.poll_once().await;
        let state = reconciler.state();
        assert!(state.snapshot.unwrap().dashboard.jobs.is_empty());
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn lifecycle_events_trigger_one_refetch_each() {
        let (reconciler, _rx) = Reconciler::new(StubBackend::new(), settings());

        assert!(reconciler.handle_container_event(&container_event("die")).await);
        assert_eq!(reconciler.backend().services_calls.load(Ordering::SeqCst), 1);

        for action in ["create", "destroy", "health_status: healthy"] {
            assert!(!reconciler.handle_container_event(&container_event(action)).await);
        }
        assert_eq!(reconciler.backend().services_calls.load(Ordering::SeqCst), 1);

        let services = reconciler.state().services;
        let chronicle = services.iter().find(|r| r.key == ServiceKey::Chronicle).unwrap();
        assert!(chronicle.running);
        let tunnel = services.iter().find(|r| r.key == ServiceKey::Tunnel).unwrap();
        assert!(!tunnel.running);
    }

    #[tokio::test]
    async fn event_stream_drives_refetch_and_stops_on_cancel() {
        let stub = StubBackend::new();
        let body = "event: connected\ndata: {\"message\": \"ok\"}\n\n\
event: container\ndata: {\"action\": \"start\", \"container_name\": \"mem0\"}\n\n";
        let bytes = body.as_bytes();
        *stub.event_chunks.lock().unwrap() =
            Some(vec![bytes[..20].to_vec(), bytes[20..].to_vec()]);
        let (reconciler, _rx) = Reconciler::new(stub, settings());

        let cancel = CancellationToken::new();
        let r = reconciler.clone();
        let c = cancel.clone();
        let handle = tokio::spawn(async move { r.run_events(c).await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while reconciler.backend().events_calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stream should reconnect after ending");

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(reconciler.backend().services_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poll_loop_stops_when_cancelled() {
        let (reconciler, _rx) = Reconciler::new(StubBackend::new(), settings());
        let cancel = CancellationToken::new();
        let r = reconciler.clone();
        let c = cancel.clone();
        let handle = tokio::spawn(async move { r.run(c).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(reconciler.backend().dashboard_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn cancelling_the_loop_drops_an_outstanding_poll() {
        let gate = Arc::new(Notify::new());
        let backend = StubBackend {
            gate: Some(gate.clone()),
            ..StubBackend::with_dashboards(vec![Ok(dashboard_with_job("late"))])
        };
        let (reconciler, mut rx) = Reconciler::new(backend, settings());
        let cancel = CancellationToken::new();
        let r = reconciler.clone();
        let c = cancel.clone();
        let handle = tokio::spawn(async move { r.run(c).await });

        tokio::time::timeout(Duration::from_secs(2), async {
            while reconciler.backend().dashboard_calls.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("loop should start a poll");

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while reconciler.inner.in_flight.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("dropped poll releases the in-flight guard");

        // The response arriving after shutdown must not land in state.
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(reconciler.state().snapshot.is_none());
        assert_eq!(reconciler.backend().dashboard_calls.load(Ordering::SeqCst), 1);
        while let Ok(update) = rx.try_recv() {
            assert_ne!(update, ReconcilerUpdate::DashboardRefreshed);
        }
    }

    #[tokio::test]
    async fn vanished_container_clears_running_on_refetch() {
        let stub = StubBackend::new();
        stub.services.lock().unwrap().extend([
            vec![service("chronicle-backend", "running"), service("mem0", "running")],
            vec![service("mem0", "running")],
        ]);
        let (reconciler, _rx) = Reconciler::new(stub, settings());
        let mut session = WizardSessionStore::load(MemorySessionStorage::new());
        session.set_service_flag(ServiceKey::ApiKeys, true);

        for report in reconciler.refresh_services().await.unwrap() {
            session.merge_service_status(report.key, report.patch());
        }
        assert!(session.state().services.chronicle.running);
        assert_eq!(session.setup_level(), SetupLevel::Level1);

        let reports = reconciler.refresh_services().await.unwrap();
        let chronicle = reports.iter().find(|r| r.key == ServiceKey::Chronicle).unwrap();
        assert!(!chronicle.running);
        assert!(chronicle.containers.is_empty());
        for report in &reports {
            session.merge_service_status(report.key, report.patch());
        }
        assert!(!session.state().services.chronicle.running);
        assert!(session.state().services.memory.running);
        assert_eq!(session.setup_level(), SetupLevel::Level0);
    }

    #[tokio::test]
    async fn active_sessions_are_expanded_on_the_next_poll() {
        let mut first = DashboardResponse::default();
        first.streaming_status.active_sessions = vec![
            StreamingSession {
                session_id: "s2".to_string(),
                ..Default::default()
            },
            StreamingSession {
                session_id: "s1".to_string(),
                ..Default::default()
            },
        ];
        let mut second = first.clone();
        let mut timelines = std::collections::HashMap::new();
        timelines.insert("s1".to_string(), dashboard_with_job("t1").jobs.all());
        second.session_jobs = Some(timelines);
        let backend = StubBackend::with_dashboards(vec![Ok(first), Ok(second)]);
        let (reconciler, _rx) = Reconciler::new(backend, settings());

        reconciler.poll_once().await;
        assert!(reconciler.expand_active_sessions());
        assert!(!reconciler.expand_active_sessions());
        reconciler.poll_once().await;

        let seen = reconciler.backend().expanded_seen.lock().unwrap().clone();
        assert_eq!(seen, vec![vec![], vec!["s1".to_string(), "s2".to_string()]]);
        let snapshot = reconciler.state().snapshot.unwrap();
        let timeline = snapshot.grouping.session("s1").expect("timeline for s1");
        assert_eq!(timeline.jobs[0].job_id, "t1");
    }

    #[test]
    fn reports_cover_every_capability_and_ignore_ui_containers() {
        let reports = service_reports(&[
            service("chronicle-backend", "exited"),
            service("chronicle-webui", "running"),
            service("openmemory-ui", "running"),
            service("ushadow-mem0-1", "exited"),
            service("mem0", "running"),
            service("redis", "running"),
        ]);
        let keys: Vec<ServiceKey> = reports.iter().map(|r| r.key).collect();
        assert_eq!(keys, ServiceKey::CAPABILITIES.to_vec());

        assert!(reports[0].running);
        assert_eq!(reports[0].containers, vec!["ushadow-mem0-1", "mem0"]);
        assert!(!reports[1].running);
        assert_eq!(reports[1].containers, vec!["chronicle-backend"]);
        assert_eq!(reports[1].patch(), ServiceStatusPatch::running(false));
        assert!(reports[2].containers.is_empty());
        assert!(!reports[3].running);
    }
}
