// uShadow setup wizard
// Library entry point: logging, configuration and the command-line modes.

pub mod api;
pub mod config;
pub mod models;
pub mod reconciler;
mod tui;
pub mod utils;
pub mod wizard;

use log::{error, info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::config::WizardConfig;
use crate::models::services::ServiceKey;
use crate::reconciler::{Reconciler, ReconcilerSettings, ReconcilerUpdate};
use crate::wizard::confirm::{confirm_running, ConfirmOutcome};
use crate::wizard::storage::FileSessionStorage;
use crate::wizard::WizardSessionStore;

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(with_stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = utils::path_resolver::resolve_log_folder()?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("ushadow-wizard-{}.log", timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("ushadow-wizard-{}.txt", timestamp));

    // Configure dual-format logging:
    // - JSON format to .log file
    // - Human-readable format to .txt file
    // - Optional: human-readable to stdout (disabled for TUI to avoid corrupting the terminal UI)
    let mut dispatch = fern::Dispatch::new()
        .level(log::LevelFilter::Debug)
        // reqwest/hyper connection chatter drowns the wizard's own lines
        .level_for("hyper", log::LevelFilter::Info)
        .level_for("hyper_util", log::LevelFilter::Info)
        .level_for("reqwest", log::LevelFilter::Info);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

fn load_config_or_exit() -> WizardConfig {
    match WizardConfig::load() {
        Ok(cfg) => {
            info!(
                "[PHASE: initialization] [STEP: config] Backend {} (poll every {}ms)",
                utils::logging::mask_url_credentials(&cfg.base_url),
                cfg.poll_interval_ms
            );
            cfg
        }
        Err(e) => {
            error!("[PHASE: initialization] [STEP: config] {:#}", e);
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn build_runtime_or_exit() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    }
}

fn client_or_exit(cfg: &WizardConfig) -> ApiClient {
    match ApiClient::new(cfg) {
        Ok(client) => client,
        Err(e) => {
            error!("[PHASE: initialization] [STEP: client] {}", e);
            eprintln!("{}", e.user_message());
            std::process::exit(2);
        }
    }
}

fn reconciler_settings(cfg: &WizardConfig) -> ReconcilerSettings {
    ReconcilerSettings {
        poll_interval: cfg.poll_interval(),
        reconnect_delay: cfg.reconnect_delay(),
    }
}

/// Interactive terminal wizard.
pub fn run_tui() {
    // Initialize logging (no stdout to avoid corrupting the TUI)
    if let Err(e) = init_logging(false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] Headless TUI wizard starting at {}",
        chrono::Utc::now()
    );

    let cfg = load_config_or_exit();
    if let Err(e) = tui::run(&cfg) {
        error!("[PHASE: tui] [STEP: fatal] TUI exited with error: {:?}", e);
        eprintln!("Wizard error: {:#}", e);
        std::process::exit(1);
    }
}

/// Non-interactive TUI smoke mode (for automated checks).
/// Renders a single frame and exits.
pub fn run_tui_smoke(target: Option<String>) {
    // Initialize logging (no stdout to avoid corrupting the terminal)
    if let Err(e) = init_logging(false) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let target = target.as_deref().unwrap_or("home");
    if let Err(e) = tui::smoke(target) {
        error!(
            "[PHASE: tui] [STEP: smoke] TUI smoke exited with error: {:?}",
            e
        );
        eprintln!("Wizard error: {:#}", e);
        std::process::exit(1);
    }
}

/// One-shot status report: backend health, tracked services, queue counts and the
/// derived setup level. Service results are merged into the stored session.
pub fn run_status() {
    if let Err(e) = init_logging(false) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let cfg = load_config_or_exit();
    let rt = build_runtime_or_exit();
    let client = client_or_exit(&cfg);

    let code = rt.block_on(async {
        match client.health().await {
            Ok(h) => println!("Backend:   {} ({})", cfg.base_url, h.status),
            Err(e) => {
                println!("Backend:   {} unreachable: {}", cfg.base_url, e.user_message());
                return 1;
            }
        }

        let (reconciler, _updates) = Reconciler::new(client.clone(), reconciler_settings(&cfg));
        reconciler.poll_once().await;
        let reports = match reconciler.refresh_services().await {
            Ok(r) => r,
            Err(e) => {
                println!("Services:  {}", e.user_message());
                return if e.is_unauthorized() { 3 } else { 1 };
            }
        };

        let mut session = WizardSessionStore::load(FileSessionStorage::new(&cfg.state_dir()));
        for report in &reports {
            session.merge_service_status(report.key, report.patch());
        }
        match client.detect_keys().await {
            Ok(keys) => session.set_service_flag(ServiceKey::ApiKeys, keys.is_complete()),
            Err(e) => warn!("[PHASE: status] [STEP: detect_keys] {}", e),
        }

        println!();
        for key in ServiceKey::CAPABILITIES {
            let status = session.state().services.status(key).cloned().unwrap_or_default();
            let containers = reports
                .iter()
                .find(|r| r.key == key)
                .map(|r| r.containers.join(", "))
                .unwrap_or_default();
            println!(
                "  {:<22} {:<8} {:<11} {}",
                key.display_name(),
                if status.running { "running" } else { "stopped" },
                if status.configured { "configured" } else { "" },
                containers
            );
        }
        println!(
            "  {:<22} {}",
            ServiceKey::ApiKeys.display_name(),
            if session.state().services.api_keys {
                "saved"
            } else {
                "missing"
            }
        );

        let state = reconciler.state();
        if let Some(snapshot) = state.snapshot.as_ref() {
            let jobs = &snapshot.dashboard.jobs;
            println!();
            println!(
                "Queue:     {} queued, {} processing, {} completed ({} conversations)",
                jobs.queued.len(),
                jobs.processing.len(),
                jobs.completed.len(),
                snapshot.grouping.conversations.len()
            );
        } else if let Some(err) = state.last_error.as_ref() {
            println!();
            println!("Queue:     unavailable ({})", err);
        }

        let label = session.setup_label();
        println!();
        println!(
            "Setup level {} of 3. Next: {} ({})",
            session.setup_level(),
            label.label,
            label.description
        );
        0
    });
    std::process::exit(code);
}

/// Follow the reconciler until Ctrl-C: queue refreshes, container events and service
/// changes are printed as they arrive.
pub fn run_watch() {
    if let Err(e) = init_logging(true) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let cfg = load_config_or_exit();
    let rt = build_runtime_or_exit();
    let client = client_or_exit(&cfg);

    let code = rt.block_on(async {
        let (reconciler, mut updates) = Reconciler::new(client, reconciler_settings(&cfg));
        let mut session = WizardSessionStore::load(FileSessionStorage::new(&cfg.state_dir()));
        let cancel = CancellationToken::new();

        let poll = reconciler.clone();
        let poll_cancel = cancel.clone();
        let poll_task = tokio::spawn(async move { poll.run(poll_cancel).await });
        let events = reconciler.clone();
        let events_cancel = cancel.clone();
        let events_task = tokio::spawn(async move { events.run_events(events_cancel).await });
        let _ = reconciler.refresh_services().await;

        let mut code = 0;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("[PHASE: watch] [STEP: stop] Interrupted");
                    break;
                }
                update = updates.recv() => {
                    let Some(update) = update else { break };
                    match update {
                        ReconcilerUpdate::DashboardRefreshed => {
                            reconciler.expand_active_sessions();
                            if let Some(snapshot) = reconciler.state().snapshot {
                                let jobs = &snapshot.dashboard.jobs;
                                info!(
                                    "[PHASE: watch] [STEP: dashboard] queued={} processing={} completed={} sessions={}",
                                    jobs.queued.len(),
                                    jobs.processing.len(),
                                    jobs.completed.len(),
                                    snapshot.dashboard.streaming_status.active_sessions.len()
                                );
                                for timeline in &snapshot.grouping.session_timelines {
                                    info!(
                                        "[PHASE: watch] [STEP: session] {}: {}",
                                        timeline.session_id,
                                        timeline
                                            .jobs
                                            .iter()
                                            .map(|j| format!("{}={}", j.job_type, j.status.as_str()))
                                            .collect::<Vec<_>>()
                                            .join(", ")
                                    );
                                }
                            }
                        }
                        ReconcilerUpdate::Services(reports) => {
                            let before = session.setup_level();
                            for report in &reports {
                                session.merge_service_status(report.key, report.patch());
                            }
                            let after = session.setup_level();
                            if before != after {
                                info!(
                                    "[PHASE: watch] [STEP: level] Setup level {} -> {} ({})",
                                    before,
                                    after,
                                    session.setup_label().label
                                );
                            }
                        }
                        ReconcilerUpdate::Container(ev) => {
                            info!(
                                "[PHASE: watch] [STEP: event] {} {}",
                                ev.container_name, ev.action
                            );
                        }
                        ReconcilerUpdate::AuthRequired => {
                            warn!("[PHASE: watch] [STEP: auth] Backend rejected the token; set USHADOW_TOKEN and restart");
                            code = 3;
                            break;
                        }
                        ReconcilerUpdate::Error(message) => {
                            warn!("[PHASE: watch] [STEP: poll] {}", message);
                        }
                    }
                }
            }
        }

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            let _ = poll_task.await;
            let _ = events_task.await;
        })
        .await;
        code
    });
    std::process::exit(code);
}

/// Clear the stored wizard session. Backend state is untouched.
pub fn run_reset() {
    if let Err(e) = init_logging(false) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let cfg = load_config_or_exit();
    let storage = FileSessionStorage::new(&cfg.state_dir());
    let path = storage.path().to_path_buf();
    let mut session = WizardSessionStore::load(storage);
    session.reset_wizard();
    println!("Wizard session reset ({:?})", path);
}

/// Start or stop one backend service. A start waits until the service reports running.
pub fn run_service_action(name: &str, start: bool) {
    if let Err(e) = init_logging(true) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    let cfg = load_config_or_exit();
    let rt = build_runtime_or_exit();
    let client = client_or_exit(&cfg);

    let code = rt.block_on(async {
        let result = if start {
            client.start_service(name).await
        } else {
            client.stop_service(name).await
        };
        // The client already turns a `success: false` body into an error.
        if let Err(e) = result {
            eprintln!("{}", e.user_message());
            return if e.is_unauthorized() { 3 } else { 1 };
        }
        if !start {
            println!("{} stopped", name);
            return 0;
        }

        let outcome = confirm_running(
            name,
            || client.check_service(name),
            cfg.confirm_attempts,
            cfg.confirm_interval(),
        )
        .await;
        match outcome {
            ConfirmOutcome::Confirmed => {
                println!("{} is running", name);
                0
            }
            ConfirmOutcome::Assumed => {
                println!("{} started but has not reported running yet", name);
                0
            }
            ConfirmOutcome::Failed(msg) => {
                eprintln!("{} failed to start: {}", name, msg);
                1
            }
        }
    });
    std::process::exit(code);
}

/// Print the effective configuration with credentials masked.
pub fn print_config() {
    let cfg = load_config_or_exit();
    match cfg.to_masked_toml() {
        Ok(rendered) => print!("{}", rendered),
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}

