use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "ushadow";

/// Resolve deployment folder (absolute path)
pub fn resolve_deployment_folder() -> PathBuf {
    // Prefer the folder where the binary is running from
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return dir.to_path_buf();
        }
    }

    // Fallback: current working directory
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Directory holding the persisted wizard session. An explicit override wins; otherwise
/// the platform data dir (`~/.local/share/ushadow` on Linux), else next to the binary.
pub fn resolve_state_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    match dirs::data_local_dir() {
        Some(base) => base.join(APP_DIR),
        None => resolve_deployment_folder().join(APP_DIR),
    }
}

/// Resolve log folder (absolute path), creating it if needed.
pub fn resolve_log_folder() -> Result<PathBuf> {
    // `USHADOW_WIZARD_LOG_DIR` lets packaged builds and CI redirect logs.
    let log_dir = match std::env::var_os("USHADOW_WIZARD_LOG_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => resolve_state_dir(None).join("logs"),
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log folder: {:?}", log_dir))?;
    Ok(log_dir)
}

/// Default config file location when `USHADOW_WIZARD_CONFIG` is not set.
pub fn default_config_file() -> PathBuf {
    match dirs::config_dir() {
        Some(base) => base.join(APP_DIR).join("ushadow-wizard.toml"),
        None => PathBuf::from("ushadow-wizard.toml"),
    }
}
