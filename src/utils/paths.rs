use std::env;
use std::path::PathBuf;

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_xdg_state_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_STATE_HOME").ok()) {
        return Some(path);
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("state"))
}

/// `$DHIS_STATE_DIR`, else `$XDG_STATE_HOME/dhis2-bridge`, else the working directory.
pub fn resolve_state_dir() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("DHIS_STATE_DIR").ok()) {
        return path;
    }
    if let Some(path) = resolve_xdg_state_dir() {
        return path.join("dhis2-bridge");
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Raw value of `DHIS_INSTANCES_PATH`; may be the literal `memory`.
pub fn instances_path_override() -> Option<PathBuf> {
    normalize_env_path(env::var("DHIS_INSTANCES_PATH").ok())
}

pub fn resolve_instances_path() -> PathBuf {
    instances_path_override().unwrap_or_else(|| resolve_state_dir().join("instances.json"))
}

pub fn resolve_key_path() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("DHIS_KEY_PATH").ok()) {
        return path;
    }
    resolve_state_dir().join(".instances.key")
}
