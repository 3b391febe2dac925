//! Configuration file loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder for all plancheck services
pub const ROOT_FOLDER_ENV: &str = "PLANCHECK_ROOT_FOLDER";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_file: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config_path) = config_file {
        if let Ok(toml_content) = std::fs::read_to_string(config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Locate the TOML config file for a service, if one exists
///
/// Checks `~/.config/plancheck/<service>.toml`, then `/etc/plancheck/<service>.toml` on Linux.
pub fn find_config_file(service_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", service_name);

    let user_config = dirs::config_dir().map(|d| d.join("plancheck").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/plancheck").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/plancheck (or /var/lib/plancheck for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("plancheck"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/plancheck"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("plancheck"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/plancheck"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("plancheck"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\plancheck"))
    } else {
        PathBuf::from("./plancheck_data")
    }
}

/// Create the root folder if it is missing
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::info!(path = %path.display(), "Created root folder");
    }
    Ok(())
}
