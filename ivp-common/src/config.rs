//! Configuration file loading and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "IVP_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "ivp.db";

/// Root folder resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    use_config_file: bool,
) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    if use_config_file {
        match load_config_toml(None) {
            Ok(Some(config)) => {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(root_folder));
                }
            }
            Ok(None) => debug!("No config file found, using default root folder"),
            Err(e) => warn!("Ignoring unreadable config file: {}", e),
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_root_folder())
}

/// Path of the SQLite database inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Locate the configuration file for the platform
///
/// Linux checks `~/.config/ivp/config.toml` and then `/etc/ivp/config.toml`;
/// other platforms use the per-user config directory only.
pub fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("ivp").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/ivp/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Read and parse a TOML config file
///
/// With an explicit path, a missing file is an error. Without one, the
/// platform config file is used if present and `Ok(None)` is returned when
/// there is none.
pub fn load_config_toml(explicit: Option<&Path>) -> Result<Option<toml::Value>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_file_path() {
            Ok(path) => path,
            Err(_) => return Ok(None),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let value = toml::from_str::<toml::Value>(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;

    debug!("Loaded config file {}", path.display());
    Ok(Some(value))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/ivp (or /var/lib/ivp for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("ivp"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ivp"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/ivp
        dirs::data_dir()
            .map(|d| d.join("ivp"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ivp"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\ivp
        dirs::data_local_dir()
            .map(|d| d.join("ivp"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ivp"))
    } else {
        PathBuf::from("./ivp_data")
    }
}
