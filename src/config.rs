//! Agent Configuration
//!
//! Loads and saves an agent's configuration as JSON, by default under
//! `~/.agentweb/agent.json`. The key file path inside the config doubles
//! as the agent's identity anchor.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::types::{default_agent_config, AgentConfig};

/// Directory name under the user's home for all agent data.
const AGENTWEB_DIR_NAME: &str = ".agentweb";

/// Config file name within the agentweb directory.
const CONFIG_FILENAME: &str = "agent.json";

/// Returns the agentweb base directory: `~/.agentweb`.
pub fn get_agentweb_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
    home.join(AGENTWEB_DIR_NAME)
}

/// Returns the default config path: `~/.agentweb/agent.json`.
pub fn default_config_path() -> PathBuf {
    get_agentweb_dir().join(CONFIG_FILENAME)
}

/// Load an agent config from `path`, merging defaults into unset fields.
///
/// Returns `None` if the file does not exist or cannot be parsed.
pub fn load_config(path: &Path) -> Option<AgentConfig> {
    if !path.exists() {
        return None;
    }

    let contents = fs::read_to_string(path).ok()?;
    let mut config: AgentConfig = serde_json::from_str(&contents).ok()?;

    let defaults = default_agent_config();

    if config.registry_url.is_empty() {
        config.registry_url = defaults.registry_url;
    }
    if config.key_file.is_empty() {
        config.key_file = defaults.key_file;
    }
    if config.http_host.is_empty() {
        config.http_host = defaults.http_host;
    }
    if config.dht_host.is_empty() {
        config.dht_host = defaults.dht_host;
    }
    if config.dht_port == 0 {
        config.dht_port = defaults.dht_port;
    }
    if config.payment_method.is_empty() {
        config.payment_method = defaults.payment_method;
    }

    Some(config)
}

/// Save the agent config to `path` as pretty JSON. Creates the parent
/// directory with mode 0o700 if needed.
pub fn save_config(path: &Path, config: &AgentConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
        }
    }

    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, &json).context("Failed to write config file")?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
///
/// If the path starts with `~`, the tilde is replaced with the user's
/// home directory. Otherwise the path is returned as-is.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}
