//! Settings file loading (`ridelink.toml`).

use std::path::{Path, PathBuf};

use ridelink_core::prelude::*;
use ridelink_core::Settings;

const CONFIG_DIR: &str = "ridelink";
const CONFIG_FILENAME: &str = "ridelink.toml";

const DEFAULT_CONFIG: &str = r#"# ridelink configuration
# Every setting is optional; the values below are the defaults.

[endpoint]
socket_url = "wss://localhost/match/connect"
# Base URL for status snapshots (GET {rest_url}/match/get/{rideId})
# rest_url = "https://localhost"

[session]
# WebSocket handshake timeout
request_timeout_secs = 30
# Connected session with no inbound frame for this long is dropped
resource_timeout_secs = 300
heartbeat_interval_secs = 30

[reconnect]
initial_delay_ms = 1000
max_delay_ms = 30000
max_attempts = 10

[coordinator]
# Status notifications arriving within this window collapse into one
debounce_ms = 300
# Backstop status query after each action
resync_delay_ms = 800
resync_min_gap_ms = 500
"#;

/// `{config_dir}/ridelink/ridelink.toml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

/// Load settings from `path`.
///
/// A missing file gives the defaults. So does a file that cannot be read or
/// parsed, with a warning.
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

/// Write a commented default config to `path` unless one already exists
pub fn init_settings_file(path: &Path) -> Result<()> {
    if path.exists() {
        debug!("Config file {:?} already exists", path);
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::config(format!("Failed to create {:?}: {}", parent, e)))?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| Error::config(format!("Failed to write {:?}: {}", path, e)))?;
    info!("Wrote default config to {:?}", path);
    Ok(())
}
