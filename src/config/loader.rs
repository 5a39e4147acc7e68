use super::structs::Settings;
use log::{info, warn};
use std::fs;
use std::path::Path;

const CONFIG_PATH: &str = "/etc/pf-ispcap/config.toml";

/// Load settings from `path`, or the system default location. Missing or
/// unparseable configuration is never fatal; the defaults keep the
/// sampler running.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = path.unwrap_or(Path::new(CONFIG_PATH));
    let mut settings = if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    info!("Loaded configuration from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}. Using defaults.", e);
                    Settings::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file: {}. Using defaults.", e);
                Settings::default()
            }
        }
    } else {
        info!("No config file found at {}. Using defaults.", path.display());
        Settings::default()
    };
    settings.normalize();
    settings
}
