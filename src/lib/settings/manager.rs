use std::{
    io::prelude::*,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::{
    bandwidth::BandwidthConfig,
    capabilities::{IceServer, IceTransportPolicy},
    diagnostics::{CameraCheckConfig, DiagnosticsConfig, MicrophoneCheckConfig},
    video::FrameQualityConfig,
};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct HeaderSettingsFile {
    pub name: String,
    pub version: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SettingsStruct {
    pub header: HeaderSettingsFile,
    pub ice_servers: Vec<IceServer>,
    #[serde(default)]
    pub ice_transport_policy: IceTransportPolicy,
    pub timeout_ms: u64,
    pub stop_on_failure: bool,
    pub audio_bandwidth: BandwidthConfig,
    pub video_bandwidth: BandwidthConfig,
    pub frame_quality: FrameQualityConfig,
    pub camera: CameraCheckConfig,
    pub microphone: MicrophoneCheckConfig,
}

#[derive(Debug)]
struct ManagerStruct {
    pub file_name: String,
    pub config: SettingsStruct,
}

#[derive(Debug)]
struct Manager {
    pub content: Option<ManagerStruct>,
}

lazy_static! {
    static ref MANAGER: Arc<Mutex<Manager>> = Arc::new(Mutex::new(Manager { content: None }));
}

impl Default for SettingsStruct {
    fn default() -> Self {
        let defaults = DiagnosticsConfig::default();
        SettingsStruct {
            header: HeaderSettingsFile {
                name: "RTC Diagnostics".to_string(),
                version: 1,
            },
            ice_servers: defaults.ice_servers,
            ice_transport_policy: defaults.ice_transport_policy,
            timeout_ms: defaults.timeout.as_millis() as u64,
            stop_on_failure: defaults.stop_on_failure,
            audio_bandwidth: defaults.audio_bandwidth,
            video_bandwidth: defaults.video_bandwidth,
            frame_quality: defaults.frame_quality,
            camera: defaults.camera,
            microphone: defaults.microphone,
        }
    }
}

impl From<&SettingsStruct> for DiagnosticsConfig {
    fn from(settings: &SettingsStruct) -> Self {
        DiagnosticsConfig {
            ice_servers: settings.ice_servers.clone(),
            ice_transport_policy: settings.ice_transport_policy,
            timeout: Duration::from_millis(settings.timeout_ms),
            stop_on_failure: settings.stop_on_failure,
            audio_bandwidth: settings.audio_bandwidth,
            video_bandwidth: settings.video_bandwidth,
            frame_quality: settings.frame_quality,
            camera: settings.camera,
            microphone: settings.microphone,
        }
    }
}

impl Manager {
    fn new(file_name: &str, reset: bool) -> ManagerStruct {
        let file_name = resolve_file_name(file_name);
        debug!("Using settings file: {file_name}");

        if reset && Path::new(&file_name).exists() {
            info!("Resetting settings file: {file_name}");
            if let Err(error) = std::fs::remove_file(&file_name) {
                error!("Failed to remove settings file {file_name:?}: {error:?}");
            }
        }

        let settings = ManagerStruct {
            config: load_settings_from_file(&file_name),
            file_name,
        };

        if let Err(error) = save_settings_to_file(&settings.file_name, &settings.config) {
            error!("Failed to save file: {error:?}");
        }

        settings
    }
}

fn resolve_file_name(file_name: &str) -> String {
    if Path::new(file_name).is_absolute() {
        return file_name.to_string();
    }

    let Some(project) = ProjectDirs::from("org", "rtc-diagnostics", env!("CARGO_PKG_NAME")) else {
        warn!("Failed to find user settings path, using {file_name:?} as is");
        return file_name.to_string();
    };

    let folder_path = project.config_dir();
    if let Err(error) = std::fs::create_dir_all(folder_path) {
        error!("Failed to create settings folder: {folder_path:?}, reason: {error:?}");
    }
    folder_path.join(file_name).to_string_lossy().to_string()
}

// Init settings manager with the desired settings file,
// will be created if does not exist
pub fn init(file_name: Option<&str>, reset: bool) {
    let mut manager = MANAGER.lock().unwrap();
    let file_name = file_name.unwrap_or("settings.json");
    manager.content = Some(Manager::new(file_name, reset));
}

fn load_settings_from_file(file_name: &str) -> SettingsStruct {
    let content = match std::fs::read_to_string(file_name) {
        Ok(content) => content,
        Err(error) => {
            debug!("No settings loaded from {file_name:?}, using defaults: {error}");
            return SettingsStruct::default();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|error| {
        warn!("Invalid settings file {file_name:?}, using defaults: {error}");
        SettingsStruct::default()
    })
}

fn save_settings_to_file(file_name: &str, content: &SettingsStruct) -> Result<()> {
    let value = serde_json::to_string_pretty(content)?;
    let mut file = std::fs::File::create(file_name)
        .with_context(|| format!("Failed to create settings file {file_name:?}"))?;
    file.write_all(value.as_bytes())?;
    Ok(())
}

// Save the latest state of the settings
fn save() {
    let manager = MANAGER.lock().unwrap();
    if let Some(content) = &manager.content {
        if let Err(error) = save_settings_to_file(&content.file_name, &content.config) {
            error!(
                "Failed to save settings: file: {:?}, error: {error:?}",
                &content.file_name
            );
        }
    } else {
        warn!("Settings manager not initialized, nothing to save");
    }
}

fn with_settings<T>(read: impl FnOnce(&SettingsStruct) -> T) -> T {
    let manager = MANAGER.lock().unwrap();
    match manager.content.as_ref() {
        Some(content) => read(&content.config),
        None => read(&SettingsStruct::default()),
    }
}

fn update_settings(update: impl FnOnce(&mut SettingsStruct)) {
    // Take care of scope mutex
    {
        let mut manager = MANAGER.lock().unwrap();
        match manager.content.as_mut() {
            Some(content) => update(&mut content.config),
            None => {
                warn!("Settings manager not initialized, update ignored");
                return;
            }
        }
    }
    save();
}

pub fn file_name() -> Option<String> {
    let manager = MANAGER.lock().unwrap();
    manager
        .content
        .as_ref()
        .map(|content| content.file_name.clone())
}

pub fn header() -> HeaderSettingsFile {
    with_settings(|settings| settings.header.clone())
}

pub fn settings() -> SettingsStruct {
    with_settings(SettingsStruct::clone)
}

/// The probe configuration built from the current settings.
pub fn diagnostics_config() -> DiagnosticsConfig {
    with_settings(|settings| DiagnosticsConfig::from(settings))
}

pub fn ice_servers() -> Vec<IceServer> {
    with_settings(|settings| settings.ice_servers.clone())
}

pub fn set_ice_servers(ice_servers: &[IceServer]) {
    update_settings(|settings| settings.ice_servers = ice_servers.to_vec());
}


#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn generate_random_settings_file_name() -> String {
        use rand::Rng;

        let rand_string: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();

        std::env::temp_dir()
            .join(format!("{rand_string}.json"))
            .to_string_lossy()
            .to_string()
    }

    #[test]
    #[serial]
    fn creates_file_with_defaults() {
        let file_name = generate_random_settings_file_name();
        init(Some(&file_name), false);

        assert!(Path::new(&file_name).exists(), "Settings file does not exist");
        assert_eq!(header().name, "RTC Diagnostics");

        let config = diagnostics_config();
        assert_eq!(config, DiagnosticsConfig::default());
        assert_eq!(config.timeout, Duration::from_millis(45_000));
        assert_eq!(config.video_bandwidth.max_bitrate_kbps, 2000.0);
    }

    #[test]
    #[serial]
    fn stores_and_reloads() {
        let file_name = generate_random_settings_file_name();
        init(Some(&file_name), false);

        let servers = vec![IceServer::new("stun:stun.example.org:3478")];
        set_ice_servers(&servers);

        init(Some(&file_name), false);
        assert_eq!(super::file_name(), Some(file_name.clone()));
        assert_eq!(ice_servers(), servers);
        assert_eq!(diagnostics_config().ice_servers, servers);

        init(Some(&file_name), true);
        assert_eq!(settings(), SettingsStruct::default());
    }

    #[test]
    #[serial]
    fn invalid_file_falls_back_to_defaults() {
        let file_name = generate_random_settings_file_name();
        std::fs::write(&file_name, "{ not json").unwrap();

        init(Some(&file_name), false);
        assert_eq!(settings(), SettingsStruct::default());

        let rewritten: SettingsStruct =
            serde_json::from_str(&std::fs::read_to_string(&file_name).unwrap()).unwrap();
        assert_eq!(rewritten, SettingsStruct::default());
    }
}
