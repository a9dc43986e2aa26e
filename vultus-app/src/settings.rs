//! Persistent application settings (JSON file in the data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vultus_core::SessionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub server_url: String,
    pub preferred_input_device: Option<String>,
    pub vad_threshold: f32,
    pub noise_gate: f32,
    pub gate_enabled: bool,
    pub transition_rate: f32,
    /// WAV file whose amplitude envelope drives the mouth when no live
    /// playback level is available.
    pub lipsync_wav_path: Option<PathBuf>,
    /// JSON file mapping emotion names to parameter targets.
    pub emotion_table_path: Option<PathBuf>,
    /// JSON file mapping motion keys to motion-group entries.
    pub motion_map_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:12393/client-ws".into(),
            preferred_input_device: None,
            vad_threshold: 0.015,
            noise_gate: 0.005,
            gate_enabled: true,
            transition_rate: 5.0,
            lipsync_wav_path: None,
            emotion_table_path: None,
            motion_map_path: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.server_url = self.server_url.trim().to_string();
        self.vad_threshold = self.vad_threshold.clamp(0.0, 1.0);
        self.noise_gate = self.noise_gate.clamp(0.0, 1.0);
        self.transition_rate = self.transition_rate.clamp(0.1, 100.0);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            server_url: self.server_url.clone(),
            transition_rate: self.transition_rate,
            lipsync_wav_path: self.lipsync_wav_path.clone(),
            ..SessionConfig::default()
        };
        config.capture.vad_threshold = self.vad_threshold;
        config.capture.noise_gate = self.noise_gate;
        config.capture.gate_enabled = self.gate_enabled;
        config.capture.preferred_input_device = self.preferred_input_device.clone();
        config
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Vultus")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("vultus")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
