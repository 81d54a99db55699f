// Settings management and persistence
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::project::Tempo;
use crate::scheduler::DEFAULT_MAX_CONCURRENT_DECODES;

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Used when the project does not declare a tempo
    pub default_tempo_bpm: f64,
    /// Headroom between pressing play and the first beat, so early clips
    /// are decoded before their start time
    pub schedule_lead_ms: u64,
    pub max_concurrent_decodes: usize,
    pub volume: f32, // 0.0-1.0
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_tempo_bpm: 120.0,
            schedule_lead_ms: 200,
            max_concurrent_decodes: DEFAULT_MAX_CONCURRENT_DECODES,
            volume: 1.0,
        }
    }
}

impl PlaybackSettings {
    /// The configured fallback tempo; an invalid value falls back to 120 BPM
    pub fn default_tempo(&self) -> Tempo {
        Tempo::new(self.default_tempo_bpm).unwrap_or_else(|e| {
            log::warn!("[Settings] {}, using {} BPM", e, Tempo::default().beats_per_minute());
            Tempo::default()
        })
    }

    pub fn schedule_lead_secs(&self) -> f64 {
        self.schedule_lead_ms as f64 / 1000.0
    }
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub playback: PlaybackSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            playback: PlaybackSettings::default(),
        }
    }
}

impl AppSettings {
    /// Default settings file location inside a config directory
    pub fn get_settings_path(config_dir: &Path) -> PathBuf {
        config_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("[Settings] No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let settings: AppSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {:?}", path))?;

        log::info!("[Settings] Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write settings file {:?}", path))?;

        log::info!("[Settings] Saved settings to {:?}", path);
        Ok(())
    }
}
