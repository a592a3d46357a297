//! Azand configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::prayer::Prayer;

/// Main azand configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Location used to resolve prayer times
    pub location: LocationConfig,

    /// Speaker connection and playback volume
    pub speaker: SpeakerConfig,

    /// Per-prayer enablement and azan track
    pub prayers: PrayersConfig,

    /// Web control surface
    pub web: WebConfig,

    /// Storage paths
    pub storage: StorageConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks the fields the daemon cannot run without. Call this early in
    /// startup to fail fast with clear error messages. A missing track for a
    /// single prayer is deliberately NOT fatal here - that surfaces per job.
    pub fn validate(&self) -> Result<()> {
        if self.location.city.trim().is_empty() {
            return Err(eyre::eyre!("location.city must be set"));
        }
        if self.location.country.trim().is_empty() {
            return Err(eyre::eyre!("location.country must be set"));
        }
        if self.speaker.address.is_none() && self.speaker.name.is_none() {
            return Err(eyre::eyre!(
                "speaker.address or speaker.name must be set to reach the Sonos"
            ));
        }
        if self.speaker.volume > 100 {
            return Err(eyre::eyre!(
                "speaker.volume must be 0-100, got {}",
                self.speaker.volume
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .azand.yml
        let local_config = PathBuf::from(".azand.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/azand/azand.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("azand").join("azand.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Location for the Aladhan prayer-times lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// City name
    pub city: String,

    /// Country name
    pub country: String,

    /// Aladhan calculation method id
    pub method: u32,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            city: "Huddinge".to_string(),
            country: "Sweden".to_string(),
            method: 1,
        }
    }
}

/// Speaker connection and volume
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Speaker IP address; skips discovery when set
    pub address: Option<String>,

    /// Room name used to pick a speaker during discovery
    pub name: Option<String>,

    /// Playback volume (0-100)
    pub volume: u8,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            address: None,
            name: None,
            volume: 30,
        }
    }
}

/// Per-prayer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrayerTrackConfig {
    /// Whether the azan plays for this prayer
    pub enabled: bool,

    /// Track reference, `scheme:identifier` (e.g. `spotify:track:<id>`)
    pub track: Option<String>,
}

/// Enablement and track for each of the five prayers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrayersConfig {
    pub fajr: PrayerTrackConfig,
    pub dhuhr: PrayerTrackConfig,
    pub asr: PrayerTrackConfig,
    pub maghrib: PrayerTrackConfig,
    pub isha: PrayerTrackConfig,
}

impl PrayersConfig {
    /// Per-prayer settings lookup
    pub fn get(&self, prayer: Prayer) -> &PrayerTrackConfig {
        match prayer {
            Prayer::Fajr => &self.fajr,
            Prayer::Dhuhr => &self.dhuhr,
            Prayer::Asr => &self.asr,
            Prayer::Maghrib => &self.maghrib,
            Prayer::Isha => &self.isha,
        }
    }
}

/// Web control surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the shared override record
    #[serde(rename = "state-file")]
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/azand on Linux)
        let state_file = dirs::data_dir()
            .map(|d| d.join("azand"))
            .unwrap_or_else(|| PathBuf::from(".azand"))
            .join("override.json");

        Self { state_file }
    }
}
