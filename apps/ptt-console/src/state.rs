use shared_types::{PttSettings, SettingsUpdate};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings format error: {0}")]
    Format(#[from] serde_json::Error),
}

pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = std::env::var("PTT_CONSOLE_CONFIG") {
        return PathBuf::from(path);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("ptt-console")
            .join("settings.json");
    }
    std::env::temp_dir().join("ptt-console").join("settings.json")
}

pub struct SettingsStore {
    path: PathBuf,
    settings: PttSettings,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        let settings = match load_settings(&path) {
            Ok(settings) => settings,
            Err(SettingsError::Io(_)) => PttSettings::default(),
            Err(err) => {
                log::warn!("ignoring {}: {err}", path.display());
                PttSettings::default()
            }
        };
        Self { path, settings }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> PttSettings {
        self.settings.clone()
    }

    pub fn update(&mut self, update: SettingsUpdate) -> Result<PttSettings, SettingsError> {
        self.settings = self.settings.apply_update(update);
        self.persist()?;
        Ok(self.settings.clone())
    }

    fn persist(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(&self.settings)?;
        fs::write(&self.path, payload)?;
        Ok(())
    }
}

fn load_settings(path: &Path) -> Result<PttSettings, SettingsError> {
    let payload = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&payload)?)
}

/// Parses `set <field> <value>` arguments into an update.
pub fn parse_setting(field: &str, value: &str) -> Option<SettingsUpdate> {
    let mut update = SettingsUpdate::default();
    match field {
        "device" | "input_device" => update.input_device = Some(value.to_string()),
        "key" | "ptt_key" => update.ptt_key = Some(value.to_string()),
        "gain" | "meter_gain" => update.meter_gain = Some(value.parse().ok()?),
        "fft" | "fft_size" => update.fft_size = Some(value.parse().ok()?),
        "interval" | "frame_interval_ms" => update.frame_interval_ms = Some(value.parse().ok()?),
        _ => return None,
    }
    Some(update)
}
