use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Denied,
    #[default]
    Closed,
}

impl ConnectionState {
    /// `Denied` and `Closed` only leave through a fresh `open`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Denied | ConnectionState::Closed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PttSnapshot {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub connection: ConnectionState,
    #[serde(default)]
    pub transmitting: bool,
    #[serde(default)]
    pub audio_level: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorKind {
    PermissionDenied,
    DeviceUnavailable,
    DeviceFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PttEvent {
    StateChanged { snapshot: PttSnapshot },
    Level { channel_id: String, level: f32 },
    DeviceError {
        channel_id: String,
        kind: DeviceErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct PttSettings {
    pub input_device: String,
    pub ptt_key: String,
    pub meter_gain: f32,
    pub fft_size: usize,
    pub frame_interval_ms: u16,
}

impl Default for PttSettings {
    fn default() -> Self {
        Self {
            input_device: "default".to_string(),
            ptt_key: "space".to_string(),
            meter_gain: 6.0,
            fft_size: 256,
            frame_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub input_device: Option<String>,
    #[serde(default)]
    pub ptt_key: Option<String>,
    #[serde(default)]
    pub meter_gain: Option<f32>,
    #[serde(default)]
    pub fft_size: Option<usize>,
    #[serde(default)]
    pub frame_interval_ms: Option<u16>,
}

impl PttSettings {
    pub fn apply_update(&self, update: SettingsUpdate) -> Self {
        Self {
            input_device: update
                .input_device
                .unwrap_or_else(|| self.input_device.clone()),
            ptt_key: update.ptt_key.unwrap_or_else(|| self.ptt_key.clone()),
            meter_gain: update.meter_gain.unwrap_or(self.meter_gain),
            fft_size: update.fft_size.unwrap_or(self.fft_size),
            frame_interval_ms: update.frame_interval_ms.unwrap_or(self.frame_interval_ms),
        }
    }

    /// `None` when the default input device should be used.
    pub fn device_name(&self) -> Option<&str> {
        let name = self.input_device.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("default") {
            None
        } else {
            Some(name)
        }
    }
}
