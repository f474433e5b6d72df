use crate::audio::DEFAULT_FFT_SIZE;
use crate::keys::PttKey;
use crate::scheduler::DEFAULT_FRAME_INTERVAL;
use shared_types::PttSettings;
use std::time::Duration;

pub const DEFAULT_METER_GAIN: f32 = 6.0;
const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown push-to-talk key: {0}")]
    UnknownKey(String),
    #[error("meter gain must be a positive number, got {0}")]
    InvalidGain(f32),
    #[error("analyser size must be a power of two between 32 and 32768, got {0}")]
    InvalidFftSize(usize),
    #[error("frame interval must be at least 1 ms")]
    InvalidFrameInterval,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterConfig {
    pub gain: f32,
    pub fft_size: usize,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            gain: DEFAULT_METER_GAIN,
            fft_size: DEFAULT_FFT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub ptt_key: PttKey,
    pub meter: MeterConfig,
    pub device: Option<String>,
    pub frame_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ptt_key: PttKey::Space,
            meter: MeterConfig::default(),
            device: None,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &PttSettings) -> Result<Self, ConfigError> {
        let ptt_key = PttKey::parse(&settings.ptt_key)
            .ok_or_else(|| ConfigError::UnknownKey(settings.ptt_key.clone()))?;

        let gain = settings.meter_gain;
        if !gain.is_finite() || gain <= 0.0 {
            return Err(ConfigError::InvalidGain(gain));
        }

        let fft_size = settings.fft_size;
        if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
            return Err(ConfigError::InvalidFftSize(fft_size));
        }

        if settings.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidFrameInterval);
        }

        Ok(Self {
            ptt_key,
            meter: MeterConfig { gain, fft_size },
            device: settings.device_name().map(str::to_string),
            frame_interval: Duration::from_millis(u64::from(settings.frame_interval_ms)),
        })
    }
}
