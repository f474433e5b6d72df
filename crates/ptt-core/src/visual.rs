use crate::keys::PttKey;
use shared_types::{ConnectionState, PttSnapshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterVisual {
    pub scale: f32,
    pub glow_radius: u32,
    pub glow_alpha: f32,
}

impl MeterVisual {
    pub const fn idle() -> Self {
        Self {
            scale: 1.0,
            glow_radius: 0,
            glow_alpha: 0.0,
        }
    }

    /// Button styling for the talk control; flat unless transmitting.
    pub fn from_snapshot(snapshot: &PttSnapshot) -> Self {
        if !snapshot.transmitting {
            return Self::idle();
        }
        let level = snapshot.audio_level.clamp(0.0, 1.0);
        Self {
            scale: 1.0 + level * 0.28,
            glow_radius: (8.0 + level * 30.0).round() as u32,
            glow_alpha: 0.35 + level * 0.65,
        }
    }
}

pub fn status_label(snapshot: &PttSnapshot, key: PttKey) -> String {
    match snapshot.connection {
        ConnectionState::Connecting => "Connecting microphone…".to_string(),
        ConnectionState::Denied => "Microphone access denied.".to_string(),
        ConnectionState::Closed => "Microphone closed.".to_string(),
        ConnectionState::Connected if snapshot.transmitting => "Transmitting…".to_string(),
        ConnectionState::Connected => format!("Hold to talk · {}", key.label()),
    }
}

/// Fixed-width text meter, e.g. `[#####-----]`.
pub fn level_bar(level: f32, width: usize) -> String {
    let filled = ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}
