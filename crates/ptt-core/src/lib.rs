mod audio;
mod config;
mod engine;
mod gate;
mod input;
mod keys;
mod meter;
mod scheduler;
mod session;
#[cfg(test)]
mod testing;
mod visual;

pub use audio::{CpalAnalyser, CpalCaptureBackend, CpalCaptureHandle, DEFAULT_FFT_SIZE};
pub use audio::{
    Acquisition, AcquisitionPoll, AcquisitionResolver, AnalysisNode, AudioDevice, CaptureBackend,
    CaptureError, CaptureHandle, CaptureRequest,
};
pub use config::{ConfigError, EngineConfig, MeterConfig, DEFAULT_METER_GAIN};
pub use engine::{PttEngine, PttEventSink};
pub use gate::{GateSignal, TransmissionGate};
pub use input::{Disposition, GateCommand, InputBinding, InputEvent, InputSource};
pub use keys::{KeyListener, KeyListenerError, KeyListenerHandle, PttKey};
pub use meter::{LevelMeter, LevelReading, MeterLoop};
pub use scheduler::{
    FrameId, FrameScheduler, IntervalFrameScheduler, ManualFrameScheduler, DEFAULT_FRAME_INTERVAL,
};
pub use session::{DeviceSession, SessionEvent};
pub use visual::{level_bar, status_label, MeterVisual};
