use crate::audio::{CaptureBackend, CaptureError, CaptureHandle, CaptureRequest};
use crate::config::EngineConfig;
use crate::gate::TransmissionGate;
use crate::input::{Disposition, GateCommand, InputBinding, InputEvent};
use crate::scheduler::{FrameId, FrameScheduler};
use crate::session::{DeviceSession, SessionEvent};
use shared_types::{ConnectionState, DeviceErrorKind, PttEvent, PttSnapshot};
use std::sync::Arc;

/// Receives state, level and device-failure notifications for rendering.
pub trait PttEventSink: Send + Sync {
    fn emit(&self, event: &PttEvent);
}

/// Device, gate and bindings for one channel; they live and die together.
struct ChannelSession<H: CaptureHandle> {
    device: DeviceSession<H>,
    gate: TransmissionGate,
    binding: InputBinding,
}

impl<H: CaptureHandle> ChannelSession<H> {
    fn start<S: FrameScheduler>(&mut self, scheduler: &mut S) -> bool {
        self.gate.start(self.device.capture_mut(), scheduler)
    }

    fn stop<S: FrameScheduler>(&mut self, scheduler: &mut S) -> bool {
        self.gate.stop(self.device.capture_mut(), scheduler)
    }

    fn tick<S: FrameScheduler>(&mut self, frame: FrameId, scheduler: &mut S) -> Option<f32> {
        self.gate.tick(frame, self.device.analyser(), scheduler)
    }

    /// Bindings first so nothing can reach the gate, then the meter, then the
    /// device.
    fn close<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        self.binding.detach();
        self.stop(scheduler);
        self.gate.halt(scheduler);
        self.device.close();
    }

    fn snapshot(&self) -> PttSnapshot {
        PttSnapshot {
            channel_id: Some(self.device.channel_id().to_string()),
            connection: self.device.connection_state(),
            transmitting: self.gate.is_transmitting(),
            audio_level: self.gate.audio_level(),
        }
    }
}

/// Push-to-talk engine for the channel the host currently has selected.
///
/// Single-threaded: the host calls `poll` from its event loop to deliver
/// acquisition results and display ticks.
pub struct PttEngine<B: CaptureBackend, S: FrameScheduler> {
    backend: B,
    scheduler: S,
    config: EngineConfig,
    active: Option<ChannelSession<B::Handle>>,
    sink: Option<Arc<dyn PttEventSink>>,
}

impl<B: CaptureBackend, S: FrameScheduler> PttEngine<B, S> {
    pub fn new(backend: B, scheduler: S, config: EngineConfig) -> Self {
        Self {
            backend,
            scheduler,
            config,
            active: None,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PttEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the configuration used by the next `open`. The active session
    /// keeps the settings it was opened with.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|session| session.device.channel_id())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.active
            .as_ref()
            .map(|session| session.device.connection_state())
            .unwrap_or(ConnectionState::Closed)
    }

    /// Why the current channel's microphone could not be opened, if it failed.
    pub fn failure(&self) -> Option<&CaptureError> {
        self.active
            .as_ref()
            .and_then(|session| session.device.failure())
    }

    pub fn is_transmitting(&self) -> bool {
        self.active
            .as_ref()
            .map(|session| session.gate.is_transmitting())
            .unwrap_or(false)
    }

    pub fn audio_level(&self) -> f32 {
        self.active
            .as_ref()
            .map(|session| session.gate.audio_level())
            .unwrap_or(0.0)
    }

    /// Gestures seen by the current channel's bindings.
    pub fn gestures(&self) -> u64 {
        self.active
            .as_ref()
            .map(|session| session.binding.gestures())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> PttSnapshot {
        self.active
            .as_ref()
            .map(ChannelSession::snapshot)
            .unwrap_or_default()
    }

    /// Starts a fresh session for `channel_id`, tearing down the previous one
    /// first. Reopening the same channel is also a fresh session.
    pub fn open(&mut self, channel_id: impl Into<String>) {
        let channel_id = channel_id.into();
        self.retire_active();

        let request = CaptureRequest {
            channel_id,
            device: self.config.device.clone(),
        };
        let device = DeviceSession::open(&self.backend, request, self.config.meter.fft_size);
        self.active = Some(ChannelSession {
            device,
            gate: TransmissionGate::new(self.config.meter),
            binding: InputBinding::new(self.config.ptt_key),
        });
        self.emit_state();
    }

    /// Stops transmission and releases the device. Does nothing on a session
    /// that is already closed.
    pub fn close(&mut self) {
        let Some(session) = self.active.as_mut() else {
            return;
        };
        let before = session.snapshot();
        session.close(&mut self.scheduler);
        if session.snapshot() != before {
            log::info!("closed channel {}", session.device.channel_id());
            self.emit_state();
        }
    }

    pub fn start(&mut self) -> bool {
        let changed = match self.active.as_mut() {
            Some(session) => session.start(&mut self.scheduler),
            None => false,
        };
        if changed {
            self.emit_state();
        }
        changed
    }

    pub fn stop(&mut self) -> bool {
        let changed = match self.active.as_mut() {
            Some(session) => session.stop(&mut self.scheduler),
            None => false,
        };
        if changed {
            self.emit_state();
        }
        changed
    }

    /// Routes a gesture through the current channel's bindings. Without an
    /// active channel nothing is bound and the event passes through.
    pub fn handle_input(&mut self, event: InputEvent) -> Disposition {
        let Some(session) = self.active.as_mut() else {
            return Disposition::default();
        };
        let disposition = session.binding.handle(event);
        match disposition.command {
            Some(GateCommand::Start) => {
                self.start();
            }
            Some(GateCommand::Stop) => {
                self.stop();
            }
            None => {}
        }
        disposition
    }

    /// Delivers finished acquisitions and runs every due meter tick.
    pub fn poll(&mut self) {
        let mut events = Vec::new();

        if let Some(session) = self.active.as_mut() {
            match session.device.poll() {
                Some(SessionEvent::Connected) => events.push(PttEvent::StateChanged {
                    snapshot: session.snapshot(),
                }),
                Some(SessionEvent::Failed(err)) => {
                    events.push(device_error_event(session.device.channel_id(), &err));
                    events.push(PttEvent::StateChanged {
                        snapshot: session.snapshot(),
                    });
                }
                None => {}
            }
        }

        for frame in self.scheduler.due_frames() {
            let Some(session) = self.active.as_mut() else {
                break;
            };
            if let Some(level) = session.tick(frame, &mut self.scheduler) {
                events.push(PttEvent::Level {
                    channel_id: session.device.channel_id().to_string(),
                    level,
                });
            }
        }

        for event in &events {
            self.emit(event);
        }
    }

    fn retire_active(&mut self) {
        if let Some(mut previous) = self.active.take() {
            previous.close(&mut self.scheduler);
            log::info!("left channel {}", previous.device.channel_id());
        }
    }

    fn emit_state(&self) {
        self.emit(&PttEvent::StateChanged {
            snapshot: self.snapshot(),
        });
    }

    fn emit(&self, event: &PttEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }
}

impl<B: CaptureBackend, S: FrameScheduler> Drop for PttEngine<B, S> {
    fn drop(&mut self) {
        self.retire_active();
    }
}

fn device_error_event(channel_id: &str, err: &CaptureError) -> PttEvent {
    let kind = match err {
        CaptureError::PermissionDenied(_) => DeviceErrorKind::PermissionDenied,
        CaptureError::DeviceUnavailable => DeviceErrorKind::DeviceUnavailable,
        CaptureError::Backend(_) => DeviceErrorKind::DeviceFailure,
    };
    PttEvent::DeviceError {
        channel_id: channel_id.to_string(),
        kind,
        message: err.to_string(),
    }
}
