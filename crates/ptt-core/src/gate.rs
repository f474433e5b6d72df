use crate::audio::{AnalysisNode, CaptureHandle};
use crate::config::MeterConfig;
use crate::meter::MeterLoop;
use crate::scheduler::{FrameId, FrameScheduler};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Read-only view of the gate's live state.
#[derive(Debug, Clone)]
pub struct GateSignal {
    transmitting: Arc<AtomicBool>,
}

impl GateSignal {
    pub(crate) fn new(transmitting: Arc<AtomicBool>) -> Self {
        Self { transmitting }
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting.load(Ordering::SeqCst)
    }
}

/// The single writer of "is the user sending audio". Owns the meter loop so
/// the loop can only run while the gate is on.
#[derive(Debug)]
pub struct TransmissionGate {
    transmitting: Arc<AtomicBool>,
    meter: MeterLoop,
}

impl TransmissionGate {
    pub fn new(config: MeterConfig) -> Self {
        let transmitting = Arc::new(AtomicBool::new(false));
        let meter = MeterLoop::new(GateSignal::new(Arc::clone(&transmitting)), config);
        Self {
            transmitting,
            meter,
        }
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting.load(Ordering::SeqCst)
    }

    pub fn audio_level(&self) -> f32 {
        self.meter.audio_level()
    }

    /// Returns `true` only when the gate actually turned on.
    pub fn start<H, S>(&mut self, capture: Option<&mut H>, scheduler: &mut S) -> bool
    where
        H: CaptureHandle,
        S: FrameScheduler,
    {
        let Some(capture) = capture else {
            return false;
        };
        if self.is_transmitting() {
            return false;
        }

        capture.set_track_enabled(true);
        self.transmitting.store(true, Ordering::SeqCst);
        self.meter.start(scheduler);
        true
    }

    /// Returns `true` only when the gate actually turned off.
    pub fn stop<H, S>(&mut self, capture: Option<&mut H>, scheduler: &mut S) -> bool
    where
        H: CaptureHandle,
        S: FrameScheduler,
    {
        let Some(capture) = capture else {
            return false;
        };
        if !self.is_transmitting() {
            return false;
        }

        capture.set_track_enabled(false);
        self.transmitting.store(false, Ordering::SeqCst);
        self.meter.stop(scheduler);
        true
    }

    /// Teardown path: forces the gate off and cancels the meter whatever the
    /// device state.
    pub(crate) fn halt<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        self.transmitting.store(false, Ordering::SeqCst);
        self.meter.stop(scheduler);
    }

    pub fn tick<A, S>(
        &mut self,
        frame: FrameId,
        analyser: Option<&A>,
        scheduler: &mut S,
    ) -> Option<f32>
    where
        A: AnalysisNode,
        S: FrameScheduler,
    {
        self.meter.tick(frame, analyser, scheduler)
    }
}
