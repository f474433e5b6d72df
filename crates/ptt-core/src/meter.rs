use crate::audio::AnalysisNode;
use crate::config::MeterConfig;
use crate::gate::GateSignal;
use crate::scheduler::{FrameId, FrameScheduler};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    /// Gain-scaled RMS clamped to `[0, 1]`; what the host renders.
    pub level: f32,
    pub rms: f32,
    pub peak: f32,
}

impl LevelReading {
    pub const fn silence() -> Self {
        Self {
            level: 0.0,
            rms: 0.0,
            peak: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LevelMeter {
    gain: f32,
    reading: LevelReading,
}

impl LevelMeter {
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            reading: LevelReading::silence(),
        }
    }

    /// Consumes analyser bytes, where 128 is the zero line.
    pub fn update(&mut self, samples: &[u8]) {
        if samples.is_empty() {
            return;
        }

        let mut peak = 0.0_f32;
        let mut sum = 0.0_f32;
        for &byte in samples {
            let value = (byte as f32 - 128.0) / 128.0;
            peak = peak.max(value.abs());
            sum += value * value;
        }

        let rms = (sum / samples.len() as f32).sqrt();
        let level = (rms * self.gain).clamp(0.0, 1.0);

        self.reading = LevelReading { level, rms, peak };
    }

    pub fn reading(&self) -> LevelReading {
        self.reading
    }

    pub fn reset(&mut self) {
        self.reading = LevelReading::silence();
    }
}

/// Samples the analysis node once per display tick while the gate is on.
#[derive(Debug)]
pub struct MeterLoop {
    gate: GateSignal,
    meter: LevelMeter,
    buffer: Vec<u8>,
    loop_handle: Option<FrameId>,
}

impl MeterLoop {
    pub fn new(gate: GateSignal, config: MeterConfig) -> Self {
        Self {
            gate,
            meter: LevelMeter::new(config.gain),
            buffer: vec![128; config.fft_size],
            loop_handle: None,
        }
    }

    pub fn audio_level(&self) -> f32 {
        self.meter.reading().level
    }

    /// Arms the first tick. Returns `false` when a loop is already scheduled.
    pub fn start<S: FrameScheduler>(&mut self, scheduler: &mut S) -> bool {
        if self.loop_handle.is_some() {
            return false;
        }
        let frame = scheduler.request_frame();
        log::debug!("level meter armed ({frame:?})");
        self.loop_handle = Some(frame);
        true
    }

    pub fn stop<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        if let Some(frame) = self.loop_handle.take() {
            scheduler.cancel_frame(frame);
        }
        self.meter.reset();
    }

    /// Runs one iteration for `frame`. Frames other than the armed one are ignored.
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
        if self.loop_handle != Some(frame) {
            return None;
        }
        self.loop_handle = None;

        let Some(analyser) = analyser.filter(|_| self.gate.is_transmitting()) else {
            self.meter.reset();
            return None;
        };

        let fft_size = analyser.fft_size();
        if self.buffer.len() != fft_size {
            self.buffer.resize(fft_size, 128);
        }
        analyser.byte_time_domain_data(&mut self.buffer);
        self.meter.update(&self.buffer);
        self.loop_handle = Some(scheduler.request_frame());

        Some(self.audio_level())
    }
}

#[cfg(test)]
mod tests {
    use super::{LevelMeter, LevelReading, MeterLoop};
    use crate::audio::CaptureHandle;
    use crate::config::MeterConfig;
    use crate::gate::GateSignal;
    use crate::scheduler::{FrameScheduler, ManualFrameScheduler};
    use crate::testing::{loud_samples, MockCapture};
    use approx::assert_relative_eq;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    fn meter_loop(flag: &Arc<AtomicBool>) -> MeterLoop {
        MeterLoop::new(GateSignal::new(Arc::clone(flag)), MeterConfig::default())
    }

    #[test]
    fn meter_reports_silence_for_empty_samples() {
        let mut meter = LevelMeter::new(6.0);
        meter.update(&[]);
        assert_eq!(meter.reading(), LevelReading::silence());
    }

    #[test]
    fn meter_centers_bytes_before_rms() {
        let mut meter = LevelMeter::new(1.0);
        meter.update(&[128, 192, 64]);
        let reading = meter.reading();
        assert_relative_eq!(reading.peak, 0.5, epsilon = 1e-6);
        assert_relative_eq!(reading.rms, (1.0 / 6.0_f32).sqrt(), epsilon = 1e-6);
        assert_relative_eq!(reading.level, reading.rms, epsilon = 1e-6);
    }

    #[test]
    fn meter_applies_gain_and_clamps() {
        let mut meter = LevelMeter::new(6.0);
        meter.update(&[138, 118]);
        assert_relative_eq!(meter.reading().level, 6.0 * 10.0 / 128.0, epsilon = 1e-5);

        meter.update(&[255, 0]);
        assert_relative_eq!(meter.reading().level, 1.0);
    }

    #[test]
    fn flat_signal_reads_zero() {
        let mut meter = LevelMeter::new(6.0);
        meter.update(&[128; 256]);
        assert_eq!(meter.reading().level, 0.0);
    }

    #[test]
    fn loop_rearms_while_gate_is_on() {
        let flag = Arc::new(AtomicBool::new(true));
        let capture = MockCapture::new();
        capture.set_samples(loud_samples(256));
        let analyser = capture.handle().connect_analyser(256).expect("analyser");
        let mut scheduler = ManualFrameScheduler::new();
        let mut meter = meter_loop(&flag);

        assert!(meter.start(&mut scheduler));
        assert!(!meter.start(&mut scheduler));
        assert_eq!(scheduler.requested(), 1);

        let frame = scheduler.due_frames()[0];
        let level = meter.tick(frame, Some(&analyser), &mut scheduler);
        assert_eq!(level, Some(1.0));
        assert_eq!(scheduler.pending().len(), 1);
        assert_eq!(scheduler.requested(), 2);
    }

    #[test]
    fn loop_reads_live_gate_state_each_tick() {
        let flag = Arc::new(AtomicBool::new(true));
        let capture = MockCapture::new();
        capture.set_samples(loud_samples(256));
        let analyser = capture.handle().connect_analyser(256).expect("analyser");
        let mut scheduler = ManualFrameScheduler::new();
        let mut meter = meter_loop(&flag);
        meter.start(&mut scheduler);

        flag.store(false, Ordering::SeqCst);
        let frame = scheduler.due_frames()[0];
        assert_eq!(meter.tick(frame, Some(&analyser), &mut scheduler), None);
        assert_eq!(capture.analyser_reads(), 0);
        assert!(scheduler.pending().is_empty());
        assert!(meter.start(&mut scheduler));
    }

    #[test]
    fn stop_cancels_scheduled_tick_and_resets_level() {
        let flag = Arc::new(AtomicBool::new(true));
        let capture = MockCapture::new();
        capture.set_samples(loud_samples(256));
        let analyser = capture.handle().connect_analyser(256).expect("analyser");
        let mut scheduler = ManualFrameScheduler::new();
        let mut meter = meter_loop(&flag);
        meter.start(&mut scheduler);
        let frame = scheduler.due_frames()[0];
        meter.tick(frame, Some(&analyser), &mut scheduler);
        assert!(meter.audio_level() > 0.0);

        meter.stop(&mut scheduler);
        assert_eq!(meter.audio_level(), 0.0);
        assert_eq!(scheduler.cancelled(), 1);
        assert!(scheduler.due_frames().is_empty());

        assert_eq!(meter.tick(frame, Some(&analyser), &mut scheduler), None);
        assert_eq!(capture.analyser_reads(), 1);
    }
}
