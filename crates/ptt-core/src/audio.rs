use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc, Mutex,
};

pub const DEFAULT_FFT_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("no input device available")]
    DeviceUnavailable,
    #[error("audio backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub channel_id: String,
    pub device: Option<String>,
}

/// Live view onto a capture handle's signal. Reading never alters the audio.
pub trait AnalysisNode {
    fn fft_size(&self) -> usize;

    /// Fills `data` with the latest time-domain samples as bytes centred on 128.
    fn byte_time_domain_data(&self, data: &mut [u8]);

    fn disconnect(&mut self);
}

pub trait CaptureHandle {
    type Analyser: AnalysisNode;

    fn set_track_enabled(&mut self, enabled: bool);
    fn connect_analyser(&mut self, fft_size: usize) -> Result<Self::Analyser, CaptureError>;

    /// Releases the device. Calling it again does nothing.
    fn stop(&mut self);
}

pub trait CaptureBackend {
    type Handle: CaptureHandle;

    fn list_input_devices(&self) -> Result<Vec<AudioDevice>, CaptureError>;
    fn request_capture(&self, request: &CaptureRequest) -> Acquisition<Self::Handle>;
}

pub enum AcquisitionPoll<H> {
    Pending,
    Ready(Result<H, CaptureError>),
}

/// One-shot handoff of a capture handle from the backend to its session.
pub struct Acquisition<H> {
    receiver: mpsc::Receiver<Result<H, CaptureError>>,
}

pub struct AcquisitionResolver<H: CaptureHandle> {
    sender: mpsc::Sender<Result<H, CaptureError>>,
}

impl<H: CaptureHandle> Acquisition<H> {
    pub fn pending() -> (Self, AcquisitionResolver<H>) {
        let (sender, receiver) = mpsc::channel();
        (Self { receiver }, AcquisitionResolver { sender })
    }

    pub fn ready(result: Result<H, CaptureError>) -> Self {
        let (acquisition, resolver) = Self::pending();
        resolver.resolve(result);
        acquisition
    }

    pub fn poll(&self) -> AcquisitionPoll<H> {
        match self.receiver.try_recv() {
            Ok(result) => AcquisitionPoll::Ready(result),
            Err(mpsc::TryRecvError::Empty) => AcquisitionPoll::Pending,
            Err(mpsc::TryRecvError::Disconnected) => AcquisitionPoll::Ready(Err(
                CaptureError::Backend("capture request was abandoned".to_string()),
            )),
        }
    }
}

impl<H: CaptureHandle> AcquisitionResolver<H> {
    pub fn resolve(self, result: Result<H, CaptureError>) {
        if let Err(mpsc::SendError(Ok(mut handle))) = self.sender.send(result) {
            log::debug!("capture request dropped before completion; releasing device");
            handle.stop();
        }
    }
}

fn normalize_u16_sample(value: u16) -> f32 {
    let midpoint = (u16::MAX as f32 + 1.0) / 2.0;
    (value as f32 - midpoint) / midpoint
}

fn normalize_i16_sample(value: i16) -> f32 {
    value as f32 / i16::MAX as f32
}

fn sample_to_byte(sample: f32) -> u8 {
    (sample.clamp(-1.0, 1.0) * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8
}

#[derive(Debug)]
struct TapBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

/// Mono ring of the most recent samples, shared with the input callback.
#[derive(Debug, Clone)]
struct SampleTap {
    enabled: Arc<AtomicBool>,
    buffer: Arc<Mutex<TapBuffer>>,
}

impl SampleTap {
    fn new(capacity: usize) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            buffer: Arc::new(Mutex::new(TapBuffer {
                samples: VecDeque::with_capacity(capacity),
                capacity,
            })),
        }
    }

    fn set_capacity(&self, capacity: usize) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.capacity = capacity;
            while buffer.samples.len() > capacity {
                buffer.samples.pop_front();
            }
        }
    }

    fn push_interleaved<T: Copy>(&self, data: &[T], channels: usize, convert: fn(T) -> f32) {
        let enabled = self.enabled.load(Ordering::SeqCst);
        let Ok(mut buffer) = self.buffer.lock() else {
            return;
        };
        for frame in data.chunks(channels.max(1)) {
            let sample = if enabled {
                frame.iter().map(|value| convert(*value)).sum::<f32>() / frame.len() as f32
            } else {
                0.0
            };
            if buffer.samples.len() >= buffer.capacity {
                buffer.samples.pop_front();
            }
            buffer.samples.push_back(sample);
        }
    }

    fn copy_bytes(&self, data: &mut [u8]) {
        data.fill(128);
        let Ok(buffer) = self.buffer.lock() else {
            return;
        };
        let available = buffer.samples.len().min(data.len());
        let offset = data.len() - available;
        let skip = buffer.samples.len() - available;
        for (slot, sample) in data[offset..]
            .iter_mut()
            .zip(buffer.samples.iter().skip(skip))
        {
            *slot = sample_to_byte(*sample);
        }
    }

    fn clear(&self) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.samples.clear();
        }
    }
}

pub struct CpalCaptureBackend {
    host: cpal::Host,
}

impl Default for CpalCaptureBackend {
    fn default() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

pub struct CpalCaptureHandle {
    stream: Option<cpal::Stream>,
    tap: SampleTap,
}

pub struct CpalAnalyser {
    tap: Option<SampleTap>,
    fft_size: usize,
}

impl AnalysisNode for CpalAnalyser {
    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn byte_time_domain_data(&self, data: &mut [u8]) {
        match &self.tap {
            Some(tap) => tap.copy_bytes(data),
            None => data.fill(128),
        }
    }

    fn disconnect(&mut self) {
        self.tap = None;
    }
}

impl CaptureHandle for CpalCaptureHandle {
    type Analyser = CpalAnalyser;

    fn set_track_enabled(&mut self, enabled: bool) {
        self.tap.enabled.store(enabled, Ordering::SeqCst);
    }

    fn connect_analyser(&mut self, fft_size: usize) -> Result<CpalAnalyser, CaptureError> {
        if self.stream.is_none() {
            return Err(CaptureError::Backend("capture stream already stopped".to_string()));
        }
        self.tap.set_capacity(fft_size);
        Ok(CpalAnalyser {
            tap: Some(self.tap.clone()),
            fft_size,
        })
    }

    fn stop(&mut self) {
        self.tap.enabled.store(false, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::warn!("failed to pause input stream: {err}");
            }
            self.tap.clear();
        }
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CpalCaptureBackend {
    fn find_device(&self, name: Option<&str>) -> Result<cpal::Device, CaptureError> {
        let Some(name) = name else {
            return self
                .host
                .default_input_device()
                .ok_or(CaptureError::DeviceUnavailable);
        };

        let devices = self
            .host
            .input_devices()
            .map_err(|err| CaptureError::Backend(err.to_string()))?;
        for device in devices {
            if device.name().map(|found| found == name).unwrap_or(false) {
                return Ok(device);
            }
        }
        Err(CaptureError::DeviceUnavailable)
    }

    fn open_stream(&self, request: &CaptureRequest) -> Result<CpalCaptureHandle, CaptureError> {
        let device = self.find_device(request.device.as_deref())?;
        let default_config = device.default_input_config().map_err(|err| match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
            other => classify_backend_message(other.to_string()),
        })?;
        let stream_config: cpal::StreamConfig = default_config.clone().into();
        let tap = SampleTap::new(DEFAULT_FFT_SIZE);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_tapped_stream::<f32>(&device, &stream_config, tap.clone(), |value| value)?
            }
            cpal::SampleFormat::I16 => build_tapped_stream::<i16>(
                &device,
                &stream_config,
                tap.clone(),
                normalize_i16_sample,
            )?,
            cpal::SampleFormat::U16 => build_tapped_stream::<u16>(
                &device,
                &stream_config,
                tap.clone(),
                normalize_u16_sample,
            )?,
            other => {
                return Err(CaptureError::Backend(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|err| classify_backend_message(err.to_string()))?;

        log::info!(
            "opened input stream for channel {} ({} Hz, {} channels)",
            request.channel_id,
            stream_config.sample_rate.0,
            stream_config.channels
        );
        Ok(CpalCaptureHandle {
            stream: Some(stream),
            tap,
        })
    }
}

fn build_tapped_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tap: SampleTap,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample + 'static,
{
    let channels = usize::from(config.channels);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                tap.push_interleaved(data, channels, convert)
            },
            |err| log::warn!("audio input stream error: {err}"),
            None,
        )
        .map_err(|err| match err {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
            other => classify_backend_message(other.to_string()),
        })
}

fn classify_backend_message(message: String) -> CaptureError {
    let lowered = message.to_ascii_lowercase();
    if ["permission", "denied", "not authorized", "not permitted"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::Backend(message)
    }
}

impl CaptureBackend for CpalCaptureBackend {
    type Handle = CpalCaptureHandle;

    fn list_input_devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        let mut devices = Vec::new();
        for (index, device) in self
            .host
            .input_devices()
            .map_err(|err| CaptureError::Backend(err.to_string()))?
            .enumerate()
        {
            let name = device
                .name()
                .map_err(|err| CaptureError::Backend(err.to_string()))?;
            devices.push(AudioDevice {
                id: format!("{}:{}", index, name),
                name,
            });
        }
        Ok(devices)
    }

    fn request_capture(&self, request: &CaptureRequest) -> Acquisition<CpalCaptureHandle> {
        Acquisition::ready(self.open_stream(request))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        classify_backend_message, normalize_u16_sample, sample_to_byte, Acquisition,
        AcquisitionPoll, CaptureError, SampleTap,
    };
    use crate::testing::MockCapture;

    #[test]
    fn u16_normalization_centers_at_zero() {
        let min = normalize_u16_sample(u16::MIN);
        let mid = normalize_u16_sample(0x8000);
        let max = normalize_u16_sample(u16::MAX);

        assert!((min + 1.0).abs() < 1e-6);
        assert!(mid.abs() < 1e-6);
        assert!(max <= 1.0);
        assert!(max > 0.99);
    }

    #[test]
    fn byte_conversion_matches_analyser_layout() {
        assert_eq!(sample_to_byte(0.0), 128);
        assert_eq!(sample_to_byte(-1.0), 0);
        assert_eq!(sample_to_byte(1.0), 255);
        assert_eq!(sample_to_byte(4.0), 255);
    }

    #[test]
    fn tap_keeps_latest_mono_frames() {
        let tap = SampleTap::new(2);
        tap.enabled.store(true, std::sync::atomic::Ordering::SeqCst);
        tap.push_interleaved(&[0.5_f32, 0.5, -1.0, -1.0, 1.0, 0.0], 2, |value| value);

        let mut data = [0_u8; 4];
        tap.copy_bytes(&mut data);
        assert_eq!(data, [128, 128, 0, 192]);
    }

    #[test]
    fn disabled_tap_records_silence() {
        let tap = SampleTap::new(4);
        tap.push_interleaved(&[1.0_f32, 1.0], 1, |value| value);

        let mut data = [0_u8; 2];
        tap.copy_bytes(&mut data);
        assert_eq!(data, [128, 128]);
    }

    #[test]
    fn acquisition_stays_pending_until_resolved() {
        let (acquisition, resolver) = Acquisition::pending();
        assert!(matches!(acquisition.poll(), AcquisitionPoll::Pending));

        let capture = MockCapture::new();
        resolver.resolve(Ok(capture.handle()));
        assert!(matches!(acquisition.poll(), AcquisitionPoll::Ready(Ok(_))));
    }

    #[test]
    fn resolver_releases_handle_when_request_was_dropped() {
        let (acquisition, resolver) = Acquisition::pending();
        drop(acquisition);

        let capture = MockCapture::new();
        resolver.resolve(Ok(capture.handle()));
        assert!(capture.is_stopped());
    }

    #[test]
    fn abandoned_request_reports_backend_error() {
        let (acquisition, resolver) = Acquisition::<crate::testing::MockHandle>::pending();
        drop(resolver);
        assert!(matches!(
            acquisition.poll(),
            AcquisitionPoll::Ready(Err(CaptureError::Backend(_)))
        ));
    }

    #[test]
    fn backend_messages_about_permissions_are_denials() {
        assert!(matches!(
            classify_backend_message("Permission denied by user".to_string()),
            CaptureError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_backend_message("ALSA function failed".to_string()),
            CaptureError::Backend(_)
        ));
    }
}
