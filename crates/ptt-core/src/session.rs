use crate::audio::{
    Acquisition, AcquisitionPoll, AnalysisNode, CaptureBackend, CaptureError, CaptureHandle,
    CaptureRequest,
};
use shared_types::ConnectionState;

enum DeviceState<H: CaptureHandle> {
    Connecting(Acquisition<H>),
    Connected {
        capture: H,
        analyser: H::Analyser,
    },
    Denied(CaptureError),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Failed(CaptureError),
}

/// Owns one channel's microphone and the analysis node reading it.
///
/// The capture handle and analyser exist only in the connected state, so
/// they are present exactly when `connection_state()` is `Connected`.
pub struct DeviceSession<H: CaptureHandle> {
    channel_id: String,
    fft_size: usize,
    state: DeviceState<H>,
    /// A request still in flight when the session was closed.
    stale: Option<Acquisition<H>>,
}

impl<H: CaptureHandle> DeviceSession<H> {
    pub fn open<B>(backend: &B, request: CaptureRequest, fft_size: usize) -> Self
    where
        B: CaptureBackend<Handle = H>,
    {
        log::info!("requesting microphone for channel {}", request.channel_id);
        let acquisition = backend.request_capture(&request);
        Self {
            channel_id: request.channel_id,
            fft_size,
            state: DeviceState::Connecting(acquisition),
            stale: None,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self.state {
            DeviceState::Connecting(_) => ConnectionState::Connecting,
            DeviceState::Connected { .. } => ConnectionState::Connected,
            DeviceState::Denied(_) => ConnectionState::Denied,
            DeviceState::Closed => ConnectionState::Closed,
        }
    }

    pub fn failure(&self) -> Option<&CaptureError> {
        match &self.state {
            DeviceState::Denied(err) => Some(err),
            _ => None,
        }
    }

    pub fn capture_mut(&mut self) -> Option<&mut H> {
        match &mut self.state {
            DeviceState::Connected { capture, .. } => Some(capture),
            _ => None,
        }
    }

    pub fn analyser(&self) -> Option<&H::Analyser> {
        match &self.state {
            DeviceState::Connected { analyser, .. } => Some(analyser),
            _ => None,
        }
    }

    /// Advances a pending acquisition. Reports the outcome once.
    pub fn poll(&mut self) -> Option<SessionEvent> {
        self.reap_stale();

        let polled = match &self.state {
            DeviceState::Connecting(acquisition) => acquisition.poll(),
            _ => return None,
        };

        match polled {
            AcquisitionPoll::Pending => None,
            AcquisitionPoll::Ready(Ok(capture)) => Some(self.connect(capture)),
            AcquisitionPoll::Ready(Err(err)) => Some(self.deny(err)),
        }
    }

    fn connect(&mut self, mut capture: H) -> SessionEvent {
        capture.set_track_enabled(false);
        match capture.connect_analyser(self.fft_size) {
            Ok(analyser) => {
                log::info!(
                    "microphone connected for channel {} (analyser size {})",
                    self.channel_id,
                    analyser.fft_size()
                );
                self.state = DeviceState::Connected { capture, analyser };
                SessionEvent::Connected
            }
            Err(err) => {
                capture.stop();
                self.deny(err)
            }
        }
    }

    fn deny(&mut self, err: CaptureError) -> SessionEvent {
        log::warn!("microphone unavailable for channel {}: {err}", self.channel_id);
        self.state = DeviceState::Denied(err.clone());
        SessionEvent::Failed(err)
    }

    /// Releases everything this session holds. Safe in every state and on
    /// repeated calls. A device granted to a request that was still in flight
    /// is stopped by whichever `close` or `poll` first sees it.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, DeviceState::Closed) {
            DeviceState::Connecting(acquisition) => {
                log::debug!("channel {} closed while connecting", self.channel_id);
                self.stale = Some(acquisition);
            }
            DeviceState::Connected {
                mut capture,
                mut analyser,
            } => {
                capture.set_track_enabled(false);
                capture.stop();
                analyser.disconnect();
                log::info!("microphone released for channel {}", self.channel_id);
            }
            DeviceState::Denied(_) | DeviceState::Closed => {}
        }
        self.reap_stale();
    }

    fn reap_stale(&mut self) {
        let Some(stale) = &self.stale else {
            return;
        };
        match stale.poll() {
            AcquisitionPoll::Pending => {}
            AcquisitionPoll::Ready(Ok(mut capture)) => {
                log::debug!(
                    "releasing microphone for channel {} that arrived after close",
                    self.channel_id
                );
                capture.stop();
                self.stale = None;
            }
            AcquisitionPoll::Ready(Err(_)) => self.stale = None,
        }
    }
}

impl<H: CaptureHandle> Drop for DeviceSession<H> {
    fn drop(&mut self) {
        self.close();
    }
}
