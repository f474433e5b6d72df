use crate::audio::{
    Acquisition, AcquisitionResolver, AnalysisNode, AudioDevice, CaptureBackend, CaptureError,
    CaptureHandle, CaptureRequest,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockCaptureState {
    enabled: bool,
    stop_calls: usize,
    analyser_reads: usize,
    analyser_connected: bool,
    samples: Vec<u8>,
    fail_analyser: bool,
}

/// Test-side view of one granted microphone.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockCapture {
    state: Arc<Mutex<MockCaptureState>>,
}

impl MockCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn set_samples(&self, samples: Vec<u8>) {
        self.state.lock().expect("mock state").samples = samples;
    }

    pub(crate) fn fail_analyser(&self) {
        self.state.lock().expect("mock state").fail_analyser = true;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.state.lock().expect("mock state").enabled
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stop_calls() > 0
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.state.lock().expect("mock state").stop_calls
    }

    pub(crate) fn analyser_reads(&self) -> usize {
        self.state.lock().expect("mock state").analyser_reads
    }

    pub(crate) fn analyser_connected(&self) -> bool {
        self.state.lock().expect("mock state").analyser_connected
    }
}

pub(crate) struct MockHandle {
    state: Arc<Mutex<MockCaptureState>>,
}

pub(crate) struct MockAnalyser {
    state: Arc<Mutex<MockCaptureState>>,
    fft_size: usize,
}

impl AnalysisNode for MockAnalyser {
    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn byte_time_domain_data(&self, data: &mut [u8]) {
        let mut state = self.state.lock().expect("mock state");
        state.analyser_reads += 1;
        data.fill(128);
        for (slot, sample) in data.iter_mut().zip(state.samples.iter()) {
            *slot = *sample;
        }
    }

    fn disconnect(&mut self) {
        self.state.lock().expect("mock state").analyser_connected = false;
    }
}

impl CaptureHandle for MockHandle {
    type Analyser = MockAnalyser;

    fn set_track_enabled(&mut self, enabled: bool) {
        self.state.lock().expect("mock state").enabled = enabled;
    }

    fn connect_analyser(&mut self, fft_size: usize) -> Result<MockAnalyser, CaptureError> {
        let mut state = self.state.lock().expect("mock state");
        if state.fail_analyser {
            return Err(CaptureError::Backend("analyser unavailable".to_string()));
        }
        state.analyser_connected = true;
        Ok(MockAnalyser {
            state: Arc::clone(&self.state),
            fft_size,
        })
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().expect("mock state");
        state.enabled = false;
        state.stop_calls += 1;
    }
}

pub(crate) enum MockResponse {
    Grant,
    Deny(CaptureError),
    Defer,
}

#[derive(Default)]
struct MockBackendState {
    responses: VecDeque<MockResponse>,
    captures: Vec<MockCapture>,
    deferred: VecDeque<AcquisitionResolver<MockHandle>>,
    requests: Vec<CaptureRequest>,
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    state: Arc<Mutex<MockBackendState>>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_response(&self, response: MockResponse) {
        self.state
            .lock()
            .expect("backend state")
            .responses
            .push_back(response);
    }

    /// Every microphone granted so far, oldest first.
    pub(crate) fn captures(&self) -> Vec<MockCapture> {
        self.state.lock().expect("backend state").captures.clone()
    }

    pub(crate) fn last_capture(&self) -> MockCapture {
        self.captures().pop().expect("a granted capture")
    }

    pub(crate) fn live_captures(&self) -> usize {
        self.captures()
            .iter()
            .filter(|capture| !capture.is_stopped())
            .count()
    }

    pub(crate) fn requests(&self) -> Vec<CaptureRequest> {
        self.state.lock().expect("backend state").requests.clone()
    }

    /// Grants the oldest deferred request with a fresh microphone.
    pub(crate) fn grant_deferred(&self) -> MockCapture {
        let resolver = self
            .state
            .lock()
            .expect("backend state")
            .deferred
            .pop_front()
            .expect("a deferred request");
        let capture = self.record_capture();
        resolver.resolve(Ok(capture.handle()));
        capture
    }

    fn record_capture(&self) -> MockCapture {
        let capture = MockCapture::new();
        self.state
            .lock()
            .expect("backend state")
            .captures
            .push(capture.clone());
        capture
    }
}

impl CaptureBackend for MockBackend {
    type Handle = MockHandle;

    fn list_input_devices(&self) -> Result<Vec<AudioDevice>, CaptureError> {
        Ok(vec![AudioDevice {
            id: "0:Mock".to_string(),
            name: "Mock".to_string(),
        }])
    }

    fn request_capture(&self, request: &CaptureRequest) -> Acquisition<MockHandle> {
        let response = {
            let mut state = self.state.lock().expect("backend state");
            state.requests.push(request.clone());
            state.responses.pop_front().unwrap_or(MockResponse::Grant)
        };

        match response {
            MockResponse::Grant => Acquisition::ready(Ok(self.record_capture().handle())),
            MockResponse::Deny(err) => Acquisition::ready(Err(err)),
            MockResponse::Defer => {
                let (acquisition, resolver) = Acquisition::pending();
                self.state
                    .lock()
                    .expect("backend state")
                    .deferred
                    .push_back(resolver);
                acquisition
            }
        }
    }
}

/// Time-domain bytes swinging between the rails.
pub(crate) fn loud_samples(len: usize) -> Vec<u8> {
    (0..len)
        .map(|index| if index % 2 == 0 { 255 } else { 0 })
        .collect()
}
