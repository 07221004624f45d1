//! In-memory encoding collaborator for tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use vr360_media::{EncodeRequest, EncodedArtifact, EncodingService, MediaError, MediaResult, VideoInfo};

use crate::orchestrator::CancelHandle;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Probe(PathBuf),
    Encode(EncodeRequest),
    Decode(PathBuf, f64),
}

/// Records every call and answers with canned data.
///
/// Encodes whose output path contains a configured needle fail or are
/// delayed.
pub(crate) struct FakeEncodingService {
    info: VideoInfo,
    frame: RgbImage,
    fail_on: Vec<String>,
    delays: Vec<(String, Duration)>,
    cancel_on_encode: Mutex<Option<CancelHandle>>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeEncodingService {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            info: VideoInfo {
                duration: 30.0,
                width,
                height,
                fps: 30.0,
                codec: "h264".to_string(),
                ..Default::default()
            },
            frame: RgbImage::from_fn(64, 32, |x, y| Rgb([(x * 4) as u8, (y * 8) as u8, 128])),
            fail_on: Vec::new(),
            delays: Vec::new(),
            cancel_on_encode: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.info.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.info.duration = duration;
        self
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub fn with_delay(mut self, needle: &str, delay: Duration) -> Self {
        self.delays.push((needle.to_string(), delay));
        self
    }

    /// Cancel `handle` when the first encode starts.
    pub fn cancel_on_encode(&self, handle: CancelHandle) {
        *self.cancel_on_encode.lock().unwrap() = Some(handle);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn encode_calls(&self) -> Vec<EncodeRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Encode(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn decode_calls(&self) -> Vec<(PathBuf, f64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Decode(path, timestamp) => Some((path, timestamp)),
                _ => None,
            })
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl EncodingService for FakeEncodingService {
    async fn probe(&self, source: &Path) -> MediaResult<VideoInfo> {
        self.record(Call::Probe(source.to_path_buf()));
        Ok(self.info.clone())
    }

    async fn encode(&self, request: &EncodeRequest) -> MediaResult<EncodedArtifact> {
        self.record(Call::Encode(request.clone()));
        let output = request.output.to_string_lossy().to_string();

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(handle) = self.cancel_on_encode.lock().unwrap().take() {
            handle.cancel();
        }
        if let Some((_, delay)) = self.delays.iter().find(|(needle, _)| output.contains(needle.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.iter().any(|needle| output.contains(needle.as_str())) {
            return Err(MediaError::ffmpeg_failed("fake encoder refused", None, Some(1)));
        }
        Ok(EncodedArtifact {
            path: request.output.clone(),
            size_bytes: 1024,
        })
    }

    async fn decode_frame(&self, source: &Path, timestamp: f64) -> MediaResult<RgbImage> {
        self.record(Call::Decode(source.to_path_buf(), timestamp));
        Ok(self.frame.clone())
    }
}
