//! Video encoding collaborator.
//!
//! The orchestrator talks to [`EncodingService`] only; [`FfmpegEncodingService`]
//! implements it on top of the FFmpeg/FFprobe CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vr360_models::{EncodingConfig, Transform};

use crate::command::{FfmpegCommand, FfmpegRunner, PIPE_OUTPUT};
use crate::error::{MediaError, MediaResult};
use crate::filters::{build_grid_filter, build_projection_filter, metadata_tags, VIDEO_OUT};
use crate::probe::{probe_video, VideoInfo};

/// One encode: inputs, the transform to apply and how to encode the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub transform: Transform,
    pub encoding: EncodingConfig,
    /// Input seek in seconds.
    #[serde(default)]
    pub start: Option<f64>,
    /// Output length in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl EncodeRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, transform: Transform, encoding: EncodingConfig) -> Self {
        Self {
            inputs: vec![input.into()],
            output: output.into(),
            transform,
            encoding,
            start: None,
            duration: None,
        }
    }

    /// Encode only `duration` seconds starting at `start`.
    pub fn with_segment(mut self, start: f64, duration: f64) -> Self {
        self.start = Some(start.max(0.0));
        self.duration = Some(duration);
        self
    }
}

/// File produced by an encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Asynchronous video encoding capability.
#[async_trait]
pub trait EncodingService: Send + Sync {
    /// Read dimensions, duration and tags of a file.
    async fn probe(&self, source: &Path) -> MediaResult<VideoInfo>;

    /// Run one transform and write the output file.
    async fn encode(&self, request: &EncodeRequest) -> MediaResult<EncodedArtifact>;

    /// Decode the frame shown at `timestamp` seconds.
    async fn decode_frame(&self, source: &Path, timestamp: f64) -> MediaResult<RgbImage>;
}

/// [`EncodingService`] backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncodingService {
    runner: FfmpegRunner,
}

impl FfmpegEncodingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill encodes running longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(timeout),
        }
    }
}

/// Translate an encode request into an FFmpeg invocation.
pub fn build_encode_command(request: &EncodeRequest) -> MediaResult<FfmpegCommand> {
    if request.inputs.is_empty() {
        return Err(MediaError::invalid_dimensions("encode request has no inputs"));
    }

    let mut cmd = match &request.transform {
        Transform::Projection(spec) => {
            let graph = build_projection_filter(spec)?;
            let mut cmd = FfmpegCommand::new(&request.inputs[0], &request.output)
                .filter_complex(graph)
                .map(VIDEO_OUT)
                .map("0:a?")
                .output_args(request.encoding.to_ffmpeg_args());
            for (key, value) in metadata_tags(spec.target_projection, spec.output_stereo_mode()) {
                cmd = cmd.metadata(key, &value);
            }
            cmd
        }
        Transform::Grid { shape, cell } => {
            let graph = build_grid_filter(*shape, *cell, request.inputs.len())?;
            FfmpegCommand::with_inputs(&request.inputs, &request.output)
                .filter_complex(graph)
                .map(VIDEO_OUT)
                .output_args(request.encoding.to_ffmpeg_args())
                .output_arg("-shortest")
        }
    };

    if let Some(start) = request.start {
        cmd = cmd.seek(start);
    }
    if let Some(duration) = request.duration {
        cmd = cmd.duration(duration);
    }

    Ok(cmd)
}

#[async_trait]
impl EncodingService for FfmpegEncodingService {
    async fn probe(&self, source: &Path) -> MediaResult<VideoInfo> {
        probe_video(source).await
    }

    async fn encode(&self, request: &EncodeRequest) -> MediaResult<EncodedArtifact> {
        for input in &request.inputs {
            if !input.exists() {
                return Err(MediaError::FileNotFound(input.clone()));
            }
        }

        let cmd = build_encode_command(request)?;

        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.runner.run(&cmd).await?;

        let size_bytes = tokio::fs::metadata(&request.output).await?.len();
        info!(
            output = %request.output.display(),
            size_bytes,
            "Encode finished"
        );

        Ok(EncodedArtifact {
            path: request.output.clone(),
            size_bytes,
        })
    }

    async fn decode_frame(&self, source: &Path, timestamp: f64) -> MediaResult<RgbImage> {
        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }

        let cmd = FfmpegCommand::new(source, PIPE_OUTPUT)
            .seek(timestamp.max(0.0))
            .single_frame()
            .output_args(["-f", "image2pipe", "-c:v", "png"]);

        let bytes = self.runner.run_capture(&cmd).await?;
        if bytes.is_empty() {
            return Err(MediaError::InvalidVideo(format!(
                "no frame decoded at {:.3}s from {}",
                timestamp,
                source.display()
            )));
        }
        debug!(bytes = bytes.len(), timestamp, "Decoded frame");

        Ok(image::load_from_memory(&bytes)?.to_rgb8())
    }
}
