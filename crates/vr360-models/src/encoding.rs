//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bitrate::{BitrateLevel360, VideoCodec};
use crate::job::QualityPreset;

/// Default audio handling: spatial audio tracks are passed through untouched.
pub const DEFAULT_AUDIO_CODEC: &str = "copy";
/// Pixel format accepted by every mainstream 360 player.
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    #[serde(default)]
    pub codec: VideoCodec,

    /// Encoder preset (e.g. "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Capped bitrate in kbps; CRF alone when absent
    #[serde(default)]
    pub max_bitrate_kbps: Option<u32>,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_preset() -> String {
    QualityPreset::default().encoder_preset().to_string()
}
fn default_crf() -> u8 {
    QualityPreset::default().crf()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::for_preset(QualityPreset::default())
    }
}

impl EncodingConfig {
    /// Encoder settings for a quality preset.
    pub fn for_preset(preset: QualityPreset) -> Self {
        Self {
            codec: VideoCodec::H264,
            preset: preset.encoder_preset().to_string(),
            crf: preset.crf(),
            max_bitrate_kbps: None,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Encoder settings for one ladder rung.
    pub fn for_level(level: &BitrateLevel360, preset: QualityPreset) -> Self {
        Self {
            codec: level.codec,
            max_bitrate_kbps: Some(level.effective_max_bitrate_kbps()),
            ..Self::for_preset(preset)
        }
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Convert to FFmpeg command arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.encoder().to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
        ];

        if let Some(max) = self.max_bitrate_kbps {
            args.extend_from_slice(&[
                "-maxrate".to_string(),
                format!("{}k", max),
                "-bufsize".to_string(),
                format!("{}k", max * 2),
            ]);
        }

        args.extend_from_slice(&[
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);

        args.extend(self.extra_args.clone());

        args
    }
}
