//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::detect::DetectionSignals;
use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
    /// Bitrate in bits/second
    pub bitrate: u64,
    /// Container tags merged with video stream tags and side data
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl VideoInfo {
    /// Detection inputs for this file.
    pub fn detection_signals(&self, source_name: Option<&str>) -> DetectionSignals {
        DetectionSignals {
            tags: self.tags.clone(),
            width: self.width,
            height: self.height,
            source_name: source_name.map(str::to_string),
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    // Check FFprobe exists
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Parse `ffprobe -print_format json` output.
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    // Find video stream
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let duration = parse_field(&probe.format.duration).unwrap_or(0.0);
    let size = parse_field(&probe.format.size).unwrap_or(0);
    let bitrate = parse_field(&probe.format.bit_rate).unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .and_then(|r| parse_frame_rate(r))
        .or_else(|| video_stream.r_frame_rate.as_ref().and_then(|r| parse_frame_rate(r)))
        .unwrap_or(30.0);

    // Stream tags win over container tags; spherical side data fills gaps
    let mut tags: BTreeMap<String, String> = probe.format.tags.clone().into_iter().collect();
    tags.extend(video_stream.tags.clone());
    for entry in &video_stream.side_data_list {
        for (key, value) in side_data_tags(entry) {
            tags.entry(key).or_insert(value);
        }
    }

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
        bitrate,
        tags,
    })
}

/// Flatten a "Spherical Mapping" side data block into tag-like pairs.
fn side_data_tags(entry: &serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    let is_spherical = entry
        .get("side_data_type")
        .and_then(|v| v.as_str())
        .map(|t| t.to_lowercase().contains("spherical"))
        .unwrap_or(false);
    if !is_spherical {
        return Vec::new();
    }

    let mut pairs = vec![("spherical".to_string(), "true".to_string())];
    if let Some(projection) = entry.get("projection").and_then(|v| v.as_str()) {
        pairs.push(("projection".to_string(), projection.to_string()));
    }
    for (field, tag) in [
        ("yaw", "initial_view_heading_degrees"),
        ("pitch", "initial_view_pitch_degrees"),
        ("roll", "initial_view_roll_degrees"),
    ] {
        if let Some(value) = entry.get(field).and_then(|v| v.as_f64()) {
            pairs.push((tag.to_string(), value.to_string()));
        }
    }
    pairs
}

fn parse_field<T: std::str::FromStr>(value: &Option<String>) -> Option<T> {
    value.as_ref().and_then(|v| v.parse::<T>().ok())
}

/// Get video duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = probe_video(path).await?;
    Ok(info.duration)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"codec_type": "audio", "codec_name": "aac"},
            {
                "codec_type": "video",
                "codec_name": "h264",
                "width": 3840,
                "height": 1920,
                "avg_frame_rate": "0/0",
                "r_frame_rate": "30000/1001",
                "tags": {"stereo_mode": "mono"},
                "side_data_list": [
                    {"side_data_type": "Spherical Mapping", "projection": "equirectangular", "yaw": 90, "pitch": 0, "roll": 0}
                ]
            }
        ],
        "format": {
            "duration": "12.5",
            "size": "1048576",
            "bit_rate": "671088",
            "tags": {"title": "ride", "stereo_mode": "top_bottom"}
        }
    }"#;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(PROBE_JSON.as_bytes()).unwrap();
        assert_eq!((info.width, info.height), (3840, 1920));
        assert_eq!(info.codec, "h264");
        assert!((info.duration - 12.5).abs() < f64::EPSILON);
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.size, 1_048_576);

        // stream tag wins over container tag
        assert_eq!(info.tags.get("stereo_mode").map(String::as_str), Some("mono"));
        assert_eq!(info.tags.get("spherical").map(String::as_str), Some("true"));
        assert_eq!(
            info.tags.get("initial_view_heading_degrees").map(String::as_str),
            Some("90")
        );
    }

    #[test]
    fn test_probe_feeds_detection() {
        let info = parse_probe_output(PROBE_JSON.as_bytes()).unwrap();
        let meta = crate::detect::detect(&info.detection_signals(Some("ride.mp4")));
        assert!(meta.is_spherical());
        assert_eq!(meta.confidence(), 1.0);
        assert_eq!(meta.initial_view().map(|v| v.heading), Some(90.0));
    }

    #[test]
    fn test_missing_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(
            parse_probe_output(json.as_bytes()),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
