//! Thumbnail and sprite sheet extraction.
//!
//! Frames are decoded by the encoding collaborator and rendered on the
//! blocking pool with the shared remap cache. Sources that are not
//! equirectangular are first normalized by a short collaborator encode.

use std::collections::BTreeMap;
use std::path::Path;

use image::{imageops, RgbImage};
use tracing::{debug, info, warn};
use vr360_media::{
    compose_sprite_sheet, extract_named_viewports, extract_viewport, EncodeRequest, SpriteSheet,
    ThumbnailOptions, SPRITE_COLUMNS,
};
use vr360_models::{
    EncodingConfig, Eye, FilterSpec, ProjectionType, QualityPreset, SphericalMetadata, StereoMode,
    StereoTransform, Transform, ViewingAngle, ViewportConfig,
};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::orchestrator::ConversionOrchestrator;

/// Length of the clip encoded to normalize a non-equirectangular frame.
const NORMALIZE_SEGMENT_SECS: f64 = 1.0;

/// Edge length of sprite sheet tiles.
pub const SPRITE_TILE_SIZE: u32 = 160;

/// Upper bound on tiles in one sprite sheet.
pub const MAX_SPRITE_TILES: usize = 500;

impl ConversionOrchestrator {
    /// Render the named angles of the frame at `timestamp`.
    ///
    /// Size and field of view come from the worker config and are validated
    /// before the source is touched.
    pub async fn extract_thumbnails(
        &self,
        source: &Path,
        timestamp: f64,
        angles: &[ViewingAngle],
    ) -> WorkerResult<BTreeMap<ViewingAngle, RgbImage>> {
        let options = self.config.thumbnail_options();
        validate_options(&options)?;
        validate_timestamp(timestamp)?;
        if angles.is_empty() {
            return Ok(BTreeMap::new());
        }

        let (_, metadata) = self.inspect(source).await?;
        let scratch = self.scratch_dir("vr360-thumb-").await?;
        let frame = self.equirect_frame(source, &metadata, timestamp, scratch.path()).await?;

        let thumbnails = self.render_angles(frame, angles.to_vec(), options).await?;
        for angle in thumbnails.keys() {
            metrics::record_thumbnail(angle.as_str());
        }
        info!(
            source = %source.display(),
            timestamp,
            count = thumbnails.len(),
            "Extracted thumbnails"
        );
        Ok(thumbnails)
    }

    /// Render an arbitrary viewport of the frame at `timestamp`.
    pub async fn extract_viewport_thumbnail(
        &self,
        source: &Path,
        timestamp: f64,
        viewport: &ViewportConfig,
    ) -> WorkerResult<RgbImage> {
        viewport.validate()?;
        validate_timestamp(timestamp)?;

        let (_, metadata) = self.inspect(source).await?;
        let scratch = self.scratch_dir("vr360-thumb-").await?;
        let frame = self.equirect_frame(source, &metadata, timestamp, scratch.path()).await?;

        let cache = self.cache.clone();
        let viewport = *viewport;
        let image = tokio::task::spawn_blocking(move || extract_viewport(&frame, &viewport, &cache))
            .await
            .map_err(|e| WorkerError::task_failed(e.to_string()))??;

        metrics::record_thumbnail("viewport");
        Ok(image)
    }

    /// Build a scrubbing sprite sheet of one angle.
    ///
    /// Tiles are taken every configured interval from the start of the
    /// source. Each WebVTT cue points at `sprite_url`.
    pub async fn generate_sprite_sheet(
        &self,
        source: &Path,
        angle: ViewingAngle,
        sprite_url: &str,
    ) -> WorkerResult<SpriteSheet> {
        let options = ThumbnailOptions {
            size: SPRITE_TILE_SIZE,
            fov: self.config.thumbnail_fov,
        };
        validate_options(&options)?;
        let interval = self.config.sprite_interval_secs;

        let (info, metadata) = self.inspect(source).await?;
        let timestamps = sprite_timestamps(info.duration, interval);
        debug!(tiles = timestamps.len(), interval, "Planning sprite sheet");

        let scratch = self.scratch_dir("vr360-sprite-").await?;
        let mut tiles = Vec::with_capacity(timestamps.len());
        for timestamp in timestamps {
            let frame = self.equirect_frame(source, &metadata, timestamp, scratch.path()).await?;
            let mut rendered = self.render_angles(frame, vec![angle], options).await?;
            let tile = rendered
                .remove(&angle)
                .ok_or_else(|| WorkerError::task_failed(format!("no {} tile rendered", angle)))?;
            tiles.push((timestamp, tile));
        }

        let sheet = compose_sprite_sheet(&tiles, SPRITE_COLUMNS, interval, sprite_url)?;
        info!(
            source = %source.display(),
            angle = %angle,
            columns = sheet.columns,
            rows = sheet.rows,
            "Generated sprite sheet"
        );
        Ok(sheet)
    }

    async fn render_angles(
        &self,
        frame: RgbImage,
        angles: Vec<ViewingAngle>,
        options: ThumbnailOptions,
    ) -> WorkerResult<BTreeMap<ViewingAngle, RgbImage>> {
        let cache = self.cache.clone();
        let rendered = tokio::task::spawn_blocking(move || extract_named_viewports(&frame, &angles, &options, &cache))
            .await
            .map_err(|e| WorkerError::task_failed(e.to_string()))??;
        Ok(rendered)
    }

    /// Mono equirectangular frame at `timestamp`.
    async fn equirect_frame(
        &self,
        source: &Path,
        metadata: &SphericalMetadata,
        timestamp: f64,
        scratch: &Path,
    ) -> WorkerResult<RgbImage> {
        let stereo = metadata.stereo_mode();

        match metadata.projection() {
            ProjectionType::Equirectangular => {
                let frame = self.service.decode_frame(source, timestamp).await?;
                Ok(left_eye(frame, stereo))
            }
            ProjectionType::Flat | ProjectionType::Unknown => {
                warn!(source = %source.display(), "No spherical evidence; treating frame as equirectangular");
                Ok(self.service.decode_frame(source, timestamp).await?)
            }
            projection => {
                let eye = if stereo.is_spatially_packed() {
                    StereoTransform::ExtractEye {
                        packing: stereo,
                        eye: Eye::Left,
                    }
                } else {
                    StereoTransform::None
                };
                let spec = FilterSpec::new(projection, ProjectionType::Equirectangular)
                    .with_source_stereo(stereo)
                    .with_stereo(eye);
                let normalized = scratch.join(format!("normalized_{:.3}.mp4", timestamp));
                let request = EncodeRequest::new(
                    source,
                    &normalized,
                    Transform::Projection(spec),
                    EncodingConfig::for_preset(QualityPreset::Fast),
                )
                .with_segment(timestamp, NORMALIZE_SEGMENT_SECS);

                debug!(from = %projection, timestamp, "Normalizing frame to equirectangular");
                let artifact = self.encode(&request).await?;
                Ok(self.service.decode_frame(&artifact.path, 0.0).await?)
            }
        }
    }
}

fn validate_options(options: &ThumbnailOptions) -> WorkerResult<()> {
    ViewportConfig::for_angle(ViewingAngle::Front, options.fov, options.size).validate()?;
    Ok(())
}

fn validate_timestamp(timestamp: f64) -> WorkerResult<()> {
    if !(timestamp.is_finite() && timestamp >= 0.0) {
        return Err(WorkerError::invalid_request(format!(
            "timestamp must be non-negative, got {}",
            timestamp
        )));
    }
    Ok(())
}

/// Keep the left eye of a spatially packed frame.
fn left_eye(frame: RgbImage, stereo: StereoMode) -> RgbImage {
    let (width, height) = frame.dimensions();
    match stereo {
        StereoMode::TopBottom if height >= 2 => imageops::crop_imm(&frame, 0, 0, width, height / 2).to_image(),
        StereoMode::LeftRight if width >= 2 => imageops::crop_imm(&frame, 0, 0, width / 2, height).to_image(),
        _ => frame,
    }
}

/// Tile timestamps: every `interval` seconds from zero, at least one.
fn sprite_timestamps(duration: f64, interval: f64) -> Vec<f64> {
    if !(duration.is_finite() && duration > 0.0) {
        return vec![0.0];
    }
    (0..MAX_SPRITE_TILES)
        .map(|i| i as f64 * interval)
        .take_while(|t| *t < duration)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::testing::FakeEncodingService;
    use std::sync::Arc;

    fn orchestrator(service: FakeEncodingService, work_dir: &Path) -> (Arc<FakeEncodingService>, ConversionOrchestrator) {
        let service = Arc::new(service);
        let config = WorkerConfig {
            work_dir: work_dir.to_path_buf(),
            thumbnail_size: 16,
            ..Default::default()
        };
        (Arc::clone(&service), ConversionOrchestrator::new(service, config))
    }

    #[tokio::test]
    async fn test_equirect_thumbnails_decode_once() {
        let dir = tempfile::tempdir().unwrap();
        let (service, orch) = orchestrator(FakeEncodingService::new(3840, 1920), dir.path());

        let thumbs = orch
            .extract_thumbnails(
                Path::new("/videos/in.mp4"),
                2.5,
                &[ViewingAngle::Front, ViewingAngle::Back, ViewingAngle::Stereographic],
            )
            .await
            .unwrap();

        assert_eq!(thumbs.len(), 3);
        assert!(thumbs.values().all(|img| img.dimensions() == (16, 16)));
        assert_eq!(service.decode_calls(), vec![(Path::new("/videos/in.mp4").to_path_buf(), 2.5)]);
        assert!(service.encode_calls().is_empty());
        assert!(!orch.cache().is_empty());
    }

    #[tokio::test]
    async fn test_eac_source_is_normalized_first() {
        let dir = tempfile::tempdir().unwrap();
        let service = FakeEncodingService::new(3840, 2560).with_tag("projection", "eac");
        let (service, orch) = orchestrator(service, dir.path());

        let thumbs = orch
            .extract_thumbnails(Path::new("/videos/yt.mp4"), 4.0, &[ViewingAngle::Up])
            .await
            .unwrap();
        assert_eq!(thumbs.len(), 1);

        let encodes = service.encode_calls();
        assert_eq!(encodes.len(), 1);
        assert_eq!(encodes[0].start, Some(4.0));
        match &encodes[0].transform {
            Transform::Projection(spec) => {
                assert_eq!(spec.source_projection, ProjectionType::Eac);
                assert_eq!(spec.target_projection, ProjectionType::Equirectangular);
            }
            other => panic!("unexpected transform {:?}", other),
        }

        let decodes = service.decode_calls();
        assert_eq!(decodes.len(), 1);
        assert_eq!(decodes[0].0, encodes[0].output);
        assert_eq!(decodes[0].1, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_viewport_is_rejected_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let (service, orch) = orchestrator(FakeEncodingService::new(3840, 1920), dir.path());

        let mut viewport = ViewportConfig::default();
        viewport.fov = 200.0;
        let err = orch
            .extract_viewport_thumbnail(Path::new("/videos/in.mp4"), 0.0, &viewport)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bad_thumbnail_config_is_rejected_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeEncodingService::new(3840, 1920));
        let config = WorkerConfig {
            work_dir: dir.path().to_path_buf(),
            thumbnail_fov: 0.0,
            ..Default::default()
        };
        let orch = ConversionOrchestrator::new(service.clone(), config);

        let err = orch
            .extract_thumbnails(Path::new("/videos/in.mp4"), 0.0, &[ViewingAngle::Front])
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Validation(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_viewport_thumbnail_uses_viewport_size() {
        let dir = tempfile::tempdir().unwrap();
        let (_, orch) = orchestrator(FakeEncodingService::new(3840, 1920), dir.path());

        let viewport = ViewportConfig::looking_at(45.0, 10.0, 70.0, 32, 18);
        let image = orch
            .extract_viewport_thumbnail(Path::new("/videos/in.mp4"), 1.0, &viewport)
            .await
            .unwrap();
        assert_eq!(image.dimensions(), (32, 18));
    }

    #[tokio::test]
    async fn test_sprite_sheet_covers_duration() {
        let dir = tempfile::tempdir().unwrap();
        let (service, orch) = orchestrator(FakeEncodingService::new(3840, 1920).with_duration(25.0), dir.path());

        let sheet = orch
            .generate_sprite_sheet(Path::new("/videos/in.mp4"), ViewingAngle::Front, "sprite.jpg")
            .await
            .unwrap();

        // tiles at 0, 10 and 20 seconds
        assert_eq!((sheet.columns, sheet.rows), (3, 1));
        assert_eq!(sheet.tile.width, SPRITE_TILE_SIZE);
        assert_eq!(service.decode_calls().len(), 3);
        assert!(sheet.webvtt.contains("00:00:20.000 --> 00:00:30.000"));
    }

    #[test]
    fn test_sprite_timestamps() {
        assert_eq!(sprite_timestamps(25.0, 10.0), vec![0.0, 10.0, 20.0]);
        assert_eq!(sprite_timestamps(0.0, 10.0), vec![0.0]);
        assert_eq!(sprite_timestamps(f64::NAN, 10.0), vec![0.0]);
        assert_eq!(sprite_timestamps(1e9, 1.0).len(), MAX_SPRITE_TILES);
    }

    #[test]
    fn test_left_eye_crops_packed_frames() {
        let frame = RgbImage::new(8, 8);
        assert_eq!(left_eye(frame.clone(), StereoMode::TopBottom).dimensions(), (8, 4));
        assert_eq!(left_eye(frame.clone(), StereoMode::LeftRight).dimensions(), (4, 8));
        assert_eq!(left_eye(frame, StereoMode::Mono).dimensions(), (8, 8));
    }
}
