//! Conversion orchestration.
//!
//! The orchestrator validates requests, resolves source geometry, hands
//! transforms to an [`EncodingService`] and aggregates the outcomes.
//! Collaborator failures come back as failed [`ConversionResult`]s; requests
//! rejected before any work started are returned as `Err`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tempfile::TempDir;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn, Instrument};
use vr360_media::filters::vertical_fov;
use vr360_media::{
    analyze, detect, estimate_conversion_seconds, EncodeRequest, EncodedArtifact, EncodingService,
    MediaError, RemapCache, SphericalAnalysis, VideoInfo,
};
use vr360_models::{
    ContentQualitySignal, ConversionJob, ConversionResult, CubemapLayout, EncodingConfig, Eye,
    FailureKind, FieldOfView, FilterSpec, GridShape, ProjectionType, QualityPreset, Resolution, SphericalMetadata,
    StereoHandling, StereoMode, StereoTransform, Transform, ViewportConfig,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Error recorded on batch jobs skipped after cancellation.
pub const CANCELLED_BEFORE_DISPATCH: &str = "cancelled before dispatch";

/// Size of one preview grid cell.
pub const PREVIEW_CELL: Resolution = Resolution { width: 960, height: 480 };

/// Detection below this confidence is reported as a warning.
const LOW_CONFIDENCE: f64 = 0.7;

/// Stops one batch from dispatching further jobs.
///
/// Create one per batch; a cancelled handle stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Jobs already running finish; jobs not yet started are skipped.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Drives conversions through an encoding collaborator.
pub struct ConversionOrchestrator {
    pub(crate) service: Arc<dyn EncodingService>,
    pub(crate) cache: RemapCache,
    pub(crate) config: WorkerConfig,
}

impl ConversionOrchestrator {
    pub fn new(service: Arc<dyn EncodingService>, config: WorkerConfig) -> Self {
        Self {
            service,
            cache: RemapCache::new(config.remap_cache_capacity),
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Remap grids shared by every thumbnail call.
    pub fn cache(&self) -> &RemapCache {
        &self.cache
    }

    /// Run one conversion.
    ///
    /// Invalid requests fail with a validation error and make no collaborator
    /// call. Collaborator errors are reported in the returned result.
    pub async fn convert_one(&self, job: &ConversionJob) -> WorkerResult<ConversionResult> {
        let logger = JobLogger::new(&job.id, "convert");
        let span = logger.create_span();

        async {
            let started = Instant::now();
            let mut warnings = Vec::new();

            logger.log_start(&format!(
                "{} -> {} ({})",
                job.source.display(),
                job.target_projection,
                job.quality_preset
            ));

            if let Err(e) = validate_job(job) {
                logger.log_error(&e.to_string());
                metrics::record_conversion("convert", "invalid", 0.0);
                return Err(e);
            }

            let outcome = self.run_conversion(job, &mut warnings).await;
            let elapsed = started.elapsed().as_secs_f64();

            for warning in &warnings {
                logger.log_warning(warning);
            }

            match outcome {
                Ok((artifact, output_metadata)) => {
                    logger.log_completion(&format!(
                        "{} ({} bytes) in {:.1}s",
                        artifact.path.display(),
                        artifact.size_bytes,
                        elapsed
                    ));
                    metrics::record_conversion("convert", "success", elapsed);
                    Ok(ConversionResult::succeeded(
                        job,
                        artifact.path,
                        elapsed,
                        warnings,
                        Some(output_metadata),
                    ))
                }
                Err(e) => {
                    logger.log_error(&e.to_string());
                    metrics::record_conversion("convert", "failed", elapsed);
                    Ok(ConversionResult::failed(job, e.to_string(), elapsed, warnings))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_conversion(
        &self,
        job: &ConversionJob,
        warnings: &mut Vec<String>,
    ) -> WorkerResult<(EncodedArtifact, SphericalMetadata)> {
        let (_, detected) = self.inspect(&job.source).await?;

        let source_projection = match job.source_projection {
            Some(projection) => projection,
            None if detected.is_spherical() => {
                if detected.confidence() < LOW_CONFIDENCE {
                    warnings.push(format!(
                        "source detected as {} with low confidence {:.2}",
                        detected.projection(),
                        detected.confidence()
                    ));
                }
                detected.projection()
            }
            None => {
                warnings.push("no spherical evidence in source; assuming equirectangular".to_string());
                ProjectionType::Equirectangular
            }
        };

        let stereo = resolve_stereo(job.stereo_handling, detected.stereo_mode(), warnings);

        let viewport = match (job.target_projection, job.viewport) {
            (ProjectionType::Flat, None) => {
                warnings.push("flat target without a viewport; rendering the front view".to_string());
                Some(ViewportConfig::default())
            }
            (ProjectionType::Flat, viewport) => viewport,
            (_, Some(_)) => {
                warnings.push(format!("viewport ignored for {} target", job.target_projection));
                None
            }
            (_, None) => None,
        };

        let spec = FilterSpec::new(source_projection, job.target_projection)
            .with_resolution(job.target_resolution)
            .with_source_stereo(detected.stereo_mode())
            .with_stereo(stereo)
            .with_viewport(viewport, viewport.and(job.viewport_motion));

        let output_metadata = output_metadata(&detected, &spec);
        let request = EncodeRequest::new(
            &job.source,
            &job.output,
            Transform::Projection(spec),
            EncodingConfig::for_preset(job.quality_preset),
        );

        let artifact = self.encode(&request).await?;
        Ok((artifact, output_metadata))
    }

    /// Run jobs with at most `max_parallel` in flight.
    ///
    /// Results come back in input order, one per job. Rejected jobs get a
    /// result with [`FailureKind::Invalid`].
    pub async fn convert_batch(&self, jobs: &[ConversionJob], max_parallel: usize) -> Vec<ConversionResult> {
        self.convert_batch_with_cancel(jobs, max_parallel, &CancelHandle::new())
            .await
    }

    /// [`Self::convert_batch`] stoppable through `cancel`.
    ///
    /// After [`CancelHandle::cancel`], jobs that have not started get a
    /// [`FailureKind::Cancelled`] result and are never dispatched.
    pub async fn convert_batch_with_cancel(
        &self,
        jobs: &[ConversionJob],
        max_parallel: usize,
        cancel: &CancelHandle,
    ) -> Vec<ConversionResult> {
        if max_parallel == 0 {
            warn!("max_parallel of 0 requested, running one job at a time");
        }
        let limit = max_parallel.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let started = Instant::now();

        info!(jobs = jobs.len(), max_parallel = limit, "Starting conversion batch");

        let futures = jobs.iter().map(|job| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ConversionResult::failed(job, "batch scheduler closed", 0.0, Vec::new());
                    }
                };
                if cancel.is_cancelled() {
                    return ConversionResult::cancelled(job, CANCELLED_BEFORE_DISPATCH);
                }
                match self.convert_one(job).await {
                    Ok(result) => result,
                    Err(e) => ConversionResult::rejected(job, e.to_string()),
                }
            }
        });

        let results = join_all(futures).await;

        let cancelled = results
            .iter()
            .filter(|r| r.failure_kind == Some(FailureKind::Cancelled))
            .count();
        let succeeded = results.iter().filter(|r| r.success).count();
        metrics::record_batch_cancelled(cancelled as u64);

        info!(
            succeeded,
            failed = results.len() - succeeded - cancelled,
            cancelled,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Conversion batch finished"
        );

        results
    }

    /// Convert one source into several cubemap layouts.
    ///
    /// Outputs land in `output_dir` as `<stem>_cubemap_<layout>.mp4`.
    /// Duplicate layouts are converted once.
    pub async fn convert_cubemap_layouts(
        &self,
        source: &Path,
        output_dir: &Path,
        layouts: &[CubemapLayout],
    ) -> BTreeMap<CubemapLayout, ConversionResult> {
        let layouts: Vec<CubemapLayout> = layouts.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let stem = file_stem(source);

        let jobs: Vec<ConversionJob> = layouts
            .iter()
            .map(|layout| {
                let projection = ProjectionType::Cubemap { layout: *layout };
                ConversionJob::new(source, output_dir.join(format!("{}_{}.mp4", stem, projection)), projection)
                    .with_quality(self.config.quality_preset)
            })
            .collect();

        let results = self.convert_batch(&jobs, self.config.max_parallel).await;
        layouts.into_iter().zip(results).collect()
    }

    /// Render `projections` side by side into one preview video.
    ///
    /// Each cell is converted first, then the cells are stacked by the
    /// collaborator. Fails with [`WorkerError::InsufficientInputs`] before any
    /// work when the grid has more cells than projections. Any failed cell
    /// fails the whole composite.
    pub async fn build_preview_grid(
        &self,
        source: &Path,
        output: &Path,
        projections: &[ProjectionType],
        shape: GridShape,
    ) -> WorkerResult<ConversionResult> {
        let required = shape.cell_count();
        if required == 0 {
            return Err(WorkerError::invalid_request("preview grid needs at least one cell"));
        }
        if projections.len() < required {
            return Err(WorkerError::InsufficientInputs {
                required,
                available: projections.len(),
            });
        }
        let projections = &projections[..required];
        if projections.contains(&ProjectionType::Unknown) {
            return Err(WorkerError::invalid_request("preview projections must be known"));
        }

        let composite = ConversionJob::new(source, output, ProjectionType::Flat).with_resolution(
            PREVIEW_CELL.width * shape.columns,
            PREVIEW_CELL.height * shape.rows,
        );
        let logger = JobLogger::new(&composite.id, "preview_grid");
        logger.log_start(&format!("{} cells from {}", required, source.display()));
        let started = Instant::now();

        let scratch = self.scratch_dir("vr360-grid-").await?;
        let cells: Vec<ConversionJob> = projections
            .iter()
            .enumerate()
            .map(|(index, projection)| {
                let path = scratch.path().join(format!("cell_{}_{}.mp4", index, projection));
                let job = ConversionJob::new(source, path, *projection).with_quality(QualityPreset::Fast);
                match projection {
                    ProjectionType::Flat => job.with_viewport(ViewportConfig::looking_at(
                        0.0,
                        0.0,
                        90.0,
                        PREVIEW_CELL.width,
                        PREVIEW_CELL.height,
                    )),
                    _ => job.with_resolution(PREVIEW_CELL.width, PREVIEW_CELL.height),
                }
            })
            .collect();

        let results = self.convert_batch(&cells, self.config.max_parallel).await;
        let warnings: Vec<String> = results.iter().flat_map(|r| r.warnings.iter().cloned()).collect();

        if let Some((index, failed)) = results.iter().enumerate().find(|(_, r)| !r.success) {
            let message = format!(
                "cell {} ({}) failed: {}",
                index,
                failed.target_projection,
                failed.error.as_deref().unwrap_or("unknown error")
            );
            logger.log_error(&message);
            let elapsed = started.elapsed().as_secs_f64();
            metrics::record_conversion("preview_grid", "failed", elapsed);
            return Ok(ConversionResult::failed(&composite, message, elapsed, warnings));
        }

        let request = EncodeRequest {
            inputs: cells.iter().map(|c| c.output.clone()).collect(),
            output: output.to_path_buf(),
            transform: Transform::Grid { shape, cell: PREVIEW_CELL },
            encoding: EncodingConfig::for_preset(self.config.quality_preset),
            start: None,
            duration: None,
        };

        let outcome = self.encode(&request).await;
        let elapsed = started.elapsed().as_secs_f64();
        drop(scratch);

        Ok(match outcome {
            Ok(artifact) => {
                logger.log_completion(&format!("{} in {:.1}s", artifact.path.display(), elapsed));
                metrics::record_conversion("preview_grid", "success", elapsed);
                let metadata = SphericalMetadata::not_spherical(
                    PREVIEW_CELL.width * shape.columns,
                    PREVIEW_CELL.height * shape.rows,
                );
                ConversionResult::succeeded(&composite, artifact.path, elapsed, warnings, Some(metadata))
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                metrics::record_conversion("preview_grid", "failed", elapsed);
                ConversionResult::failed(&composite, e.to_string(), elapsed, warnings)
            }
        })
    }

    /// Probe and analyze a source.
    pub async fn analyze_source(
        &self,
        source: &Path,
        quality: &ContentQualitySignal,
    ) -> WorkerResult<SphericalAnalysis> {
        let (_, metadata) = self.inspect(source).await?;
        Ok(analyze(&metadata, quality))
    }

    /// Rough wall-clock seconds `job` would take.
    pub async fn estimate_job(&self, job: &ConversionJob) -> WorkerResult<f64> {
        let (info, metadata) = self.inspect(&job.source).await?;
        let source = job.source_projection.unwrap_or(metadata.projection());
        Ok(estimate_conversion_seconds(
            info.width,
            info.height,
            info.duration,
            info.fps,
            source,
            job.target_projection,
        ))
    }

    /// Probe a source and detect its geometry.
    pub(crate) async fn inspect(&self, source: &Path) -> WorkerResult<(VideoInfo, SphericalMetadata)> {
        let info = self.service.probe(source).await?;
        let name = source.file_name().and_then(|n| n.to_str());
        let metadata = detect(&info.detection_signals(name));
        Ok((info, metadata))
    }

    /// Encode with the configured timeout.
    pub(crate) async fn encode(&self, request: &EncodeRequest) -> WorkerResult<EncodedArtifact> {
        match tokio::time::timeout(self.config.job_timeout, self.service.encode(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MediaError::Timeout(self.config.job_timeout.as_secs()).into()),
        }
    }

    /// Fresh scratch directory under the work dir, removed on drop.
    pub(crate) async fn scratch_dir(&self, prefix: &str) -> WorkerResult<TempDir> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        Ok(tempfile::Builder::new().prefix(prefix).tempdir_in(&self.config.work_dir)?)
    }
}

/// Reject requests no collaborator call could satisfy.
fn validate_job(job: &ConversionJob) -> WorkerResult<()> {
    if let Some(viewport) = &job.viewport {
        viewport.validate()?;
    }
    if let Some(motion) = &job.viewport_motion {
        motion.end.validate()?;
        if !(motion.duration.is_finite() && motion.duration > 0.0) {
            return Err(WorkerError::invalid_request(format!(
                "viewport motion duration must be positive, got {}",
                motion.duration
            )));
        }
    }
    if let Some(resolution) = job.target_resolution {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(WorkerError::invalid_request(format!(
                "target resolution must be positive, got {}",
                resolution
            )));
        }
    }
    if job.target_projection == ProjectionType::Unknown {
        return Err(WorkerError::invalid_request("target projection must be known"));
    }
    Ok(())
}

/// Map the requested stereo handling onto the source packing.
fn resolve_stereo(handling: StereoHandling, source: StereoMode, warnings: &mut Vec<String>) -> StereoTransform {
    match handling {
        StereoHandling::Preserve => StereoTransform::None,
        StereoHandling::ExtractEye(eye) if source.is_spatially_packed() => {
            StereoTransform::ExtractEye { packing: source, eye }
        }
        StereoHandling::ExtractEye(eye) => {
            warnings.push(format!("source is {}; cannot extract the {} eye", source, eye));
            StereoTransform::None
        }
        StereoHandling::Convert(to) if to == source => StereoTransform::None,
        StereoHandling::Convert(to) if !source.is_spatially_packed() => {
            warnings.push(format!("source is {}; cannot convert to {}", source, to));
            StereoTransform::None
        }
        StereoHandling::Convert(StereoMode::Mono) => StereoTransform::ExtractEye {
            packing: source,
            eye: Eye::Left,
        },
        StereoHandling::Convert(to) => StereoTransform::Repack { from: source, to },
    }
}

/// Geometry of the file a conversion will produce.
fn output_metadata(source: &SphericalMetadata, spec: &FilterSpec) -> SphericalMetadata {
    let target = spec.target_projection;
    let metadata = source
        .with_projection(target)
        .with_stereo_mode(spec.output_stereo_mode());

    match (target, spec.viewport, spec.resolution) {
        (ProjectionType::Flat, Some(viewport), _) => {
            let fov = FieldOfView::new(viewport.fov, vertical_fov(&viewport))
                .unwrap_or_else(|| FieldOfView::for_projection(ProjectionType::Flat));
            metadata
                .with_dimensions(viewport.output_width, viewport.output_height)
                .with_fov(fov)
        }
        (_, _, Some(resolution)) => metadata.with_dimensions(resolution.width, resolution.height),
        _ => metadata,
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output")
        .to_string()
}

/// Output path for a job when only a directory is given.
pub fn default_output_path(source: &Path, output_dir: &Path, target: ProjectionType) -> PathBuf {
    output_dir.join(format!("{}_{}.mp4", file_stem(source), target))
}
