//! Spherical video conversion worker.
//!
//! Drives projection conversions, batches, preview grids and thumbnail
//! extraction through an [`vr360_media::EncodingService`].

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod thumbnails;

#[cfg(test)]
pub(crate) mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use orchestrator::{CancelHandle, ConversionOrchestrator};
