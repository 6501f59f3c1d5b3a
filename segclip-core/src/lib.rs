//! segclip-core — highlight-aware video segmentation pipeline.
//!
//! This crate provides:
//! - **config**: the `Config` parameter bundle threaded through every stage.
//! - **decoder**: the `Decoder` collaborator (`FfmpegDecoder`, `SyntheticDecoder`).
//! - **features**: the Feature Extractor (`ExtractedFeatures`).
//! - **cache**: the on-disk Feature Cache.
//! - **anchors**: the Anchor Detector.
//! - **boundaries**: the Boundary Scorer.
//! - **windows**: the Window Selector.
//! - **post_filter**: the four-pass Post-Filter.
//! - **debug**: debug JSON/SVG artifact writers.
//! - **runner**: the Pipeline Runner orchestrating all of the above.
//! - **error**: error kinds shared across the pipeline.

pub mod anchors;
pub mod boundaries;
pub mod cache;
pub mod config;
pub mod debug;
pub mod decoder;
pub mod error;
pub mod features;
pub mod post_filter;
pub mod runner;
pub mod windows;

pub use config::Config;
pub use decoder::{Decoder, FfmpegDecoder, SyntheticDecoder};
pub use runner::{run_pipeline, PipelineResult};
