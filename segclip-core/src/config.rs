//! Immutable pipeline configuration.
//!
//! A single `Config` value is threaded explicitly through every stage;
//! nothing in this crate reads ambient/global configuration.

use serde::{Deserialize, Serialize};

/// Parameter bundle for one pipeline run. Every field here is read by
/// exactly the component named in its doc comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Feature Extractor: sampling step of the shared `times` axis, seconds.
    pub step_sec: f64,
    /// Feature Extractor: PCM sample rate requested from the Decoder.
    pub audio_sample_rate: u32,
    /// Feature Extractor: grayscale frame rate requested from the Decoder.
    pub motion_fps: f64,
    /// Feature Extractor: grayscale frame width (height is derived as 9:16).
    pub motion_width: u32,

    /// Window Selector: minimum final clip duration, seconds.
    pub min_clip_seconds: f64,
    /// Window Selector: maximum final clip duration, seconds.
    pub max_clip_seconds: f64,
    /// Window Selector: how far before the anchor to search for a start boundary.
    pub pre_max: f64,
    /// Window Selector: how close to the anchor the start search may come.
    pub pre_min: f64,
    /// Window Selector: how far after the anchor to search for an end boundary.
    pub post_max: f64,
    /// Window Selector: how close to the anchor the end search may come.
    pub post_min: f64,
    /// Window Selector: start offset used when no boundary is found in range.
    pub fallback_pre: f64,
    /// Window Selector: end offset used when no boundary is found in range.
    pub fallback_post: f64,

    /// Anchor Detector: minimum spacing between anchors of the same method.
    pub anchor_suppression_window_sec: f64,
    /// Anchor Detector: excitement threshold for the primary round.
    pub anchor_excitement_threshold: f64,
    /// Anchor Detector: caps the adaptive anchor budget per minute of video.
    pub max_anchors_per_minute: f64,

    /// Boundary Scorer: weight of the scene-proximity component.
    pub boundary_w_scene: f64,
    /// Boundary Scorer: weight of the audio-dip-valley component.
    pub boundary_w_audio_dip: f64,
    /// Boundary Scorer: weight of the fade-proximity component.
    pub boundary_w_fade: f64,
    /// Boundary Scorer: weight of the motion-valley component.
    pub boundary_w_motion_valley: f64,
    /// Boundary Scorer: minimum valley spacing / spacing-penalty radius, seconds.
    pub boundary_min_spacing_sec: f64,
    /// Boundary Scorer: minimum combined score to emit a candidate.
    pub boundary_candidate_threshold: f64,

    /// Post-Filter: soft cap on final clip count.
    pub target_clip_count_soft: usize,
    /// Post-Filter (overlap pass): max allowed IoU between kept clips.
    pub overlap_iou_threshold: f64,
    /// Post-Filter (boring pass) / Window Selector (narrative n/a):
    /// excitement level below which a sample counts as "boring".
    pub boring_threshold: f64,
    /// Post-Filter (boring pass): fraction of low-excitement samples
    /// required to call a window boring.
    pub boring_duration_ratio: f64,

    /// Window Selector (quality score): weight of excitement_score.
    pub quality_w_excitement: f64,
    /// Window Selector (quality score): weight subtracted for dead time.
    pub quality_w_dead_time_penalty: f64,
    /// Window Selector (quality score): weight of boundary_quality.
    pub quality_w_boundary_quality: f64,
    /// Window Selector (quality score): weight of narrative_score.
    pub quality_w_narrative: f64,

    /// Feature Extractor: threshold passed to the Decoder's scene-cut query.
    pub scene_threshold: f64,

    /// Pipeline Runner: whether to write `debug/segmentation_v2_debug.json`.
    pub write_debug_json: bool,
    /// Pipeline Runner: whether to write `debug/segmentation_v2_plot.svg`.
    pub write_debug_plot: bool,

    /// Feature Cache: opaque token stamped onto persisted features; any
    /// change invalidates every cache entry on disk.
    pub cache_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            step_sec: 0.5,
            audio_sample_rate: 16_000,
            motion_fps: 4.0,
            motion_width: 160,

            min_clip_seconds: 5.0,
            max_clip_seconds: 60.0,
            pre_max: 14.0,
            pre_min: 2.0,
            post_max: 28.0,
            post_min: 2.0,
            fallback_pre: 8.0,
            fallback_post: 12.0,

            anchor_suppression_window_sec: 4.0,
            anchor_excitement_threshold: 0.3,
            max_anchors_per_minute: 8.0,

            boundary_w_scene: 0.45,
            boundary_w_audio_dip: 0.25,
            boundary_w_fade: 0.15,
            boundary_w_motion_valley: 0.15,
            boundary_min_spacing_sec: 1.5,
            boundary_candidate_threshold: 0.1,

            target_clip_count_soft: 200,
            overlap_iou_threshold: 0.35,
            boring_threshold: 0.15,
            boring_duration_ratio: 0.7,

            quality_w_excitement: 0.4,
            quality_w_dead_time_penalty: 0.2,
            quality_w_boundary_quality: 0.2,
            quality_w_narrative: 0.2,

            scene_threshold: 0.3,

            write_debug_json: true,
            write_debug_plot: false,

            cache_version: "v2.0.0".to_string(),
        }
    }
}

/// Dead-time threshold used in quality scoring (§4.6); distinct from
/// `Config::boring_threshold` and not itself a Config field (see
/// DESIGN.md open-question decisions).
pub const DEAD_TIME_THRESHOLD: f64 = 0.1;

/// Relative trust weights for the three anchor-detection methods.
pub const ANCHOR_WEIGHT_EXCITEMENT: f64 = 1.0;
pub const ANCHOR_WEIGHT_AUDIO: f64 = 0.7;
pub const ANCHOR_WEIGHT_ACTION: f64 = 0.6;

/// Duration below which freeze-frame extraction is skipped.
pub const FREEZE_DETECTION_MAX_DURATION_SEC: f64 = 600.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.step_sec, 0.5);
        assert_eq!(cfg.audio_sample_rate, 16_000);
        assert_eq!(cfg.target_clip_count_soft, 200);
        assert_eq!(cfg.cache_version, "v2.0.0");
    }

    #[test]
    fn roundtrips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
