//! Pipeline Runner — orchestrates the five stages end to end,
//! reporting monotonic progress and honoring cooperative cancellation.

use crate::anchors::{detect_anchors, Anchor};
use crate::boundaries::{compute_boundary_scores, BoundaryCandidate};
use crate::cache;
use crate::config::Config;
use crate::debug;
use crate::decoder::Decoder;
pub use crate::error::{new_cancel_token, CancelToken};
use crate::error::{check_cancelled, FatalDecoderError, PipelineError};
use crate::features::{extract_features, ExtractedFeatures};
use crate::post_filter::{apply_post_filters, FilterDecision};
use crate::windows::{select_windows, ClipWindow};
use log::info;
use std::path::Path;

/// Reports overall progress as a percentage (0-100) plus a short
/// human-readable message.
pub type ProgressCallback = Box<dyn Fn(u8, &str) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub clips: Vec<ClipWindow>,
    pub anchors: Vec<Anchor>,
    pub boundaries: Vec<BoundaryCandidate>,
    pub features: ExtractedFeatures,
    pub filter_report: Vec<FilterDecision>,
    pub config: Config,
}

/// Run the full segmentation pipeline against `video` using
/// `project_dir` for cache/debug artifacts, reporting progress at
/// the checkpoints 0, 5, 40, 45, 55, 60, 70, 75, 80, 82, 90, 95.
pub fn run_pipeline(
    decoder: &dyn Decoder,
    video: &str,
    project_dir: &Path,
    config: &Config,
    progress: &Option<ProgressCallback>,
    cancel: &Option<CancelToken>,
) -> Result<PipelineResult, PipelineError> {
    macro_rules! prog {
        ($pct:expr, $msg:expr) => {
            if let Some(cb) = progress {
                cb($pct, $msg);
            }
        };
    }

    macro_rules! bail_if_cancelled {
        () => {
            check_cancelled(cancel)?;
        };
    }

    prog!(0, "probing source video");
    bail_if_cancelled!();
    let probe = decoder.probe(video).map_err(|e| FatalDecoderError(e.0))?;

    let debug_dir = project_dir.join("debug");

    prog!(5, "loading or extracting features");
    bail_if_cancelled!();
    let features = match cache::load(project_dir, &config.cache_version) {
        Ok(Some(f)) => {
            info!("using cached features for {video}");
            f
        }
        _ => {
            let extracted = extract_features(decoder, video, probe.duration_sec, config, cancel)?;
            if let Err(e) = cache::save(project_dir, &extracted) {
                log::warn!("failed to persist feature cache: {e}");
            }
            extracted
        }
    };
    prog!(40, "features ready");

    prog!(45, "detecting anchors");
    bail_if_cancelled!();
    let anchors = detect_anchors(&features, config);
    prog!(55, "anchors detected");

    prog!(60, "scoring boundaries");
    bail_if_cancelled!();
    let boundaries = compute_boundary_scores(&features, config);
    prog!(70, "boundaries scored");

    prog!(75, "selecting windows");
    bail_if_cancelled!();
    let candidate_windows = select_windows(&anchors, &boundaries, &features, config);
    prog!(80, "windows selected");

    prog!(82, "applying post-filters");
    bail_if_cancelled!();
    let (final_clips, filter_report) = apply_post_filters(&candidate_windows, &features, decoder, video, config, cancel)?;
    prog!(90, "post-filters applied");

    if config.write_debug_json {
        if let Err(e) = debug::write_debug_json(&debug_dir, config, &features, &anchors, &boundaries, &candidate_windows, &filter_report, &final_clips) {
            log::warn!("failed to write debug json: {e}");
        }
    }
    if config.write_debug_plot {
        debug::write_debug_plot(&debug_dir, &features, &anchors, &final_clips);
    }

    prog!(95, "done");

    Ok(PipelineResult {
        clips: final_clips,
        anchors,
        boundaries,
        features,
        filter_report,
        config: config.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{ProbeInfo, SyntheticDecoder};
    use std::sync::atomic::Ordering;

    #[test]
    fn runs_end_to_end_against_synthetic_decoder() {
        let cfg = Config::default();
        let duration = 60.0;
        let decoder = SyntheticDecoder {
            probe: Some(ProbeInfo { duration_sec: duration, width: 160, height: 90, fps: 4.0, codecs: vec![] }),
            pcm: {
                let sr = cfg.audio_sample_rate as f64;
                let n = (duration * sr) as usize;
                let mut v = vec![0i16; n];
                for i in (5 * sr as usize)..(6 * sr as usize).min(n) {
                    v[i] = 10000;
                }
                v
            },
            pcm_sample_rate: cfg.audio_sample_rate,
            frames: vec![vec![0u8; 160 * 90]; (duration as usize) * 4],
            frame_width: 160,
            scene_cuts: vec![5.5],
            black_events: vec![],
            freeze_events: vec![],
        };

        let dir = tempfile::tempdir().unwrap();
        let progress_log = std::sync::Mutex::new(Vec::new());
        let progress: ProgressCallback = Box::new(move |pct, msg| {
            progress_log.lock().unwrap().push((pct, msg.to_string()));
        });

        let result = run_pipeline(&decoder, "video.mp4", dir.path(), &cfg, &Some(progress), &None).unwrap();
        assert_eq!(result.features.duration, duration);
        assert!(result.clips.iter().all(|c| c.start_sec < c.end_sec));
    }

    #[test]
    fn cancellation_before_start_returns_fatal_error() {
        let cfg = Config::default();
        let decoder = SyntheticDecoder {
            probe: Some(ProbeInfo { duration_sec: 30.0, width: 160, height: 90, fps: 4.0, codecs: vec![] }),
            pcm_sample_rate: cfg.audio_sample_rate,
            frame_width: 160,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let token = new_cancel_token();
        token.store(true, Ordering::Relaxed);

        let result = run_pipeline(&decoder, "video.mp4", dir.path(), &cfg, &None, &Some(token));
        assert!(result.is_err());
    }

    #[test]
    fn second_run_uses_feature_cache() {
        let cfg = Config::default();
        let decoder = SyntheticDecoder {
            probe: Some(ProbeInfo { duration_sec: 30.0, width: 160, height: 90, fps: 4.0, codecs: vec![] }),
            pcm_sample_rate: cfg.audio_sample_rate,
            frame_width: 160,
            frames: vec![vec![0u8; 160 * 90]; 120],
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();

        let first = run_pipeline(&decoder, "video.mp4", dir.path(), &cfg, &None, &None).unwrap();
        let second = run_pipeline(&decoder, "video.mp4", dir.path(), &cfg, &None, &None).unwrap();
        assert_eq!(first.features, second.features);
    }
}
