//! Window Selector: snaps each anchor to start/end boundaries,
//! enforces duration bounds, and scores the result.

use crate::anchors::Anchor;
use crate::boundaries::BoundaryCandidate;
use crate::config::{Config, DEAD_TIME_THRESHOLD};
use crate::error::InvalidWindowError;
use crate::features::ExtractedFeatures;
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartReason {
    BoundarySnap,
    FallbackOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    BoundarySnap,
    FallbackOffset,
    HardCutMaxDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub start_sec: f64,
    pub end_sec: f64,
    pub anchor_time_sec: f64,
    pub anchor_score: f64,
    pub quality_score: f64,
    pub excitement_score: f64,
    pub dead_time_penalty: f64,
    pub boundary_quality: f64,
    pub narrative_score: f64,
    pub start_boundary_score: f64,
    pub end_boundary_score: f64,
    pub start_reason: StartReason,
    pub end_reason: EndReason,
}

fn boundaries_in_range(boundaries: &[BoundaryCandidate], lo: f64, hi: f64) -> Vec<&BoundaryCandidate> {
    if lo >= hi {
        return Vec::new();
    }
    boundaries.iter().filter(|b| b.time_sec >= lo && b.time_sec <= hi).collect()
}

fn select_start(anchor_time: f64, boundaries: &[BoundaryCandidate], config: &Config) -> (f64, f64, StartReason) {
    let lo = (anchor_time - config.pre_max).max(0.0);
    let hi = (anchor_time - config.pre_min).max(0.0);
    let candidates = boundaries_in_range(boundaries, lo, hi);

    if let Some(best) = candidates.iter().max_by(|a, b| a.score.partial_cmp(&b.score).unwrap()) {
        (best.time_sec, best.score, StartReason::BoundarySnap)
    } else {
        ((anchor_time - config.fallback_pre).max(0.0), 0.0, StartReason::FallbackOffset)
    }
}

fn select_end(
    anchor_time: f64,
    start: f64,
    duration: f64,
    boundaries: &[BoundaryCandidate],
    features: &ExtractedFeatures,
    config: &Config,
) -> (f64, f64, EndReason) {
    let max_end = duration.min(start + config.max_clip_seconds);
    let lo = anchor_time + config.post_min;
    let hi = max_end.min(anchor_time + config.post_max);
    let candidates = boundaries_in_range(boundaries, lo, hi);

    if !candidates.is_empty() {
        let best = candidates
            .iter()
            .max_by(|a, b| {
                let bonus_a = (0.1 * features.excitement_integral(anchor_time.max(a.time_sec - 3.0), a.time_sec)).min(0.2);
                let bonus_b = (0.1 * features.excitement_integral(anchor_time.max(b.time_sec - 3.0), b.time_sec)).min(0.2);
                (a.score + bonus_a).partial_cmp(&(b.score + bonus_b)).unwrap()
            })
            .unwrap();
        (best.time_sec, best.score, EndReason::BoundarySnap)
    } else {
        let fallback = duration.min((start + config.max_clip_seconds).min(anchor_time + config.fallback_post));
        (fallback, 0.0, EndReason::FallbackOffset)
    }
}

fn enforce_duration(
    mut start: f64,
    mut end: f64,
    mut end_reason: EndReason,
    duration: f64,
    config: &Config,
) -> Option<(f64, f64, EndReason)> {
    if end - start < config.min_clip_seconds {
        let deficit = config.min_clip_seconds - (end - start);
        start = (start - deficit / 2.0).max(0.0);
        end = (end + deficit / 2.0).min(duration);

        if end - start < config.min_clip_seconds {
            if duration - start >= config.min_clip_seconds {
                end = start + config.min_clip_seconds;
            } else if end >= config.min_clip_seconds {
                start = end - config.min_clip_seconds;
            }
        }
    }

    if end - start > config.max_clip_seconds {
        end = start + config.max_clip_seconds;
        end_reason = EndReason::HardCutMaxDuration;
    }

    if end <= start {
        return None;
    }

    Some((start, end, end_reason))
}

fn compute_quality_score(
    start: f64,
    end: f64,
    anchor_time: f64,
    anchor_score: f64,
    start_boundary_score: f64,
    end_boundary_score: f64,
    features: &ExtractedFeatures,
    config: &Config,
) -> (f64, f64, f64, f64, f64) {
    let dur = (end - start).max(1e-9);
    let integral = features.excitement_integral(start, end);
    let excitement_score = integral / dur.max(1.0);

    let (lo_idx, hi_idx) = features.index_range(start, end);
    let low_ratio = if hi_idx > lo_idx {
        features.excitement[lo_idx..hi_idx].iter().filter(|&&v| v < DEAD_TIME_THRESHOLD).count() as f64 / (hi_idx - lo_idx) as f64
    } else {
        0.0
    };
    let dead_time_penalty = low_ratio * config.quality_w_dead_time_penalty;

    let boundary_quality = (start_boundary_score + end_boundary_score) / 2.0;

    let min_off = (anchor_time - start).min(end - anchor_time);
    let ideal = 0.2 * dur;
    let narrative_score = if ideal <= 0.0 || min_off >= ideal { 1.0 } else { min_off / ideal };

    let raw = config.quality_w_excitement * excitement_score
        + config.quality_w_boundary_quality * boundary_quality
        + config.quality_w_narrative * narrative_score
        - dead_time_penalty;

    let quality_score = raw * (0.5 + 0.5 * anchor_score.min(1.0));

    (quality_score, excitement_score, dead_time_penalty, boundary_quality, narrative_score)
}

/// Build one `ClipWindow` per anchor, discarding anchors whose
/// window collapses to `end <= start` after clamping.
pub fn select_windows(anchors: &[Anchor], boundaries: &[BoundaryCandidate], features: &ExtractedFeatures, config: &Config) -> Vec<ClipWindow> {
    let mut windows = Vec::with_capacity(anchors.len());

    for anchor in anchors {
        let t_a = anchor.time_sec;
        let (start, start_boundary_score, start_reason) = select_start(t_a, boundaries, config);
        let (end, end_boundary_score, end_reason) = select_end(t_a, start, features.duration, boundaries, features, config);

        let Some((start, end, end_reason)) = enforce_duration(start, end, end_reason, features.duration, config) else {
            let err = InvalidWindowError { anchor_time_sec: t_a, reason: "end <= start after clamping".to_string() };
            warn!("discarding anchor: {err}");
            continue;
        };

        let (quality_score, excitement_score, dead_time_penalty, boundary_quality, narrative_score) =
            compute_quality_score(start, end, t_a, anchor.score, start_boundary_score, end_boundary_score, features, config);

        windows.push(ClipWindow {
            start_sec: start,
            end_sec: end,
            anchor_time_sec: t_a,
            anchor_score: anchor.score,
            quality_score,
            excitement_score,
            dead_time_penalty,
            boundary_quality,
            narrative_score,
            start_boundary_score,
            end_boundary_score,
            start_reason,
            end_reason,
        });
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::AnchorReason;
    use crate::features::ExtractedFeatures;

    fn flat_features(duration: f64, step_sec: f64) -> ExtractedFeatures {
        let n = (duration / step_sec).floor() as usize + 1;
        let times: Vec<f64> = (0..n).map(|i| i as f64 * step_sec).collect();
        ExtractedFeatures {
            audio_rms: vec![0.0; n],
            audio_rms_z: vec![0.0; n],
            motion_score: vec![0.0; n],
            motion_score_z: vec![0.0; n],
            excitement: vec![0.5; n],
            scene_cuts: vec![],
            fade_timestamps: vec![],
            freeze_timestamps: vec![],
            duration,
            step_sec,
            version: "v2.0.0".to_string(),
            degraded_signals: vec![],
            times,
        }
    }

    #[test]
    fn fallback_window_respects_bounds() {
        let cfg = Config::default();
        let features = flat_features(120.0, cfg.step_sec);
        let anchors = vec![Anchor { time_sec: 60.0, score: 0.8, audio_z: 0.0, motion_z: 0.0, reason: AnchorReason::ExcitementPeak }];
        let windows = select_windows(&anchors, &[], &features, &cfg);
        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert!(w.start_sec < w.anchor_time_sec);
        assert!(w.anchor_time_sec <= w.end_sec);
        let dur = w.end_sec - w.start_sec;
        assert!(dur >= cfg.min_clip_seconds - 1e-6 && dur <= cfg.max_clip_seconds + 1e-6);
    }

    #[test]
    fn boundary_snap_used_when_available() {
        let cfg = Config::default();
        let features = flat_features(120.0, cfg.step_sec);
        let anchors = vec![Anchor { time_sec: 60.0, score: 0.8, audio_z: 0.0, motion_z: 0.0, reason: AnchorReason::ExcitementPeak }];
        let boundaries = vec![
            BoundaryCandidate { time_sec: 50.0, score: 0.9, scene_strength: 1.0, audio_dip_strength: 0.0, fade_strength: 0.0, motion_valley_strength: 0.0 },
            BoundaryCandidate { time_sec: 70.0, score: 0.7, scene_strength: 1.0, audio_dip_strength: 0.0, fade_strength: 0.0, motion_valley_strength: 0.0 },
        ];
        let windows = select_windows(&anchors, &boundaries, &features, &cfg);
        assert_eq!(windows[0].start_reason, StartReason::BoundarySnap);
        assert_eq!(windows[0].start_sec, 50.0);
    }

    #[test]
    fn near_end_of_video_is_clamped() {
        let cfg = Config::default();
        let features = flat_features(65.0, cfg.step_sec);
        let anchors = vec![Anchor { time_sec: 63.0, score: 0.5, audio_z: 0.0, motion_z: 0.0, reason: AnchorReason::ExcitementPeak }];
        let windows = select_windows(&anchors, &[], &features, &cfg);
        assert_eq!(windows.len(), 1);
        assert!(windows[0].end_sec <= 65.0 + 1e-9);
    }
}
