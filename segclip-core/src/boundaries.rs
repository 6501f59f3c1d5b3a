//! Boundary Scorer: combines scene/fade proximity and audio/motion
//! valley proximity into one candidate-boundary score per sample.

use crate::config::Config;
use crate::features::ExtractedFeatures;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCandidate {
    pub time_sec: f64,
    pub score: f64,
    pub scene_strength: f64,
    pub audio_dip_strength: f64,
    pub fade_strength: f64,
    pub motion_valley_strength: f64,
}

const EVENT_DECAY_TAU: f64 = 0.5;
const VALLEY_SPREAD_TAU: f64 = 0.3;
const VALLEY_SPREAD_RADIUS_SEC: f64 = 1.0;

/// `p[i] = max_{e in events} exp(-|times[i] - e| / tau)`.
fn proximity_from_events(times: &[f64], events: &[f64]) -> Vec<f64> {
    if events.is_empty() {
        return vec![0.0; times.len()];
    }
    times
        .iter()
        .map(|&t| {
            events
                .iter()
                .map(|&e| (-(t - e).abs() / EVENT_DECAY_TAU).exp())
                .fold(0.0, f64::max)
        })
        .collect()
}

/// Local minima of `values` (already z-scored) with a minimum
/// spacing of `spacing_samples`, accepted greedily by descending
/// strength `max(0, -value)`.
fn find_valleys(values: &[f64], times: &[f64], spacing_samples: usize) -> Vec<(f64, f64)> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = (1..n - 1)
        .filter(|&i| {
            if !(values[i] < values[i - 1] && values[i] < values[i + 1]) {
                return false;
            }
            let lo = i.saturating_sub(spacing_samples);
            let hi = (i + spacing_samples + 1).min(n);
            values[i] <= values[lo..hi].iter().cloned().fold(f64::INFINITY, f64::min)
        })
        .collect();

    candidates.sort_by(|&a, &b| {
        let sa = (-values[a]).max(0.0);
        let sb = (-values[b]).max(0.0);
        sb.partial_cmp(&sa).unwrap()
    });

    let spacing_sec = spacing_samples as f64 * (times.get(1).copied().unwrap_or(1.0) - times.first().copied().unwrap_or(0.0)).max(1e-9);

    let mut accepted: Vec<usize> = Vec::new();
    for i in candidates {
        let too_close = accepted.iter().any(|&j| (times[i] - times[j]).abs() < spacing_sec);
        if !too_close {
            accepted.push(i);
        }
    }

    accepted
        .into_iter()
        .map(|i| (times[i], (-values[i]).max(0.0)))
        .collect()
}

/// Spread each `(valley_time, strength)` into a `±1s` radius via
/// `strength * exp(-|t - valley_time| / tau)`, taking the max across
/// valleys at each sample.
fn spread_valleys(times: &[f64], valleys: &[(f64, f64)]) -> Vec<f64> {
    times
        .iter()
        .map(|&t| {
            valleys
                .iter()
                .filter(|(v, _)| (t - v).abs() <= VALLEY_SPREAD_RADIUS_SEC)
                .map(|&(v, s)| s * (-(t - v).abs() / VALLEY_SPREAD_TAU).exp())
                .fold(0.0, f64::max)
        })
        .collect()
}

fn normalize_by_max(values: &[f64]) -> Vec<f64> {
    let max = values.iter().cloned().fold(0.0, f64::max);
    if max <= 0.0 {
        return values.to_vec();
    }
    values.iter().map(|&v| v / max).collect()
}

/// Compute per-sample boundary scores and emit one `BoundaryCandidate`
/// for every sample whose final score is at least
/// `config.boundary_candidate_threshold`.
pub fn compute_boundary_scores(features: &ExtractedFeatures, config: &Config) -> Vec<BoundaryCandidate> {
    let times = &features.times;
    let n = times.len();
    if n == 0 {
        return Vec::new();
    }

    let spacing_samples = (config.boundary_min_spacing_sec / config.step_sec).ceil().max(1.0) as usize;

    let scene = normalize_by_max(&proximity_from_events(times, &features.scene_cuts));
    let fade = normalize_by_max(&proximity_from_events(times, &features.fade_timestamps));

    let audio_valleys = find_valleys(&features.audio_rms_z, times, spacing_samples);
    let audio_dip = normalize_by_max(&spread_valleys(times, &audio_valleys));

    let motion_valleys = find_valleys(&features.motion_score_z, times, spacing_samples);
    let motion_valley = normalize_by_max(&spread_valleys(times, &motion_valleys));

    let combined: Vec<f64> = (0..n)
        .map(|i| {
            config.boundary_w_scene * scene[i]
                + config.boundary_w_audio_dip * audio_dip[i]
                + config.boundary_w_fade * fade[i]
                + config.boundary_w_motion_valley * motion_valley[i]
        })
        .collect();

    let final_scores: Vec<f64> = (0..n)
        .map(|i| {
            let mut penalty = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let delta = (times[i] - times[j]).abs();
                if delta < config.boundary_min_spacing_sec && combined[j] > combined[i] {
                    penalty += 0.3 * (1.0 - delta / config.boundary_min_spacing_sec);
                }
            }
            (combined[i] - penalty).max(0.0)
        })
        .collect();

    (0..n)
        .filter(|&i| final_scores[i] >= config.boundary_candidate_threshold)
        .map(|i| BoundaryCandidate {
            time_sec: times[i],
            score: final_scores[i],
            scene_strength: scene[i],
            audio_dip_strength: audio_dip[i],
            fade_strength: fade[i],
            motion_valley_strength: motion_valley[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_features(n: usize, step_sec: f64) -> ExtractedFeatures {
        let times: Vec<f64> = (0..n).map(|i| i as f64 * step_sec).collect();
        ExtractedFeatures {
            audio_rms: vec![0.0; n],
            audio_rms_z: vec![0.0; n],
            motion_score: vec![0.0; n],
            motion_score_z: vec![0.0; n],
            excitement: vec![0.0; n],
            scene_cuts: vec![],
            fade_timestamps: vec![],
            freeze_timestamps: vec![],
            duration: (n as f64 - 1.0) * step_sec,
            step_sec,
            version: "v2.0.0".to_string(),
            degraded_signals: vec![],
            times,
        }
    }

    #[test]
    fn no_events_yields_no_candidates() {
        let cfg = Config::default();
        let features = flat_features(240, cfg.step_sec);
        let candidates = compute_boundary_scores(&features, &cfg);
        assert!(candidates.is_empty());
    }

    #[test]
    fn scene_cut_produces_nearby_candidate() {
        let cfg = Config::default();
        let mut features = flat_features(240, cfg.step_sec);
        features.scene_cuts = vec![30.0];
        let candidates = compute_boundary_scores(&features, &cfg);
        assert!(!candidates.is_empty());
        let closest = candidates
            .iter()
            .min_by(|a, b| (a.time_sec - 30.0).abs().partial_cmp(&(b.time_sec - 30.0).abs()).unwrap())
            .unwrap();
        assert!((closest.time_sec - 30.0).abs() < 2.0);
    }

    #[test]
    fn all_scores_are_non_negative() {
        let cfg = Config::default();
        let mut features = flat_features(240, cfg.step_sec);
        features.scene_cuts = vec![10.0, 20.0, 30.0, 40.0];
        features.fade_timestamps = vec![60.0];
        let candidates = compute_boundary_scores(&features, &cfg);
        assert!(candidates.iter().all(|c| c.score >= 0.0));
    }
}
