//! Anchor Detector: picks highlight centers from the excitement,
//! audio, and motion signals via local-maxima-with-suppression.

use crate::config::{Config, ANCHOR_WEIGHT_ACTION, ANCHOR_WEIGHT_AUDIO, ANCHOR_WEIGHT_EXCITEMENT};
use crate::features::ExtractedFeatures;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorReason {
    ExcitementPeak,
    AudioPeak,
    ActionSequence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub time_sec: f64,
    pub score: f64,
    pub audio_z: f64,
    pub motion_z: f64,
    pub reason: AnchorReason,
}

/// Local-maxima-with-suppression: indices `i` with `a[i] > threshold`
/// that are the max of their own `±radius` window, accepted
/// greedily by descending value within this round (own-round NMS,
/// self-contained), then filtered a second time against anchors
/// already accepted in earlier rounds. A same-round candidate still
/// suppresses a weaker same-round neighbor even if it is itself
/// later rejected for being too close to an earlier-round anchor.
fn local_maxima_with_suppression(
    values: &[f64],
    times: &[f64],
    threshold: f64,
    radius: usize,
    suppression_sec: f64,
    accepted: &mut Vec<usize>,
) -> Vec<usize> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }

    let mut candidates: Vec<usize> = (1..n - 1)
        .filter(|&i| {
            if values[i] <= threshold {
                return false;
            }
            let lo = i.saturating_sub(radius);
            let hi = (i + radius + 1).min(n);
            values[i] >= values[lo..hi].iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        })
        .collect();

    candidates.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap());

    // Pass 1: own-round NMS, using only this round's winners so far.
    let mut own_round: Vec<usize> = Vec::new();
    for i in candidates.drain(..) {
        let too_close = own_round.iter().any(|&j| (times[i] - times[j]).abs() < suppression_sec);
        if !too_close {
            own_round.push(i);
        }
    }

    // Pass 2: filter this round's winners against earlier rounds,
    // extending `accepted` one survivor at a time.
    let mut this_round = Vec::new();
    for i in own_round {
        let too_close = accepted.iter().any(|&j| (times[i] - times[j]).abs() < suppression_sec);
        if !too_close {
            this_round.push(i);
            accepted.push(i);
        }
    }

    this_round
}

fn cut_density(times: &[f64], scene_cuts: &[f64]) -> Vec<f64> {
    times
        .iter()
        .map(|&t| {
            scene_cuts
                .iter()
                .filter(|&&c| (c - t).abs() < 5.0)
                .map(|&c| 1.0 / (1.0 + (c - t).abs()))
                .sum()
        })
        .collect()
}

/// Run the three anchor-detection rounds and return the final
/// top-M anchors, sorted by `time_sec` ascending.
pub fn detect_anchors(features: &ExtractedFeatures, config: &Config) -> Vec<Anchor> {
    let times = &features.times;
    let n = times.len();
    if n == 0 {
        return Vec::new();
    }

    let radius = (config.anchor_suppression_window_sec / config.step_sec).ceil().max(1.0) as usize;
    let max_m = (2.0 * config.target_clip_count_soft as f64) as usize;
    let per_minute_m = ((features.duration / 60.0) * config.max_anchors_per_minute).floor() as usize;
    let m = per_minute_m.min(max_m).max(10);

    let mut accepted_indices: Vec<usize> = Vec::new();
    let mut anchors: Vec<Anchor> = Vec::new();

    // Round 1: excitement_peak.
    let round1 = local_maxima_with_suppression(
        &features.excitement,
        times,
        config.anchor_excitement_threshold,
        radius,
        config.anchor_suppression_window_sec,
        &mut accepted_indices,
    );
    for i in round1 {
        anchors.push(Anchor {
            time_sec: times[i],
            score: features.excitement[i] * ANCHOR_WEIGHT_EXCITEMENT,
            audio_z: features.audio_rms_z[i],
            motion_z: features.motion_score_z[i],
            reason: AnchorReason::ExcitementPeak,
        });
    }

    // Round 2: audio_peak.
    let round2 = local_maxima_with_suppression(
        &features.audio_rms_z,
        times,
        1.5,
        radius,
        config.anchor_suppression_window_sec,
        &mut accepted_indices,
    );
    for i in round2 {
        anchors.push(Anchor {
            time_sec: times[i],
            score: features.audio_rms_z[i] * ANCHOR_WEIGHT_AUDIO,
            audio_z: features.audio_rms_z[i],
            motion_z: features.motion_score_z[i],
            reason: AnchorReason::AudioPeak,
        });
    }

    // Round 3: action_sequence.
    let density = cut_density(times, &features.scene_cuts);
    let action_score: Vec<f64> = features
        .motion_score_z
        .iter()
        .zip(density.iter())
        .map(|(&m, &d)| m * (1.0 + 0.5 * d))
        .collect();
    let round3 = local_maxima_with_suppression(
        &action_score,
        times,
        1.0,
        radius,
        config.anchor_suppression_window_sec,
        &mut accepted_indices,
    );
    for i in round3 {
        anchors.push(Anchor {
            time_sec: times[i],
            score: action_score[i] * ANCHOR_WEIGHT_ACTION,
            audio_z: features.audio_rms_z[i],
            motion_z: features.motion_score_z[i],
            reason: AnchorReason::ActionSequence,
        });
    }

    anchors.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    anchors.truncate(m);
    anchors.sort_by(|a, b| a.time_sec.partial_cmp(&b.time_sec).unwrap());
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{ProbeInfo, SyntheticDecoder};
    use crate::features::extract_features;

    fn spiky_decoder(cfg: &Config, duration: f64, spikes: &[f64]) -> SyntheticDecoder {
        let n_samples = (duration * cfg.audio_sample_rate as f64) as usize;
        let sr = cfg.audio_sample_rate as f64;
        let mut pcm = vec![0i16; n_samples];
        for &spike_t in spikes {
            let center = (spike_t * sr) as usize;
            for k in center.saturating_sub(200)..(center + 200).min(n_samples) {
                pcm[k] = 12000;
            }
        }
        SyntheticDecoder {
            probe: Some(ProbeInfo { duration_sec: duration, width: 160, height: 90, fps: 4.0, codecs: vec![] }),
            pcm,
            pcm_sample_rate: cfg.audio_sample_rate,
            frames: vec![vec![0u8; 160 * 90]; (duration as usize) * 4],
            frame_width: 160,
            scene_cuts: vec![],
            black_events: vec![],
            freeze_events: vec![],
        }
    }

    #[test]
    fn detects_anchors_near_audio_spikes() {
        let cfg = Config::default();
        let decoder = spiky_decoder(&cfg, 120.0, &[30.0, 90.0]);
        let features = extract_features(&decoder, "video.mp4", 120.0, &cfg, &None).unwrap();
        let anchors = detect_anchors(&features, &cfg);

        assert!(!anchors.is_empty());
        let near_30 = anchors.iter().any(|a| (a.time_sec - 30.0).abs() < 5.0);
        let near_90 = anchors.iter().any(|a| (a.time_sec - 90.0).abs() < 5.0);
        assert!(near_30, "expected an anchor near t=30s, got {anchors:?}");
        assert!(near_90, "expected an anchor near t=90s, got {anchors:?}");
    }

    #[test]
    fn anchors_sorted_by_time_ascending() {
        let cfg = Config::default();
        let decoder = spiky_decoder(&cfg, 120.0, &[10.0, 50.0, 100.0]);
        let features = extract_features(&decoder, "video.mp4", 120.0, &cfg, &None).unwrap();
        let anchors = detect_anchors(&features, &cfg);
        let times: Vec<f64> = anchors.iter().map(|a| a.time_sec).collect();
        let mut sorted = times.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(times, sorted);
    }

    #[test]
    fn constant_signal_yields_no_anchors() {
        let cfg = Config::default();
        let duration = 60.0;
        let decoder = SyntheticDecoder {
            probe: Some(ProbeInfo { duration_sec: duration, width: 160, height: 90, fps: 4.0, codecs: vec![] }),
            pcm: vec![0i16; (duration * cfg.audio_sample_rate as f64) as usize],
            pcm_sample_rate: cfg.audio_sample_rate,
            frames: vec![vec![0u8; 160 * 90]; (duration as usize) * 4],
            frame_width: 160,
            scene_cuts: vec![],
            black_events: vec![],
            freeze_events: vec![],
        };
        let features = extract_features(&decoder, "video.mp4", duration, &cfg, &None).unwrap();
        let anchors = detect_anchors(&features, &cfg);
        assert!(anchors.is_empty());
    }

    #[test]
    fn anchor_count_is_capped() {
        let cfg = Config::default();
        let duration = 600.0;
        let spikes: Vec<f64> = (0..200).map(|i| i as f64 * 3.0).collect();
        let decoder = spiky_decoder(&cfg, duration, &spikes);
        let features = extract_features(&decoder, "video.mp4", duration, &cfg, &None).unwrap();
        let anchors = detect_anchors(&features, &cfg);
        let max_m = (2.0 * cfg.target_clip_count_soft as f64) as usize;
        assert!(anchors.len() <= max_m);
    }
}
