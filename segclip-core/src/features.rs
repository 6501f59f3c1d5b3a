//! Feature Extractor: turns raw Decoder signals into one sampled
//! time-series per modality, all sharing the `times` axis.

use crate::config::{Config, FREEZE_DETECTION_MAX_DURATION_SEC};
use crate::decoder::{Decoder, FadeEventKind};
use crate::error::{check_cancelled, CancelToken, CancelledError};
use log::warn;
use serde::{Deserialize, Serialize};

/// All sampled arrays share `times`, length `N = floor(duration/step_sec)+1`.
/// Immutable after construction; every later stage only reads from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFeatures {
    pub times: Vec<f64>,
    pub audio_rms: Vec<f64>,
    pub audio_rms_z: Vec<f64>,
    pub motion_score: Vec<f64>,
    pub motion_score_z: Vec<f64>,
    pub excitement: Vec<f64>,
    pub scene_cuts: Vec<f64>,
    pub fade_timestamps: Vec<f64>,
    pub freeze_timestamps: Vec<f64>,
    pub duration: f64,
    pub step_sec: f64,
    pub version: String,
    /// Names of signals that failed extraction and were neutralized
    /// (e.g. "audio", "motion"), for the debug artifact's benefit.
    #[serde(default)]
    pub degraded_signals: Vec<String>,
}

fn sample_count(duration: f64, step_sec: f64) -> usize {
    (duration / step_sec).floor() as usize + 1
}

/// Standard z-score; a zero-variance input yields the zero vector
/// rather than NaN.
pub fn z_score(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let std = variance.sqrt();
    if std < 1e-12 {
        return vec![0.0; n];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

/// Length-preserving 3-tap moving average with edge padding.
pub fn smooth(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return values.to_vec();
    }
    let mut padded = Vec::with_capacity(n + 2);
    padded.push(values[0]);
    padded.extend_from_slice(values);
    padded.push(values[n - 1]);

    (0..n)
        .map(|i| (padded[i] + padded[i + 1] + padded[i + 2]) / 3.0)
        .collect()
}

/// Linearly interpolate `(src_times, src_values)` onto `dst_times`,
/// clamping to the endpoints outside the source range (mirrors
/// `numpy.interp`'s default behavior).
pub fn interp(dst_times: &[f64], src_times: &[f64], src_values: &[f64]) -> Vec<f64> {
    if src_times.is_empty() {
        return vec![0.0; dst_times.len()];
    }
    if src_times.len() == 1 {
        return vec![src_values[0]; dst_times.len()];
    }

    dst_times
        .iter()
        .map(|&t| {
            if t <= src_times[0] {
                return src_values[0];
            }
            if t >= src_times[src_times.len() - 1] {
                return src_values[src_values.len() - 1];
            }
            // First index with src_times[idx] >= t.
            let idx = match src_times.binary_search_by(|probe| probe.partial_cmp(&t).unwrap()) {
                Ok(i) => i,
                Err(i) => i,
            };
            if idx == 0 {
                return src_values[0];
            }
            let (t0, t1) = (src_times[idx - 1], src_times[idx]);
            let (v0, v1) = (src_values[idx - 1], src_values[idx]);
            if (t1 - t0).abs() < 1e-12 {
                return v0;
            }
            v0 + (v1 - v0) * (t - t0) / (t1 - t0)
        })
        .collect()
}

/// Truncate or edge-pad `values` to exactly `n` entries.
fn fit_len(values: &[f64], n: usize) -> Vec<f64> {
    if values.len() == n {
        return values.to_vec();
    }
    if values.is_empty() {
        return vec![0.0; n];
    }
    if values.len() > n {
        return values[..n].to_vec();
    }
    let mut out = values.to_vec();
    let last = out[out.len() - 1];
    out.resize(n, last);
    out
}

fn extract_audio_rms(decoder: &dyn Decoder, video: &str, times: &[f64], config: &Config, cancel: &Option<CancelToken>) -> (Vec<f64>, bool) {
    if check_cancelled(cancel).is_err() {
        return (vec![0.0; times.len()], true);
    }
    let pcm = match decoder.pcm_mono(video, config.audio_sample_rate) {
        Ok(p) => p,
        Err(e) => {
            warn!("audio extraction failed, using neutral signal: {e}");
            return (vec![0.0; times.len()], true);
        }
    };

    let window = ((config.step_sec * config.audio_sample_rate as f64).floor() as usize).max(1);
    if pcm.is_empty() {
        return (vec![0.0; times.len()], true);
    }

    let raw: Vec<f64> = pcm
        .chunks(window)
        .map(|chunk| {
            let mean_sq = chunk
                .iter()
                .map(|&s| {
                    let f = s as f64 / i16::MAX as f64;
                    f * f
                })
                .sum::<f64>()
                / chunk.len() as f64;
            let rms = mean_sq.sqrt();
            let db = 20.0 * rms.max(1e-10).log10() + 60.0;
            db.max(0.0)
        })
        .collect();

    (smooth(&fit_len(&raw, times.len())), false)
}

fn extract_motion_score(decoder: &dyn Decoder, video: &str, times: &[f64], config: &Config, cancel: &Option<CancelToken>) -> (Vec<f64>, bool) {
    if check_cancelled(cancel).is_err() {
        return (vec![0.0; times.len()], true);
    }
    let frames = match decoder.gray_frames(video, config.motion_fps, config.motion_width) {
        Ok(f) => f,
        Err(e) => {
            warn!("motion extraction failed, using neutral signal: {e}");
            return (vec![0.0; times.len()], true);
        }
    };

    if frames.len() < 2 {
        return (vec![0.0; times.len()], true);
    }

    let mut raw = Vec::with_capacity(frames.len());
    raw.push(0.0); // placeholder for frame 0, replaced below
    for i in 1..frames.len() {
        let a = &frames[i];
        let b = &frames[i - 1];
        let n = a.len().min(b.len()).max(1);
        let diff: f64 = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x as f64 - y as f64).abs())
            .sum::<f64>()
            / n as f64;
        raw.push(diff);
    }
    raw[0] = raw[1];

    let frame_times: Vec<f64> = (0..frames.len())
        .map(|i| i as f64 / config.motion_fps)
        .collect();

    let interpolated = interp(times, &frame_times, &raw);
    (smooth(&interpolated), false)
}

fn detect_scene_cuts(decoder: &dyn Decoder, video: &str, config: &Config, cancel: &Option<CancelToken>) -> Vec<f64> {
    if check_cancelled(cancel).is_err() {
        return Vec::new();
    }
    match decoder.scene_events(video, config.scene_threshold) {
        Ok(mut cuts) => {
            cuts.retain(|&t| t > 0.0);
            cuts.sort_by(|a, b| a.partial_cmp(b).unwrap());
            cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
            cuts
        }
        Err(e) => {
            warn!("scene-cut extraction failed, using empty list: {e}");
            Vec::new()
        }
    }
}

fn detect_fades(decoder: &dyn Decoder, video: &str, cancel: &Option<CancelToken>) -> Vec<f64> {
    if check_cancelled(cancel).is_err() {
        return Vec::new();
    }
    match decoder.black_events(video) {
        Ok(events) => {
            let mut ts: Vec<f64> = events
                .into_iter()
                .filter(|e| matches!(e.kind, FadeEventKind::BlackStart | FadeEventKind::BlackEnd))
                .map(|e| e.time_sec)
                .filter(|&t| t > 0.0)
                .collect();
            ts.sort_by(|a, b| a.partial_cmp(b).unwrap());
            ts.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
            ts
        }
        Err(e) => {
            warn!("fade extraction failed, using empty list: {e}");
            Vec::new()
        }
    }
}

fn detect_freezes(decoder: &dyn Decoder, video: &str, duration: f64, cancel: &Option<CancelToken>) -> Vec<f64> {
    if duration >= FREEZE_DETECTION_MAX_DURATION_SEC {
        return Vec::new();
    }
    if check_cancelled(cancel).is_err() {
        return Vec::new();
    }
    match decoder.freeze_events(video) {
        Ok(mut ts) => {
            ts.retain(|&t| t > 0.0);
            ts.sort_by(|a, b| a.partial_cmp(b).unwrap());
            ts.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
            ts
        }
        Err(e) => {
            warn!("freeze extraction failed, using empty list: {e}");
            Vec::new()
        }
    }
}

/// Build the full `ExtractedFeatures` for one video. Audio, motion,
/// and scene-cut extraction run on independent OS threads (bounded
/// fan-out); each owns its own Decoder call and shares no mutable
/// state with the others, matching the scheduling model of
/// "parallel I/O-bound tasks feeding a sequential CPU stage".
///
/// `cancel` is checked before each per-signal Decoder call, both
/// inside the thread-scope fan-out and before the two sequential
/// fade/freeze calls, and once more before assembly: a cancellation
/// observed at any of these points stops further Decoder calls from
/// starting and this function returns `CancelledError`. A subprocess
/// already in flight when cancellation is observed is not killed —
/// see DESIGN.md.
pub fn extract_features(decoder: &dyn Decoder, video: &str, duration: f64, config: &Config, cancel: &Option<CancelToken>) -> Result<ExtractedFeatures, CancelledError> {
    let n = sample_count(duration, config.step_sec);
    let times: Vec<f64> = (0..n).map(|i| i as f64 * config.step_sec).collect();

    check_cancelled(cancel)?;
    let ((audio_rms, audio_degraded), (motion_score, motion_degraded), scene_cuts) =
        std::thread::scope(|scope| {
            let audio_handle = scope.spawn(|| extract_audio_rms(decoder, video, &times, config, cancel));
            let motion_handle = scope.spawn(|| extract_motion_score(decoder, video, &times, config, cancel));
            let scene_handle = scope.spawn(|| detect_scene_cuts(decoder, video, config, cancel));

            (
                audio_handle.join().unwrap_or((vec![0.0; n], true)),
                motion_handle.join().unwrap_or((vec![0.0; n], true)),
                scene_handle.join().unwrap_or_default(),
            )
        });

    check_cancelled(cancel)?;
    let fade_timestamps = detect_fades(decoder, video, cancel);
    let freeze_timestamps = detect_freezes(decoder, video, duration, cancel);

    check_cancelled(cancel)?;
    let mut degraded_signals = Vec::new();
    if audio_degraded {
        degraded_signals.push("audio".to_string());
    }
    if motion_degraded {
        degraded_signals.push("motion".to_string());
    }

    let audio_rms_z = z_score(&audio_rms);
    let motion_score_z = z_score(&motion_score);

    let excitement: Vec<f64> = audio_rms_z
        .iter()
        .zip(motion_score_z.iter())
        .map(|(&a, &m)| 0.6 * a.max(0.0) + 0.4 * m.max(0.0))
        .collect();

    Ok(ExtractedFeatures {
        times,
        audio_rms,
        audio_rms_z,
        motion_score,
        motion_score_z,
        excitement,
        scene_cuts,
        fade_timestamps,
        freeze_timestamps,
        duration,
        step_sec: config.step_sec,
        version: config.cache_version.clone(),
        degraded_signals,
    })
}

impl ExtractedFeatures {
    /// Nearest-index excitement value at `time_sec`, clamped to range.
    pub fn excitement_at(&self, time_sec: f64) -> f64 {
        if self.excitement.is_empty() {
            return 0.0;
        }
        let idx = (time_sec / self.step_sec).floor() as i64;
        let idx = idx.clamp(0, self.excitement.len() as i64 - 1) as usize;
        self.excitement[idx]
    }

    /// Rectangular integral of `excitement` over `[start_sec, end_sec)`.
    pub fn excitement_integral(&self, start_sec: f64, end_sec: f64) -> f64 {
        let start_idx = (start_sec / self.step_sec).floor().max(0.0) as usize;
        let end_idx_raw = (end_sec / self.step_sec).floor() as i64 + 1;
        let end_idx = (end_idx_raw.max(0) as usize).min(self.excitement.len());
        if start_idx >= end_idx {
            return 0.0;
        }
        self.excitement[start_idx..end_idx].iter().sum::<f64>() * self.step_sec
    }

    /// Index range `[start_idx, end_idx)` covering `[start_sec, end_sec)`,
    /// clamped into bounds. Used by boring-filter and quality scoring.
    pub fn index_range(&self, start_sec: f64, end_sec: f64) -> (usize, usize) {
        let start_idx = (start_sec / self.step_sec).floor().max(0.0) as usize;
        let end_idx_raw = (end_sec / self.step_sec).floor() as i64 + 1;
        let end_idx = (end_idx_raw.max(0) as usize).min(self.excitement.len());
        (start_idx.min(end_idx), end_idx)
    }
}
