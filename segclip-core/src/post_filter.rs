//! Post-Filter: four sequential passes over the candidate windows —
//! overlap resolution, boring-clip removal, perceptual-hash
//! deduplication, and a soft cap on total clip count.

use crate::config::Config;
use crate::decoder::Decoder;
use crate::error::{check_cancelled, CancelToken, CancelledError};
use crate::features::ExtractedFeatures;
use crate::windows::ClipWindow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterAction {
    Keep,
    DropOverlap,
    DropBoring,
    DropDuplicate,
    DropQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDecision {
    pub clip_index: usize,
    pub action: FilterAction,
    pub reason: String,
    pub related_clip_index: Option<usize>,
}

/// 1-D interval intersection-over-union.
pub fn compute_iou(a: &ClipWindow, b: &ClipWindow) -> f64 {
    let inter = (a.end_sec.min(b.end_sec) - a.start_sec.max(b.start_sec)).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }
    let union = (a.end_sec.max(b.end_sec)) - (a.start_sec.min(b.start_sec));
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedily accept windows by descending `quality_score`, dropping
/// any whose IoU with an already-kept window exceeds `threshold`.
fn resolve_overlaps(windows: &[ClipWindow], threshold: f64) -> (Vec<usize>, Vec<FilterDecision>) {
    let mut order: Vec<usize> = (0..windows.len()).collect();
    order.sort_by(|&a, &b| windows[b].quality_score.partial_cmp(&windows[a].quality_score).unwrap());

    let mut kept: Vec<usize> = Vec::new();
    let mut decisions = Vec::with_capacity(windows.len());

    for &i in &order {
        let blocker = kept.iter().find(|&&k| compute_iou(&windows[i], &windows[k]) > threshold);
        match blocker {
            Some(&k) => decisions.push(FilterDecision {
                clip_index: i,
                action: FilterAction::DropOverlap,
                reason: format!("IoU with clip {k} exceeds {threshold}"),
                related_clip_index: Some(k),
            }),
            None => {
                kept.push(i);
                decisions.push(FilterDecision { clip_index: i, action: FilterAction::Keep, reason: "no blocking overlap".to_string(), related_clip_index: None });
            }
        }
    }

    (kept, decisions)
}

/// Drop a kept window iff mean excitement in range is below
/// threshold, the low-excitement ratio exceeds the configured bound,
/// and the anchor score is weak.
fn filter_boring(kept: &[usize], windows: &[ClipWindow], features: &ExtractedFeatures, config: &Config) -> (Vec<usize>, Vec<FilterDecision>) {
    let mut survivors = Vec::with_capacity(kept.len());
    let mut decisions = Vec::with_capacity(kept.len());

    for &i in kept {
        let w = &windows[i];
        let (lo, hi) = features.index_range(w.start_sec, w.end_sec);
        let is_boring = if hi > lo {
            let slice = &features.excitement[lo..hi];
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let low_ratio = slice.iter().filter(|&&v| v < config.boring_threshold).count() as f64 / slice.len() as f64;
            mean < config.boring_threshold && low_ratio > config.boring_duration_ratio && w.anchor_score < 0.5
        } else {
            false
        };

        if is_boring {
            decisions.push(FilterDecision { clip_index: i, action: FilterAction::DropBoring, reason: "low excitement throughout window".to_string(), related_clip_index: None });
        } else {
            survivors.push(i);
            decisions.push(FilterDecision { clip_index: i, action: FilterAction::Keep, reason: "excitement above boring threshold".to_string(), related_clip_index: None });
        }
    }

    (survivors, decisions)
}

/// A weak perceptual hash: threshold a small grayscale frame against
/// its own mean, pack the resulting bits, and truncate the MD5 of
/// that bitstring to 16 hex characters. Returns `"unknown"` if the
/// Decoder cannot supply the frame.
fn simple_frame_hash(decoder: &dyn Decoder, video: &str, time_sec: f64) -> String {
    let frame = match decoder.still_frame(video, time_sec, 16, 16) {
        Ok(f) => f,
        Err(_) => return "unknown".to_string(),
    };
    if frame.is_empty() {
        return "unknown".to_string();
    }

    let mean = frame.iter().map(|&b| b as f64).sum::<f64>() / frame.len() as f64;
    let bits: String = frame.iter().map(|&b| if (b as f64) > mean { '1' } else { '0' }).collect();

    let digest = md5::compute(bits.as_bytes());
    format!("{digest:x}")[..16].to_string()
}

/// Drop later duplicates within a 30s window: same perceptual hash
/// and lower quality than the kept window. Checks `cancel` before
/// each per-candidate `still_frame` call; a cancellation stops
/// further hashing and aborts the whole post-filter pass.
fn deduplicate_clips(
    kept: &[usize],
    windows: &[ClipWindow],
    decoder: &dyn Decoder,
    video: &str,
    cancel: &Option<CancelToken>,
) -> Result<(Vec<usize>, Vec<FilterDecision>), CancelledError> {
    let mut by_start: Vec<usize> = kept.to_vec();
    by_start.sort_by(|&a, &b| windows[a].start_sec.partial_cmp(&windows[b].start_sec).unwrap());

    let mut hashes: Vec<(usize, String)> = Vec::with_capacity(by_start.len());
    let mut survivors = Vec::with_capacity(by_start.len());
    let mut decisions = Vec::with_capacity(by_start.len());

    for &i in &by_start {
        check_cancelled(cancel)?;
        let w = &windows[i];
        let mid = (w.start_sec + w.end_sec) / 2.0;
        let hash = simple_frame_hash(decoder, video, mid);

        let duplicate_of = hashes
            .iter()
            .filter(|(j, _)| (windows[*j].start_sec - w.start_sec).abs() < 30.0)
            .find(|(_, h)| h == &hash && hash != "unknown");

        match duplicate_of {
            Some(&(j, _)) if windows[i].quality_score < windows[j].quality_score => {
                decisions.push(FilterDecision { clip_index: i, action: FilterAction::DropDuplicate, reason: format!("duplicate of clip {j}"), related_clip_index: Some(j) });
            }
            _ => {
                hashes.push((i, hash));
                survivors.push(i);
                decisions.push(FilterDecision { clip_index: i, action: FilterAction::Keep, reason: "no higher-quality duplicate".to_string(), related_clip_index: None });
            }
        }
    }

    Ok((survivors, decisions))
}

/// Cap the total clip count at `target_clip_count_soft`, keeping the
/// highest-quality survivors.
fn filter_by_quality_target(kept: &[usize], windows: &[ClipWindow], target: usize) -> (Vec<usize>, Vec<FilterDecision>) {
    if kept.len() <= target {
        let decisions = kept.iter().map(|&i| FilterDecision { clip_index: i, action: FilterAction::Keep, reason: "within target clip count".to_string(), related_clip_index: None }).collect();
        return (kept.to_vec(), decisions);
    }

    let mut order = kept.to_vec();
    order.sort_by(|&a, &b| windows[b].quality_score.partial_cmp(&windows[a].quality_score).unwrap());

    let survivors: Vec<usize> = order[..target].to_vec();
    let mut decisions = Vec::with_capacity(kept.len());
    for &i in kept {
        if survivors.contains(&i) {
            decisions.push(FilterDecision { clip_index: i, action: FilterAction::Keep, reason: "within quality-capped target count".to_string(), related_clip_index: None });
        } else {
            decisions.push(FilterDecision { clip_index: i, action: FilterAction::DropQuality, reason: format!("below top-{target} by quality"), related_clip_index: None });
        }
    }
    (survivors, decisions)
}

/// Run all four passes in order, returning the final clips (sorted
/// by `start_sec`) and every `FilterDecision` emitted, grouped by pass.
/// `cancel` is checked inside the deduplication pass, the only pass
/// that issues Decoder calls.
pub fn apply_post_filters(
    windows: &[ClipWindow],
    features: &ExtractedFeatures,
    decoder: &dyn Decoder,
    video: &str,
    config: &Config,
    cancel: &Option<CancelToken>,
) -> Result<(Vec<ClipWindow>, Vec<FilterDecision>), CancelledError> {
    let mut all_decisions = Vec::new();

    let (kept, decisions) = resolve_overlaps(windows, config.overlap_iou_threshold);
    all_decisions.extend(decisions);

    let (kept, decisions) = filter_boring(&kept, windows, features, config);
    all_decisions.extend(decisions);

    let (kept, decisions) = deduplicate_clips(&kept, windows, decoder, video, cancel)?;
    all_decisions.extend(decisions);

    let (kept, decisions) = filter_by_quality_target(&kept, windows, config.target_clip_count_soft);
    all_decisions.extend(decisions);

    let mut final_clips: Vec<ClipWindow> = kept.into_iter().map(|i| windows[i].clone()).collect();
    final_clips.sort_by(|a, b| a.start_sec.partial_cmp(&b.start_sec).unwrap());

    Ok((final_clips, all_decisions))
}
