//! Debug artifacts: a full JSON dump of every pipeline entity, and an
//! optional SVG timeline plot.

use crate::anchors::Anchor;
use crate::boundaries::BoundaryCandidate;
use crate::config::Config;
use crate::error::DebugWriteError;
use crate::features::ExtractedFeatures;
use crate::post_filter::FilterDecision;
use crate::windows::ClipWindow;
use log::warn;
use plotters::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

const PIPELINE_VERSION: &str = "v2";

#[derive(Debug, Serialize)]
struct ArrayStats {
    min: f64,
    max: f64,
    mean: f64,
}

fn stats(values: &[f64]) -> ArrayStats {
    if values.is_empty() {
        return ArrayStats { min: 0.0, max: 0.0, mean: 0.0 };
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    ArrayStats { min, max, mean }
}

/// Write `debug/segmentation_v2_debug.json` under `debug_dir`. Every
/// field is deterministic given the same inputs except
/// `generated_at`.
pub fn write_debug_json(
    debug_dir: &Path,
    config: &Config,
    features: &ExtractedFeatures,
    anchors: &[Anchor],
    boundaries: &[BoundaryCandidate],
    candidate_windows: &[ClipWindow],
    decisions: &[FilterDecision],
    final_clips: &[ClipWindow],
) -> Result<(), DebugWriteError> {
    std::fs::create_dir_all(debug_dir).map_err(|e| DebugWriteError(format!("failed to create {}: {e}", debug_dir.display())))?;

    let mut sorted_boundaries = boundaries.to_vec();
    sorted_boundaries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    sorted_boundaries.truncate(100);

    let avg_duration = if final_clips.is_empty() {
        0.0
    } else {
        final_clips.iter().map(|c| c.end_sec - c.start_sec).sum::<f64>() / final_clips.len() as f64
    };
    let avg_quality = if final_clips.is_empty() {
        0.0
    } else {
        final_clips.iter().map(|c| c.quality_score).sum::<f64>() / final_clips.len() as f64
    };

    let document = json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "pipeline_version": PIPELINE_VERSION,
        "config": config,
        "features_summary": {
            "duration": features.duration,
            "step_sec": features.step_sec,
            "num_samples": features.times.len(),
            "scene_cuts_count": features.scene_cuts.len(),
            "fade_timestamps_count": features.fade_timestamps.len(),
            "freeze_timestamps_count": features.freeze_timestamps.len(),
            "degraded_signals": features.degraded_signals,
            "audio_rms_stats": stats(&features.audio_rms),
            "motion_stats": stats(&features.motion_score),
        },
        "scene_cuts": features.scene_cuts.iter().take(100).collect::<Vec<_>>(),
        "anchors": anchors,
        "top_boundaries": sorted_boundaries,
        "candidate_windows": candidate_windows,
        "filter_report": decisions,
        "final_clips": final_clips,
        "statistics": {
            "total_anchors": anchors.len(),
            "total_boundaries": boundaries.len(),
            "candidate_windows": candidate_windows.len(),
            "final_clips": final_clips.len(),
            "avg_clip_duration": avg_duration,
            "avg_quality_score": avg_quality,
        },
    });

    let path = debug_dir.join("segmentation_v2_debug.json");
    let text = serde_json::to_string_pretty(&document).map_err(|e| DebugWriteError(format!("failed to serialize debug document: {e}")))?;
    std::fs::write(&path, text).map_err(|e| DebugWriteError(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

/// Write `debug/segmentation_v2_plot.svg`: a 4-panel timeline — audio
/// z-score, motion z-score, excitement with anchor markers, and the
/// final clip intervals — with scene-cut gridlines overlaid on the
/// first three panels. Failure is logged and swallowed; the caller
/// always gets its pipeline result regardless of plotting success.
pub fn write_debug_plot(debug_dir: &Path, features: &ExtractedFeatures, anchors: &[Anchor], final_clips: &[ClipWindow]) {
    if let Err(e) = try_write_debug_plot(debug_dir, features, anchors, final_clips) {
        warn!("failed to write debug plot, continuing without it: {e}");
    }
}

fn try_write_debug_plot(debug_dir: &Path, features: &ExtractedFeatures, anchors: &[Anchor], final_clips: &[ClipWindow]) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(debug_dir)?;
    let path = debug_dir.join("segmentation_v2_plot.svg");

    let duration = features.duration.max(1.0);
    let root = SVGBackend::new(&path, (1600, 1000)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((4, 1));

    draw_series_panel(&panels[0], "Audio z-score", duration, &features.times, &features.audio_rms_z, &features.scene_cuts, &RED)?;
    draw_series_panel(&panels[1], "Motion z-score", duration, &features.times, &features.motion_score_z, &features.scene_cuts, &BLUE)?;

    {
        let mut chart = ChartBuilder::on(&panels[2])
            .caption("Excitement", ("sans-serif", 16))
            .set_label_area_size(LabelAreaPosition::Left, 40)
            .set_label_area_size(LabelAreaPosition::Bottom, 30)
            .margin(5)
            .build_cartesian_2d(0.0..duration, 0.0..1.0_f64)?;
        chart.configure_mesh().draw()?;
        chart
            .draw_series(LineSeries::new(features.times.iter().zip(features.excitement.iter()).map(|(&t, &v)| (t, v)), &GREEN))?
            .label("excitement")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &GREEN));
        for anchor in anchors {
            chart.draw_series(std::iter::once(PathElement::new(vec![(anchor.time_sec, 0.0), (anchor.time_sec, 1.0)], &MAGENTA)))?;
        }
        chart.configure_series_labels().background_style(&WHITE.mix(0.8)).border_style(&BLACK).draw()?;
    }

    {
        let mut chart = ChartBuilder::on(&panels[3])
            .caption("Final clips", ("sans-serif", 16))
            .set_label_area_size(LabelAreaPosition::Left, 40)
            .set_label_area_size(LabelAreaPosition::Bottom, 30)
            .margin(5)
            .build_cartesian_2d(0.0..duration, 0.0..1.0_f64)?;
        chart.configure_mesh().draw()?;
        for clip in final_clips {
            chart.draw_series(std::iter::once(Rectangle::new([(clip.start_sec, 0.1), (clip.end_sec, 0.9)], BLUE.mix(0.3).filled())))?;
            chart.draw_series(std::iter::once(Circle::new((clip.anchor_time_sec, 0.5), 3, MAGENTA.filled())))?;
        }
    }

    root.present()?;
    Ok(())
}

fn draw_series_panel(
    area: &DrawingArea<SVGBackend, plotters::coord::Shift>,
    caption: &str,
    duration: f64,
    times: &[f64],
    values: &[f64],
    scene_cuts: &[f64],
    color: &RGBColor,
) -> Result<(), Box<dyn std::error::Error>> {
    let max_abs = values.iter().cloned().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 16))
        .set_label_area_size(LabelAreaPosition::Left, 40)
        .set_label_area_size(LabelAreaPosition::Bottom, 30)
        .margin(5)
        .build_cartesian_2d(0.0..duration, -max_abs..max_abs)?;
    chart.configure_mesh().draw()?;
    chart.draw_series(LineSeries::new(times.iter().zip(values.iter()).map(|(&t, &v)| (t, v)), color))?;
    for &cut in scene_cuts {
        chart.draw_series(std::iter::once(PathElement::new(vec![(cut, -max_abs), (cut, max_abs)], BLACK.mix(0.3))))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn sample_features() -> ExtractedFeatures {
        ExtractedFeatures {
            times: vec![0.0, 0.5, 1.0],
            audio_rms: vec![1.0, 2.0, 3.0],
            audio_rms_z: vec![-1.0, 0.0, 1.0],
            motion_score: vec![1.0, 2.0, 3.0],
            motion_score_z: vec![-1.0, 0.0, 1.0],
            excitement: vec![0.1, 0.3, 0.6],
            scene_cuts: vec![0.5],
            fade_timestamps: vec![],
            freeze_timestamps: vec![],
            duration: 1.0,
            step_sec: 0.5,
            version: "v2.0.0".to_string(),
            degraded_signals: vec![],
        }
    }

    #[test]
    fn writes_parseable_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let features = sample_features();
        write_debug_json(dir.path(), &config, &features, &[], &[], &[], &[], &[]).unwrap();

        let path = dir.path().join("segmentation_v2_debug.json");
        let text = std::fs::read_to_string(path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["pipeline_version"], PIPELINE_VERSION);
        assert_eq!(parsed["statistics"]["final_clips"], 0);
    }

    #[test]
    fn plot_failure_never_panics() {
        let dir = tempfile::tempdir().unwrap();
        let features = sample_features();
        write_debug_plot(dir.path(), &features, &[], &[]);
    }
}
