//! The Decoder collaborator: everything the Pipeline needs to pull out
//! of a source video, behind a trait so the Pipeline never couples to
//! a specific media toolchain.
//!
//! Parsing any given decoder's textual diagnostics (ffmpeg's stderr,
//! in `FfmpegDecoder`'s case) is an implementation detail of the
//! adapter, not of the Pipeline itself.

use crate::error::DecoderError;
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::process::{Command, Stdio};

/// Coarse facts about a source video, established once at the start
/// of a run. Failure to obtain this is the only fatal Decoder error.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub duration_sec: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codecs: Vec<String>,
}

/// A black-frame or freeze-frame marker. `black_events` reports both
/// start and end timestamps for each blacked-out span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeEventKind {
    BlackStart,
    BlackEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeEvent {
    pub kind: FadeEventKind,
    pub time_sec: f64,
}

/// The external collaborator the Pipeline depends on for every raw
/// signal. Each method may fail with `DecoderError`; callers treat
/// that as "this signal is absent" and continue.
pub trait Decoder {
    fn probe(&self, video: &str) -> Result<ProbeInfo, DecoderError>;

    /// Signed 16-bit little-endian mono PCM at the requested sample rate.
    fn pcm_mono(&self, video: &str, sample_rate: u32) -> Result<Vec<i16>, DecoderError>;

    /// Grayscale frames (row-major, one byte per pixel) at `fps`,
    /// `width` wide, height derived as `floor(width * 9 / 16)`.
    fn gray_frames(&self, video: &str, fps: f64, width: u32) -> Result<Vec<Vec<u8>>, DecoderError>;

    /// Sorted timestamps where inter-frame difference exceeds `threshold`.
    fn scene_events(&self, video: &str, threshold: f64) -> Result<Vec<f64>, DecoderError>;

    /// Black-frame start/end markers, in encounter order.
    fn black_events(&self, video: &str) -> Result<Vec<FadeEvent>, DecoderError>;

    /// Freeze-frame start markers. Only ever consulted by the Feature
    /// Extractor when duration < 600s.
    fn freeze_events(&self, video: &str) -> Result<Vec<f64>, DecoderError>;

    /// A single small grayscale frame at `time_sec`, `width`x`height`,
    /// used by the duplicate filter's perceptual hash.
    fn still_frame(&self, video: &str, time_sec: f64, width: u32, height: u32) -> Result<Vec<u8>, DecoderError>;
}

fn motion_height(width: u32) -> u32 {
    (width as f64 * 9.0 / 16.0).floor() as u32
}

/// Decoder backed by `ffmpeg`/`ffprobe` subprocesses.
pub struct FfmpegDecoder {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegDecoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn run_ffmpeg_capture_stdout(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .context("failed to spawn ffmpeg")?;
        if !output.status.success() {
            return Err(anyhow!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail(&String::from_utf8_lossy(&output.stderr), 500)
            ));
        }
        Ok(output.stdout)
    }

    fn run_ffmpeg_capture_stderr(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .context("failed to spawn ffmpeg")?;
        // These filters write to stderr and deliberately target `-f null -`,
        // so a non-zero exit without usable stderr is the real failure.
        Ok(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

fn tail(s: &str, n: usize) -> String {
    if s.len() <= n {
        s.to_string()
    } else {
        s[s.len() - n..].to_string()
    }
}

impl Decoder for FfmpegDecoder {
    fn probe(&self, video: &str) -> Result<ProbeInfo, DecoderError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-print_format", "json",
                "-show_entries",
                "format=duration:stream=width,height,r_frame_rate,codec_name",
                video,
            ])
            .output()
            .map_err(|e| DecoderError(format!("ffprobe spawn failed: {e}")))?;

        if !output.status.success() {
            return Err(DecoderError(format!(
                "ffprobe failed: {}",
                tail(&String::from_utf8_lossy(&output.stderr), 300)
            )));
        }

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DecoderError(format!("ffprobe json parse failed: {e}")))?;

        let duration_sec: f64 = parsed["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| DecoderError("ffprobe returned no duration".to_string()))?;

        let mut width = 0u32;
        let mut height = 0u32;
        let mut fps = 0.0f64;
        let mut codecs = Vec::new();

        if let Some(streams) = parsed["streams"].as_array() {
            for s in streams {
                if let Some(w) = s["width"].as_u64() {
                    width = w as u32;
                }
                if let Some(h) = s["height"].as_u64() {
                    height = h as u32;
                }
                if let Some(rate) = s["r_frame_rate"].as_str() {
                    fps = parse_frame_rate(rate).unwrap_or(fps);
                }
                if let Some(codec) = s["codec_name"].as_str() {
                    codecs.push(codec.to_string());
                }
            }
        }

        Ok(ProbeInfo { duration_sec, width, height, fps, codecs })
    }

    fn pcm_mono(&self, video: &str, sample_rate: u32) -> Result<Vec<i16>, DecoderError> {
        let sr = sample_rate.to_string();
        let args = [
            "-y", "-i", video,
            "-vn", "-ac", "1", "-ar", sr.as_str(),
            "-acodec", "pcm_s16le",
            "-f", "s16le",
            "-",
        ];
        let bytes = self
            .run_ffmpeg_capture_stdout(&args)
            .map_err(|e| DecoderError(e.to_string()))?;
        Ok(bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect())
    }

    fn gray_frames(&self, video: &str, fps: f64, width: u32) -> Result<Vec<Vec<u8>>, DecoderError> {
        let height = motion_height(width);
        let filter = format!("fps={fps},scale={width}:{height},format=gray");
        let args = [
            "-y", "-i", video,
            "-vf", filter.as_str(),
            "-f", "rawvideo",
            "-pix_fmt", "gray",
            "-",
        ];
        let bytes = self
            .run_ffmpeg_capture_stdout(&args)
            .map_err(|e| DecoderError(e.to_string()))?;
        let frame_len = (width * height) as usize;
        if frame_len == 0 {
            return Err(DecoderError("zero-size motion frame requested".to_string()));
        }
        Ok(bytes.chunks_exact(frame_len).map(|c| c.to_vec()).collect())
    }

    fn scene_events(&self, video: &str, threshold: f64) -> Result<Vec<f64>, DecoderError> {
        let filter = format!("select='gt(scene,{threshold})',showinfo");
        let args = ["-i", video, "-vf", filter.as_str(), "-f", "null", "-"];
        let stderr = self
            .run_ffmpeg_capture_stderr(&args)
            .map_err(|e| DecoderError(e.to_string()))?;

        let mut times: Vec<f64> = stderr
            .lines()
            .filter_map(|line| parse_labeled_time(line, "pts_time:"))
            .filter(|&t| t > 0.0)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        Ok(times)
    }

    fn black_events(&self, video: &str) -> Result<Vec<FadeEvent>, DecoderError> {
        let args = ["-i", video, "-vf", "blackdetect", "-f", "null", "-"];
        let stderr = self
            .run_ffmpeg_capture_stderr(&args)
            .map_err(|e| DecoderError(e.to_string()))?;

        let mut events = Vec::new();
        for line in stderr.lines() {
            if let Some(t) = parse_labeled_time(line, "black_start:") {
                events.push(FadeEvent { kind: FadeEventKind::BlackStart, time_sec: t });
            }
            if let Some(t) = parse_labeled_time(line, "black_end:") {
                events.push(FadeEvent { kind: FadeEventKind::BlackEnd, time_sec: t });
            }
        }
        Ok(events)
    }

    fn freeze_events(&self, video: &str) -> Result<Vec<f64>, DecoderError> {
        let args = ["-i", video, "-vf", "freezedetect", "-f", "null", "-"];
        let stderr = self
            .run_ffmpeg_capture_stderr(&args)
            .map_err(|e| DecoderError(e.to_string()))?;

        let times: Vec<f64> = stderr
            .lines()
            .filter_map(|line| parse_labeled_time(line, "freeze_start:"))
            .collect();
        Ok(times)
    }

    fn still_frame(&self, video: &str, time_sec: f64, width: u32, height: u32) -> Result<Vec<u8>, DecoderError> {
        let ts = format!("{time_sec}");
        let filter = format!("scale={width}:{height},format=gray");
        let args = [
            "-y", "-ss", ts.as_str(), "-i", video,
            "-vframes", "1",
            "-vf", filter.as_str(),
            "-f", "rawvideo",
            "-pix_fmt", "gray",
            "-",
        ];
        let bytes = self
            .run_ffmpeg_capture_stdout(&args)
            .map_err(|e| DecoderError(e.to_string()))?;
        let expected = (width * height) as usize;
        if bytes.len() != expected {
            return Err(DecoderError(format!(
                "expected {expected} bytes for still frame, got {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    let mut parts = raw.split('/');
    let num: f64 = parts.next()?.parse().ok()?;
    let den: f64 = parts.next().unwrap_or("1").parse().ok()?;
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// Extract the float following `label` in `line`, stopping at the next
/// whitespace — e.g. `parse_labeled_time("... pts_time:12.34 ...",
/// "pts_time:")` returns `Some(12.34)`.
fn parse_labeled_time(line: &str, label: &str) -> Option<f64> {
    let idx = line.find(label)?;
    let rest = &line[idx + label.len()..];
    let value: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    value.parse().ok()
}

/// A synthetic in-memory Decoder used by tests and anywhere a real
/// `ffmpeg` toolchain is unavailable or undesired.
#[derive(Debug, Clone, Default)]
pub struct SyntheticDecoder {
    pub probe: Option<ProbeInfo>,
    pub pcm: Vec<i16>,
    pub pcm_sample_rate: u32,
    pub frames: Vec<Vec<u8>>,
    pub frame_width: u32,
    pub scene_cuts: Vec<f64>,
    pub black_events: Vec<FadeEvent>,
    pub freeze_events: Vec<f64>,
}

impl Decoder for SyntheticDecoder {
    fn probe(&self, _video: &str) -> Result<ProbeInfo, DecoderError> {
        self.probe
            .clone()
            .ok_or_else(|| DecoderError("no synthetic probe configured".to_string()))
    }

    fn pcm_mono(&self, _video: &str, sample_rate: u32) -> Result<Vec<i16>, DecoderError> {
        if sample_rate != self.pcm_sample_rate {
            debug!(
                "SyntheticDecoder ignoring sample-rate mismatch ({} requested, {} configured)",
                sample_rate, self.pcm_sample_rate
            );
        }
        Ok(self.pcm.clone())
    }

    fn gray_frames(&self, _video: &str, _fps: f64, width: u32) -> Result<Vec<Vec<u8>>, DecoderError> {
        if width != self.frame_width {
            warn!("SyntheticDecoder frame width mismatch: requested {width}, have {}", self.frame_width);
        }
        Ok(self.frames.clone())
    }

    fn scene_events(&self, _video: &str, _threshold: f64) -> Result<Vec<f64>, DecoderError> {
        Ok(self.scene_cuts.clone())
    }

    fn black_events(&self, _video: &str) -> Result<Vec<FadeEvent>, DecoderError> {
        Ok(self.black_events.clone())
    }

    fn freeze_events(&self, _video: &str) -> Result<Vec<f64>, DecoderError> {
        Ok(self.freeze_events.clone())
    }

    fn still_frame(&self, _video: &str, _time_sec: f64, width: u32, height: u32) -> Result<Vec<u8>, DecoderError> {
        Ok(vec![128u8; (width * height) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_frame_rate("bogus"), None);
    }

    #[test]
    fn parses_labeled_time() {
        let line = "[Parsed_showinfo_1 @ 0x0] ... pts_time:12.5 ...";
        assert_eq!(parse_labeled_time(line, "pts_time:"), Some(12.5));
        assert_eq!(parse_labeled_time(line, "missing:"), None);
    }

    #[test]
    fn motion_height_is_9_by_16() {
        assert_eq!(motion_height(160), 90);
        assert_eq!(motion_height(16), 9);
    }

    #[test]
    fn synthetic_decoder_returns_configured_signals() {
        let dec = SyntheticDecoder {
            probe: Some(ProbeInfo { duration_sec: 10.0, width: 640, height: 360, fps: 30.0, codecs: vec![] }),
            scene_cuts: vec![1.0, 2.0],
            ..Default::default()
        };
        assert_eq!(dec.probe("x").unwrap().duration_sec, 10.0);
        assert_eq!(dec.scene_events("x", 0.3).unwrap(), vec![1.0, 2.0]);
    }
}
