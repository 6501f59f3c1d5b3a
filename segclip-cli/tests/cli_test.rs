//! CLI integration tests.
//!
//! These test the segclip binary's argument parsing and basic output.
//! End-to-end segmentation against a real video requires an ffmpeg
//! toolchain and fixture media, and is exercised by segclip-core's
//! own SyntheticDecoder-backed tests instead.

use std::process::Command;

fn segclip_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_segclip"))
}

#[test]
fn test_version() {
    let output = segclip_bin().arg("--version").output().expect("Failed to run segclip");
    assert!(output.status.success());
}

#[test]
fn test_help() {
    let output = segclip_bin().arg("--help").output().expect("Failed to run segclip");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("segclip"), "Should contain binary name");
    assert!(stdout.contains("segment"));
}

#[test]
fn test_segment_help() {
    let output = segclip_bin().args(["segment", "--help"]).output().expect("Failed to run segclip");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--json"));
    assert!(stdout.contains("--project-dir"));
    assert!(stdout.contains("--cache-version"));
}

#[test]
fn test_segment_no_video() {
    let output = segclip_bin().arg("segment").output().expect("Failed to run segclip");
    assert!(!output.status.success(), "Should fail without a video argument");
}

#[test]
fn test_segment_missing_file_fails_gracefully() {
    let output = segclip_bin()
        .args(["segment", "nonexistent.mp4", "--json"])
        .output()
        .expect("Failed to run segclip");
    assert!(!output.status.success());
}
