//! Feature cache — persists one `ExtractedFeatures` per project
//! directory, keyed by an exact `cache_version` match.

use crate::error::CacheError;
use crate::features::ExtractedFeatures;
use log::info;
use std::path::{Path, PathBuf};

fn features_path(project_dir: &Path) -> PathBuf {
    project_dir.join("features").join("features_v2.json")
}

/// Load cached features for `project_dir`, rejecting anything whose
/// stamped `version` does not exactly match `expected_version` — any
/// mismatch, not just "older", invalidates the entry.
pub fn load(project_dir: &Path, expected_version: &str) -> Result<Option<ExtractedFeatures>, CacheError> {
    let path = features_path(project_dir);
    if !path.exists() {
        return Ok(None);
    }

    let json = std::fs::read_to_string(&path)
        .map_err(|e| CacheError(format!("failed to read {}: {e}", path.display())))?;

    let features: ExtractedFeatures = match serde_json::from_str(&json) {
        Ok(f) => f,
        Err(e) => {
            info!("feature cache at {} is unparseable, treating as miss: {e}", path.display());
            return Ok(None);
        }
    };

    if features.version != expected_version {
        info!(
            "feature cache at {} has version {:?}, expected {:?}; treating as miss",
            path.display(),
            features.version,
            expected_version
        );
        return Ok(None);
    }

    Ok(Some(features))
}

/// Persist `features` for `project_dir`, writing to a uuid-named
/// temp file in the same directory and renaming it into place so a
/// reader never observes a partially written cache file.
pub fn save(project_dir: &Path, features: &ExtractedFeatures) -> Result<(), CacheError> {
    let path = features_path(project_dir);
    let dir = path
        .parent()
        .ok_or_else(|| CacheError("feature cache path has no parent directory".to_string()))?;
    std::fs::create_dir_all(dir).map_err(|e| CacheError(format!("failed to create {}: {e}", dir.display())))?;

    let json = serde_json::to_string_pretty(features)
        .map_err(|e| CacheError(format!("failed to serialize features: {e}")))?;

    let temp_path = dir.join(format!("features_{}.json.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&temp_path, &json)
        .map_err(|e| CacheError(format!("failed to write {}: {e}", temp_path.display())))?;

    std::fs::rename(&temp_path, &path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        CacheError(format!("failed to rename cache into place: {e}"))
    })?;

    info!("feature cache written: {} ({} bytes)", path.display(), json.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn sample_features(version: &str) -> ExtractedFeatures {
        ExtractedFeatures {
            times: vec![0.0, 0.5, 1.0],
            audio_rms: vec![1.0, 2.0, 3.0],
            audio_rms_z: vec![0.0, 0.0, 0.0],
            motion_score: vec![1.0, 2.0, 3.0],
            motion_score_z: vec![0.0, 0.0, 0.0],
            excitement: vec![0.0, 0.0, 0.0],
            scene_cuts: vec![0.5],
            fade_timestamps: vec![],
            freeze_timestamps: vec![],
            duration: 1.0,
            step_sec: 0.5,
            version: version.to_string(),
            degraded_signals: vec![],
        }
    }

    #[test]
    fn missing_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(dir.path(), "v2.0.0").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let features = sample_features("v2.0.0");
        save(dir.path(), &features).unwrap();
        let loaded = load(dir.path(), "v2.0.0").unwrap().unwrap();
        assert_eq!(loaded, features);
    }

    #[test]
    fn version_mismatch_is_treated_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let features = sample_features("v1.0.0");
        save(dir.path(), &features).unwrap();
        let cfg = Config::default();
        let loaded = load(dir.path(), &cfg.cache_version).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &sample_features("v2.0.0")).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("features"))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].file_name().to_string_lossy().ends_with(".tmp"));
    }
}
