use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const INGEST_STAGE: &str = "ingest";
pub const DETECT_STAGE: &str = "detect";

/// Run id shared by every stage of one AOI/date window
pub fn build_run_id(start_date: &str, end_date: &str, aoi: &str) -> String {
    format!("{}_{}_{}", start_date, end_date, aoi).replace('/', "-")
}

pub fn stage_dir(output_root: &Path, stage: &str, run_id: &str) -> PathBuf {
    output_root.join(stage).join(run_id)
}

pub fn gee_source_dir(output_root: &Path, run_id: &str) -> PathBuf {
    output_root.join("source").join("gee").join(run_id)
}

/// Pretty-print `value` to `path`, creating parent directories
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Explicit run id, or the lexicographically last run under `<root>/<stage>`
pub fn resolve_run_id(output_root: &Path, stage: &str, run_id: Option<&str>) -> Result<String> {
    if let Some(run_id) = run_id {
        return Ok(run_id.to_string());
    }

    let stage_root = output_root.join(stage);
    let mut runs = Vec::new();
    if stage_root.is_dir() {
        for entry in fs::read_dir(&stage_root)
            .with_context(|| format!("Failed to list {}", stage_root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                runs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }

    runs.sort();
    runs.pop()
        .ok_or_else(|| anyhow!("No {} artifacts found. Run `methane-hotspots {}` first.", stage, stage))
}

pub fn resolve_ingest_run_id(output_root: &Path, run_id: Option<&str>) -> Result<String> {
    resolve_run_id(output_root, INGEST_STAGE, run_id)
}
