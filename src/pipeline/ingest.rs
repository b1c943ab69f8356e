// TROPOMI ingest job
//
// Reads observations from a source adapter, applies the QA threshold,
// and writes raw refs, processed observations and run metadata.

use super::artifacts::{build_run_id, read_json, stage_dir, write_json, INGEST_STAGE};
use super::real_source::load_real_payload;
use super::{IngestMetadata, IngestSummary, Observation, ProcessedObservations, RawRefs};
use anyhow::{bail, Result};
use chrono::Utc;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Which adapter feeds the ingest job
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    Fixture,
    Real,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Fixture => "fixture",
            SourceKind::Real => "real",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub source: SourceKind,
    pub aoi: String,
    pub start_date: String,
    pub end_date: String,
    pub qa_threshold: f64,
    pub fixture: PathBuf,
    pub real_source_url: Option<String>,
    pub real_timeout: Duration,
    pub output_root: PathBuf,
}

/// Adapter output before QA filtering
#[derive(Debug, Clone)]
pub struct SourcePayload {
    pub dataset: String,
    pub product: String,
    pub version: String,
    pub source_refs: Vec<String>,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct FixturePayload {
    dataset: String,
    product: String,
    version: String,
    observations: Vec<Observation>,
}

fn fixture_source(options: &IngestOptions) -> Result<SourcePayload> {
    let payload: FixturePayload = read_json(&options.fixture)?;
    Ok(SourcePayload {
        dataset: payload.dataset,
        product: payload.product,
        version: payload.version,
        source_refs: vec![options.fixture.display().to_string()],
        observations: payload.observations,
    })
}

fn real_source(options: &IngestOptions) -> Result<SourcePayload> {
    let Some(url) = options.real_source_url.as_deref() else {
        bail!("Real TROPOMI source needs a URL. Set --real-source-url or INGEST_REAL_SOURCE_URL, or use --source fixture.");
    };

    let payload = load_real_payload(
        url,
        &options.start_date,
        &options.end_date,
        &options.aoi,
        options.real_timeout,
    )?;

    Ok(SourcePayload {
        dataset: payload.dataset,
        product: payload.product,
        version: payload.version,
        source_refs: payload.source_urls,
        observations: payload.observations,
    })
}

pub fn read_source(options: &IngestOptions) -> Result<SourcePayload> {
    match options.source {
        SourceKind::Fixture => fixture_source(options),
        SourceKind::Real => real_source(options),
    }
}

/// Split by QA: (kept observations, ids of dropped ones), input order kept
pub fn split_by_qa(observations: Vec<Observation>, qa_threshold: f64) -> (Vec<Observation>, Vec<String>) {
    let mut passed = Vec::new();
    let mut dropped = Vec::new();

    for obs in observations {
        if obs.qa_value >= qa_threshold {
            passed.push(obs);
        } else {
            dropped.push(obs.observation_id);
        }
    }

    (passed, dropped)
}

/// Everything one ingest run writes, regardless of which job produced it
#[derive(Debug, Clone)]
pub struct IngestRun {
    pub run_id: String,
    pub aoi: String,
    pub start_date: String,
    pub end_date: String,
    pub qa_threshold: f64,
    pub source: String,
    pub dataset: String,
    pub product: String,
    pub version: String,
    pub source_refs: Vec<String>,
    pub raw_observation_ids: Vec<String>,
    pub passed: Vec<Observation>,
    pub dropped_ids: Vec<String>,
}

/// Write raw/processed/metadata for a run under `<root>/ingest/<run_id>`
pub fn write_ingest_run(output_root: &Path, run: IngestRun) -> Result<IngestSummary> {
    let run_dir = stage_dir(output_root, INGEST_STAGE, &run.run_id);
    let raw_refs_path = run_dir.join("raw").join("raw_refs.json");
    let processed_path = run_dir.join("processed").join("observations.json");
    let raw_count = run.raw_observation_ids.len();
    let qa_pass_count = run.passed.len();

    let raw_refs = RawRefs {
        dataset: run.dataset.clone(),
        product: run.product.clone(),
        version: run.version.clone(),
        source: run.source.clone(),
        source_refs: run.source_refs.clone(),
        raw_observation_count: raw_count,
        raw_observation_ids: run.raw_observation_ids,
    };

    let metadata = IngestMetadata {
        run_id: run.run_id.clone(),
        stage: INGEST_STAGE.to_string(),
        dataset: run.dataset.clone(),
        product: run.product.clone(),
        version: run.version.clone(),
        aoi: run.aoi.clone(),
        start_date: run.start_date.clone(),
        end_date: run.end_date.clone(),
        qa_threshold: run.qa_threshold,
        source: run.source.clone(),
        source_refs: run.source_refs,
        raw_count,
        qa_pass_count,
        qa_fail_count: run.dropped_ids.len(),
        qa_fail_ids: run.dropped_ids,
        generated_at: Utc::now(),
        raw_refs_path: raw_refs_path.display().to_string(),
        processed_path: processed_path.display().to_string(),
    };

    let processed = ProcessedObservations {
        dataset: run.dataset,
        product: run.product,
        version: run.version,
        aoi: run.aoi,
        start_date: run.start_date,
        end_date: run.end_date,
        qa_threshold: run.qa_threshold,
        source: run.source,
        observations: run.passed,
    };

    write_json(&raw_refs_path, &raw_refs)?;
    write_json(&processed_path, &processed)?;
    write_json(&run_dir.join("metadata.json"), &metadata)?;

    if metadata.qa_fail_count > 0 {
        warn!(
            run_id = %metadata.run_id,
            dropped = metadata.qa_fail_count,
            threshold = metadata.qa_threshold,
            "observations below QA threshold"
        );
    }
    info!(run_id = %metadata.run_id, raw_count, qa_pass_count, "ingest run written");

    Ok(IngestSummary {
        stage: INGEST_STAGE.to_string(),
        run_id: metadata.run_id,
        raw_count,
        qa_pass_count,
        artifact_dir: run_dir.display().to_string(),
    })
}

pub fn run_ingest(options: &IngestOptions) -> Result<IngestSummary> {
    let payload = read_source(options)?;
    let raw_observation_ids = payload
        .observations
        .iter()
        .map(|obs| obs.observation_id.clone())
        .collect();
    let (passed, dropped_ids) = split_by_qa(payload.observations, options.qa_threshold);

    write_ingest_run(
        &options.output_root,
        IngestRun {
            run_id: build_run_id(&options.start_date, &options.end_date, &options.aoi),
            aoi: options.aoi.clone(),
            start_date: options.start_date.clone(),
            end_date: options.end_date.clone(),
            qa_threshold: options.qa_threshold,
            source: options.source.as_str().to_string(),
            dataset: payload.dataset,
            product: payload.product,
            version: payload.version,
            source_refs: payload.source_refs,
            raw_observation_ids,
            passed,
            dropped_ids,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join("sample_tropomi_observations.json")
    }

    fn options(output_root: &Path, qa_threshold: f64) -> IngestOptions {
        IngestOptions {
            source: SourceKind::Fixture,
            aoi: "permian-test".to_string(),
            start_date: "2026-02-10".to_string(),
            end_date: "2026-02-11".to_string(),
            qa_threshold,
            fixture: fixture_path(),
            real_source_url: None,
            real_timeout: Duration::from_secs(30),
            output_root: output_root.to_path_buf(),
        }
    }

    #[test]
    fn test_ingest_writes_raw_processed_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run_ingest(&options(dir.path(), 0.9)).unwrap();

        assert_eq!(summary.run_id, "2026-02-10_2026-02-11_permian-test");
        assert_eq!(summary.raw_count, 4);
        assert_eq!(summary.qa_pass_count, 2);

        let run_dir = dir.path().join("ingest").join(&summary.run_id);
        let metadata: IngestMetadata = read_json(&run_dir.join("metadata.json")).unwrap();
        let processed: ProcessedObservations =
            read_json(&run_dir.join("processed").join("observations.json")).unwrap();
        let raw: RawRefs = read_json(&run_dir.join("raw").join("raw_refs.json")).unwrap();

        assert_eq!(metadata.qa_threshold, 0.9);
        assert_eq!(metadata.qa_pass_count, 2);
        assert_eq!(metadata.qa_fail_count, 2);
        assert_eq!(metadata.qa_fail_ids, vec!["S5P-20260210-003", "S5P-20260211-004"]);
        assert_eq!(metadata.source, "fixture");
        assert_eq!(processed.observations.len(), 2);
        assert_eq!(raw.raw_observation_ids.len(), 4);
    }

    #[test]
    fn test_split_by_qa_threshold_is_inclusive() {
        let obs = |id: &str, qa: f64| Observation {
            observation_id: id.to_string(),
            observed_on: "2026-02-10".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            ch4_ppb: 1900.0,
            qa_value: qa,
        };

        let (passed, dropped) = split_by_qa(vec![obs("a", 0.85), obs("b", 0.84), obs("c", 1.0)], 0.85);

        assert_eq!(passed.len(), 2);
        assert_eq!(dropped, vec!["b"]);
    }

    #[test]
    fn test_real_source_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), 0.85);
        opts.source = SourceKind::Real;

        let err = run_ingest(&opts).unwrap_err();
        assert!(err.to_string().contains("INGEST_REAL_SOURCE_URL"));
    }

    #[test]
    fn test_real_source_from_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), 0.85);
        opts.source = SourceKind::Real;
        opts.real_source_url = Some(format!("file://{}", fixture_path().display()));

        let summary = run_ingest(&opts).unwrap();
        let metadata: IngestMetadata =
            read_json(&dir.path().join("ingest").join(&summary.run_id).join("metadata.json")).unwrap();

        assert_eq!(summary.qa_pass_count, 3);
        assert_eq!(metadata.source, "real");
        assert!(metadata.source_refs[0].contains("aoi=permian-test"));
    }
}
