// Fixture-backed methane pipeline: ingest -> detect -> publish
//
// Each stage writes JSON artifacts under a run directory so later stages
// (and humans) can replay or audit them.

pub mod artifacts;
pub mod detect;
pub mod gee;
pub mod ingest;
pub mod publish;
pub mod real_source;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One satellite CH4 retrieval, normalized across sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub observation_id: String,
    pub observed_on: String,
    pub latitude: f64,
    pub longitude: f64,
    pub ch4_ppb: f64,
    pub qa_value: f64,
}

/// Pointers back to the unfiltered input of an ingest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRefs {
    pub dataset: String,
    pub product: String,
    pub version: String,
    pub source: String,
    pub source_refs: Vec<String>,
    pub raw_observation_count: usize,
    pub raw_observation_ids: Vec<String>,
}

/// QA-filtered observations handed to detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedObservations {
    pub dataset: String,
    pub product: String,
    pub version: String,
    pub aoi: String,
    pub start_date: String,
    pub end_date: String,
    pub qa_threshold: f64,
    pub source: String,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMetadata {
    pub run_id: String,
    pub stage: String,
    pub dataset: String,
    pub product: String,
    pub version: String,
    pub aoi: String,
    pub start_date: String,
    pub end_date: String,
    pub qa_threshold: f64,
    pub source: String,
    pub source_refs: Vec<String>,
    pub raw_count: usize,
    pub qa_pass_count: usize,
    pub qa_fail_count: usize,
    pub qa_fail_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub raw_refs_path: String,
    pub processed_path: String,
}

/// One-line JSON summary printed by the ingest jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub stage: String,
    pub run_id: String,
    pub raw_count: usize,
    pub qa_pass_count: usize,
    pub artifact_dir: String,
}
