// Load a detect run into the store, attributing each hotspot to the
// nearest known emitter.

use super::artifacts::{read_json, resolve_run_id, stage_dir, DETECT_STAGE};
use super::detect::{DetectionPayload, HotspotCandidate};
use crate::db::{count_hotspots, insert_hotspots, list_emitters, EmitterSummary, Hotspot};
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_MAX_DISTANCE_KM: f64 = 25.0;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSummary {
    pub stage: String,
    pub run_id: String,
    pub hotspot_count: usize,
    pub attributed_count: usize,
    /// Hotspot rows in the store after this publish
    pub stored_hotspot_count: i64,
}

/// Great-circle distance in kilometres (haversine)
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Closest emitter within `max_distance_km`; ties go to the lower id
pub fn nearest_emitter<'a>(
    emitters: &'a [EmitterSummary],
    latitude: f64,
    longitude: f64,
    max_distance_km: f64,
) -> Option<&'a EmitterSummary> {
    emitters
        .iter()
        .map(|e| (haversine_km(latitude, longitude, e.latitude, e.longitude), e))
        .filter(|(distance, _)| *distance <= max_distance_km)
        .min_by(|(da, ea), (db, eb)| da.total_cmp(db).then_with(|| ea.id.cmp(&eb.id)))
        .map(|(_, e)| e)
}

pub fn attribute_hotspots(
    candidates: &[HotspotCandidate],
    emitters: &[EmitterSummary],
    max_distance_km: f64,
) -> Vec<Hotspot> {
    candidates
        .iter()
        .map(|c| {
            let emitter_id = nearest_emitter(emitters, c.centroid_latitude, c.centroid_longitude, max_distance_km)
                .map(|e| e.id.clone());
            debug!(hotspot = %c.id, emitter = ?emitter_id, "attributed hotspot");

            Hotspot {
                id: c.id.clone(),
                emitter_id,
                observed_on: c.observed_on.clone(),
                anomaly_score: c.anomaly_score,
                area_km2: c.area_km2,
                pixel_count: c.pixel_count,
                qa_pass_ratio: c.qa_pass_ratio,
                centroid_latitude: c.centroid_latitude,
                centroid_longitude: c.centroid_longitude,
            }
        })
        .collect()
}

/// Publish `run_id` (or the latest detect run) into `conn`
pub fn publish_detect_run(
    conn: &Connection,
    output_root: &Path,
    run_id: Option<&str>,
    max_distance_km: f64,
) -> Result<PublishSummary> {
    let run_id = resolve_run_id(output_root, DETECT_STAGE, run_id)?;
    let payload: DetectionPayload = read_json(&stage_dir(output_root, DETECT_STAGE, &run_id).join("hotspots.json"))?;

    let emitters = list_emitters(conn)?;
    let hotspots = attribute_hotspots(&payload.hotspots, &emitters, max_distance_km);
    let attributed_count = hotspots.iter().filter(|h| h.emitter_id.is_some()).count();

    insert_hotspots(conn, &hotspots)?;
    let stored_hotspot_count = count_hotspots(conn)?;
    info!(
        run_id = %run_id,
        hotspots = hotspots.len(),
        attributed = attributed_count,
        stored = stored_hotspot_count,
        "published detect run"
    );

    Ok(PublishSummary {
        stage: "publish".to_string(),
        run_id,
        hotspot_count: hotspots.len(),
        attributed_count,
        stored_hotspot_count,
    })
}
