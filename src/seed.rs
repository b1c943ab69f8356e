// GeoJSON emitter fixture loader
//
// Feature properties carry the emitter fields; the Point geometry is
// [longitude, latitude].

use crate::db::{count_emitters, upsert_emitters, EmitterSummary};
use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: EmitterProperties,
    #[serde(default)]
    geometry: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EmitterProperties {
    id: String,
    name: String,
    confidence: f64,
    detection_count: i64,
    last_seen: String,
}

/// `[lon, lat]` of a Point geometry, or None for any other shape
fn point_coordinates(geometry: Option<&Value>) -> Option<(f64, f64)> {
    let geometry = geometry?;
    if geometry.get("type").and_then(Value::as_str) != Some("Point") {
        return None;
    }
    match geometry.get("coordinates").and_then(Value::as_array)?.as_slice() {
        [lon, lat] => Some((lon.as_f64()?, lat.as_f64()?)),
        _ => None,
    }
}

fn geometry_kind(geometry: Option<&Value>) -> &str {
    match geometry {
        None | Some(Value::Null) => "no geometry",
        Some(g) => g.get("type").and_then(Value::as_str).unwrap_or("untyped geometry"),
    }
}

/// Parse a FeatureCollection of emitter points
pub fn parse_emitter_geojson(text: &str) -> Result<Vec<EmitterSummary>> {
    let collection: FeatureCollection =
        serde_json::from_str(text).context("Emitter fixture is not a valid FeatureCollection")?;

    collection
        .features
        .into_iter()
        .map(|feature| {
            let props = feature.properties;
            let geometry = feature.geometry.as_ref();

            let Some((longitude, latitude)) = point_coordinates(geometry) else {
                bail!(
                    "Emitter {} must have a Point geometry with numeric [lon, lat], got {}",
                    props.id,
                    geometry_kind(geometry)
                );
            };

            Ok(EmitterSummary {
                id: props.id,
                name: props.name,
                confidence: props.confidence,
                detection_count: props.detection_count,
                last_seen: props.last_seen,
                longitude,
                latitude,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub stage: String,
    pub fixture: String,
    pub emitter_count: usize,
    /// Emitter rows in the store after seeding
    pub stored_emitter_count: i64,
}

/// Load the fixture at `path` into the store
pub fn seed_emitters(conn: &Connection, path: &Path) -> Result<SeedSummary> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read emitter fixture {}", path.display()))?;
    let emitters = parse_emitter_geojson(&text)?;
    let written = upsert_emitters(conn, &emitters)?;
    let stored_emitter_count = count_emitters(conn)?;

    info!(path = %path.display(), count = written, stored = stored_emitter_count, "seeded emitters");
    Ok(SeedSummary {
        stage: "seed".to_string(),
        fixture: path.display().to_string(),
        emitter_count: written,
        stored_emitter_count,
    })
}
