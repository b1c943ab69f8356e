// Real TROPOMI source adapter
//
// Upstream feeds disagree on field names, so every field is looked up
// through an alias list and coerced to the normalized Observation.

use super::Observation;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RealSourceError {
    #[error("Record is missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Field {field} is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("Observation {index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error("Real source payload must include an observations list")]
    MissingObservations,

    #[error("Real source request failed: {0}")]
    Request(String),
}

/// Observations pulled from the configured real source
#[derive(Debug, Clone)]
pub struct RealPayload {
    pub dataset: String,
    pub product: String,
    pub version: String,
    pub source_urls: Vec<String>,
    pub observations: Vec<Observation>,
}

const ID_KEYS: &[&str] = &["observation_id", "id", "observationId"];
const DATE_KEYS: &[&str] = &["observed_on", "date", "observedOn"];
const LAT_KEYS: &[&str] = &["latitude", "lat"];
const LON_KEYS: &[&str] = &["longitude", "lon", "lng"];
const CH4_KEYS: &[&str] = &["ch4_ppb", "methane_mixing_ratio_bias_corrected", "xch4"];
const QA_KEYS: &[&str] = &["qa_value", "qa", "quality"];

fn first_present<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null())
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(field: &'static str, value: &Value) -> Result<f64, RealSourceError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| RealSourceError::NotNumeric {
        field,
        value: as_text(value),
    })
}

/// Map one upstream record onto an Observation
pub fn normalize_observation(record: &Map<String, Value>) -> Result<Observation, RealSourceError> {
    let fields = [
        ("observation_id", first_present(record, ID_KEYS)),
        ("observed_on", first_present(record, DATE_KEYS)),
        ("latitude", first_present(record, LAT_KEYS)),
        ("longitude", first_present(record, LON_KEYS)),
        ("ch4_ppb", first_present(record, CH4_KEYS)),
        ("qa_value", first_present(record, QA_KEYS)),
    ];

    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name.to_string())
        .collect();

    match fields.map(|(_, value)| value) {
        [Some(id), Some(date), Some(lat), Some(lon), Some(ch4), Some(qa)] => Ok(Observation {
            observation_id: as_text(id),
            observed_on: as_text(date),
            latitude: as_number("latitude", lat)?,
            longitude: as_number("longitude", lon)?,
            ch4_ppb: as_number("ch4_ppb", ch4)?,
            qa_value: as_number("qa_value", qa)?,
        }),
        _ => Err(RealSourceError::MissingFields(missing)),
    }
}

/// Append the window query to `source_url`; returns (request_url, recorded reference)
pub fn build_request_url(source_url: &str, start_date: &str, end_date: &str, aoi: &str) -> (String, String) {
    let query = format!(
        "start_date={}&end_date={}&aoi={}",
        urlencoding::encode(start_date),
        urlencoding::encode(end_date),
        urlencoding::encode(aoi)
    );

    if source_url.starts_with("file://") {
        // local files ignore the query; keep it for provenance only
        return (source_url.to_string(), format!("{}?{}", source_url, query));
    }

    let separator = if source_url.contains('?') { '&' } else { '?' };
    let request_url = format!("{}{}{}", source_url, separator, query);
    (request_url.clone(), request_url)
}

fn fetch_json(request_url: &str, timeout: Duration) -> Result<Value> {
    if let Some(path) = request_url.strip_prefix("file://") {
        let text = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read real source file {}", path))?;
        return serde_json::from_str(&text).with_context(|| format!("Real source {} is not JSON", path));
    }

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into();

    let response = agent
        .get(request_url)
        .call()
        .map_err(|e| RealSourceError::Request(e.to_string()))?;

    let payload: Value = response
        .into_body()
        .read_json()
        .map_err(|e| RealSourceError::Request(format!("invalid JSON body: {}", e)))?;

    Ok(payload)
}

/// Parse a fetched payload; observations sorted by (observed_on, observation_id)
pub fn parse_real_payload(payload: &Value, source_reference: String) -> Result<RealPayload, RealSourceError> {
    let records = payload
        .get("observations")
        .and_then(Value::as_array)
        .ok_or(RealSourceError::MissingObservations)?;

    let mut observations = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let record = record.as_object().ok_or(RealSourceError::NotAnObject { index })?;
        observations.push(normalize_observation(record)?);
    }

    observations.sort_by(|a, b| {
        (a.observed_on.as_str(), a.observation_id.as_str())
            .cmp(&(b.observed_on.as_str(), b.observation_id.as_str()))
    });

    let text_or = |key: &str, default: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };

    Ok(RealPayload {
        dataset: text_or("dataset", "Sentinel-5P"),
        product: text_or("product", "TROPOMI-CH4"),
        version: text_or("version", "unknown"),
        source_urls: vec![source_reference],
        observations,
    })
}

pub fn load_real_payload(
    source_url: &str,
    start_date: &str,
    end_date: &str,
    aoi: &str,
    timeout: Duration,
) -> Result<RealPayload> {
    let (request_url, source_reference) = build_request_url(source_url, start_date, end_date, aoi);
    info!(url = %request_url, "fetching real TROPOMI payload");

    let payload = fetch_json(&request_url, timeout)?;
    let parsed = parse_real_payload(&payload, source_reference)?;

    info!(count = parsed.observations.len(), "normalized real observations");
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_normalize_uses_aliases() {
        let record = object(json!({
            "id": 42,
            "date": "2026-02-10",
            "lat": "31.9",
            "lng": -102.1,
            "xch4": 1912.5,
            "quality": 0.9
        }));

        let obs = normalize_observation(&record).unwrap();

        assert_eq!(obs.observation_id, "42");
        assert_eq!(obs.observed_on, "2026-02-10");
        assert_eq!(obs.latitude, 31.9);
        assert_eq!(obs.longitude, -102.1);
        assert_eq!(obs.ch4_ppb, 1912.5);
        assert_eq!(obs.qa_value, 0.9);
    }

    #[test]
    fn test_normalize_skips_null_alias() {
        let record = object(json!({
            "observation_id": null,
            "observationId": "obs-1",
            "observed_on": "2026-02-10",
            "latitude": 1.0,
            "longitude": 2.0,
            "ch4_ppb": 1900.0,
            "qa_value": 0.8
        }));

        assert_eq!(normalize_observation(&record).unwrap().observation_id, "obs-1");
    }

    #[test]
    fn test_normalize_reports_all_missing_fields() {
        let record = object(json!({"id": "x", "lat": 1.0}));

        let err = normalize_observation(&record).unwrap_err();
        let message = err.to_string();

        assert!(matches!(err, RealSourceError::MissingFields(ref f) if f.len() == 4));
        assert!(message.contains("observed_on, longitude, ch4_ppb, qa_value"));
    }

    #[test]
    fn test_normalize_rejects_non_numeric() {
        let record = object(json!({
            "id": "x", "date": "d", "lat": "north", "lon": 1.0, "xch4": 1.0, "qa": 1.0
        }));

        let err = normalize_observation(&record).unwrap_err();
        assert!(matches!(err, RealSourceError::NotNumeric { field: "latitude", .. }));
    }

    #[test]
    fn test_build_request_url() {
        let (url, reference) = build_request_url("https://example.org/ch4", "2026-02-10", "2026-02-11", "permian basin");
        assert_eq!(
            url,
            "https://example.org/ch4?start_date=2026-02-10&end_date=2026-02-11&aoi=permian%20basin"
        );
        assert_eq!(url, reference);

        let (url, _) = build_request_url("https://example.org/ch4?key=1", "a", "b", "c");
        assert!(url.starts_with("https://example.org/ch4?key=1&start_date=a"));
    }

    #[test]
    fn test_file_url_keeps_query_in_reference_only() {
        let (url, reference) = build_request_url("file:///tmp/x.json", "a", "b", "c");

        assert_eq!(url, "file:///tmp/x.json");
        assert_eq!(reference, "file:///tmp/x.json?start_date=a&end_date=b&aoi=c");
    }

    #[test]
    fn test_parse_payload_sorts_and_defaults() {
        let payload = json!({
            "observations": [
                {"id": "b", "date": "2026-02-11", "lat": 0, "lon": 0, "xch4": 1, "qa": 1},
                {"id": "z", "date": "2026-02-10", "lat": 0, "lon": 0, "xch4": 1, "qa": 1},
                {"id": "a", "date": "2026-02-11", "lat": 0, "lon": 0, "xch4": 1, "qa": 1}
            ]
        });

        let parsed = parse_real_payload(&payload, "ref".to_string()).unwrap();
        let ids: Vec<&str> = parsed.observations.iter().map(|o| o.observation_id.as_str()).collect();

        assert_eq!(ids, vec!["z", "a", "b"]);
        assert_eq!(parsed.dataset, "Sentinel-5P");
        assert_eq!(parsed.product, "TROPOMI-CH4");
        assert_eq!(parsed.version, "unknown");
        assert_eq!(parsed.source_urls, vec!["ref".to_string()]);
    }

    #[test]
    fn test_parse_payload_requires_observation_list() {
        let err = parse_real_payload(&json!({"observations": {}}), "ref".to_string()).unwrap_err();
        assert!(matches!(err, RealSourceError::MissingObservations));
    }

    #[test]
    fn test_parse_payload_rejects_non_object_record() {
        let good = json!({
            "observation_id": "a", "observed_on": "2026-02-10",
            "latitude": 1.0, "longitude": 2.0, "ch4_ppb": 1900.0, "qa_value": 0.9
        });
        let payload = json!({"observations": [good, "not-a-record"]});

        let err = parse_real_payload(&payload, "ref".to_string()).unwrap_err();
        assert!(matches!(err, RealSourceError::NotAnObject { index: 1 }));
        assert_eq!(err.to_string(), "Observation 1 is not a JSON object");
    }

    #[test]
    fn test_load_from_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("real.json");
        std::fs::write(
            &path,
            json!({
                "dataset": "S5P",
                "observations": [
                    {"observation_id": "o1", "observed_on": "2026-02-10", "latitude": 1.0,
                     "longitude": 2.0, "ch4_ppb": 1900.0, "qa_value": 0.95}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let url = format!("file://{}", path.display());
        let payload = load_real_payload(&url, "2026-02-10", "2026-02-11", "permian", Duration::from_secs(5)).unwrap();

        assert_eq!(payload.dataset, "S5P");
        assert_eq!(payload.observations.len(), 1);
        assert!(payload.source_urls[0].ends_with("?start_date=2026-02-10&end_date=2026-02-11&aoi=permian"));
    }
}
