// Emitter records shown by the dashboard list
//
// A persistent emitter is a candidate methane source: an id, a display
// name, a confidence score and the date it was last observed.

use crate::db::EmitterSummary;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Emitter - the record rendered by the emitter list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emitter {
    /// Unique token, e.g. "em-001"
    pub id: String,

    /// Display name
    pub name: String,

    /// Confidence score (samples are within 0.0-1.0, not enforced)
    pub confidence: f64,

    /// Last-seen date as reported upstream (not validated)
    #[serde(rename = "lastSeen", alias = "last_seen")]
    pub last_seen: String,
}

impl Emitter {
    pub fn new(id: &str, name: &str, confidence: f64, last_seen: &str) -> Self {
        Emitter {
            id: id.to_string(),
            name: name.to_string(),
            confidence,
            last_seen: last_seen.to_string(),
        }
    }
}

impl From<&EmitterSummary> for Emitter {
    fn from(summary: &EmitterSummary) -> Self {
        Emitter {
            id: summary.id.clone(),
            name: summary.name.clone(),
            confidence: summary.confidence,
            last_seen: summary.last_seen.clone(),
        }
    }
}

/// Placeholder rows carry no location or detection history
impl From<&Emitter> for EmitterSummary {
    fn from(emitter: &Emitter) -> Self {
        EmitterSummary {
            id: emitter.id.clone(),
            name: emitter.name.clone(),
            confidence: emitter.confidence,
            detection_count: 0,
            last_seen: emitter.last_seen.clone(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

static MOCK_EMITTERS: OnceLock<Vec<Emitter>> = OnceLock::new();

/// Static sample emitters used until the store has real detections.
///
/// Built once on first access and never mutated afterwards.
pub fn mock_emitters() -> &'static [Emitter] {
    MOCK_EMITTERS.get_or_init(|| {
        vec![
            Emitter::new("em-001", "Permian Candidate 1", 0.88, "2026-02-12"),
            Emitter::new("em-002", "Turkmenistan Candidate 7", 0.74, "2026-02-11"),
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_emitters_not_empty() {
        let emitters = mock_emitters();

        assert!(!emitters.is_empty(), "dashboard placeholder needs seed emitters");
        assert!(emitters.iter().all(|e| !e.id.is_empty()));
        assert_eq!(emitters[0].id, "em-001");
    }

    #[test]
    fn test_mock_emitters_is_stable() {
        let first = mock_emitters().as_ptr();
        let second = mock_emitters().as_ptr();

        assert_eq!(first, second, "mock list should be built once");
        assert_eq!(mock_emitters().len(), 2);
    }

    #[test]
    fn test_emitter_serializes_last_seen_as_camel_case() {
        let json = serde_json::to_value(&mock_emitters()[1]).unwrap();

        assert_eq!(json["lastSeen"], "2026-02-11");
        assert_eq!(json["confidence"], 0.74);
    }

    #[test]
    fn test_emitter_from_summary() {
        let summary = EmitterSummary {
            id: "em-009".to_string(),
            name: "Test Site".to_string(),
            confidence: 0.5,
            detection_count: 3,
            last_seen: "2026-01-01".to_string(),
            latitude: 31.9,
            longitude: -102.1,
        };

        let emitter = Emitter::from(&summary);
        assert_eq!(emitter, Emitter::new("em-009", "Test Site", 0.5, "2026-01-01"));
    }

    #[test]
    fn test_summary_from_mock_emitter() {
        let summaries: Vec<EmitterSummary> = mock_emitters().iter().map(EmitterSummary::from).collect();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].id, "em-002");
        assert_eq!(summaries[1].last_seen, "2026-02-11");
        assert_eq!(summaries[1].detection_count, 0);
        assert_eq!(Emitter::from(&summaries[0]), mock_emitters()[0]);
    }
}
