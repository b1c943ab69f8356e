use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Stored persistent emitter with its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterSummary {
    pub id: String,
    pub name: String,
    pub confidence: f64,
    pub detection_count: i64,
    pub last_seen: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One hotspot detection attached to an emitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotEvidence {
    pub hotspot_id: String,
    pub observed_on: String,
    pub anomaly_score: f64,
    pub area_km2: f64,
    pub pixel_count: i64,
    pub qa_pass_ratio: f64,
}

/// Emitter plus every hotspot that backs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterDetail {
    #[serde(flatten)]
    pub emitter: EmitterSummary,
    pub hotspot_evidence: Vec<HotspotEvidence>,
}

/// Stored hotspot detection (emitter_id is None until attributed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub id: String,
    pub emitter_id: Option<String>,
    pub observed_on: String,
    pub anomaly_score: f64,
    pub area_km2: f64,
    pub pixel_count: i64,
    pub qa_pass_ratio: f64,
    pub centroid_latitude: f64,
    pub centroid_longitude: f64,
}

/// Open (or create) the store at `path` and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases silently keep "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS emitters (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            confidence REAL NOT NULL,
            detection_count INTEGER NOT NULL DEFAULT 0,
            last_seen TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hotspots (
            id TEXT PRIMARY KEY,
            emitter_id TEXT REFERENCES emitters(id),
            observed_on TEXT NOT NULL,
            anomaly_score REAL NOT NULL,
            area_km2 REAL NOT NULL,
            pixel_count INTEGER NOT NULL,
            qa_pass_ratio REAL NOT NULL,
            centroid_latitude REAL NOT NULL,
            centroid_longitude REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_hotspots_observed_on ON hotspots(observed_on);
        CREATE INDEX IF NOT EXISTS idx_hotspots_emitter_id ON hotspots(emitter_id);",
    )
    .context("Failed to create schema")?;

    Ok(())
}

/// Probe the connection; never fails, reports the error text instead
pub fn check_db_connection(conn: &Connection) -> (bool, String) {
    match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
        Ok(_) => (true, "connected".to_string()),
        Err(e) => (false, e.to_string()),
    }
}

/// Insert emitters, overwriting every field of existing ids
pub fn upsert_emitters(conn: &Connection, emitters: &[EmitterSummary]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut written = 0;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO emitters (id, name, confidence, detection_count, last_seen, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
               name = excluded.name,
               confidence = excluded.confidence,
               detection_count = excluded.detection_count,
               last_seen = excluded.last_seen,
               latitude = excluded.latitude,
               longitude = excluded.longitude",
        )?;

        for emitter in emitters {
            written += stmt
                .execute(params![
                    emitter.id,
                    emitter.name,
                    emitter.confidence,
                    emitter.detection_count,
                    emitter.last_seen,
                    emitter.latitude,
                    emitter.longitude,
                ])
                .with_context(|| format!("Failed to upsert emitter {}", emitter.id))?;
        }
    }

    tx.commit()?;
    debug!(count = written, "upserted emitters");
    Ok(written)
}

fn emitter_from_row(row: &rusqlite::Row) -> rusqlite::Result<EmitterSummary> {
    Ok(EmitterSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        confidence: row.get(2)?,
        detection_count: row.get(3)?,
        last_seen: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
    })
}

pub fn list_emitters(conn: &Connection) -> Result<Vec<EmitterSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, confidence, detection_count, last_seen, latitude, longitude
         FROM emitters
         ORDER BY confidence DESC, id ASC",
    )?;

    let emitters = stmt
        .query_map([], emitter_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(emitters)
}

pub fn count_emitters(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM emitters", [], |row| row.get(0))?;
    Ok(count)
}

/// Emitter and its hotspot evidence, newest observation first
pub fn get_emitter_with_evidence(conn: &Connection, emitter_id: &str) -> Result<Option<EmitterDetail>> {
    let emitter = conn
        .query_row(
            "SELECT id, name, confidence, detection_count, last_seen, latitude, longitude
             FROM emitters
             WHERE id = ?1",
            params![emitter_id],
            emitter_from_row,
        )
        .optional()?;

    let Some(emitter) = emitter else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, observed_on, anomaly_score, area_km2, pixel_count, qa_pass_ratio
         FROM hotspots
         WHERE emitter_id = ?1
         ORDER BY observed_on DESC, id ASC",
    )?;

    let hotspot_evidence = stmt
        .query_map(params![emitter_id], |row| {
            Ok(HotspotEvidence {
                hotspot_id: row.get(0)?,
                observed_on: row.get(1)?,
                anomaly_score: row.get(2)?,
                area_km2: row.get(3)?,
                pixel_count: row.get(4)?,
                qa_pass_ratio: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(EmitterDetail {
        emitter,
        hotspot_evidence,
    }))
}

/// Hotspots observed on one day, strongest anomaly first
pub fn list_hotspots_by_date(conn: &Connection, observed_on: NaiveDate) -> Result<Vec<Hotspot>> {
    let mut stmt = conn.prepare(
        "SELECT id, emitter_id, observed_on, anomaly_score, area_km2, pixel_count,
                qa_pass_ratio, centroid_latitude, centroid_longitude
         FROM hotspots
         WHERE observed_on = ?1
         ORDER BY anomaly_score DESC, id ASC",
    )?;

    let day = observed_on.format("%Y-%m-%d").to_string();
    let hotspots = stmt
        .query_map(params![day], |row| {
            Ok(Hotspot {
                id: row.get(0)?,
                emitter_id: row.get(1)?,
                observed_on: row.get(2)?,
                anomaly_score: row.get(3)?,
                area_km2: row.get(4)?,
                pixel_count: row.get(5)?,
                qa_pass_ratio: row.get(6)?,
                centroid_latitude: row.get(7)?,
                centroid_longitude: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(hotspots)
}

/// Upsert hotspots keyed by id; importing the same run twice is a no-op
pub fn insert_hotspots(conn: &Connection, hotspots: &[Hotspot]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut written = 0;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO hotspots (id, emitter_id, observed_on, anomaly_score, area_km2, pixel_count,
                                   qa_pass_ratio, centroid_latitude, centroid_longitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (id) DO UPDATE SET
               emitter_id = excluded.emitter_id,
               observed_on = excluded.observed_on,
               anomaly_score = excluded.anomaly_score,
               area_km2 = excluded.area_km2,
               pixel_count = excluded.pixel_count,
               qa_pass_ratio = excluded.qa_pass_ratio,
               centroid_latitude = excluded.centroid_latitude,
               centroid_longitude = excluded.centroid_longitude",
        )?;

        for hotspot in hotspots {
            written += stmt
                .execute(params![
                    hotspot.id,
                    hotspot.emitter_id,
                    hotspot.observed_on,
                    hotspot.anomaly_score,
                    hotspot.area_km2,
                    hotspot.pixel_count,
                    hotspot.qa_pass_ratio,
                    hotspot.centroid_latitude,
                    hotspot.centroid_longitude,
                ])
                .with_context(|| format!("Failed to upsert hotspot {}", hotspot.id))?;
        }
    }

    tx.commit()?;
    Ok(written)
}

pub fn count_hotspots(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM hotspots", [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_emitter(id: &str, confidence: f64) -> EmitterSummary {
        EmitterSummary {
            id: id.to_string(),
            name: format!("Site {}", id),
            confidence,
            detection_count: 1,
            last_seen: "2026-02-12".to_string(),
            latitude: 31.9,
            longitude: -102.1,
        }
    }

    fn sample_hotspot(id: &str, emitter_id: Option<&str>, observed_on: &str, score: f64) -> Hotspot {
        Hotspot {
            id: id.to_string(),
            emitter_id: emitter_id.map(str::to_string),
            observed_on: observed_on.to_string(),
            anomaly_score: score,
            area_km2: 7.0,
            pixel_count: 1,
            qa_pass_ratio: 0.75,
            centroid_latitude: 31.9,
            centroid_longitude: -102.1,
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = memory_db();
        setup_database(&conn).unwrap();

        assert_eq!(count_emitters(&conn).unwrap(), 0);
        assert_eq!(count_hotspots(&conn).unwrap(), 0);
    }

    #[test]
    fn test_check_db_connection() {
        let conn = memory_db();
        let (ok, detail) = check_db_connection(&conn);

        assert!(ok);
        assert_eq!(detail, "connected");
    }

    #[test]
    fn test_list_emitters_orders_by_confidence_then_id() {
        let conn = memory_db();
        upsert_emitters(
            &conn,
            &[
                sample_emitter("em-003", 0.5),
                sample_emitter("em-002", 0.9),
                sample_emitter("em-001", 0.5),
            ],
        )
        .unwrap();

        let ids: Vec<String> = list_emitters(&conn).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["em-002", "em-001", "em-003"]);
    }

    #[test]
    fn test_upsert_overwrites_existing_emitter() {
        let conn = memory_db();
        upsert_emitters(&conn, &[sample_emitter("em-001", 0.5)]).unwrap();

        let mut updated = sample_emitter("em-001", 0.95);
        updated.name = "Renamed".to_string();
        upsert_emitters(&conn, &[updated]).unwrap();

        let emitters = list_emitters(&conn).unwrap();
        assert_eq!(emitters.len(), 1);
        assert_eq!(emitters[0].name, "Renamed");
        assert_eq!(emitters[0].confidence, 0.95);
    }

    #[test]
    fn test_failed_emitter_batch_writes_nothing() {
        let conn = memory_db();
        conn.execute_batch(
            "CREATE TRIGGER reject_em_bad BEFORE INSERT ON emitters
             WHEN NEW.id = 'em-bad'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let err = upsert_emitters(&conn, &[sample_emitter("em-001", 0.9), sample_emitter("em-bad", 0.1)]).unwrap_err();

        assert!(err.to_string().contains("em-bad"));
        assert_eq!(count_emitters(&conn).unwrap(), 0, "batch should roll back as a whole");
    }

    #[test]
    fn test_get_emitter_with_evidence() {
        let conn = memory_db();
        upsert_emitters(&conn, &[sample_emitter("em-001", 0.88)]).unwrap();
        insert_hotspots(
            &conn,
            &[
                sample_hotspot("hs-b", Some("em-001"), "2026-02-10", 45.0),
                sample_hotspot("hs-a", Some("em-001"), "2026-02-10", 41.0),
                sample_hotspot("hs-c", Some("em-001"), "2026-02-12", 60.0),
                sample_hotspot("hs-x", None, "2026-02-12", 90.0),
            ],
        )
        .unwrap();

        let detail = get_emitter_with_evidence(&conn, "em-001").unwrap().unwrap();
        let ids: Vec<&str> = detail
            .hotspot_evidence
            .iter()
            .map(|h| h.hotspot_id.as_str())
            .collect();

        assert_eq!(detail.emitter.id, "em-001");
        assert_eq!(ids, vec!["hs-c", "hs-a", "hs-b"]);
    }

    #[test]
    fn test_get_unknown_emitter_returns_none() {
        let conn = memory_db();
        assert!(get_emitter_with_evidence(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_list_hotspots_by_date() {
        let conn = memory_db();
        insert_hotspots(
            &conn,
            &[
                sample_hotspot("hs-1", None, "2026-02-10", 41.0),
                sample_hotspot("hs-2", None, "2026-02-10", 47.0),
                sample_hotspot("hs-3", None, "2026-02-11", 99.0),
            ],
        )
        .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let hotspots = list_hotspots_by_date(&conn, day).unwrap();

        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].id, "hs-2");
        assert_eq!(hotspots[1].id, "hs-1");
    }

    #[test]
    fn test_insert_hotspots_twice_keeps_one_row() {
        let conn = memory_db();
        let batch = vec![sample_hotspot("hs-1", None, "2026-02-10", 41.0)];

        insert_hotspots(&conn, &batch).unwrap();
        insert_hotspots(&conn, &batch).unwrap();

        assert_eq!(count_hotspots(&conn).unwrap(), 1);
    }

    #[test]
    fn test_emitter_detail_flattens_summary() {
        let detail = EmitterDetail {
            emitter: sample_emitter("em-001", 0.88),
            hotspot_evidence: vec![],
        };
        let json = serde_json::to_value(&detail).unwrap();

        assert_eq!(json["id"], "em-001");
        assert!(json["hotspot_evidence"].as_array().unwrap().is_empty());
    }
}
