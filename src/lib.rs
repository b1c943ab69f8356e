// Methane Hotspots - Core Library
// Shared by the pipeline CLI, the API server, and tests

pub mod config;
pub mod dashboard;
pub mod db;
pub mod emitters;
pub mod pipeline;
pub mod seed;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{init_tracing, Settings};
pub use dashboard::{render_emitter_list, render_home, render_layout};
pub use db::{
    check_db_connection, count_emitters, count_hotspots, get_emitter_with_evidence, insert_hotspots, list_emitters, list_hotspots_by_date,
    open_database, setup_database, upsert_emitters, EmitterDetail, EmitterSummary, Hotspot, HotspotEvidence,
};
pub use emitters::{mock_emitters, Emitter};
pub use pipeline::detect::{run_detect, DetectOptions, DetectSummary};
pub use pipeline::gee::{run_gee_fetch, run_gee_ingest, FetchSummary, GeeFetchOptions, GeeIngestOptions};
pub use pipeline::ingest::{run_ingest, IngestOptions, SourceKind};
pub use pipeline::publish::{publish_detect_run, PublishSummary};
pub use pipeline::{IngestSummary, Observation};
pub use seed::{seed_emitters, SeedSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
