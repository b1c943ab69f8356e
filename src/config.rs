// Settings and logging shared by the binaries

use clap::Args;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_DATABASE_PATH: &str = "methane.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "methane_hotspots=info,tower_http=debug";

/// Server settings; every field can come from the environment
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Version reported by GET /version
    #[arg(long, env = "APP_VERSION", default_value = crate::VERSION)]
    pub app_version: String,

    /// SQLite store holding emitters and hotspots
    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            app_version: crate::VERSION.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

/// Install the global tracing subscriber (RUST_LOG overrides the default filter).
///
/// Logs go to stderr so stage summaries on stdout stay machine-readable.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.app_version, crate::VERSION);
        assert_eq!(settings.database_path, PathBuf::from("methane.db"));
        assert_eq!(settings.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_settings_from_flags() {
        let harness = Harness::parse_from([
            "server",
            "--app-version",
            "9.9.9",
            "--database-path",
            "/tmp/x.db",
            "--bind-addr",
            "127.0.0.1:8080",
        ]);

        assert_eq!(harness.settings.app_version, "9.9.9");
        assert_eq!(harness.settings.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(harness.settings.bind_addr, "127.0.0.1:8080");
    }
}
