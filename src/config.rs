//! Configuration resolution
//!
//! CLI flags override environment variables, which override the built-in
//! defaults. The engine path is the one setting that may stay unset: the
//! server then answers every analysis with `engineAvailable: false`.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Result;

/// Default equity-loss threshold for a play to become a quiz
pub const DEFAULT_THRESHOLD: f64 = 0.08;
/// Default crawl window in days
pub const DEFAULT_DAYS: u32 = 30;
/// Default source-site base URL
pub const DEFAULT_SITE_URL: &str = "http://www.dailygammon.com";
/// Bundled engine-side analysis script
pub const DEFAULT_ENGINE_SCRIPT: &str = "scripts/analyze_position.py";

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding the SQLite database
    pub data_dir: PathBuf,
    /// GNU Backgammon executable; `None` disables analysis
    pub engine_path: Option<PathBuf>,
    /// Script run inside the engine's embedded interpreter
    pub engine_script: PathBuf,
    pub site_url: String,
    pub threshold: f64,
    pub days: u32,
}

impl Config {
    /// Resolve the configuration, with the given CLI overrides winning over
    /// the environment.
    pub fn resolve(
        host: Option<String>,
        port: Option<u16>,
        data_dir: Option<PathBuf>,
    ) -> Result<Config> {
        let host = host
            .or_else(|| std::env::var("GAMMON_HOST").ok())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = port
            .or_else(|| env_parsed::<u16>("GAMMON_PORT"))
            .unwrap_or(3000);
        let data_dir = data_dir
            .or_else(|| std::env::var("GAMMON_DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data"));

        let engine_path = std::env::var("GNUBG_PATH").ok().map(PathBuf::from);
        match &engine_path {
            Some(path) => {
                if path.exists() {
                    info!("Engine executable: {}", path.display());
                } else {
                    warn!(
                        "GNUBG_PATH points at {}, which does not exist; analysis will be skipped",
                        path.display()
                    );
                }
            }
            None => warn!("GNUBG_PATH not set; analysis will report engineAvailable=false"),
        }

        let engine_script = std::env::var("GNUBG_SCRIPT")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE_SCRIPT));

        let site_url = std::env::var("GAMMON_SITE_URL")
            .ok()
            .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());

        let threshold = env_parsed::<f64>("GAMMON_THRESHOLD").unwrap_or(DEFAULT_THRESHOLD);
        let days = env_parsed::<u32>("GAMMON_DAYS").unwrap_or(DEFAULT_DAYS);

        info!(
            host = %host,
            port,
            data_dir = %data_dir.display(),
            site_url = %site_url,
            threshold,
            days,
            "configuration resolved"
        );

        Ok(Config {
            host,
            port,
            data_dir,
            engine_path,
            engine_script,
            site_url,
            threshold,
            days,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("gammon-quiz.db")
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparseable {}={}", key, raw);
            None
        }
    }
}
