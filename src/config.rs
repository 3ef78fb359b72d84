use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::data::{BoundarySource, DEFAULT_BOUNDARY_URL};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const APP_DIR: &str = "gdp-globe";
const LOG_FILE: &str = "gdp-globe.log";

/// Environment variables checked for the API key, in order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Interactive GDP globe with AI economic commentary")]
pub struct Args {
    /// Config file (default: <config dir>/gdp-globe/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Boundary GeoJSON: local path or http(s) URL
    #[arg(long)]
    pub geojson: Option<String>,

    /// Generative model name
    #[arg(long)]
    pub model: Option<String>,

    /// Per-request timeout for analysis and chat
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Where to write the log
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Start with the globe still
    #[arg(long)]
    pub no_rotate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
    pub geojson: String,
    pub auto_rotate: bool,
    /// 2.0 is one turn every 30 seconds
    pub rotate_speed: f64,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 30,
            geojson: DEFAULT_BOUNDARY_URL.to_string(),
            auto_rotate: true,
            rotate_speed: 0.5,
            log_file: None,
        }
    }
}

impl Config {
    /// Resolve the final settings. `env` looks up an environment variable.
    pub fn load(args: &Args, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Some(key) = API_KEY_VARS
            .iter()
            .filter_map(|&var| env(var))
            .find(|key| !key.trim().is_empty())
        {
            config.api_key = Some(key);
        }

        config.apply_args(args);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(geojson) = &args.geojson {
            self.geojson = geojson.clone();
        }
        if let Some(model) = &args.model {
            self.model = model.clone();
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout_secs = secs;
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = Some(log_file.clone());
        }
        if args.no_rotate {
            self.auto_rotate = false;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn boundary_source(&self) -> BoundarySource {
        BoundarySource::parse(&self.geojson)
    }

    /// Spin per frame in radians, assuming 60 frames per second
    pub fn rotate_step(&self) -> f64 {
        self.rotate_speed * std::f64::consts::TAU / 3600.0
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join(APP_DIR))
                .unwrap_or_else(std::env::temp_dir)
                .join(LOG_FILE)
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}
