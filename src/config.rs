//! Runtime settings: matching thresholds, job sizing and data file layout.
//!
//! Every field has a default, so an empty JSON object is a valid settings file:
//! ```json
//! {
//!   "engine": { "match_radius_m": 200.0 },
//!   "job": { "workers": 8, "timeout_secs": 120 },
//!   "data": { "data_dir": "data/MIO/" }
//! }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum distance in meters between a fix and an arc for the fix to count on that arc.
pub const DEFAULT_MATCH_RADIUS_M: f64 = 200.0;
/// Samples at or above this speed are treated as GPS jitter.
pub const DEFAULT_MAX_SPEED_KMH: f64 = 200.0;
/// Mean Earth radius used by both the haversine and the local projection.
pub const DEFAULT_EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub data: DataLayout,
}

impl Settings {
    /// Loads settings from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Loads from `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.job.validate()
    }
}

/// Thresholds used while turning consecutive fixes into arc speed samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "EngineConfig::default_match_radius_m")]
    pub match_radius_m: f64,
    #[serde(default = "EngineConfig::default_max_speed_kmh")]
    pub max_speed_kmh: f64,
    #[serde(default = "EngineConfig::default_earth_radius_m")]
    pub earth_radius_m: f64,
    /// How often the streaming pass logs progress (rows).
    #[serde(default = "EngineConfig::default_progress_every_rows")]
    pub progress_every_rows: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_radius_m: Self::default_match_radius_m(),
            max_speed_kmh: Self::default_max_speed_kmh(),
            earth_radius_m: Self::default_earth_radius_m(),
            progress_every_rows: Self::default_progress_every_rows(),
        }
    }
}

impl EngineConfig {
    fn default_match_radius_m() -> f64 {
        DEFAULT_MATCH_RADIUS_M
    }
    fn default_max_speed_kmh() -> f64 {
        DEFAULT_MAX_SPEED_KMH
    }
    fn default_earth_radius_m() -> f64 {
        DEFAULT_EARTH_RADIUS_M
    }
    fn default_progress_every_rows() -> u64 {
        1_000_000
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.match_radius_m > 0.0) {
            bail!("match_radius_m must be positive, got {}", self.match_radius_m);
        }
        if !(self.max_speed_kmh > 0.0) {
            bail!("max_speed_kmh must be positive, got {}", self.max_speed_kmh);
        }
        if !(self.earth_radius_m > 0.0) {
            bail!("earth_radius_m must be positive, got {}", self.earth_radius_m);
        }
        Ok(())
    }
}

/// Sizing of a bounded (partitioned) job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "JobConfig::default_workers")]
    pub workers: usize,
    /// Number of partitions; falls back to `workers` when unset.
    #[serde(default)]
    pub partitions: Option<usize>,
    #[serde(default = "JobConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Only the first `max_rows` telemetry rows are loaded when set.
    #[serde(default)]
    pub max_rows: Option<usize>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            partitions: None,
            timeout_secs: Self::default_timeout_secs(),
            max_rows: None,
        }
    }
}

impl JobConfig {
    fn default_workers() -> usize {
        4
    }
    fn default_timeout_secs() -> u64 {
        600
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.unwrap_or(self.workers)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.partition_count() == 0 {
            bail!("partitions must be at least 1");
        }
        Ok(())
    }
}

/// Where the topology and telemetry files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLayout {
    #[serde(default = "DataLayout::default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "DataLayout::default_lines_file")]
    pub lines_file: String,
    #[serde(default = "DataLayout::default_stops_file")]
    pub stops_file: String,
    #[serde(default = "DataLayout::default_line_stops_file")]
    pub line_stops_file: String,
    #[serde(default = "DataLayout::default_historical_file")]
    pub historical_file: String,
    #[serde(default = "DataLayout::default_streaming_file")]
    pub streaming_file: String,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            lines_file: Self::default_lines_file(),
            stops_file: Self::default_stops_file(),
            line_stops_file: Self::default_line_stops_file(),
            historical_file: Self::default_historical_file(),
            streaming_file: Self::default_streaming_file(),
        }
    }
}

impl DataLayout {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("proyecto-mio/MIO/")
    }
    fn default_lines_file() -> String {
        "lines-241.csv".into()
    }
    fn default_stops_file() -> String {
        "stops-241.csv".into()
    }
    fn default_line_stops_file() -> String {
        "linestops-241.csv".into()
    }
    fn default_historical_file() -> String {
        "datagrams4history.csv".into()
    }
    fn default_streaming_file() -> String {
        "datagrams4streaming.csv".into()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn lines_path(&self) -> PathBuf {
        self.data_dir.join(&self.lines_file)
    }

    pub fn stops_path(&self) -> PathBuf {
        self.data_dir.join(&self.stops_file)
    }

    pub fn line_stops_path(&self) -> PathBuf {
        self.data_dir.join(&self.line_stops_file)
    }

    pub fn historical_path(&self) -> PathBuf {
        self.data_dir.join(&self.historical_file)
    }

    pub fn streaming_path(&self) -> PathBuf {
        self.data_dir.join(&self.streaming_file)
    }
}
