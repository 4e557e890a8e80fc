use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::FilterSelection;
use crate::error::AnalysisError;

/// Where the season tables live and which slice of them to analyze.
///
/// Loaded from an optional TOML file; every field has a default so an empty
/// file (or no file) is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Directory holding `<year>_laps_master.csv` and `<year>_session_master.csv`
    pub data_dir: PathBuf,
    /// Season to analyze
    pub year: u16,
    /// Driver names to keep; empty keeps everyone
    pub drivers: Vec<String>,
    /// Track names to keep; empty keeps every track
    pub tracks: Vec<String>,
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            year: 2023,
            drivers: Vec::new(),
            tracks: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::MissingInput { path: path.to_path_buf() });
        }
        let contents = fs::read_to_string(path)
            .map_err(|source| AnalysisError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&contents)
            .map_err(|source| AnalysisError::Config { path: path.to_path_buf(), source })
    }

    pub fn laps_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}_laps_master.csv", self.year))
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}_session_master.csv", self.year))
    }

    pub fn selection(&self) -> FilterSelection {
        FilterSelection::new(self.drivers.iter().cloned(), self.tracks.iter().cloned())
    }
}
