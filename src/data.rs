use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// Tire rubber formulation. Declaration order is the display order (hardest dry
/// compound first, wet weather last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compound {
    Hard,
    Medium,
    Soft,
    Intermediate,
    Wet,
}

impl Compound {
    pub const ALL: [Compound; 5] = [
        Compound::Hard,
        Compound::Medium,
        Compound::Soft,
        Compound::Intermediate,
        Compound::Wet,
    ];

    /// Parses the upstream label. Anything outside the five known compounds
    /// (the feed also reports "UNKNOWN" and "TEST_UNKNOWN") is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "HARD" => Some(Compound::Hard),
            "MEDIUM" => Some(Compound::Medium),
            "SOFT" => Some(Compound::Soft),
            "INTERMEDIATE" => Some(Compound::Intermediate),
            "WET" => Some(Compound::Wet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compound::Hard => "HARD",
            Compound::Medium => "MEDIUM",
            Compound::Soft => "SOFT",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
        }
    }

    /// Chart colour used for this compound.
    pub fn color(&self) -> &'static str {
        match self {
            Compound::Hard => "ghostwhite",
            Compound::Medium => "gold",
            Compound::Soft => "firebrick",
            Compound::Intermediate => "seagreen",
            Compound::Wet => "royalblue",
        }
    }

    pub fn is_dry(&self) -> bool {
        matches!(self, Compound::Hard | Compound::Medium | Compound::Soft)
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// column names follow the cached season tables written by the fetch layer
#[derive(Debug, Deserialize)]
struct RawLap {
    #[serde(default, deserialize_with = "lenient_u32")]
    session_key: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    driver_number: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    lap_number: Option<u32>,
    #[serde(default)]
    lap_seconds: Option<f64>,
    #[serde(default, deserialize_with = "flag")]
    is_pit_out_lap: bool,
    #[serde(default)]
    sector_1: Option<f64>,
    #[serde(default)]
    sector_2: Option<f64>,
    #[serde(default)]
    sector_3: Option<f64>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStint {
    #[serde(default, deserialize_with = "lenient_u32")]
    session_key: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    driver_number: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    stint_number: Option<u32>,
    #[serde(default)]
    compound: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    lap_start: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    lap_end: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    initial_tire_age: Option<u32>,
    #[serde(default)]
    session_name: String,
    #[serde(default)]
    track_name: String,
    #[serde(default)]
    driver_name: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    team_name: Option<String>,
}

/// One driver's completed lap within a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapRecord {
    pub session_key: u32,
    pub driver_number: u32,
    pub lap_number: u32,
    /// `None` when the timing system invalidated the lap.
    pub lap_seconds: Option<f64>,
    pub is_pit_out_lap: bool,
    pub sectors: [Option<f64>; 3],
    pub date: Option<String>,
}

/// A contiguous range of laps run on one compound by one driver in one
/// session, with the session metadata the fetch layer joined onto it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StintRecord {
    pub session_key: u32,
    pub driver_number: u32,
    pub stint_number: u32,
    /// `None` for compounds outside the known five.
    pub compound: Option<Compound>,
    pub lap_start: u32,
    /// Inclusive.
    pub lap_end: u32,
    pub initial_tire_age: Option<u32>,
    pub session_name: String,
    pub track_name: String,
    pub driver_name: String,
    pub year: Option<i32>,
    pub date: Option<String>,
    pub team_name: Option<String>,
}

impl StintRecord {
    pub fn stint_length(&self) -> u32 {
        self.lap_end - self.lap_start + 1
    }
}

impl RawLap {
    fn into_record(self) -> Option<LapRecord> {
        let lap_number = self.lap_number.filter(|n| *n >= 1)?;
        Some(LapRecord {
            session_key: self.session_key?,
            driver_number: self.driver_number?,
            lap_number,
            lap_seconds: self.lap_seconds.filter(|s| s.is_finite()),
            is_pit_out_lap: self.is_pit_out_lap,
            sectors: [self.sector_1, self.sector_2, self.sector_3],
            date: self.date,
        })
    }
}

impl RawStint {
    fn into_record(self) -> Option<StintRecord> {
        let (lap_start, lap_end) = (self.lap_start?, self.lap_end?);
        if lap_start == 0 || lap_start > lap_end {
            return None;
        }
        Some(StintRecord {
            session_key: self.session_key?,
            driver_number: self.driver_number?,
            stint_number: self.stint_number?,
            compound: self.compound.as_deref().and_then(Compound::from_label),
            lap_start,
            lap_end,
            initial_tire_age: self.initial_tire_age,
            session_name: self.session_name,
            track_name: self.track_name,
            driver_name: self.driver_name,
            year: self.year,
            date: self.date,
            team_name: self.team_name,
        })
    }
}

/// Lap table and session/stint table for one season.
#[derive(Debug, Clone, Default)]
pub struct SeasonTables {
    pub laps: Vec<LapRecord>,
    pub stints: Vec<StintRecord>,
}

impl SeasonTables {
    /// Loads the cached master tables named by the config. Both files must
    /// exist before anything is read.
    pub fn load(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let laps_path = config.laps_path();
        let stints_path = config.sessions_path();
        for path in [&laps_path, &stints_path] {
            if !path.exists() {
                return Err(AnalysisError::MissingInput { path: path.clone() });
            }
        }
        Ok(SeasonTables {
            laps: load_laps(&laps_path)?,
            stints: load_stints(&stints_path)?,
        })
    }
}

pub fn load_laps<P: AsRef<Path>>(path: P) -> Result<Vec<LapRecord>, AnalysisError> {
    let rows: Vec<RawLap> = read_rows(path.as_ref())?;
    let total = rows.len();
    let laps: Vec<LapRecord> = rows.into_iter().filter_map(RawLap::into_record).collect();
    if laps.len() < total {
        debug!("skipped {} lap rows without a usable key", total - laps.len());
    }
    info!("loaded {} laps from {}", laps.len(), path.as_ref().display());
    Ok(laps)
}

pub fn load_stints<P: AsRef<Path>>(path: P) -> Result<Vec<StintRecord>, AnalysisError> {
    let rows: Vec<RawStint> = read_rows(path.as_ref())?;
    let total = rows.len();
    let stints: Vec<StintRecord> = rows.into_iter().filter_map(RawStint::into_record).collect();
    if stints.len() < total {
        debug!("skipped {} stint rows with an unusable key or lap range", total - stints.len());
    }
    info!("loaded {} stints from {}", stints.len(), path.as_ref().display());
    Ok(stints)
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, AnalysisError> {
    let csv_err = |source| AnalysisError::Csv { path: path.to_path_buf(), source };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;
    reader.deserialize().map(|res| res.map_err(csv_err)).collect()
}

// integer columns come back as "12.0" once pandas has seen a NaN in them.
// Negative, fractional or out-of-range values read as missing so the row is skipped.
fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<f64>()
            .map(|v| {
                let whole = v.is_finite() && v.fract() == 0.0;
                if whole && (0.0..=u32::MAX as f64).contains(&v) {
                    Some(v as u32)
                } else {
                    None
                }
            })
            .map_err(serde::de::Error::custom),
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(text) if text.eq_ignore_ascii_case("true") || text == "1" || text == "1.0" => Ok(true),
        Some(text) if text.eq_ignore_ascii_case("false") || text == "0" || text == "0.0" => Ok(false),
        Some(other) => Err(serde::de::Error::custom(format!("not a boolean: {other}"))),
    }
}
