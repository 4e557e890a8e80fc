// Lap validity filtering.
//
// Keeps only laps that represent competitive pace. A lap is dropped when it is
// slow for its driver (a personal outlier), when the whole field was slow on
// that lap number (safety car, yellow flags, weather), or when it is a pit-out
// lap.
//
// This can remove whole stints, most often at the start of a race where a
// driver pits on lap 1 and only has a lap or two on the first set. Stint
// statistics are computed from the uncleaned table for that reason.

use serde::Serialize;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::assembler::MergedLapRow;
use crate::stats::median;

/// A lap at or above `median * 1.25` for its driver-session is an outlier.
pub const OUTLIER_FACTOR: f64 = 1.25;
/// A lap number is field-valid only if more than this many drivers set a valid
/// lap on it.
pub const FIELD_AGREEMENT_MIN: usize = 10;
/// Observed race lengths at or below this are treated as truncated.
pub const SHORT_RACE_LAPS: u32 = 44;
/// Assumed distance for truncated races (the most common race length).
pub const FALLBACK_RACE_LAPS: u32 = 57;

/// A merged lap with every flag the filter computed for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapAssessment {
    #[serde(flatten)]
    pub row: MergedLapRow,
    /// Laps this driver has in this session.
    pub session_laps: u32,
    /// `None` if the driver has no timed lap in the session.
    pub valid_lap_threshold: Option<f64>,
    pub total_session_laps: u32,
    pub lap_validity: bool,
    pub field_valid_lap: bool,
}

impl LapAssessment {
    pub fn is_kept(&self) -> bool {
        self.lap_validity && self.field_valid_lap && !self.row.is_pit_out_lap
    }
}

/// A lap that survived the filter. `lap_seconds` is always present here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidLap {
    #[serde(flatten)]
    pub row: MergedLapRow,
    #[serde(skip)]
    pub lap_seconds: f64,
    pub session_laps: u32,
    pub valid_lap_threshold: f64,
    pub total_session_laps: u32,
}

#[derive(Debug, Clone, Copy)]
struct DriverSessionStats {
    session_laps: u32,
    valid_lap_threshold: Option<f64>,
}

/// Assumed full race distance given the most laps any driver completed.
pub fn total_session_laps(max_session_laps: u32) -> u32 {
    if max_session_laps > SHORT_RACE_LAPS {
        max_session_laps
    } else {
        FALLBACK_RACE_LAPS
    }
}

/// Computes thresholds, race distance, per-lap validity and field validity for
/// every row. Nothing is removed; see [`remove_invalid_laps`].
pub fn assess_laps(rows: &[MergedLapRow]) -> Vec<LapAssessment> {
    let driver_stats = driver_session_stats(rows);

    let mut session_max: HashMap<u32, u32> = HashMap::new();
    for ((session_key, _), stats) in &driver_stats {
        let max = session_max.entry(*session_key).or_default();
        *max = (*max).max(stats.session_laps);
    }

    let mut assessed: Vec<LapAssessment> = rows
        .iter()
        .map(|row| {
            let stats = driver_stats[&(row.session_key, row.driver_name.as_str())];
            let lap_validity = match (row.lap_seconds, stats.valid_lap_threshold) {
                (Some(seconds), Some(threshold)) => seconds < threshold,
                _ => false,
            };
            LapAssessment {
                row: row.clone(),
                session_laps: stats.session_laps,
                valid_lap_threshold: stats.valid_lap_threshold,
                total_session_laps: total_session_laps(session_max[&row.session_key]),
                lap_validity,
                field_valid_lap: false,
            }
        })
        .collect();

    // field agreement is counted over every driver before anything is dropped
    let mut valid_per_lap: HashMap<(u32, u32), usize> = HashMap::new();
    for lap in &assessed {
        let count = valid_per_lap.entry((lap.row.session_key, lap.row.lap_number)).or_default();
        if lap.lap_validity {
            *count += 1;
        }
    }
    for lap in &mut assessed {
        lap.field_valid_lap = valid_per_lap[&(lap.row.session_key, lap.row.lap_number)] > FIELD_AGREEMENT_MIN;
    }

    assessed
}

/// Drops personal outliers, laps with no time, laps on which the field was
/// slowed, and pit-out laps.
pub fn remove_invalid_laps(rows: &[MergedLapRow]) -> Vec<ValidLap> {
    let assessed = assess_laps(rows);

    let field_slow = assessed.iter().filter(|lap| !lap.field_valid_lap).count();
    let outliers = assessed.iter().filter(|lap| !lap.lap_validity).count();
    debug!("{} laps are personal outliers, {} laps fall on field-slowed lap numbers", outliers, field_slow);

    let kept: Vec<ValidLap> = assessed
        .into_iter()
        .filter(LapAssessment::is_kept)
        .filter_map(|lap| {
            Some(ValidLap {
                lap_seconds: lap.row.lap_seconds?,
                valid_lap_threshold: lap.valid_lap_threshold?,
                session_laps: lap.session_laps,
                total_session_laps: lap.total_session_laps,
                row: lap.row,
            })
        })
        .collect();

    info!("kept {} of {} laps after validity filtering", kept.len(), rows.len());
    kept
}

fn driver_session_stats(rows: &[MergedLapRow]) -> HashMap<(u32, &str), DriverSessionStats> {
    let mut grouped: HashMap<(u32, &str), (u32, Vec<f64>)> = HashMap::new();
    for row in rows {
        let entry = grouped.entry((row.session_key, row.driver_name.as_str())).or_default();
        entry.0 += 1;
        entry.1.extend(row.lap_seconds);
    }
    grouped
        .into_iter()
        .map(|(key, (session_laps, times))| {
            let stats = DriverSessionStats {
                session_laps,
                valid_lap_threshold: median(&times).map(|m| m * OUTLIER_FACTOR),
            };
            (key, stats)
        })
        .collect()
}
