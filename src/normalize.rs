// Fuel-load correction and relative pace for cleaned laps.
//
// Fuel model: 110 kg burned linearly over the race distance, each kg costing
// 0.03 s of lap time. Fuel is taken at mid-lap, hence the half-lap offset.
use serde::Serialize;
use std::collections::HashMap;

use tracing::info;

use crate::assembler::MergedLapRow;
use crate::cleaning::{remove_invalid_laps, ValidLap};
use crate::context::FilterSelection;
use crate::stats::{mean, ratio, round2};

pub const RACE_FUEL_KG: f64 = 110.0;
pub const SECONDS_PER_FUEL_KG: f64 = 0.03;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedLap {
    #[serde(flatten)]
    pub lap: ValidLap,
    pub normalized_lap_seconds: f64,
    /// Mean normalized time of the driver-session; set by [`attach_relative_pace`].
    pub average_normalized_lap_seconds: Option<f64>,
    /// Percent above (positive) or below (negative) the driver-session average,
    /// rounded to two decimals. `None` until computed or if the average is zero.
    pub lap_time_percentage_compared_to_average: Option<f64>,
}

/// Fuel still on board halfway through `lap_number` of a `total_laps` race.
pub fn remaining_fuel_kg(lap_number: f64, total_laps: u32) -> f64 {
    RACE_FUEL_KG - (RACE_FUEL_KG / total_laps as f64) * (lap_number - 0.5)
}

pub fn fuel_corrected_seconds(lap_seconds: f64, lap_number: u32, total_laps: u32) -> f64 {
    lap_seconds - remaining_fuel_kg(lap_number as f64, total_laps) * SECONDS_PER_FUEL_KG
}

/// First stage: subtract the estimated fuel weight penalty from every lap.
pub fn normalize_fuel_load(laps: Vec<ValidLap>) -> Vec<NormalizedLap> {
    laps.into_iter()
        .map(|lap| NormalizedLap {
            normalized_lap_seconds: fuel_corrected_seconds(
                lap.lap_seconds,
                lap.row.lap_number,
                lap.total_session_laps,
            ),
            lap,
            average_normalized_lap_seconds: None,
            lap_time_percentage_compared_to_average: None,
        })
        .collect()
}

/// Second stage: express every lap relative to its driver-session average, so
/// sessions of different absolute pace can be compared.
pub fn attach_relative_pace(mut laps: Vec<NormalizedLap>) -> Vec<NormalizedLap> {
    let mut grouped: HashMap<(u32, String), Vec<f64>> = HashMap::new();
    for lap in &laps {
        grouped
            .entry((lap.lap.row.session_key, lap.lap.row.driver_name.clone()))
            .or_default()
            .push(lap.normalized_lap_seconds);
    }
    let averages: HashMap<(u32, String), f64> = grouped
        .into_iter()
        .filter_map(|(key, times)| Some((key, mean(&times)?)))
        .collect();

    for lap in &mut laps {
        let key = (lap.lap.row.session_key, lap.lap.row.driver_name.clone());
        let average = averages.get(&key).copied();
        lap.average_normalized_lap_seconds = average;
        lap.lap_time_percentage_compared_to_average = average
            .and_then(|avg| ratio(lap.normalized_lap_seconds - avg, avg))
            .map(|r| round2(r * 100.0));
    }
    laps
}

/// Full lap-time pipeline: validity filter over the whole field, then the
/// selection, then fuel correction and relative pace.
///
/// The selection is applied after filtering so field-wide slowdowns are still
/// detected from every driver's times.
pub fn clean_and_normalize(rows: &[MergedLapRow], selection: &FilterSelection) -> Vec<NormalizedLap> {
    let valid: Vec<ValidLap> = remove_invalid_laps(rows)
        .into_iter()
        .filter(|lap| selection.matches(&lap.row))
        .collect();
    let normalized = attach_relative_pace(normalize_fuel_load(valid));
    info!("normalized {} laps", normalized.len());
    normalized
}
