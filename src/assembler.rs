// Joins the lap table to the stint table: one row per raced lap with its stint.
use serde::Serialize;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::data::{Compound, LapRecord, StintRecord};

/// A completed lap joined with the stint that covers it and the session
/// metadata of that stint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedLapRow {
    pub session_key: u32,
    pub track_name: String,
    pub session_name: String,
    pub year: Option<i32>,
    pub date: Option<String>,
    pub driver_number: u32,
    pub driver_name: String,
    pub team_name: Option<String>,
    pub lap_number: u32,
    pub lap_seconds: Option<f64>,
    pub is_pit_out_lap: bool,
    pub stint_number: u32,
    pub compound: Compound,
    pub lap_start: u32,
    pub lap_end: u32,
    pub stint_length: u32,
    /// 1-based position of this lap inside its stint.
    pub lap_in_stint: u32,
    pub initial_tire_age: Option<u32>,
}

/// Only race sessions feed the analysis (sprints are reported as "Sprint").
pub const RACE_SESSION_NAME: &str = "Race";

type LapKey = (u32, u32, u32);

/// Expands every stint into one entry per lap it covers and inner-joins the
/// result with the lap table on (session, driver number, lap number).
///
/// Output follows lap table order. Laps without a covering stint, stint laps
/// without a lap record, non-race sessions and unknown compounds are left out.
pub fn assemble_session(laps: &[LapRecord], stints: &[StintRecord]) -> Vec<MergedLapRow> {
    let mut covering: HashMap<LapKey, Vec<&StintRecord>> = HashMap::new();
    for stint in stints {
        for lap_number in stint.lap_start..=stint.lap_end {
            covering
                .entry((stint.session_key, stint.driver_number, lap_number))
                .or_default()
                .push(stint);
        }
    }

    let mut unmatched = 0usize;
    let mut filtered = 0usize;
    let mut merged = Vec::with_capacity(laps.len());
    for lap in laps {
        let Some(matches) = covering.get(&(lap.session_key, lap.driver_number, lap.lap_number)) else {
            unmatched += 1;
            continue;
        };
        for stint in matches {
            match merge_row(lap, stint) {
                Some(row) => merged.push(row),
                None => filtered += 1,
            }
        }
    }

    debug!("{} laps had no covering stint, {} joined rows were not race laps on a known compound", unmatched, filtered);
    info!("assembled {} lap rows from {} laps and {} stints", merged.len(), laps.len(), stints.len());
    merged
}

fn merge_row(lap: &LapRecord, stint: &StintRecord) -> Option<MergedLapRow> {
    if stint.session_name != RACE_SESSION_NAME {
        return None;
    }
    let compound = stint.compound?;
    Some(MergedLapRow {
        session_key: lap.session_key,
        track_name: stint.track_name.clone(),
        session_name: stint.session_name.clone(),
        year: stint.year,
        date: stint.date.clone(),
        driver_number: lap.driver_number,
        driver_name: stint.driver_name.clone(),
        team_name: stint.team_name.clone(),
        lap_number: lap.lap_number,
        lap_seconds: lap.lap_seconds,
        is_pit_out_lap: lap.is_pit_out_lap,
        stint_number: stint.stint_number,
        compound,
        lap_start: stint.lap_start,
        lap_end: stint.lap_end,
        stint_length: stint.stint_length(),
        lap_in_stint: lap.lap_number - stint.lap_start + 1,
        initial_tire_age: stint.initial_tire_age,
    })
}
