use crate::data::Compound;
use crate::normalize::NormalizedLap;
use crate::stats::mean;
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Fewer laps than this and a compound gets no trend line.
pub const MIN_TREND_LAPS: usize = 5;

/// Straight-line fit of relative pace against position in the stint. A positive
/// slope means laps get slower (relative to the driver's average) as the set ages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaceTrend {
    pub compound: Compound,
    pub slope_pct_per_lap: f64,
    pub intercept_pct: f64,
    pub sample_laps: usize,
}

impl PaceTrend {
    /// Expected relative pace on the given lap of a stint.
    pub fn pace_at(&self, lap_in_stint: u32) -> f64 {
        self.intercept_pct + self.slope_pct_per_lap * lap_in_stint as f64
    }
}

/// One trend per compound with enough data, in compound order.
pub fn compound_pace_trends(laps: &[NormalizedLap]) -> Vec<PaceTrend> {
    Compound::ALL
        .iter()
        .filter_map(|compound| fit_trend(laps, *compound))
        .collect()
}

fn fit_trend(laps: &[NormalizedLap], compound: Compound) -> Option<PaceTrend> {
    let points: Vec<(f64, f64)> = laps
        .iter()
        .filter(|l| l.lap.row.compound == compound)
        .filter_map(|l| Some((l.lap.row.lap_in_stint as f64, l.lap_time_percentage_compared_to_average?)))
        .collect();
    if points.len() < MIN_TREND_LAPS {
        return None;
    }
    // a single stint position gives a vertical cloud, nothing to fit
    let positions: BTreeSet<u64> = points.iter().map(|(x, _)| x.to_bits()).collect();
    if positions.len() < 2 {
        return None;
    }

    let x = Array2::from_shape_vec((points.len(), 1), points.iter().map(|(x, _)| *x).collect()).ok()?;
    let y = Array1::from_vec(points.iter().map(|(_, y)| *y).collect());
    let ds = Dataset::new(x, y);

    let fitted = LinearRegression::new().fit(&ds).ok()?;
    Some(PaceTrend {
        compound,
        slope_pct_per_lap: *fitted.params().get(0)?,
        intercept_pct: fitted.intercept(),
        sample_laps: points.len(),
    })
}

/// Mean relative pace and mean normalized time at one position in a stint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StintLapPace {
    pub mean_percentage: Option<f64>,
    pub mean_normalized_seconds: f64,
    pub laps: usize,
}

/// Pace by (compound, lap in stint) for the dry compounds.
pub fn pace_by_lap_in_stint(laps: &[NormalizedLap]) -> BTreeMap<(Compound, u32), StintLapPace> {
    let mut grouped: BTreeMap<(Compound, u32), Vec<&NormalizedLap>> = BTreeMap::new();
    for lap in laps.iter().filter(|l| l.lap.row.compound.is_dry()) {
        grouped.entry((lap.lap.row.compound, lap.lap.row.lap_in_stint)).or_default().push(lap);
    }
    grouped
        .into_iter()
        .map(|(key, group)| {
            let pct: Vec<f64> = group.iter().filter_map(|l| l.lap_time_percentage_compared_to_average).collect();
            let secs: Vec<f64> = group.iter().map(|l| l.normalized_lap_seconds).collect();
            let pace = StintLapPace {
                mean_percentage: mean(&pct),
                mean_normalized_seconds: secs.iter().sum::<f64>() / secs.len() as f64,
                laps: group.len(),
            };
            (key, pace)
        })
        .collect()
}
