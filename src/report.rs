// Metrics the dashboard shows on top of the derived tables.
//
// Lookups return `None` when the requested compound or stint is not in the
// data; the UI renders that as "NA".

use std::collections::BTreeMap;

use crate::data::Compound;
use crate::normalize::NormalizedLap;
use crate::stats::{mean, ratio, round2};
use crate::strategy::{CompoundSummary, StintCompoundSummary, StintSummary};

/// Which stints a lap-time average covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StintSelector {
    Exactly(u32),
    /// This stint and every later one.
    From(u32),
}

impl StintSelector {
    fn covers(&self, stint_number: u32) -> bool {
        match *self {
            StintSelector::Exactly(n) => stint_number == n,
            StintSelector::From(n) => stint_number >= n,
        }
    }
}

/// Mean normalized lap time, rounded to two decimals.
pub fn average_lap_time(
    laps: &[NormalizedLap],
    compound: Option<Compound>,
    stint: Option<StintSelector>,
) -> Option<f64> {
    let times: Vec<f64> = laps
        .iter()
        .filter(|l| compound.map_or(true, |c| l.lap.row.compound == c))
        .filter(|l| stint.map_or(true, |s| s.covers(l.lap.row.stint_number)))
        .map(|l| l.normalized_lap_seconds)
        .collect();
    mean(&times).map(round2)
}

/// Average length of stint `stint_number`, or of it and all later stints when
/// `and_later` is set (mean of the per-stint averages).
pub fn average_stint_length(stints: &[StintSummary], stint_number: u32, and_later: bool) -> Option<f64> {
    stints.iter().find(|s| s.stint_number == stint_number)?;
    let averages: Vec<f64> = stints
        .iter()
        .filter(|s| if and_later { s.stint_number >= stint_number } else { s.stint_number == stint_number })
        .filter_map(|s| s.avg_stint_length)
        .collect();
    mean(&averages).map(round2)
}

/// How many races ended on stint `stint_number`, or on it or any later stint.
pub fn final_stint_count(stints: &[StintSummary], stint_number: u32, and_later: bool) -> Option<i64> {
    stints.iter().find(|s| s.stint_number == stint_number)?;
    Some(
        stints
            .iter()
            .filter(|s| if and_later { s.stint_number >= stint_number } else { s.stint_number == stint_number })
            .map(|s| s.final_stint_count)
            .sum(),
    )
}

/// Stint count per stint number and compound.
pub fn compound_usage_by_stint(stint_compounds: &[StintCompoundSummary]) -> BTreeMap<u32, BTreeMap<Compound, u32>> {
    let mut pivot: BTreeMap<u32, BTreeMap<Compound, u32>> = BTreeMap::new();
    for row in stint_compounds {
        *pivot.entry(row.stint_number).or_default().entry(row.compound).or_default() += row.compound_count_per_stint;
    }
    pivot
}

/// Total stints run on a compound across all stint numbers, 0 if unused.
pub fn compound_stint_total(pivot: &BTreeMap<u32, BTreeMap<Compound, u32>>, compound: Compound) -> u32 {
    pivot.values().filter_map(|row| row.get(&compound)).sum()
}

pub fn compound_laps(compounds: &[CompoundSummary], compound: Compound) -> u32 {
    compounds.iter().find(|c| c.compound == compound).map_or(0, |c| c.compound_laps)
}

/// 0 if the compound was never used or has no stints.
pub fn average_compound_laps(compounds: &[CompoundSummary], compound: Compound) -> f64 {
    compounds
        .iter()
        .find(|c| c.compound == compound)
        .and_then(|c| c.average_compound_laps)
        .map_or(0.0, round2)
}

/// Compounds shown together on one tile.
pub const WET_WEATHER: [Compound; 2] = [Compound::Intermediate, Compound::Wet];

pub fn group_stint_total(pivot: &BTreeMap<u32, BTreeMap<Compound, u32>>, group: &[Compound]) -> u32 {
    group.iter().map(|c| compound_stint_total(pivot, *c)).sum()
}

pub fn group_laps(compounds: &[CompoundSummary], group: &[Compound]) -> u32 {
    group.iter().map(|c| compound_laps(compounds, *c)).sum()
}

/// Laps per stint over every compound in the group, 0 if none was used.
pub fn group_average_laps(compounds: &[CompoundSummary], group: &[Compound]) -> f64 {
    let used = compounds.iter().filter(|c| group.contains(&c.compound));
    let (laps, stints) = used.fold((0u32, 0u32), |(l, s), c| (l + c.compound_laps, s + c.compound_stint_count));
    ratio(laps as f64, stints as f64).map_or(0.0, round2)
}
