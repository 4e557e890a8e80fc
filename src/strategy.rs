// Stint and compound usage statistics over the assembled (uncleaned) lap table.
use serde::Serialize;
use std::collections::BTreeMap;

use tracing::info;

use crate::assembler::MergedLapRow;
use crate::context::FilterSelection;
use crate::data::Compound;
use crate::stats::{mode_first, ratio};

/// One stint, collapsed from its lap rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StintGroup {
    pub track_name: String,
    pub driver_name: String,
    pub stint_number: u32,
    pub session_key: u32,
    pub compound: Compound,
    pub stint_length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundSummary {
    pub compound: Compound,
    pub compound_laps: u32,
    pub compound_stint_count: u32,
    pub average_compound_laps: Option<f64>,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StintSummary {
    pub stint_number: u32,
    pub stint_count: u32,
    pub avg_stint_length: Option<f64>,
    /// Drivers whose race ended on this stint.
    pub final_stint_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StintCompoundSummary {
    pub stint_number: u32,
    pub compound: Compound,
    pub compound_count_per_stint: u32,
    pub compound_stint_laps: u32,
    pub average_compound_length_for_this_stint: Option<f64>,
}

/// Compound and stint usage for a set of races. Tables are ordered by
/// compound, by stint number, and by (stint number, compound).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StintReport {
    pub stint_compounds: Vec<StintCompoundSummary>,
    pub compounds: Vec<CompoundSummary>,
    pub stints: Vec<StintSummary>,
}

/// Collapses lap rows to one entry per (track, driver, stint number), taking
/// the most frequent stint length, session and compound in each group. Ties
/// go to the value seen first.
pub fn collapse_stints(rows: &[MergedLapRow]) -> Vec<StintGroup> {
    let mut grouped: BTreeMap<(&str, &str, u32), Vec<&MergedLapRow>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.track_name.as_str(), row.driver_name.as_str(), row.stint_number))
            .or_default()
            .push(row);
    }

    grouped
        .into_iter()
        .filter_map(|((track_name, driver_name, stint_number), group)| {
            Some(StintGroup {
                track_name: track_name.to_string(),
                driver_name: driver_name.to_string(),
                stint_number,
                session_key: mode_first(group.iter().map(|r| r.session_key))?,
                compound: mode_first(group.iter().map(|r| r.compound))?,
                stint_length: mode_first(group.iter().map(|r| r.stint_length))?,
            })
        })
        .collect()
}

/// Stint and compound statistics for the rows the selection keeps.
///
/// Expects the assembled table before lap cleaning, so stints whose laps would
/// all be filtered out are still counted.
pub fn summarize_stints_for(rows: &[MergedLapRow], selection: &FilterSelection) -> StintReport {
    if selection.is_empty() {
        return summarize_stints(rows);
    }
    let selected: Vec<MergedLapRow> = rows.iter().filter(|row| selection.matches(row)).cloned().collect();
    summarize_stints(&selected)
}

pub fn summarize_stints(rows: &[MergedLapRow]) -> StintReport {
    let groups = collapse_stints(rows);
    info!("summarizing {} stints", groups.len());
    StintReport {
        stint_compounds: by_stint_and_compound(&groups),
        compounds: by_compound(&groups),
        stints: by_stint(&groups),
    }
}

fn by_compound(groups: &[StintGroup]) -> Vec<CompoundSummary> {
    let mut totals: BTreeMap<Compound, (u32, u32)> = BTreeMap::new();
    for group in groups {
        let (laps, count) = totals.entry(group.compound).or_default();
        *laps += group.stint_length;
        *count += 1;
    }
    totals
        .into_iter()
        .map(|(compound, (laps, count))| CompoundSummary {
            compound,
            compound_laps: laps,
            compound_stint_count: count,
            average_compound_laps: ratio(laps as f64, count as f64),
            color: compound.color(),
        })
        .collect()
}

fn by_stint(groups: &[StintGroup]) -> Vec<StintSummary> {
    let mut totals: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
    for group in groups {
        let (count, laps) = totals.entry(group.stint_number).or_default();
        *count += 1;
        *laps += group.stint_length;
    }
    totals
        .iter()
        .map(|(&stint_number, &(count, laps))| {
            // a stint number nobody reached counts as zero
            let next = stint_number
                .checked_add(1)
                .and_then(|n| totals.get(&n))
                .map_or(0, |(c, _)| *c);
            StintSummary {
                stint_number,
                stint_count: count,
                avg_stint_length: ratio(laps as f64, count as f64),
                final_stint_count: count as i64 - next as i64,
            }
        })
        .collect()
}

fn by_stint_and_compound(groups: &[StintGroup]) -> Vec<StintCompoundSummary> {
    let mut totals: BTreeMap<(u32, Compound), (u32, u32)> = BTreeMap::new();
    for group in groups {
        let (count, laps) = totals.entry((group.stint_number, group.compound)).or_default();
        *count += 1;
        *laps += group.stint_length;
    }
    totals
        .into_iter()
        .map(|((stint_number, compound), (count, laps))| StintCompoundSummary {
            stint_number,
            compound,
            compound_count_per_stint: count,
            compound_stint_laps: laps,
            average_compound_length_for_this_stint: ratio(laps as f64, count as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stint_rows(track: &str, driver: &str, stint_number: u32, compound: Compound, laps: std::ops::RangeInclusive<u32>) -> Vec<MergedLapRow> {
        let (start, end) = (*laps.start(), *laps.end());
        laps.map(|lap_number| MergedLapRow {
            session_key: 100,
            track_name: track.to_string(),
            session_name: "Race".to_string(),
            year: Some(2023),
            date: None,
            driver_number: 0,
            driver_name: driver.to_string(),
            team_name: None,
            lap_number,
            lap_seconds: Some(95.0),
            is_pit_out_lap: lap_number == start && stint_number > 1,
            stint_number,
            compound,
            lap_start: start,
            lap_end: end,
            stint_length: end - start + 1,
            lap_in_stint: lap_number - start + 1,
            initial_tire_age: Some(0),
        })
        .collect()
    }

    /// Two one-stop drivers and one two-stop driver.
    fn race() -> Vec<MergedLapRow> {
        let mut rows = Vec::new();
        rows.extend(stint_rows("Silverstone", "A", 1, Compound::Medium, 1..=20));
        rows.extend(stint_rows("Silverstone", "A", 2, Compound::Hard, 21..=52));
        rows.extend(stint_rows("Silverstone", "B", 1, Compound::Medium, 1..=24));
        rows.extend(stint_rows("Silverstone", "B", 2, Compound::Hard, 25..=52));
        rows.extend(stint_rows("Silverstone", "C", 1, Compound::Soft, 1..=1));
        rows.extend(stint_rows("Silverstone", "C", 2, Compound::Hard, 2..=30));
        rows.extend(stint_rows("Silverstone", "C", 3, Compound::Medium, 31..=52));
        rows
    }

    #[test]
    fn collapse_keeps_one_row_per_stint() {
        let groups = collapse_stints(&race());
        assert_eq!(groups.len(), 7);
        assert_eq!(groups[0].driver_name, "A");
        assert_eq!(groups[0].stint_length, 20);
    }

    #[test]
    fn collapse_resolves_inconsistent_rows_by_mode_then_first_seen() {
        let mut rows = stint_rows("Baku", "A", 1, Compound::Soft, 1..=3);
        rows[1].compound = Compound::Medium;
        rows[2].stint_length = 9;
        let groups = collapse_stints(&rows);
        assert_eq!(groups[0].compound, Compound::Soft);
        assert_eq!(groups[0].stint_length, 3);

        let mut rows = stint_rows("Baku", "A", 1, Compound::Soft, 1..=2);
        rows[1].compound = Compound::Hard;
        assert_eq!(collapse_stints(&rows)[0].compound, Compound::Soft);
    }

    #[test]
    fn compound_summary_totals_laps_and_stints() {
        let report = summarize_stints(&race());
        let hard = report.compounds.iter().find(|c| c.compound == Compound::Hard).unwrap();
        assert_eq!(hard.compound_laps, 32 + 28 + 29);
        assert_eq!(hard.compound_stint_count, 3);
        assert_eq!(hard.average_compound_laps, Some(89.0 / 3.0));
        assert_eq!(hard.color, "ghostwhite");

        let order: Vec<_> = report.compounds.iter().map(|c| c.compound).collect();
        assert_eq!(order, vec![Compound::Hard, Compound::Medium, Compound::Soft]);
    }

    #[test]
    fn final_stint_counts_record_where_races_ended() {
        let report = summarize_stints(&race());
        let finals: Vec<_> = report.stints.iter().map(|s| (s.stint_number, s.stint_count, s.final_stint_count)).collect();
        assert_eq!(finals, vec![(1, 3, 0), (2, 3, 2), (3, 1, 1)]);
        assert_eq!(report.stints[0].avg_stint_length, Some(45.0 / 3.0));
    }

    #[test]
    fn one_lap_opening_stint_is_still_counted() {
        let report = summarize_stints(&race());
        let soft_first = report
            .stint_compounds
            .iter()
            .find(|s| s.stint_number == 1 && s.compound == Compound::Soft)
            .unwrap();
        assert_eq!(soft_first.compound_count_per_stint, 1);
        assert_eq!(soft_first.compound_stint_laps, 1);
        assert_eq!(soft_first.average_compound_length_for_this_stint, Some(1.0));
    }

    #[test]
    fn selection_is_applied_before_aggregation() {
        let selection = FilterSelection::new(vec!["C".to_string()], Vec::new());
        let report = summarize_stints_for(&race(), &selection);
        assert_eq!(report.stints.len(), 3);
        assert!(report.stints.iter().all(|s| s.stint_count == 1));
        assert_eq!(report.stints.last().unwrap().final_stint_count, 1);
    }

    #[test]
    fn highest_possible_stint_number_is_final() {
        let mut rows = stint_rows("Austin", "A", 1, Compound::Soft, 1..=3);
        rows.extend(stint_rows("Austin", "A", u32::MAX, Compound::Hard, 4..=6));
        let report = summarize_stints(&rows);
        let finals: Vec<_> = report.stints.iter().map(|s| (s.stint_number, s.final_stint_count)).collect();
        assert_eq!(finals, vec![(1, 1), (u32::MAX, 1)]);
    }

    #[test]
    fn empty_input_gives_empty_tables() {
        assert_eq!(summarize_stints(&[]), StintReport::default());
    }
}
