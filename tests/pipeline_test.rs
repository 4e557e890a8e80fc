// End-to-end tests: season tables on disk -> assembled rows -> cleaned laps
// and stint statistics.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;

use stint_analysis::cleaning::{assess_laps, total_session_laps, OUTLIER_FACTOR};
use stint_analysis::normalize::{remaining_fuel_kg, SECONDS_PER_FUEL_KG};
use stint_analysis::{
    assemble_session, clean_and_normalize, summarize_stints, AnalysisConfig, Compound, FilterSelection,
    LapRecord, MergedLapRow, SeasonTables, StintRecord,
};

const DRIVERS: u32 = 15;
const RACE_LAPS: u32 = 50;
const SAFETY_CAR_LAP: u32 = 10;

/// Every driver pits once at lap 20 (laps 1-20 medium, 21-50 hard), except
/// driver 14 who damages the car on lap 1, stops for softs and again at lap
/// 20. Lap 10 is slow for eleven drivers.
fn write_season(dir: &std::path::Path) -> AnalysisConfig {
    let mut laps = String::from("date,driver_number,lap_seconds,is_pit_out_lap,lap_number,session_key\n");
    let mut sessions = String::from(
        "session_key,track_name,session_name,driver_number,stint_number,year,driver_name,compound,lap_end,lap_start,stint_length,initial_tire_age\n",
    );

    for driver in 0..DRIVERS {
        let number = driver + 1;
        let pit_laps: &[u32] = if driver == 14 { &[1, 20] } else { &[20] };
        for lap in 1..=RACE_LAPS {
            let mut seconds = 90.0 + (lap % 3) as f64 * 0.2;
            if lap == SAFETY_CAR_LAP && driver < 11 {
                seconds = 130.0;
            }
            if lap == 1 && driver == 14 {
                seconds = 140.0;
            }
            let pit_out = pit_laps.contains(&(lap - 1));
            let time = if lap == 1 && driver == 3 { String::new() } else { format!("{seconds}") };
            let flag = if pit_out { "True" } else { "False" };
            writeln!(laps, ",{number},{time},{flag},{lap},9001").unwrap();
        }

        let stints: Vec<(u32, &str, u32, u32)> = if driver == 14 {
            vec![(1, "MEDIUM", 1, 1), (2, "SOFT", 2, 20), (3, "HARD", 21, RACE_LAPS)]
        } else {
            vec![(1, "MEDIUM", 1, 20), (2, "HARD", 21, RACE_LAPS)]
        };
        for (stint, compound, start, end) in stints {
            writeln!(
                sessions,
                "9001,Monza,Race,{number},{stint},2023,Driver {number},{compound},{end},{start},{},0",
                end - start + 1
            )
            .unwrap();
        }
        // sprint rows must not leak into the race analysis
        writeln!(sessions, "9000,Monza,Sprint,{number},1,2023,Driver {number},SOFT,5,1,5,0").unwrap();
    }

    fs::write(dir.join("2023_laps_master.csv"), laps).unwrap();
    fs::write(dir.join("2023_session_master.csv"), sessions).unwrap();
    AnalysisConfig { data_dir: dir.to_path_buf(), ..AnalysisConfig::default() }
}

fn load_master() -> Vec<MergedLapRow> {
    let dir = tempfile::tempdir().unwrap();
    let config = write_season(dir.path());
    let tables = SeasonTables::load(&config).unwrap();
    assemble_session(&tables.laps, &tables.stints)
}

#[test]
fn season_tables_assemble_into_race_rows() {
    let master = load_master();
    assert_eq!(master.len(), (DRIVERS * RACE_LAPS) as usize);
    assert!(master.iter().all(|r| r.session_key == 9001 && r.track_name == "Monza"));

    let hard = master.iter().find(|r| r.driver_name == "Driver 1" && r.lap_number == 21).unwrap();
    assert_eq!(hard.compound, Compound::Hard);
    assert_eq!(hard.lap_in_stint, 1);
    assert!(hard.is_pit_out_lap);
}

#[test]
fn safety_car_lap_is_removed_for_the_whole_field() {
    let master = load_master();
    let laps = clean_and_normalize(&master, &FilterSelection::default());

    assert!(laps.iter().all(|l| l.lap.row.lap_number != SAFETY_CAR_LAP));
    assert!(laps.iter().all(|l| !l.lap.row.is_pit_out_lap));
    // driver 4 had no time on lap 1
    assert!(!laps.iter().any(|l| l.lap.row.driver_name == "Driver 4" && l.lap.row.lap_number == 1));
    assert!(laps.iter().all(|l| l.lap.total_session_laps == RACE_LAPS));

    let per_driver = |name: &str| laps.iter().filter(|l| l.lap.row.driver_name == name).count();
    // 50 laps minus lap 10 minus the pit-out lap
    assert_eq!(per_driver("Driver 1"), 48);
    assert_eq!(per_driver("Driver 4"), 47);
    // slow opening lap and two pit-out laps
    assert_eq!(per_driver("Driver 15"), 46);
}

#[test]
fn cleaned_laps_carry_fuel_correction_and_relative_pace() {
    let master = load_master();
    let laps = clean_and_normalize(&master, &FilterSelection::default());

    for lap in &laps {
        let expected = lap.lap.lap_seconds - remaining_fuel_kg(lap.lap.row.lap_number as f64, RACE_LAPS) * SECONDS_PER_FUEL_KG;
        assert!((lap.normalized_lap_seconds - expected).abs() < 1e-9);
        assert!(lap.lap_time_percentage_compared_to_average.is_some());
    }

    // the same raw time early in the race was set on a heavier car
    let early = laps.iter().find(|l| l.lap.row.driver_name == "Driver 2" && l.lap.row.lap_number == 3).unwrap();
    let late = laps.iter().find(|l| l.lap.row.driver_name == "Driver 2" && l.lap.row.lap_number == 48).unwrap();
    assert_eq!(early.lap.lap_seconds, late.lap.lap_seconds);
    assert!(early.normalized_lap_seconds < late.normalized_lap_seconds);
}

#[test]
fn stint_statistics_ignore_lap_cleaning() {
    let master = load_master();
    let report = summarize_stints(&master);

    let medium = report.compounds.iter().find(|c| c.compound == Compound::Medium).unwrap();
    assert_eq!(medium.compound_stint_count, DRIVERS);
    assert_eq!(medium.compound_laps, 14 * 20 + 1);

    // the one-lap opening stint is counted even though cleaning drops its only lap
    let cleaned = clean_and_normalize(&master, &FilterSelection::default());
    assert!(!cleaned.iter().any(|l| l.lap.row.driver_name == "Driver 15" && l.lap.row.stint_number == 1));
    let opening = report
        .stint_compounds
        .iter()
        .find(|s| s.stint_number == 1 && s.compound == Compound::Medium)
        .unwrap();
    assert_eq!(opening.compound_stint_laps, 14 * 20 + 1);

    let finals: Vec<_> = report.stints.iter().map(|s| (s.stint_number, s.final_stint_count)).collect();
    assert_eq!(finals, vec![(1, 0), (2, 14), (3, 1)]);
}

#[test]
fn final_stint_counts_add_up_to_the_races_run() {
    let master = load_master();
    let report = summarize_stints(&master);

    let races: HashSet<_> = master.iter().map(|r| (r.session_key, r.driver_name.clone())).collect();
    let total: i64 = report.stints.iter().map(|s| s.final_stint_count).sum();
    assert_eq!(total, races.len() as i64);
}

#[test]
fn driver_selection_filters_both_outputs() {
    let master = load_master();
    let selection = FilterSelection::new(vec!["Driver 15".to_string()], Vec::new());

    let laps = clean_and_normalize(&master, &selection);
    assert_eq!(laps.len(), 46);

    let report = stint_analysis::summarize_stints_for(&master, &selection);
    let stints: Vec<_> = report.stints.iter().map(|s| s.stint_number).collect();
    assert_eq!(stints, vec![1, 2, 3]);
}

fn merged(driver: &str, lap_number: u32, lap_seconds: f64) -> MergedLapRow {
    let laps = vec![LapRecord {
        session_key: 1,
        driver_number: 1,
        lap_number,
        lap_seconds: Some(lap_seconds),
        is_pit_out_lap: false,
        sectors: [None; 3],
        date: None,
    }];
    let stints = vec![StintRecord {
        session_key: 1,
        driver_number: 1,
        stint_number: 1,
        compound: Some(Compound::Soft),
        lap_start: 1,
        lap_end: 100,
        initial_tire_age: None,
        session_name: "Race".to_string(),
        track_name: "Jeddah".to_string(),
        driver_name: driver.to_string(),
        year: None,
        date: None,
        team_name: None,
    }];
    assemble_session(&laps, &stints).remove(0)
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn laps_at_or_above_threshold_are_invalid(times in prop::collection::vec(60.0f64..200.0, 1..40)) {
            let rows: Vec<_> = times.iter().enumerate().map(|(i, t)| merged("A", i as u32 + 1, *t)).collect();
            let assessed = assess_laps(&rows);

            let mut sorted = times.clone();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            let median = if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] };
            let threshold = median * OUTLIER_FACTOR;

            for lap in &assessed {
                prop_assert_eq!(lap.valid_lap_threshold, Some(threshold));
                prop_assert_eq!(lap.lap_validity, lap.row.lap_seconds.unwrap() < threshold);
            }
        }

        #[test]
        fn race_distance_never_drops_below_fallback(max_laps in 1u32..100) {
            let total = total_session_laps(max_laps);
            prop_assert!(total > 44);
            prop_assert_eq!(total == max_laps, max_laps > 44);
        }

        #[test]
        fn fuel_load_falls_linearly_to_zero(total in 40u32..90, lap in 1u32..90) {
            let now = remaining_fuel_kg(lap as f64, total);
            let next = remaining_fuel_kg(lap as f64 + 1.0, total);
            prop_assert!((now - next - 110.0 / total as f64).abs() < 1e-9);
            prop_assert!(remaining_fuel_kg(total as f64 + 0.5, total).abs() < 1e-9);
        }
    }
}
