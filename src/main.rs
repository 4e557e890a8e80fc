use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stint_analysis::model::{compound_pace_trends, pace_by_lap_in_stint, PaceTrend, StintLapPace};
use stint_analysis::report::{
    average_compound_laps, average_lap_time, average_stint_length, compound_laps, compound_stint_total,
    compound_usage_by_stint, final_stint_count, group_average_laps, group_laps, group_stint_total, StintSelector,
    WET_WEATHER,
};
use stint_analysis::{
    assemble_session, AnalysisConfig, AnalysisContext, AnalysisError, AnalysisView, Compound, SeasonTables,
};

#[derive(Parser, Debug)]
#[command(version, about = "Tire compound and stint analysis over a season of race laps", long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// TOML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the cached season tables
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(short, long)]
    year: Option<u16>,

    /// Keep only this driver (repeatable)
    #[arg(short, long = "driver")]
    drivers: Vec<String>,

    /// Keep only this track (repeatable)
    #[arg(short, long = "track")]
    tracks: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print compound, stint and lap-time statistics
    Summary,
    /// Write the full analysis as JSON
    Export {
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct LapInStintRow {
    compound: Compound,
    lap_in_stint: u32,
    #[serde(flatten)]
    pace: StintLapPace,
}

#[derive(Serialize)]
struct Export<'a> {
    #[serde(flatten)]
    view: &'a AnalysisView,
    pace_trends: Vec<PaceTrend>,
    pace_by_lap_in_stint: Vec<LapInStintRow>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    // logs go to stderr so an export on stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with_writer(io::stderr)
        .init();

    let tables = SeasonTables::load(&config)
        .with_context(|| format!("loading {} season from {}", config.year, config.data_dir.display()))?;
    let master = assemble_session(&tables.laps, &tables.stints);
    if master.is_empty() {
        anyhow::bail!("no race laps found for {}", config.year);
    }

    let mut ctx = AnalysisContext::new(master);
    let view = ctx.select(config.selection());
    info!("{} drivers, {} tracks in season", ctx.driver_names().len(), ctx.track_names().len());

    match args.command {
        Commands::Summary => print_summary(&view),
        Commands::Export { output } => export(&view, output)?,
    }
    Ok(())
}

fn resolve_config(args: &Args) -> Result<AnalysisConfig, AnalysisError> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(year) = args.year {
        config.year = year;
    }
    if !args.drivers.is_empty() {
        config.drivers = args.drivers.clone();
    }
    if !args.tracks.is_empty() {
        config.tracks = args.tracks.clone();
    }
    Ok(config)
}

fn na<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| v.to_string())
}

fn print_summary(view: &AnalysisView) {
    let report = &view.stints;
    let pivot = compound_usage_by_stint(&report.stint_compounds);
    if !view.selection.is_empty() {
        println!("Filter: drivers {:?}, tracks {:?}", view.selection.drivers, view.selection.tracks);
    }

    println!("\n--- Compounds ---");
    println!("{:14} {:>7} {:>7} {:>9}", "compound", "stints", "laps", "avg laps");
    for compound in Compound::ALL {
        println!(
            "{:14} {:>7} {:>7} {:>9.2}",
            compound.as_str(),
            compound_stint_total(&pivot, compound),
            compound_laps(&report.compounds, compound),
            average_compound_laps(&report.compounds, compound),
        );
    }
    println!(
        "{:14} {:>7} {:>7} {:>9.2}",
        "WET/INT",
        group_stint_total(&pivot, &WET_WEATHER),
        group_laps(&report.compounds, &WET_WEATHER),
        group_average_laps(&report.compounds, &WET_WEATHER),
    );

    println!("\n--- Stints ---");
    for (label, stint, later) in [("1st", 1, false), ("2nd", 2, false), ("3rd", 3, false), ("4th and up", 4, true)] {
        let selector = if later { StintSelector::From(stint) } else { StintSelector::Exactly(stint) };
        println!(
            "- {:10} : avg length {:>6} laps, final stint for {:>3}, *avg lap {:>7}s",
            label,
            na(average_stint_length(&report.stints, stint, later)),
            na(final_stint_count(&report.stints, stint, later)),
            na(average_lap_time(&view.laps, None, Some(selector))),
        );
    }

    println!("\n--- Compound usage per stint ---");
    for (stint, usage) in &pivot {
        let cells: Vec<String> = usage.iter().map(|(c, n)| format!("{c}={n}")).collect();
        println!("- stint {stint}: {}", cells.join(", "));
    }

    println!("\n--- Lap times (dry compounds) ---");
    for compound in Compound::ALL.into_iter().filter(Compound::is_dry) {
        println!("- {:8} : *avg lap {:>7}s", compound.as_str(), na(average_lap_time(&view.laps, Some(compound), None)));
    }
    for trend in compound_pace_trends(&view.laps) {
        println!(
            "- {:8} : {:+.3}% per lap in stint ({} laps)",
            trend.compound.as_str(),
            trend.slope_pct_per_lap,
            trend.sample_laps
        );
    }

    println!(
        "\n* {} laps after removing outliers, field-slowed laps and pit-out laps; \
         times adjusted for fuel burn assuming a linear 110 kg load.",
        view.laps.len()
    );
}

fn export(view: &AnalysisView, output: Option<PathBuf>) -> anyhow::Result<()> {
    let doc = Export {
        view,
        pace_trends: compound_pace_trends(&view.laps),
        pace_by_lap_in_stint: pace_by_lap_in_stint(&view.laps)
            .into_iter()
            .map(|((compound, lap_in_stint), pace)| LapInStintRow { compound, lap_in_stint, pace })
            .collect(),
    };

    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, &doc).map_err(AnalysisError::from)?;
    writeln!(writer).map_err(AnalysisError::from)?;
    writer.flush().map_err(AnalysisError::from)?;
    if let Some(path) = output {
        info!("wrote analysis to {}", path.display());
    }
    Ok(())
}
