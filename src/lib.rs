// Library interface for stint_analysis.
// The binary and the integration tests both go through here.

pub mod assembler;
pub mod cleaning;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod model;
pub mod normalize;
pub mod report;
pub mod stats;
pub mod strategy;

pub use assembler::{assemble_session, MergedLapRow};
pub use cleaning::{assess_laps, remove_invalid_laps, LapAssessment, ValidLap};
pub use config::AnalysisConfig;
pub use context::{AnalysisContext, AnalysisView, FilterSelection};
pub use data::{load_laps, load_stints, Compound, LapRecord, SeasonTables, StintRecord};
pub use error::AnalysisError;
pub use normalize::{clean_and_normalize, NormalizedLap};
pub use strategy::{summarize_stints, summarize_stints_for, StintReport};
