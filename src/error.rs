use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    // Input tables and config files
    #[error("input file not found: {}", path.display())]
    MissingInput { path: PathBuf },
    #[error("could not read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed csv in {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid config file {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // Output
    #[error("error serializing analysis output")]
    Serialize(#[from] serde_json::Error),
    #[error("error writing analysis output")]
    Write(#[from] io::Error),
}
