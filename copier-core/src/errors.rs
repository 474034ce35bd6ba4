use thiserror::Error;

/// Fatal error kinds per the error-handling policy table: config and
/// terminal-initialisation failures abort the process. Everything else
/// (transient session, unmapped symbol, invalid fill, ...) is handled
/// in-band by the engine and never surfaces as a `CopierError`.
#[derive(Debug, Error)]
pub enum CopierError {
    #[error("missing required column(s) in {file}: {missing}")]
    MissingColumns { file: String, missing: String },

    #[error("missing required credential field: {0}")]
    MissingCredential(&'static str),

    #[error("invalid lot_multiplier for {symbol}: {value} (must be > 0)")]
    InvalidLotMultiplier { symbol: String, value: f64 },

    #[error("terminal initialisation failed: {0}")]
    InitFailed(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error reading {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}
