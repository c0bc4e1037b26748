use thiserror::Error;

/// Errors that can occur while loading data or fitting models
#[derive(Error, Debug)]
pub enum StatsError {
    // Configuration errors
    #[error("Column not found in table: {0}")]
    MissingColumn(String),

    #[error("Empty input: {field} cannot be empty")]
    EmptyInput { field: &'static str },

    #[error("Invalid confidence level: {0} (must be in (0, 1))")]
    InvalidConfidenceLevel(f64),

    // Data errors
    #[error("Insufficient data: {rows} rows, {cols} features (need rows > features)")]
    InsufficientData { rows: usize, cols: usize },

    #[error("Insufficient groups: {groups} (need at least 2 for a random intercept)")]
    InsufficientGroups { groups: usize },

    #[error("All rows filtered due to missing/NaN values")]
    NoValidData,

    #[error("Dimension mismatch: y has {y_len} elements, X has {x_rows} rows")]
    DimensionMismatch { y_len: usize, x_rows: usize },

    // Numerical errors
    #[error("Matrix is singular or near-singular")]
    SingularMatrix,

    #[error("Cholesky decomposition failed: matrix not positive definite")]
    CholeskyFailed,

    #[error(
        "Variance search failed to converge after {iterations} iterations (tolerance: {tolerance})"
    )]
    ConvergenceFailure { iterations: u32, tolerance: f64 },

    #[error("Total variance is degenerate (near zero); ICC undefined")]
    DegenerateVariance,

    #[error("Numerical error: {0}")]
    Numerical(String),

    // Input/output errors
    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet parse error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Spreadsheet write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
}

/// Result type for analysis operations
pub type StatsResult<T> = Result<T, StatsError>;
