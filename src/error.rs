use thiserror::Error;

#[derive(Error, Debug)]
pub enum AkiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column for {field}: '{column}'")]
    MissingColumn { field: &'static str, column: String },

    #[error("eGFR-based imputation needs age, sex and race; column '{column}' is missing")]
    MissingDemographics { column: String },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Null creatinine value at row {row}; clean the data before running the flagger")]
    NullCreatinine { row: usize },

    #[error("Missing {field} value at row {row} while eGFR-based imputation is enabled")]
    MissingDemographicValue { row: usize, field: &'static str },

    #[error("Could not parse {field} value '{value}' at row {row}")]
    Parse {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("Readings for patient '{patient_id}' are not sorted by time")]
    UnsortedInput { patient_id: String },
}

impl AkiError {
    /// Configuration errors are detected from the bindings alone, before any row is read.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AkiError::MissingColumn { .. }
                | AkiError::MissingDemographics { .. }
                | AkiError::InvalidDuration(_)
                | AkiError::Validation(_)
        )
    }
}

pub type AkiResult<T> = Result<T, AkiError>;
