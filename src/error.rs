use crate::llm::LlmError;

/// Everything that can go wrong during a single upload or query.
///
/// None of these end the session: the REPL prints the message and reads the
/// next line.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Unsupported file type: .{0}")]
    UnsupportedFormat(String),
    #[error("Error processing {name}: {reason}")]
    ExtractionFailure { name: String, reason: String },
    #[error("The column '{0}' does not exist in the uploaded dataset.")]
    MissingColumn(String),
    #[error("The uploaded file is not a valid CSV or Excel file for generating plots.")]
    NonTabularPlotRequest,
    #[error("API call failed: {0}")]
    TransportFailure(#[from] LlmError),
    #[error("No valid Python code found in the response.")]
    NoCodeFound { response: String },
    #[error("Plot code executed, but no valid Plotly figure ('fig') was generated.")]
    NoFigureProduced,
    #[error("Error executing plot code: {0}")]
    ExecutionError(String),
    #[error("Could not save chart: {0}")]
    ChartOutput(String),
    #[error("No document named {0} is open")]
    DocumentNotFound(String),
    #[error("Query cannot be empty")]
    EmptyQuery,
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ChatError {
    pub(crate) fn extraction(name: &str, reason: impl Into<String>) -> Self {
        ChatError::ExtractionFailure {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
