#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no patient found with id: {0}")]
    PatientNotFound(String),
    #[error("patient sources unavailable: {0}")]
    Unavailable(String),
}

pub type ReportResult<T> = std::result::Result<T, ReportError>;
