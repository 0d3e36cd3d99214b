use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OplogError {
    /// A required identity header (`CompanyID` or `UserID`) is missing.
    #[error("{0}")]
    Validation(String),

    /// The capture buffer could not grow to hold more response bytes.
    #[error("capture write failed: {0}")]
    CaptureWrite(String),

    /// The request body could not be read while extracting the parameter.
    #[error("body read failed: {0}")]
    BodyRead(String),
}

impl OplogError {
    pub fn header_parameter() -> Self {
        Self::Validation(HEADER_PARAMETER_ERROR.to_string())
    }
}

pub const HEADER_PARAMETER_ERROR: &str = "header parameter error";

pub type Result<T> = std::result::Result<T, OplogError>;
