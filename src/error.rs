use thiserror::Error;

pub type Result<T, E = EmulatorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Association failed: {0}")]
    Association(String),
    #[error("Transfer failed: {0}")]
    Transfer(String),
    #[error("DICOM parsing error: {0}")]
    DicomParsing(#[from] dicom_object::ReadError),
    #[error("DICOM encoding error: {0}")]
    DicomEncoding(String),
    #[error("No accepted presentation context for {0}")]
    NoPresentationContext(String),
    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),
    #[error("Unexpected PDU: {0}")]
    UnexpectedPdu(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EmulatorError {
    pub fn encoding(err: impl std::fmt::Display) -> Self {
        Self::DicomEncoding(err.to_string())
    }

    pub fn transfer(err: impl std::fmt::Display) -> Self {
        Self::Transfer(err.to_string())
    }
}
