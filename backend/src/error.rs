use market::MarketError;
use thiserror::Error;

/// Failure classes of the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected synchronously; retrying the same request cannot succeed.
    Input,
    /// Not enough data for the requested computation.
    Data,
    /// Storage or network failure; the same request may succeed later.
    TransientIo,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("stream already running")]
    AlreadyRunning,

    #[error("no symbols provided")]
    EmptySymbolSet,

    #[error("stream is not running")]
    NotRunning,

    #[error("{0}")]
    BadInterval(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("at least {required} symbols are required")]
    TooFewSymbols { required: usize },

    #[error("no data: {0}")]
    NoData(String),

    #[error("not enough aligned data points: got {aligned}, need at least {required}")]
    InsufficientData { aligned: usize, required: usize },

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::AlreadyRunning
            | ServiceError::EmptySymbolSet
            | ServiceError::NotRunning
            | ServiceError::BadInterval(_)
            | ServiceError::Invalid(_)
            | ServiceError::TooFewSymbols { .. } => ErrorKind::Input,
            ServiceError::NoData(_) | ServiceError::InsufficientData { .. } => ErrorKind::Data,
            ServiceError::Storage(_) => ErrorKind::TransientIo,
        }
    }
}

impl From<MarketError> for ServiceError {
    fn from(e: MarketError) -> Self {
        match e {
            MarketError::UnknownInterval(_) => ServiceError::BadInterval(e.to_string()),
            MarketError::InsufficientData { aligned, required } => {
                ServiceError::InsufficientData { aligned, required }
            }
            MarketError::UnknownOperator(_) => ServiceError::Invalid(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_errors_map_onto_taxonomy() {
        let e: ServiceError = MarketError::UnknownInterval("2min".into()).into();
        assert_eq!(e.kind(), ErrorKind::Input);
        assert!(e.to_string().contains("2min"));

        let e: ServiceError = MarketError::InsufficientData {
            aligned: 3,
            required: 5,
        }
        .into();
        assert!(matches!(
            e,
            ServiceError::InsufficientData {
                aligned: 3,
                required: 5
            }
        ));
        assert_eq!(e.kind(), ErrorKind::Data);

        let e = ServiceError::Storage(anyhow::anyhow!("disk full"));
        assert_eq!(e.kind(), ErrorKind::TransientIo);
    }
}
