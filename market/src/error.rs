use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("unknown interval `{0}`; expected one of 1s, 1min, 5min, 15min, 1h, 4h")]
    UnknownInterval(String),

    #[error("not enough aligned data points: got {aligned}, need at least {required}")]
    InsufficientData { aligned: usize, required: usize },

    #[error("unknown comparison operator `{0}`; expected one of gt, lt, gte, lte, eq")]
    UnknownOperator(String),
}
