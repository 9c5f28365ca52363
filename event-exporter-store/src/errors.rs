use event_exporter_core::err_impl;
use event_exporter_core::errors::*;

err_impl! {StoreError,
    #[error("missing required value: {0}")]
    Configuration(String),

    #[error("cannot reach {0}")]
    Connectivity(String),

    #[error("required field missing while decoding: {0}")]
    Schema(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),
}
