#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Named parameter is not exported by the addressed controllable.
    #[error("parameter '{parameter}' is not exported by controllable {controllable}")]
    UnknownParameter {
        controllable: String,
        parameter: String,
    },
    #[error("parameter '{0}' is read-only")]
    ReadOnlyParameter(String),
    #[error("invalid value '{value}' for parameter '{parameter}'")]
    InvalidValue { parameter: String, value: String },
    /// Requested data has not been established yet, e.g. a timestamp read
    /// before any full timestamp was received.
    #[error("not available yet")]
    NotAvailable,
}

pub type Result<T> = std::result::Result<T, Error>;
