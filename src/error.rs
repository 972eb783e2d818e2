use std::{
    num::{ParseFloatError, ParseIntError, TryFromIntError},
    path::PathBuf,
    str::Utf8Error,
};
use thiserror::Error;

pub type GvxResult<T> = std::result::Result<T, GvxError>;

#[derive(Debug, Error)]
pub enum GvxError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),
    #[error(transparent)]
    TryFromInt(#[from] TryFromIntError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    #[error("Unknown FORMAT key '{key}' in {context}")]
    UnknownFormatKey { key: String, context: String },
    #[error("No usable records in input: {}", path.display())]
    EmptyStream { path: PathBuf },
    #[error("Invalid gzip header: {}", path.display())]
    InvalidGzipHeader { path: PathBuf },
}

impl GvxError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[macro_export]
macro_rules! gvx_error {
    ($($arg:tt)*) => {
        $crate::error::GvxError::message(format!($($arg)*))
    };
}
