use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// ringdb errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Invalid data: decoding failures, corruption, unexpected internal values.
    InvalidData(String),
    /// Invalid caller input, typically configuration or parameter errors.
    InvalidInput(String),
    /// An IO or runtime error.
    IO(String),
}

/// A ringdb Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, msg) = match self {
            Error::InvalidData(msg) => ("invalid data", msg),
            Error::InvalidInput(msg) => ("invalid input", msg),
            Error::IO(msg) => ("io error", msg),
        };
        write!(f, "{kind}: {msg}")
    }
}

/// Constructs an `Err(Error::InvalidData)` from a format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => {
        Err($crate::error::Error::InvalidData(format!($($args)*)))
    };
}

/// Constructs an `Err(Error::InvalidInput)` from a format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => {
        Err($crate::error::Error::InvalidInput(format!($($args)*)))
    };
}

/// Foreign error types that surface as [`Error::IO`].
macro_rules! from_io_error {
    ($($type:ty),* $(,)?) => {
        $(impl From<$type> for Error {
            fn from(err: $type) -> Self {
                Self::IO(err.to_string())
            }
        })*
    };
}

from_io_error!(std::io::Error, tokio::task::JoinError);

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::IO("lock poisoned by a panicked thread".to_string())
    }
}
