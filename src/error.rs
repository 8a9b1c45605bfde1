//! MongoDB client-side errors and server error codes.
use bson::{self, oid};
use bulk::error::BulkWriteException;
use std::{error, fmt, io};

/// A type for results generated by MongoDB-related functions, where the
/// `Err` type is `mongodb_core::Error`.
pub type Result<T> = ::std::result::Result<T, Error>;

/// The error type for MongoDB client-side operations.
#[derive(Debug)]
pub enum Error {
    /// Caller misuse detected before any server round trip.
    ArgumentError(String),
    /// One or more writes within a bulk operation failed.
    BulkWriteError(BulkWriteException),
    /// The server could not find the referenced cursor.
    CursorNotFoundError,
    /// A BSON document could not be encoded.
    EncoderError(bson::EncoderError),
    /// A transport failure while talking to the server.
    IoError(io::Error),
    /// An object id could not be generated.
    OidError(oid::Error),
    /// The server replied, but reported a command failure.
    OperationError { code: i32, message: String },
    /// The server reply was missing expected fields.
    ResponseError(String),
}

impl Error {
    /// The server-defined code attached to this error, if it carries one.
    pub fn code(&self) -> Option<i32> {
        match *self {
            Error::OperationError { code, .. } => Some(code),
            Error::CursorNotFoundError => Some(ErrorCode::CursorNotFound as i32),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<bson::EncoderError> for Error {
    fn from(err: bson::EncoderError) -> Error {
        Error::EncoderError(err)
    }
}

impl From<oid::Error> for Error {
    fn from(err: oid::Error) -> Error {
        Error::OidError(err)
    }
}

impl From<BulkWriteException> for Error {
    fn from(err: BulkWriteException) -> Error {
        Error::BulkWriteError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ArgumentError(ref inner) => inner.fmt(fmt),
            Error::BulkWriteError(ref inner) => inner.fmt(fmt),
            Error::CursorNotFoundError => fmt.write_str("No cursor found for cursor operation."),
            Error::EncoderError(ref inner) => inner.fmt(fmt),
            Error::IoError(ref inner) => inner.fmt(fmt),
            Error::OidError(ref inner) => inner.fmt(fmt),
            Error::OperationError { code, ref message } => {
                write!(fmt, "Command failed ({}): {}", code, message)
            }
            Error::ResponseError(ref inner) => inner.fmt(fmt),
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::ArgumentError(ref inner) => inner,
            Error::BulkWriteError(ref inner) => &inner.message,
            Error::CursorNotFoundError => "No cursor found for cursor operation",
            Error::EncoderError(ref inner) => inner.description(),
            Error::IoError(ref inner) => inner.description(),
            Error::OidError(ref inner) => inner.description(),
            Error::OperationError { ref message, .. } => message,
            Error::ResponseError(ref inner) => inner,
        }
    }

    fn cause(&self) -> Option<&error::Error> {
        match *self {
            Error::EncoderError(ref inner) => Some(inner),
            Error::IoError(ref inner) => Some(inner),
            Error::OidError(ref inner) => Some(inner),
            _ => None,
        }
    }
}

/// Server error codes this crate traffics in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    CursorNotFound = 43,
    CommandNotFound = 59,
    WriteConcernFailed = 64,
    DuplicateKey = 11000,
}
