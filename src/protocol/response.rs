//! Response definitions
//!
//! Represents responses to clients.

use crate::error::ElevatorError;
use super::codec::encode_values;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
    BadRequest = 0x03,
    Unavailable = 0x04,
}

impl Status {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::NotFound),
            0x02 => Some(Status::Error),
            0x03 => Some(Status::BadRequest),
            0x04 => Some(Status::Unavailable),
            _ => None,
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value for GET, list for MGET/RANGE/DBLIST, message for errors)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create an OK response carrying a list of values
    pub fn values(items: &[Vec<u8>]) -> Self {
        Self::ok(Some(encode_values(items)))
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create a NOT_FOUND response with an explanation
    pub fn not_found_with(message: &str) -> Self {
        Self {
            status: Status::NotFound,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Create a BAD_REQUEST response
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: Status::BadRequest,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Create an UNAVAILABLE response (client may retry)
    pub fn unavailable(message: &str) -> Self {
        Self {
            status: Status::Unavailable,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Payload interpreted as UTF-8 text, lossy
    pub fn text(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}

impl From<&ElevatorError> for Response {
    fn from(err: &ElevatorError) -> Self {
        let message = err.to_string();
        match err {
            ElevatorError::DatabaseNotFound(_) => Response::not_found_with(&message),
            ElevatorError::Protocol(_) | ElevatorError::InvalidDatabaseName(_) => {
                Response::bad_request(&message)
            }
            ElevatorError::Unavailable(_) => Response::unavailable(&message),
            _ => Response::error(&message),
        }
    }
}
