//! Serialization of task inputs and results.
//!
//! Payloads are CBOR. Unlike JSON it carries every `f64`, including the
//! infinities and NaN, so a value decodes to what was encoded. A result
//! travels inside an [`Envelope`] so that a failed computation reaches the
//! controller as data instead of being lost with the worker process.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Errors converting between values and payloads.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("cannot encode: {0}")]
    Encode(#[from] ciborium::ser::Error<io::Error>),

    #[error("cannot decode: {0}")]
    Decode(#[from] ciborium::de::Error<io::Error>),
}

/// Tagged success/failure wrapper for a computation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope<T> {
    /// The computation returned a value.
    Ok {
        /// Returned value
        value: T,
    },

    /// The computation returned an error or panicked.
    Failed {
        /// Rendered error
        message: String,
    },
}

impl<T> Envelope<T> {
    /// Create a success envelope.
    pub fn ok(value: T) -> Self {
        Self::Ok { value }
    }

    /// Create a failure envelope.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Convert into a `Result`, keeping the failure message.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Ok { value } => Ok(value),
            Self::Failed { message } => Err(message),
        }
    }
}

/// Serialize a value into a payload.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;
    Ok(payload)
}

/// Deserialize a payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(ciborium::from_reader(payload)?)
}
