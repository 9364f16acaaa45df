//! Transport of errors from the isolated child back to the parent.
//!
//! An error crosses the process boundary as a small versioned JSON envelope carrying
//! the error's type name, its message, an optional backtrace, and, when the type supports
//! it, a full-fidelity encoding of the error itself. Encoding tries the following
//! representations in order and uses the first one that works:
//!
//! 1. *native*: the bytes produced by [`Marshal::encode`], decoded on the other side
//!    with [`Marshal::decode`] into the original value;
//! 2. *rebuilt*: only the message, from which [`Marshal::rebuild`] constructs a
//!    substitute of the same type;
//! 3. *fallback*: a generic [`RemoteError`], which always works.
//!
//! The parent therefore receives one of the [`WorkError`] variants and must be prepared
//! to handle all of them.

use std::any::{Any, type_name};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const ENVELOPE_VERSION: u32 = 1;

/// Why an error could not be marshalled in a particular representation.
#[derive(Debug, Error)]
pub enum MarshalError {
    /// The type does not support the requested representation.
    #[error("{0} does not support this representation")]
    Unsupported(&'static str),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope is well-formed JSON but cannot be used.
    #[error("invalid envelope: {0}")]
    Invalid(String),
}

/// Error types that can be sent from the isolated child to the parent.
///
/// All methods have defaults, so `impl Marshal for MyError {}` is enough for any type
/// implementing `Display`; such errors arrive in the parent as
/// [`WorkError::Fallback`]. Implement [`rebuild`](Self::rebuild) to get the same type
/// back from its message, and [`encode`](Self::encode)/[`decode`](Self::decode) to get
/// the value back intact. For serde types the latter two are one-liners:
///
/// ```
/// # use serde::{Deserialize, Serialize};
/// # use isolate::{Marshal, MarshalError};
/// #[derive(Debug, Serialize, Deserialize)]
/// struct ParseError { line: u32 }
///
/// # impl std::fmt::Display for ParseError {
/// #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
/// #         write!(f, "parse error at line {}", self.line)
/// #     }
/// # }
/// impl Marshal for ParseError {
///     fn encode(&self) -> Result<Vec<u8>, MarshalError> {
///         isolate::to_json(self)
///     }
///     fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
///         isolate::from_json(bytes)
///     }
/// }
/// ```
pub trait Marshal: fmt::Display + Sized {
    /// Encode the error so that [`decode`](Self::decode) can reproduce it.
    fn encode(&self) -> Result<Vec<u8>, MarshalError> {
        Err(MarshalError::Unsupported(type_name::<Self>()))
    }

    /// Reproduce an error from the output of [`encode`](Self::encode).
    fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
        let _ = bytes;
        Err(MarshalError::Unsupported(type_name::<Self>()))
    }

    /// Construct an error of this type carrying only `message`.
    fn rebuild(message: &str) -> Option<Self> {
        let _ = message;
        None
    }
}

/// Encode `value` as JSON, for use in [`Marshal::encode`].
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, MarshalError> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode JSON produced by [`to_json`], for use in [`Marshal::decode`].
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MarshalError> {
    Ok(serde_json::from_slice(bytes)?)
}

impl Marshal for String {
    fn encode(&self) -> Result<Vec<u8>, MarshalError> {
        to_json(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
        from_json(bytes)
    }

    fn rebuild(message: &str) -> Option<Self> {
        Some(message.to_owned())
    }
}

impl Marshal for io::Error {
    // Only OS errors are fully described by their number; custom errors keep just the
    // message.
    fn encode(&self) -> Result<Vec<u8>, MarshalError> {
        match self.raw_os_error() {
            Some(errno) => to_json(&errno),
            None => Err(MarshalError::Unsupported(type_name::<Self>())),
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
        Ok(io::Error::from_raw_os_error(from_json(bytes)?))
    }

    fn rebuild(message: &str) -> Option<Self> {
        Some(io::Error::other(message.to_owned()))
    }
}

impl Marshal for Box<dyn StdError + Send + Sync> {
    fn rebuild(message: &str) -> Option<Self> {
        Some(message.into())
    }
}

impl Marshal for Infallible {}

/// An error reconstructed in the parent without its original type.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Type name of the original error, as reported by `std::any::type_name`, or
    /// `"panic"` for a panic.
    pub type_name: String,
    /// The original error's `Display` output, or the panic message.
    pub message: String,
    /// Backtrace captured in the child, if one was available.
    pub trace: Option<String>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl StdError for RemoteError {}

impl Marshal for RemoteError {
    fn encode(&self) -> Result<Vec<u8>, MarshalError> {
        to_json(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
        from_json(bytes)
    }
}

/// An error raised by isolated work, as received by the parent.
#[derive(Debug)]
pub enum WorkError<E> {
    /// The error was transferred intact.
    Original {
        /// The decoded error.
        error: E,
        /// Backtrace captured in the child, if any.
        trace: Option<String>,
    },

    /// The error was rebuilt from its message with [`Marshal::rebuild`].
    Rebuilt {
        /// The substitute error.
        error: E,
        /// Backtrace captured in the child, if any.
        trace: Option<String>,
    },

    /// The error could not be reproduced as `E`.
    Fallback(RemoteError),

    /// The work panicked.
    Panicked(RemoteError),
}

impl<E> WorkError<E> {
    /// The error as `E`, if it could be reproduced.
    pub fn error(&self) -> Option<&E> {
        match self {
            WorkError::Original { error, .. } | WorkError::Rebuilt { error, .. } => Some(error),
            WorkError::Fallback(_) | WorkError::Panicked(_) => None,
        }
    }

    /// Consume `self`, returning the error as `E` if it could be reproduced.
    pub fn into_error(self) -> Option<E> {
        match self {
            WorkError::Original { error, .. } | WorkError::Rebuilt { error, .. } => Some(error),
            WorkError::Fallback(_) | WorkError::Panicked(_) => None,
        }
    }

    /// The original error message.
    pub fn message(&self) -> String
    where
        E: fmt::Display,
    {
        match self {
            WorkError::Original { error, .. } | WorkError::Rebuilt { error, .. } => {
                error.to_string()
            }
            WorkError::Fallback(remote) | WorkError::Panicked(remote) => remote.message.clone(),
        }
    }

    /// Backtrace captured in the child, if any.
    pub fn trace(&self) -> Option<&str> {
        match self {
            WorkError::Original { trace, .. } | WorkError::Rebuilt { trace, .. } => {
                trace.as_deref()
            }
            WorkError::Fallback(remote) | WorkError::Panicked(remote) => remote.trace.as_deref(),
        }
    }

    /// True unless the error was transferred intact.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, WorkError::Original { .. })
    }
}

impl<E: fmt::Display> fmt::Display for WorkError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkError::Original { error, .. } | WorkError::Rebuilt { error, .. } => {
                error.fmt(f)
            }
            WorkError::Fallback(remote) => {
                write!(f, "marshalling error with: {}", remote.message)
            }
            WorkError::Panicked(remote) => write!(f, "work panicked: {}", remote.message),
        }
    }
}

impl<E: StdError + 'static> StdError for WorkError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            WorkError::Original { error, .. } | WorkError::Rebuilt { error, .. } => {
                error.source()
            }
            WorkError::Fallback(_) | WorkError::Panicked(_) => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Tier {
    Native,
    Rebuilt,
    Fallback,
    Panic,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    tier: Tier,
    type_name: String,
    message: String,
    trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<Vec<u8>>,
}

impl Envelope {
    fn new(tier: Tier, type_name: &str, message: &str, trace: Option<&str>) -> Envelope {
        Envelope {
            version: ENVELOPE_VERSION,
            tier,
            type_name: type_name.to_owned(),
            message: message.to_owned(),
            trace: trace.map(str::to_owned),
            body: None,
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, MarshalError> {
        to_json(self)
    }

    fn into_remote(self) -> RemoteError {
        RemoteError {
            type_name: self.type_name,
            message: self.message,
            trace: self.trace,
        }
    }
}

type Encoder<E> = fn(&E, &str, Option<&str>) -> Result<Envelope, MarshalError>;

fn encode_native<E: Marshal>(
    error: &E,
    message: &str,
    trace: Option<&str>,
) -> Result<Envelope, MarshalError> {
    let body = error.encode()?;
    let mut envelope = Envelope::new(Tier::Native, type_name::<E>(), message, trace);
    envelope.body = Some(body);
    Ok(envelope)
}

fn encode_rebuilt<E: Marshal>(
    _error: &E,
    message: &str,
    trace: Option<&str>,
) -> Result<Envelope, MarshalError> {
    // The substitute must be constructible here, or the parent could not construct it
    // either.
    E::rebuild(message).ok_or(MarshalError::Unsupported(type_name::<E>()))?;
    Ok(Envelope::new(Tier::Rebuilt, type_name::<E>(), message, trace))
}

fn remote_bytes(tier: Tier, type_name: &str, message: &str, trace: Option<&str>) -> Vec<u8> {
    // An envelope without a body consists of strings only and always serializes. Should
    // that ever fail, the parent sees an empty payload and reports a plain exit.
    Envelope::new(tier, type_name, message, trace)
        .to_bytes()
        .unwrap_or_default()
}

/// Encode `error` into an envelope, degrading to simpler representations as needed.
///
/// The result is complete before anything is written, so a failed attempt never leaves
/// a partial payload behind.
pub fn encode<E: Marshal>(error: &E, trace: Option<&str>) -> Vec<u8> {
    let message = error.to_string();
    let encoders: [Encoder<E>; 2] = [encode_native::<E>, encode_rebuilt::<E>];
    for encoder in encoders {
        match encoder(error, &message, trace).and_then(|envelope| envelope.to_bytes()) {
            Ok(bytes) => return bytes,
            Err(e) => debug!(type_name = type_name::<E>(), "degrading error payload: {}", e),
        }
    }
    remote_bytes(Tier::Fallback, type_name::<E>(), &message, trace)
}

/// Encode an error that must arrive as [`WorkError::Fallback`] whatever the parent's
/// error type.
pub(crate) fn encode_fallback<E: fmt::Display>(error: &E, trace: Option<&str>) -> Vec<u8> {
    remote_bytes(Tier::Fallback, type_name::<E>(), &error.to_string(), trace)
}

/// Encode a panic payload caught in the child.
pub(crate) fn encode_panic(payload: &(dyn Any + Send), trace: Option<&str>) -> Vec<u8> {
    remote_bytes(Tier::Panic, "panic", &panic_message(payload), trace)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Reconstruct an error from an envelope produced by [`encode`].
///
/// A native envelope that cannot be decoded as `E` (for example because it was produced
/// for a different type) degrades to [`WorkError::Rebuilt`] or
/// [`WorkError::Fallback`], just as it would have in the child.
pub fn decode<E: Marshal>(bytes: &[u8]) -> Result<WorkError<E>, MarshalError> {
    let mut envelope: Envelope = from_json(bytes)?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(MarshalError::Invalid(format!(
            "unsupported version {}",
            envelope.version
        )));
    }
    match envelope.tier {
        Tier::Panic => return Ok(WorkError::Panicked(envelope.into_remote())),
        Tier::Fallback => return Ok(WorkError::Fallback(envelope.into_remote())),
        Tier::Native => {
            let body = envelope.body.take().unwrap_or_default();
            if envelope.type_name == type_name::<E>() {
                match E::decode(&body) {
                    Ok(error) => {
                        return Ok(WorkError::Original {
                            error,
                            trace: envelope.trace,
                        });
                    }
                    Err(e) => debug!(
                        type_name = %envelope.type_name,
                        "degrading error payload: {}", e
                    ),
                }
            }
        }
        Tier::Rebuilt => {}
    }
    Ok(match E::rebuild(&envelope.message) {
        Some(error) => WorkError::Rebuilt {
            error,
            trace: envelope.trace,
        },
        None => WorkError::Fallback(envelope.into_remote()),
    })
}
