use std::fmt::{Display, Formatter};
use std::{error::Error, fmt, io};

/// Crate-wide error type.
///
/// The variants map to the failure classes of the stores, the view, the
/// codecs and the routing-table engine. Store lookups and codec framing
/// problems are recoverable by the caller; `Internal` indicates a broken
/// view invariant and poisons the originating view.
#[derive(Debug)]
pub enum BgpViewError {
    /// An argument violates a documented bound (e.g. collector name too
    /// long, compression level out of range).
    InvalidArg(String),
    /// Lookup of an id or key that was never interned/inserted.
    NotFound(String),
    /// An id space is exhausted (e.g. the 16-bit peer id space).
    Capacity(&'static str),
    /// Framing or cross-check failure while decoding a view stream.
    CorruptStream(String),
    /// A field value that cannot be interpreted (e.g. unknown ip length).
    InvalidFormat(String),
    /// An element or interval signal arrived behind the interval barrier.
    OutOfOrder { barrier: u32, ts: u32 },
    IoError(io::Error),
    /// Transport-level failure (e.g. kafka produce/connect error).
    Transport(String),
    /// A view invariant was violated; the view is poisoned and further
    /// mutations fail fast.
    Internal(String),
}

impl Error for BgpViewError {}

impl Display for BgpViewError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            BgpViewError::InvalidArg(s) => write!(f, "invalid argument: {}", s),
            BgpViewError::NotFound(s) => write!(f, "not found: {}", s),
            BgpViewError::Capacity(s) => write!(f, "capacity exhausted: {}", s),
            BgpViewError::CorruptStream(s) => write!(f, "corrupt view stream: {}", s),
            BgpViewError::InvalidFormat(s) => write!(f, "invalid format: {}", s),
            BgpViewError::OutOfOrder { barrier, ts } => {
                write!(f, "out of order: ts {} behind interval barrier {}", ts, barrier)
            }
            BgpViewError::IoError(e) => write!(f, "io error: {}", e),
            BgpViewError::Transport(s) => write!(f, "transport error: {}", s),
            BgpViewError::Internal(s) => write!(f, "internal error: {}", s),
        }
    }
}

impl From<io::Error> for BgpViewError {
    fn from(io_error: io::Error) -> Self {
        BgpViewError::IoError(io_error)
    }
}
