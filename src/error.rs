use std::fmt;
use std::io;

/// Failure outcome of a fallible [`crate::Session`] operation.
///
/// Protocol-level outcomes (a kernel error *reply*) are never represented
/// here — those are logged and folded into the `bool` returned by
/// `Session::test`, or simply logged during `flush`. `Error` only covers
/// what stops a request from ever reaching the kernel in a sensible shape,
/// or a failure of the transport itself.
#[derive(Debug)]
pub enum Error {
    /// A set name (or the flag describing it) does not satisfy the
    /// grammar in [the set-name grammar](crate::name). Detected entirely
    /// locally, before any socket is touched.
    Config(String),
    /// A socket syscall (`socket`, `bind`, `getsockname`, `sendmmsg`,
    /// `recvmmsg`) failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Io(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(_) => None,
            Error::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(e: nix::errno::Errno) -> Self {
        Error::Io(io::Error::from(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
