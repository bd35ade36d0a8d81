use nix::errno::Errno;
use thiserror::Error;

use crate::backend::BackendError;
use crate::usage::Usage;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the buffer-object layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown pixel format 0x{0:x}")]
    InvalidFormat(i32),
    #[error("buffer handle is not valid in this process")]
    InvalidHandle,
    #[error("lock usage {requested:?} was not declared by buffer (usage {declared:?})")]
    UsageMismatch { declared: Usage, requested: Usage },
    #[error("buffer is locked for {locked_for:?}, cannot lock for {requested:?}")]
    IncompatibleLock { locked_for: Usage, requested: Usage },
    #[error("out of memory")]
    OutOfMemory,
    #[error("no backend available for the device")]
    BackendUnavailable,
    #[error("unsupported driver: {0}")]
    UnsupportedBackend(String),
    #[error("failed to initialize display: {0}")]
    DisplayInitFailed(Errno),
    #[error("kernel device error: {0}")]
    Kernel(Errno),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl From<Error> for Errno {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidFormat(_)
            | Error::InvalidHandle
            | Error::UsageMismatch { .. }
            | Error::IncompatibleLock { .. }
            | Error::BackendUnavailable
            | Error::UnsupportedBackend(_) => Errno::EINVAL,
            Error::OutOfMemory => Errno::ENOMEM,
            Error::DisplayInitFailed(e) | Error::Kernel(e) => e,
            Error::Backend(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ioctl::IntoErrno;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::InvalidHandle.into_errno(), Errno::EINVAL as i32);
        assert_eq!(Error::OutOfMemory.into_errno(), Errno::ENOMEM as i32);
        assert_eq!(
            Error::DisplayInitFailed(Errno::EOPNOTSUPP).into_errno(),
            Errno::EOPNOTSUPP as i32
        );
        assert_eq!(
            Error::Backend(BackendError::Ioctl(Errno::EACCES)).into_errno(),
            Errno::EACCES as i32
        );
    }
}
