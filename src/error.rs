use std::cell::RefCell;

use thiserror::Error;

/// Flat error codes, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
  InvalidArgument,
  TryAgain,
  OutOfMemory,
  OutOfBuffer,
  OutOfCapacity,
  OutOfRange,
  NoSuchEntry,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
  #[error("invalid argument: {0}")]
  InvalidArgument(&'static str),
  /// Not a failure: a measure-mode call succeeded and `required` bytes are
  /// needed to complete it.
  #[error("{required} bytes required, call again with a buffer")]
  TryAgain { required: usize },
  #[error("out of memory: requested {requested} bytes")]
  OutOfMemory { requested: usize },
  #[error("output buffer too small: required {required} bytes, available {available}")]
  OutOfBuffer { required: usize, available: usize },
  #[error("capacity of {capacity} exhausted")]
  OutOfCapacity { capacity: usize },
  #[error("index {index} out of range for length {len}")]
  OutOfRange { index: usize, len: usize },
  #[error("no such entry")]
  NoSuchEntry,
  /// A multi-step operation stopped after `committed` complete steps.
  #[error("interrupted after {committed} committed matches")]
  Interrupted {
    committed: usize,
    #[source]
    source: Box<Error>,
  },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  pub fn code(&self) -> ErrorCode {
    match self {
      Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
      Error::TryAgain { .. } => ErrorCode::TryAgain,
      Error::OutOfMemory { .. } => ErrorCode::OutOfMemory,
      Error::OutOfBuffer { .. } => ErrorCode::OutOfBuffer,
      Error::OutOfCapacity { .. } => ErrorCode::OutOfCapacity,
      Error::OutOfRange { .. } => ErrorCode::OutOfRange,
      Error::NoSuchEntry => ErrorCode::NoSuchEntry,
      Error::Interrupted { source, .. } => source.code(),
    }
  }

  pub fn is_try_again(&self) -> bool {
    matches!(self, Error::TryAgain { .. })
  }

  /// Records the error on the calling thread's channel and returns it as `Err`.
  pub(crate) fn raise<T>(self) -> Result<T> {
    set_error(self.code(), Some(&self.to_string()));
    Err(self)
  }
}

thread_local! {
  static LAST_ERROR: RefCell<Option<(ErrorCode, String)>> = const { RefCell::new(None) };
}

/// Overwrites the calling thread's last error.
///
/// A `None` message stores the code's default text.
pub fn set_error(
  code: ErrorCode,
  message: Option<&str>,
) {
  let message = message.map_or_else(|| format!("{code:?}"), str::to_owned);
  LAST_ERROR.with(|slot| *slot.borrow_mut() = Some((code, message)));
}

/// Returns the last error raised on this thread, if any.
///
/// Every failing operation in this crate records itself here before
/// returning `Err`, so the channel must be read before the next fallible
/// call overwrites it.
pub fn last_error() -> Option<(ErrorCode, String)> {
  LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub fn clear_error() {
  LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_raise_records_last_error() {
    clear_error();
    let result: Result<()> = Error::OutOfRange { index: 4, len: 2 }.raise();

    assert_eq!(result, Err(Error::OutOfRange { index: 4, len: 2 }));

    let (code, message) = last_error().unwrap();
    assert_eq!(code, ErrorCode::OutOfRange);
    assert_eq!(message, "index 4 out of range for length 2");
  }

  #[test]
  fn test_interrupted_reports_cause_code() {
    let err = Error::Interrupted {
      committed: 2,
      source: Box::new(Error::OutOfMemory { requested: 64 }),
    };

    assert_eq!(err.code(), ErrorCode::OutOfMemory);
    assert!(!err.is_try_again());
    assert!(Error::TryAgain { required: 3 }.is_try_again());
  }

  #[test]
  fn test_channel_is_thread_local() {
    set_error(ErrorCode::InvalidArgument, None);

    let other = std::thread::spawn(last_error).join().unwrap();

    assert_eq!(other, None);
    assert_eq!(
      last_error(),
      Some((ErrorCode::InvalidArgument, "InvalidArgument".to_owned()))
    );
  }
}
