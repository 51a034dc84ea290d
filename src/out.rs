//! The measure / fill / new-string output protocol.
//!
//! Every operation that produces bytes takes an [`Out`] saying where the
//! result should go:
//!
//! ```text
//!   Out::Measure      -> Err(TryAgain { required })   nothing written
//!   Out::Fill { buf } -> Ok(Written(n))               n <= buf.len()
//!   Out::New          -> Ok(New(bytes))               exact-size pool allocation
//! ```
//!
//! A measure followed by a fill with a buffer of exactly `required` bytes
//! never truncates.

use std::{
  marker::PhantomData,
  ptr::{self, NonNull},
};

use crate::{
  error::{Error, Result},
  mempool::{MemPool, PoolBytes},
};

#[derive(Debug)]
pub enum Out<'b> {
  Measure,
  Fill {
    buf: &'b mut [u8],
    /// Write a prefix when `buf` is too short instead of failing with
    /// `OutOfBuffer`.
    truncate: bool,
  },
  New,
}

impl<'b> Out<'b> {
  /// Fill `buf`, truncating if it is too short.
  pub fn fill(buf: &'b mut [u8]) -> Self {
    Out::Fill { buf, truncate: true }
  }

  /// Fill `buf`, failing with `OutOfBuffer` if it is too short.
  pub fn fill_exact(buf: &'b mut [u8]) -> Self {
    Out::Fill {
      buf,
      truncate: false,
    }
  }
}

#[derive(Debug)]
pub enum Emitted<'p> {
  Written(usize),
  New(PoolBytes<'p>),
}

impl<'p> Emitted<'p> {
  pub fn len(&self) -> usize {
    match self {
      Emitted::Written(len) => *len,
      Emitted::New(bytes) => bytes.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn into_bytes(self) -> Option<PoolBytes<'p>> {
    match self {
      Emitted::New(bytes) => Some(bytes),
      Emitted::Written(_) => None,
    }
  }
}

/// Truncating sequential writer over a fixed span of bytes.
///
/// The span may be uninitialised: the writer only ever stores into it.
pub(crate) struct Writer<'w> {
  ptr: *mut u8,
  cap: usize,
  pos: usize,
  _buf: PhantomData<&'w mut [u8]>,
}

impl<'w> Writer<'w> {
  pub fn new(buf: &'w mut [u8]) -> Self {
    unsafe { Self::from_raw(buf.as_mut_ptr(), buf.len()) }
  }

  /// # Safety
  ///
  /// `ptr` must be valid for writes of `cap` bytes for `'w`, and nothing else
  /// may access them meanwhile.
  unsafe fn from_raw(
    ptr: *mut u8,
    cap: usize,
  ) -> Self {
    Self {
      ptr,
      cap,
      pos: 0,
      _buf: PhantomData,
    }
  }

  pub fn put(
    &mut self,
    bytes: &[u8],
  ) {
    let len = bytes.len().min(self.cap - self.pos);
    if len == 0 {
      return;
    }

    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(self.pos), len) };
    self.pos += len;
  }

  pub fn written(&self) -> usize {
    self.pos
  }

  /// Zeroes whatever has not been written yet.
  fn pad(&mut self) {
    let rest = self.cap - self.pos;
    if rest > 0 {
      unsafe { ptr::write_bytes(self.ptr.add(self.pos), 0, rest) };
    }
  }
}

/// Routes a result of `required` bytes to `out`, calling `write` to produce
/// it when the mode asks for bytes.
pub(crate) fn emit<'p, F>(
  pool: &'p dyn MemPool,
  out: Out<'_>,
  required: usize,
  write: F,
) -> Result<Emitted<'p>>
where
  F: FnOnce(&mut Writer<'_>),
{
  match out {
    Out::Measure => Error::TryAgain { required }.raise(),
    Out::Fill { buf, truncate } => {
      if !truncate && buf.len() < required {
        return Error::OutOfBuffer {
          required,
          available: buf.len(),
        }
        .raise();
      }

      let mut writer = Writer::new(buf);
      write(&mut writer);
      Ok(Emitted::Written(writer.written()))
    }
    Out::New => {
      let mut bytes = unsafe { PoolBytes::uninit(pool, required)? };
      let mut writer = unsafe { Writer::from_raw(bytes.as_mut_ptr(), required) };
      write(&mut writer);
      debug_assert_eq!(writer.written(), required);
      writer.pad();
      Ok(Emitted::New(bytes))
    }
  }
}

/// Borrows `len` bytes at `ptr` as a slice, mapping empty spans to `&[]`.
///
/// # Safety
///
/// When `len > 0`, `ptr` must be valid for reads of `len` bytes for `'a`.
pub(crate) unsafe fn span<'a>(
  ptr: NonNull<u8>,
  len: usize,
) -> &'a [u8] {
  if len == 0 {
    return &[];
  }
  unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }
}
