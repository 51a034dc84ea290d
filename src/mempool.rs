use std::{fmt, ops, ptr, ptr::NonNull, slice};

use tracing::warn;

use crate::error::{Error, Result};

/// Pluggable allocation strategy.
///
/// Everything in this crate that needs memory asks a `MemPool` for it instead
/// of going to the platform allocator directly, so a [`Memhose`] (or any other
/// strategy) can be injected wherever a pool is expected. Use [`system()`]
/// for the platform allocator.
///
/// A request for zero bytes is legal and yields [`EMPTY`], a non-null handle
/// that must never be dereferenced. Deallocating `EMPTY` does nothing and
/// reallocating it behaves like a fresh allocation.
///
/// Pools are single threaded; none of them lock.
///
/// # Safety
///
/// A successful `allocate` or `reallocate` of `size` bytes must return memory
/// valid for reads and writes of `size` bytes that no other live allocation
/// of the same pool overlaps.
///
/// [`Memhose`]: crate::Memhose
pub unsafe trait MemPool {
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>>;

  /// Resizes the allocation at `ptr` to `size` bytes.
  ///
  /// Whether the old contents survive is up to the pool; see
  /// [`Memhose`](crate::Memhose) for a pool that does not preserve them.
  ///
  /// # Safety
  ///
  /// `ptr` must come from this pool and must not be used after the call.
  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<NonNull<u8>>;

  /// # Safety
  ///
  /// `ptr` must come from this pool and must not be used after the call.
  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
  );
}

/// Handle returned for zero-byte allocations.
pub const EMPTY: NonNull<u8> = NonNull::dangling();

pub(crate) fn out_of_memory<T>(requested: usize) -> Result<T> {
  warn!(requested, "backing allocation failed");
  Error::OutOfMemory { requested }.raise()
}

/// The platform allocator (`malloc`, `realloc`, `free`).
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

static SYSTEM: System = System;

pub fn system() -> &'static System {
  &SYSTEM
}

unsafe impl MemPool for System {
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if size == 0 {
      return Ok(EMPTY);
    }

    let address = unsafe { libc::malloc(size) } as *mut u8;

    match NonNull::new(address) {
      Some(ptr) => Ok(ptr),
      None => out_of_memory(size),
    }
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if ptr == EMPTY {
      return self.allocate(size);
    }

    if size == 0 {
      unsafe { self.deallocate(ptr) };
      return Ok(EMPTY);
    }

    // On failure the old block stays valid and owned by the caller.
    let address = unsafe { libc::realloc(ptr.as_ptr().cast(), size) } as *mut u8;

    match NonNull::new(address) {
      Some(ptr) => Ok(ptr),
      None => out_of_memory(size),
    }
  }

  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
  ) {
    if ptr != EMPTY {
      unsafe { libc::free(ptr.as_ptr().cast()) };
    }
  }
}

/// Bytes owned by a [`MemPool`] allocation, handed back to the pool on drop.
pub struct PoolBytes<'p> {
  ptr: NonNull<u8>,
  len: usize,
  pool: &'p dyn MemPool,
}

impl<'p> PoolBytes<'p> {
  /// The empty string. Never allocates.
  pub fn empty(pool: &'p dyn MemPool) -> Self {
    Self {
      ptr: EMPTY,
      len: 0,
      pool,
    }
  }

  /// Allocates `len` zeroed bytes from `pool`.
  pub fn zeroed(
    pool: &'p dyn MemPool,
    len: usize,
  ) -> Result<Self> {
    if len == 0 {
      return Ok(Self::empty(pool));
    }

    let ptr = pool.allocate(len)?;
    unsafe { ptr::write_bytes(ptr.as_ptr(), 0, len) };

    Ok(Self { ptr, len, pool })
  }

  /// Allocates `len` bytes from `pool` without initialising them.
  ///
  /// # Safety
  ///
  /// Every byte must be written through [`PoolBytes::as_mut_ptr`] before the
  /// result is read or handed out.
  pub(crate) unsafe fn uninit(
    pool: &'p dyn MemPool,
    len: usize,
  ) -> Result<Self> {
    if len == 0 {
      return Ok(Self::empty(pool));
    }

    let ptr = pool.allocate(len)?;
    Ok(Self { ptr, len, pool })
  }

  pub fn as_bytes(&self) -> &[u8] {
    self
  }

  pub fn as_ptr(&self) -> *const u8 {
    self.ptr.as_ptr()
  }

  pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
    self.ptr.as_ptr()
  }
}

/// Copies `bytes` into a fresh allocation from `pool`.
pub fn duplicate<'p>(
  pool: &'p dyn MemPool,
  bytes: &[u8],
) -> Result<PoolBytes<'p>> {
  let mut copy = unsafe { PoolBytes::uninit(pool, bytes.len())? };
  if !bytes.is_empty() {
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), copy.as_mut_ptr(), bytes.len()) };
  }
  Ok(copy)
}

impl ops::Deref for PoolBytes<'_> {
  type Target = [u8];

  fn deref(&self) -> &[u8] {
    if self.len == 0 {
      return &[];
    }
    unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
  }
}

impl ops::DerefMut for PoolBytes<'_> {
  fn deref_mut(&mut self) -> &mut [u8] {
    if self.len == 0 {
      return &mut [];
    }
    unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
  }
}

impl Drop for PoolBytes<'_> {
  fn drop(&mut self) {
    unsafe { self.pool.deallocate(self.ptr) };
  }
}

impl fmt::Debug for PoolBytes<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_tuple("PoolBytes")
      .field(&String::from_utf8_lossy(self))
      .finish()
  }
}

impl PartialEq<[u8]> for PoolBytes<'_> {
  fn eq(
    &self,
    other: &[u8],
  ) -> bool {
    self.as_bytes() == other
  }
}

impl<const N: usize> PartialEq<[u8; N]> for PoolBytes<'_> {
  fn eq(
    &self,
    other: &[u8; N],
  ) -> bool {
    self.as_bytes() == other
  }
}
