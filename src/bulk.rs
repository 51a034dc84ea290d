use std::ptr::NonNull;

use crate::{
  error::Result,
  mempool::{MemPool, system},
};

/// One contiguous region of a [`Memhose`](crate::Memhose).
///
/// Allocations are carved from the front; `capacity - unused` bytes are in
/// use. The buffer never moves while the bulk lives.
pub struct Bulk {
  pub capacity: usize,
  pub unused: usize,
  pub buffer: NonNull<u8>,
}

impl Bulk {
  /// Allocates a bulk of `capacity` bytes from the platform allocator.
  ///
  /// `capacity` must be non-zero and word aligned.
  pub fn new(capacity: usize) -> Result<Self> {
    let buffer = system().allocate(capacity)?;

    Ok(Self {
      capacity,
      unused: capacity,
      buffer,
    })
  }

  /// Bumps `size` bytes off the unused tail, if they fit.
  pub fn take(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size > self.unused {
      return None;
    }

    let offset = self.capacity - self.unused;
    self.unused -= size;

    Some(unsafe { self.buffer.add(offset) })
  }

  pub fn rewind(&mut self) {
    self.unused = self.capacity;
  }

  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    let start = self.buffer.as_ptr() as usize;
    let address = address as usize;

    address >= start && address < start + self.capacity
  }
}

impl Drop for Bulk {
  fn drop(&mut self) {
    unsafe { system().deallocate(self.buffer) };
  }
}
