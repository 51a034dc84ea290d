use std::{cell::RefCell, ptr::NonNull};

use tracing::debug;

use crate::{
  align::{WORD, checked_align},
  bulk::Bulk,
  error::{Error, Result},
  mempool::{EMPTY, MemPool, out_of_memory},
};

/// Default size of every bulk: 4 MiB.
pub const DEFAULT_BULK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoseConfig {
  /// Minimum size of every bulk the hose allocates.
  pub bulk_size: usize,
}

impl HoseConfig {
  pub fn with_bulk_size(
    mut self,
    bulk_size: usize,
  ) -> Self {
    self.bulk_size = bulk_size;
    self
  }
}

impl Default for HoseConfig {
  fn default() -> Self {
    Self {
      bulk_size: DEFAULT_BULK_SIZE,
    }
  }
}

struct Bulks {
  list: Vec<Bulk>,
  // Bulks in `list[..end]` can still serve a word; the rest are exhausted.
  end: usize,
}

/// Region allocator built from large bulks.
///
/// Allocation bumps a cursor inside the first bulk that fits. Individual
/// allocations are never freed: [`Memhose::free_all`] rewinds every bulk at
/// once, and dropping the hose releases them.
pub struct Memhose {
  config: HoseConfig,
  bulks: RefCell<Bulks>,
}

impl Memhose {
  pub fn new(min_capacity: usize) -> Result<Self> {
    Self::with_config(min_capacity, HoseConfig::default())
  }

  pub fn with_config(
    min_capacity: usize,
    config: HoseConfig,
  ) -> Result<Self> {
    if config.bulk_size == 0 {
      return Error::InvalidArgument("bulk size must be non-zero").raise();
    }

    let Some(capacity) = checked_align(min_capacity.max(config.bulk_size)) else {
      return out_of_memory(min_capacity);
    };

    let bulk = Bulk::new(capacity)?;
    debug!(capacity, "memhose created");

    Ok(Self {
      config,
      bulks: RefCell::new(Bulks {
        list: vec![bulk],
        end: 1,
      }),
    })
  }

  pub fn config(&self) -> HoseConfig {
    self.config
  }

  /// Total number of bulks, exhausted ones included.
  pub fn bulk_count(&self) -> usize {
    self.bulks.borrow().list.len()
  }

  /// Number of bulks still considered for allocation.
  pub fn usable_bulks(&self) -> usize {
    self.bulks.borrow().end
  }

  pub fn capacity(&self) -> usize {
    self.bulks.borrow().list.iter().map(|bulk| bulk.capacity).sum()
  }

  pub fn used(&self) -> usize {
    self
      .bulks
      .borrow()
      .list
      .iter()
      .map(|bulk| bulk.capacity - bulk.unused)
      .sum()
  }

  /// Whether `address` lies inside one of the hose's bulks.
  pub fn owns(
    &self,
    address: *const u8,
  ) -> bool {
    self.bulks.borrow().list.iter().any(|bulk| bulk.contains(address))
  }

  /// Makes every bulk fully available again without releasing memory.
  ///
  /// All pointers handed out so far become invalid; taking `&mut self` means
  /// nothing can still be borrowing the hose.
  pub fn free_all(&mut self) {
    let bulks = self.bulks.get_mut();

    for bulk in bulks.list.iter_mut() {
      bulk.rewind();
    }
    bulks.end = bulks.list.len();

    debug!(bulks = bulks.end, "memhose rewound");
  }

  fn bump(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let Some(size) = checked_align(size.max(1)) else {
      return out_of_memory(size);
    };

    let mut bulks = self.bulks.borrow_mut();
    let bulks = &mut *bulks;

    for index in 0..bulks.end {
      let bulk = &mut bulks.list[index];

      if let Some(ptr) = bulk.take(size) {
        if bulk.unused < WORD {
          bulks.list.swap(index, bulks.end - 1);
          bulks.end -= 1;
        }
        return Ok(ptr);
      }
    }

    let Some(capacity) = size.checked_mul(2).map(|twice| twice.max(self.config.bulk_size))
    else {
      return out_of_memory(size);
    };
    let Some(capacity) = checked_align(capacity) else {
      return out_of_memory(size);
    };

    let mut bulk = Bulk::new(capacity)?;
    let Some(ptr) = bulk.take(size) else {
      return out_of_memory(size);
    };

    debug!(capacity, requested = size, bulks = bulks.list.len() + 1, "memhose grew");

    if bulks.list.try_reserve(1).is_err() {
      return out_of_memory(size);
    }
    bulks.list.insert(0, bulk);
    bulks.end += 1;

    Ok(ptr)
  }
}

unsafe impl MemPool for Memhose {
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    self.bump(size)
  }

  /// Returns a fresh allocation of `size` bytes.
  ///
  /// Unlike `realloc`, the old contents are NOT copied: the hose cannot
  /// tell how large the old allocation was. Callers that need the bytes must
  /// copy them first, or grow through [`System`](crate::System) instead.
  unsafe fn reallocate(
    &self,
    _ptr: NonNull<u8>,
    size: usize,
  ) -> Result<NonNull<u8>> {
    self.bump(size)
  }

  /// Does nothing. Memory comes back through [`Memhose::free_all`] or drop.
  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
  ) {
    debug_assert!(ptr == EMPTY || self.owns(ptr.as_ptr()));
  }
}
