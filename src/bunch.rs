use std::{marker::PhantomData, ptr, ptr::NonNull};

use tracing::trace;

use crate::{
  error::{Error, Result},
  mempool::{self, EMPTY, MemPool, out_of_memory},
  out::{Emitted, Out, emit, span},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BunchConfig {
  /// Minimum size of each copy buffer.
  pub buffer_size: usize,
  /// Reference-table slots reserved by the first push.
  pub references: usize,
}

impl BunchConfig {
  pub fn with_buffer_size(
    mut self,
    buffer_size: usize,
  ) -> Self {
    self.buffer_size = buffer_size;
    self
  }

  pub fn with_references(
    mut self,
    references: usize,
  ) -> Self {
    self.references = references;
    self
  }
}

impl Default for BunchConfig {
  fn default() -> Self {
    Self {
      buffer_size: 256,
      references: 8,
    }
  }
}

#[derive(Clone, Copy)]
struct Entry {
  ptr: NonNull<u8>,
  len: usize,
  copied: bool,
}

struct Buffer {
  ptr: NonNull<u8>,
  pos: usize,
  end: usize,
}

impl Buffer {
  fn written(&self) -> &[u8] {
    unsafe { span(self.ptr, self.pos) }
  }
}

/// Position of a [`StrBunch::next_buffer`] walk. The default cursor starts at
/// the first buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferCursor(usize);

/// Growable, ordered collection of byte strings.
///
/// Each entry either borrows caller memory for `'s` ([`push_refer_to`]) or
/// points into one of the bunch's own copy buffers ([`push_copy_of`]). Copy
/// buffers come from the pool `'p`; the reference table and the buffer list
/// grow independently by half their size.
///
/// ```text
///   refs:     [ "a" | "bb" | "ccc" | "dd" ]
///               │      │      │       │
///               │      │      │       └────────► caller memory
///               ▼      ▼      ▼
///   buffers:  [ a bb ccc ........ ] [ ....... ]
///                         ▲
///                         └ pos of the active buffer
/// ```
///
/// [`push_refer_to`]: StrBunch::push_refer_to
/// [`push_copy_of`]: StrBunch::push_copy_of
pub struct StrBunch<'s, 'p> {
  pool: &'p dyn MemPool,
  config: BunchConfig,
  refs: Vec<Entry>,
  buffers: Vec<Buffer>,
  active: usize,
  total: usize,
  _source: PhantomData<&'s [u8]>,
}

/// Makes room for one more element, growing by half the current capacity.
fn reserve_one<T>(
  list: &mut Vec<T>,
  initial: usize,
) -> Result<()> {
  if list.len() < list.capacity() {
    return Ok(());
  }

  let capacity = list.capacity();
  let target = if capacity == 0 {
    initial.max(1)
  } else {
    capacity + (capacity / 2).max(1)
  };

  if list.try_reserve_exact(target - list.len()).is_err() {
    return out_of_memory(target * std::mem::size_of::<T>());
  }
  trace!(from = capacity, to = target, "bunch table grew");

  Ok(())
}

impl<'s, 'p> StrBunch<'s, 'p> {
  pub fn new(pool: &'p dyn MemPool) -> Self {
    Self::with_config(pool, BunchConfig::default())
  }

  pub fn with_config(
    pool: &'p dyn MemPool,
    config: BunchConfig,
  ) -> Self {
    Self {
      pool,
      config,
      refs: Vec::new(),
      buffers: Vec::new(),
      active: 0,
      total: 0,
      _source: PhantomData,
    }
  }

  pub fn pool(&self) -> &'p dyn MemPool {
    self.pool
  }

  pub fn reference_count(&self) -> usize {
    self.refs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.refs.is_empty()
  }

  /// Sum of all entry lengths.
  pub fn total(&self) -> usize {
    self.total
  }

  pub fn buffer_count(&self) -> usize {
    self.buffers.len()
  }

  /// Bytes written so far into the buffer that receives the next copy.
  pub fn active_buffer(&self) -> Option<&[u8]> {
    self.buffers.get(self.active).map(Buffer::written)
  }

  pub fn reference(
    &self,
    index: usize,
  ) -> Result<&[u8]> {
    match self.refs.get(index) {
      Some(entry) => Ok(unsafe { span(entry.ptr, entry.len) }),
      None => Error::OutOfRange {
        index,
        len: self.refs.len(),
      }
      .raise(),
    }
  }

  /// Whether entry `index` lives in the bunch's own buffers.
  pub fn is_copy(
    &self,
    index: usize,
  ) -> Result<bool> {
    self.reference(index)?;
    Ok(self.refs[index].copied)
  }

  pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
    self.refs.iter().map(|entry| unsafe { span(entry.ptr, entry.len) })
  }

  /// Appends a zero-copy entry for `bytes`.
  pub fn push_refer_to(
    &mut self,
    bytes: &'s [u8],
  ) -> Result<()> {
    reserve_one(&mut self.refs, self.config.references)?;

    let ptr = NonNull::new(bytes.as_ptr() as *mut u8).unwrap_or(EMPTY);
    self.refs.push(Entry {
      ptr,
      len: bytes.len(),
      copied: false,
    });
    self.total += bytes.len();

    Ok(())
  }

  /// Copies `bytes` into the bunch's buffers and appends an entry for the copy.
  pub fn push_copy_of(
    &mut self,
    bytes: &[u8],
  ) -> Result<()> {
    reserve_one(&mut self.refs, self.config.references)?;

    let ptr = if bytes.is_empty() {
      EMPTY
    } else {
      let ptr = self.reserve_copy(bytes.len())?;
      unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
      ptr
    };

    self.refs.push(Entry {
      ptr,
      len: bytes.len(),
      copied: true,
    });
    self.total += bytes.len();

    Ok(())
  }

  /// Claims `len` bytes at the write cursor of a buffer that can hold them.
  fn reserve_copy(
    &mut self,
    len: usize,
  ) -> Result<NonNull<u8>> {
    let Some(size) = len.checked_mul(2).map(|twice| twice.max(self.config.buffer_size)) else {
      return out_of_memory(len);
    };
    let start = self.active;

    loop {
      if self.active == self.buffers.len() {
        if let Err(err) = self.add_buffer(size) {
          self.active = start;
          return Err(err);
        }
      }

      let buffer = &mut self.buffers[self.active];

      if buffer.end - buffer.pos >= len {
        let at = unsafe { buffer.ptr.add(buffer.pos) };
        buffer.pos += len;
        return Ok(at);
      }

      if buffer.pos == 0 {
        // Nothing lives in this buffer yet, so its old bytes need not survive.
        match unsafe { self.pool.reallocate(buffer.ptr, size) } {
          Ok(ptr) => {
            trace!(from = buffer.end, to = size, "bunch buffer resized");
            buffer.ptr = ptr;
            buffer.end = size;
            continue;
          }
          Err(err) => {
            self.active = start;
            return Err(err);
          }
        }
      }

      self.active += 1;
    }
  }

  fn add_buffer(
    &mut self,
    size: usize,
  ) -> Result<()> {
    reserve_one(&mut self.buffers, 2)?;

    let ptr = self.pool.allocate(size)?;
    trace!(size, buffers = self.buffers.len() + 1, "bunch buffer added");

    self.buffers.push(Buffer { ptr, pos: 0, end: size });

    Ok(())
  }

  /// Removes the last `n` entries.
  ///
  /// Copies sitting at the tail of the active buffer give their space back.
  /// Fails with `OutOfRange`, removing nothing, if there are fewer than `n`
  /// entries.
  pub fn pop_n(
    &mut self,
    n: usize,
  ) -> Result<()> {
    if n > self.refs.len() {
      return Error::OutOfRange {
        index: n,
        len: self.refs.len(),
      }
      .raise();
    }

    for _ in 0..n {
      self.pop_last();
    }

    Ok(())
  }

  pub(crate) fn pop_last(&mut self) {
    let Some(entry) = self.refs.pop() else {
      return;
    };
    self.total -= entry.len;

    if entry.copied && entry.len > 0 {
      self.rewind(entry);
    }
  }

  fn rewind(
    &mut self,
    entry: Entry,
  ) {
    loop {
      match self.buffers.get_mut(self.active) {
        Some(buffer) if buffer.pos > 0 => {
          let tail = unsafe { buffer.ptr.add(buffer.pos) };

          if tail == unsafe { entry.ptr.add(entry.len) } {
            buffer.pos -= entry.len;
            if buffer.pos == 0 && self.active > 0 {
              self.active -= 1;
            }
          }
          return;
        }
        _ if self.active > 0 => self.active -= 1,
        _ => return,
      }
    }
  }

  /// Joins every entry with `delimiter` in between.
  ///
  /// An empty bunch yields the empty string and a single entry is
  /// duplicated as is.
  pub fn join_by(
    &self,
    delimiter: &[u8],
    out: Out<'_>,
  ) -> Result<Emitted<'p>> {
    let required = match self.refs.len() {
      0 => Some(0),
      count => delimiter
        .len()
        .checked_mul(count - 1)
        .and_then(|delimiters| delimiters.checked_add(self.total)),
    };
    let Some(required) = required else {
      return out_of_memory(usize::MAX);
    };

    if let (Out::New, [entry]) = (&out, self.refs.as_slice()) {
      let bytes = unsafe { span(entry.ptr, entry.len) };
      return mempool::duplicate(self.pool, bytes).map(Emitted::New);
    }

    emit(self.pool, out, required, |writer| {
      for (index, bytes) in self.iter().enumerate() {
        if index > 0 {
          writer.put(delimiter);
        }
        writer.put(bytes);
      }
    })
  }

  pub fn concat(
    &self,
    out: Out<'_>,
  ) -> Result<Emitted<'p>> {
    self.join_by(&[], out)
  }

  /// Entry `index`, delivered through the output protocol.
  pub fn fetch(
    &self,
    index: usize,
    out: Out<'_>,
  ) -> Result<Emitted<'p>> {
    let bytes = self.reference(index)?;
    emit(self.pool, out, bytes.len(), |writer| writer.put(bytes))
  }

  /// Returns the next non-empty copy buffer after `cursor` and advances it.
  ///
  /// Only the written part of each buffer is returned. Returns `None` once
  /// every buffer has been visited; reset the cursor to walk again.
  pub fn next_buffer(
    &self,
    cursor: &mut BufferCursor,
  ) -> Option<&[u8]> {
    while let Some(buffer) = self.buffers.get(cursor.0) {
      cursor.0 += 1;
      if buffer.pos > 0 {
        return Some(buffer.written());
      }
    }
    None
  }

  pub fn buffers(&self) -> Buffers<'_, 's, 'p> {
    Buffers {
      bunch: self,
      cursor: BufferCursor::default(),
    }
  }

  /// Drops every entry but keeps tables and buffers for reuse.
  pub fn reset(&mut self) {
    self.refs.clear();
    for buffer in self.buffers.iter_mut() {
      buffer.pos = 0;
    }
    self.active = 0;
    self.total = 0;
  }
}

impl Drop for StrBunch<'_, '_> {
  fn drop(&mut self) {
    for buffer in self.buffers.drain(..) {
      unsafe { self.pool.deallocate(buffer.ptr) };
    }
  }
}

pub struct Buffers<'b, 's, 'p> {
  bunch: &'b StrBunch<'s, 'p>,
  cursor: BufferCursor,
}

impl<'b> Iterator for Buffers<'b, '_, '_> {
  type Item = &'b [u8];

  fn next(&mut self) -> Option<&'b [u8]> {
    self.bunch.next_buffer(&mut self.cursor)
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::{
    Memhose,
    error::ErrorCode,
    mempool::{system, testing::FailingPool},
  };

  fn joined(
    bunch: &StrBunch<'_, '_>,
    delimiter: &[u8],
  ) -> Vec<u8> {
    bunch
      .join_by(delimiter, Out::New)
      .unwrap()
      .into_bytes()
      .unwrap()
      .to_vec()
  }

  #[test]
  fn test_push_copy_is_a_copy() {
    let source = b"payload".to_vec();
    let mut bunch = StrBunch::new(system());

    bunch.push_copy_of(&source).unwrap();

    let copy = bunch.reference(0).unwrap();
    assert_eq!(copy, source.as_slice());
    assert_ne!(copy.as_ptr(), source.as_ptr());
    assert!(bunch.is_copy(0).unwrap());
  }

  #[test]
  fn test_push_refer_is_zero_copy() {
    let source = b"payload".to_vec();
    let mut bunch = StrBunch::new(system());

    bunch.push_refer_to(&source).unwrap();

    assert_eq!(bunch.reference(0).unwrap().as_ptr(), source.as_ptr());
    assert!(!bunch.is_copy(0).unwrap());
    assert_eq!(bunch.buffer_count(), 0);
  }

  #[test]
  fn test_reference_out_of_range() {
    let bunch = StrBunch::new(system());

    assert_eq!(
      bunch.reference(0).unwrap_err(),
      Error::OutOfRange { index: 0, len: 0 }
    );
  }

  #[test]
  fn test_join_by() {
    let mut bunch = StrBunch::new(system());
    bunch.push_refer_to(b"a").unwrap();
    bunch.push_copy_of(b"bb").unwrap();
    bunch.push_refer_to(b"ccc").unwrap();

    let result = joined(&bunch, b"-");

    assert_eq!(result, b"a-bb-ccc");
    assert_eq!(result.len(), 8);
    assert_eq!(joined(&bunch, b""), b"abbccc");
  }

  #[test]
  fn test_join_empty_and_single() {
    let mut bunch = StrBunch::new(system());

    let empty = bunch.join_by(b"-", Out::New).unwrap().into_bytes().unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.as_ptr(), EMPTY.as_ptr() as *const u8);
    drop(empty);

    bunch.push_refer_to(b"solo").unwrap();
    let single = bunch.join_by(b"-", Out::New).unwrap().into_bytes().unwrap();
    assert_eq!(single, *b"solo");
    assert_ne!(single.as_ptr(), bunch.reference(0).unwrap().as_ptr());
  }

  #[test]
  fn test_join_modes() {
    let mut bunch = StrBunch::new(system());
    for word in [&b"one"[..], b"two", b"three"] {
      bunch.push_refer_to(word).unwrap();
    }

    let required = match bunch.join_by(b", ", Out::Measure) {
      Err(Error::TryAgain { required }) => required,
      other => panic!("unexpected {other:?}"),
    };
    assert_eq!(required, 15);

    let mut buf = vec![0u8; required];
    let written = bunch.join_by(b", ", Out::fill_exact(&mut buf)).unwrap();
    assert_eq!(written.len(), 15);
    assert_eq!(buf, b"one, two, three");

    let mut short = [0u8; 6];
    bunch.concat(Out::fill(&mut short)).unwrap();
    assert_eq!(&short, b"onetwo");

    let err = bunch.concat(Out::fill_exact(&mut short)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OutOfBuffer);
  }

  #[test]
  fn test_fetch() {
    let mut bunch = StrBunch::new(system());
    bunch.push_copy_of(b"entry").unwrap();

    let fetched = bunch.fetch(0, Out::New).unwrap().into_bytes().unwrap();
    assert_eq!(fetched, *b"entry");

    assert_eq!(
      bunch.fetch(0, Out::Measure).unwrap_err(),
      Error::TryAgain { required: 5 }
    );
  }

  #[test]
  fn test_pop_n_reclaims_copy_space() {
    let mut bunch = StrBunch::new(system());

    bunch.push_copy_of(b"x").unwrap();
    let before = bunch.active_buffer().unwrap().len();
    bunch.push_copy_of(b"yz").unwrap();
    assert_eq!(bunch.active_buffer().unwrap().len(), before + 2);

    bunch.pop_n(1).unwrap();

    assert_eq!(bunch.active_buffer().unwrap().len(), before);
    assert_eq!(bunch.reference_count(), 1);
    assert_eq!(bunch.total(), 1);
  }

  #[test]
  fn test_pop_n_steps_back_across_buffers() {
    let config = BunchConfig::default().with_buffer_size(4);
    let mut bunch = StrBunch::with_config(system(), config);

    bunch.push_copy_of(b"abc").unwrap();
    bunch.push_copy_of(b"defgh").unwrap();
    assert_eq!(bunch.buffer_count(), 2);
    assert_eq!(bunch.active_buffer().unwrap(), b"defgh");

    bunch.pop_n(1).unwrap();
    assert_eq!(bunch.active_buffer().unwrap(), b"abc");

    bunch.pop_n(1).unwrap();
    assert_eq!(bunch.active_buffer().unwrap(), b"");
    assert!(bunch.is_empty());

    bunch.push_copy_of(b"ij").unwrap();
    assert_eq!(bunch.buffer_count(), 2);
    assert_eq!(bunch.reference(0).unwrap(), b"ij");
  }

  #[test]
  fn test_pop_n_too_many() {
    let mut bunch = StrBunch::new(system());
    bunch.push_refer_to(b"only").unwrap();

    let err = bunch.pop_n(2).unwrap_err();

    assert_eq!(err, Error::OutOfRange { index: 2, len: 1 });
    assert_eq!(bunch.reference_count(), 1);
  }

  #[test]
  fn test_pop_reference_leaves_buffer() {
    let mut bunch = StrBunch::new(system());
    bunch.push_copy_of(b"copy").unwrap();
    bunch.push_refer_to(b"ref").unwrap();

    bunch.pop_n(1).unwrap();

    assert_eq!(bunch.active_buffer().unwrap(), b"copy");
  }

  #[test]
  fn test_large_copy_gets_its_own_buffer() {
    let config = BunchConfig::default().with_buffer_size(8);
    let mut bunch = StrBunch::with_config(system(), config);
    let large = [7u8; 20];

    bunch.push_copy_of(b"tiny").unwrap();
    bunch.push_copy_of(&large).unwrap();

    assert_eq!(bunch.buffer_count(), 2);
    assert_eq!(bunch.reference(1).unwrap(), &large);
  }

  #[test]
  fn test_empty_buffer_is_resized_in_place() {
    let config = BunchConfig::default().with_buffer_size(8);
    let mut bunch = StrBunch::with_config(system(), config);

    bunch.push_copy_of(b"1234").unwrap();
    bunch.reset();
    bunch.push_copy_of(b"a much longer entry").unwrap();

    assert_eq!(bunch.buffer_count(), 1);
    assert_eq!(bunch.reference(0).unwrap(), b"a much longer entry");
  }

  #[test]
  fn test_next_buffer_walks_copies() {
    let config = BunchConfig::default().with_buffer_size(4);
    let mut bunch = StrBunch::with_config(system(), config);
    bunch.push_copy_of(b"ab").unwrap();
    bunch.push_refer_to(b"skipped").unwrap();
    bunch.push_copy_of(b"cd").unwrap();
    bunch.push_copy_of(b"efg").unwrap();

    let mut cursor = BufferCursor::default();
    assert_eq!(bunch.next_buffer(&mut cursor), Some(&b"abcd"[..]));
    assert_eq!(bunch.next_buffer(&mut cursor), Some(&b"efg"[..]));
    assert_eq!(bunch.next_buffer(&mut cursor), None);
    assert_eq!(bunch.next_buffer(&mut cursor), None);

    let again: Vec<&[u8]> = bunch.buffers().collect();
    assert_eq!(again, vec![&b"abcd"[..], b"efg"]);
  }

  #[test]
  fn test_reset_keeps_capacity() {
    let config = BunchConfig::default().with_buffer_size(4);
    let mut bunch = StrBunch::with_config(system(), config);
    for word in [&b"abcd"[..], b"efgh", b"ijkl"] {
      bunch.push_copy_of(word).unwrap();
    }
    let buffers = bunch.buffer_count();

    bunch.reset();
    assert_eq!(bunch.total(), 0);
    assert_eq!(bunch.reference_count(), 0);
    assert_eq!(bunch.buffers().count(), 0);

    for word in [&b"mnop"[..], b"qrst", b"uvwx"] {
      bunch.push_copy_of(word).unwrap();
    }
    assert_eq!(bunch.buffer_count(), buffers);
    assert_eq!(joined(&bunch, b""), b"mnopqrstuvwx");
  }

  #[test]
  fn test_backed_by_memhose() {
    let hose = Memhose::new(0).unwrap();
    let mut bunch = StrBunch::new(&hose);

    bunch.push_copy_of(b"into").unwrap();
    bunch.push_copy_of(b"the hose").unwrap();

    assert!(hose.owns(bunch.reference(0).unwrap().as_ptr()));

    let result = bunch.join_by(b" ", Out::New).unwrap().into_bytes().unwrap();
    assert_eq!(result, *b"into the hose");
    assert!(hose.owns(result.as_ptr()));
  }

  #[test]
  fn test_failed_copy_leaves_bunch_intact() {
    let pool = FailingPool::new(1);
    let config = BunchConfig::default().with_buffer_size(4);
    let mut bunch = StrBunch::with_config(&pool, config);

    bunch.push_copy_of(b"abc").unwrap();
    let err = bunch.push_copy_of(b"defgh").unwrap_err();

    assert_eq!(err.code(), ErrorCode::OutOfMemory);
    assert_eq!(bunch.reference_count(), 1);
    assert_eq!(bunch.total(), 3);
    assert_eq!(bunch.active_buffer().unwrap(), b"abc");

    bunch.push_refer_to(b"still works").unwrap();
    let mut buf = [0u8; 15];
    bunch.join_by(b"|", Out::fill_exact(&mut buf)).unwrap();
    assert_eq!(&buf, b"abc|still works");
  }

  #[test]
  fn test_tables_grow_independently() {
    let mut bunch = StrBunch::new(system());

    for _ in 0..100 {
      bunch.push_refer_to(b"ref").unwrap();
    }

    assert_eq!(bunch.reference_count(), 100);
    assert_eq!(bunch.buffer_count(), 0);
  }

  proptest! {
    #[test]
    fn prop_total_tracks_entries(
      ops in proptest::collection::vec((any::<bool>(), proptest::collection::vec(any::<u8>(), 0..40)), 0..48),
      pops in 0usize..16,
    ) {
      let config = BunchConfig::default().with_buffer_size(16);
      let mut bunch = StrBunch::with_config(system(), config);
      let mut expected: Vec<Vec<u8>> = Vec::new();

      for (copy, bytes) in &ops {
        if *copy {
          bunch.push_copy_of(bytes).unwrap();
        } else {
          bunch.push_refer_to(bytes).unwrap();
        }
        expected.push(bytes.clone());
      }

      let pops = pops.min(expected.len());
      bunch.pop_n(pops).unwrap();
      expected.truncate(expected.len() - pops);

      prop_assert_eq!(bunch.total(), expected.iter().map(Vec::len).sum::<usize>());
      prop_assert_eq!(bunch.reference_count(), expected.len());
      for (index, bytes) in expected.iter().enumerate() {
        prop_assert_eq!(bunch.reference(index).unwrap(), bytes.as_slice());
      }
      prop_assert_eq!(joined(&bunch, b","), expected.join(&b","[..]));
    }
  }
}
