use crate::{
  error::{Error, Result},
  finder::search,
  mempool::{self, MemPool, PoolBytes, out_of_memory},
};

/// Snippets of up to this many spans keep them inline, without a heap
/// allocation.
pub const INLINE_SPANS: usize = 8;

enum Spans<'s> {
  Inline([&'s [u8]; INLINE_SPANS]),
  Heap(Vec<&'s [u8]>),
}

/// Fixed-capacity list of borrowed spans.
///
/// A snippet never grows: once `capacity` spans are pushed, further pushes
/// fail with `OutOfCapacity`. The spans borrow the source bytes, so a snippet
/// cannot outlive the buffer it indexes.
pub struct Snippet<'s> {
  capacity: usize,
  len: usize,
  total: usize,
  spans: Spans<'s>,
}

impl<'s> Snippet<'s> {
  /// Creates an empty snippet holding at most `capacity` spans.
  ///
  /// Larger capacities reserve their span table up front and fail with
  /// `OutOfMemory` when it cannot be allocated.
  pub fn new(capacity: usize) -> Result<Self> {
    let empty: &'s [u8] = &[];
    let spans = if capacity <= INLINE_SPANS {
      Spans::Inline([empty; INLINE_SPANS])
    } else {
      let mut list = Vec::new();
      if list.try_reserve_exact(capacity).is_err() {
        return out_of_memory(capacity.saturating_mul(size_of::<&[u8]>()));
      }
      Spans::Heap(list)
    };

    Ok(Self {
      capacity,
      len: 0,
      total: 0,
      spans,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn is_full(&self) -> bool {
    self.len == self.capacity
  }

  /// Sum of all span lengths.
  pub fn total(&self) -> usize {
    self.total
  }

  pub fn push(
    &mut self,
    span: &'s [u8],
  ) -> Result<()> {
    if self.is_full() {
      return Error::OutOfCapacity {
        capacity: self.capacity,
      }
      .raise();
    }

    match &mut self.spans {
      Spans::Inline(slots) => slots[self.len] = span,
      Spans::Heap(list) => list.push(span),
    }
    self.len += 1;
    self.total += span.len();

    Ok(())
  }

  pub fn get(
    &self,
    index: usize,
  ) -> Result<&'s [u8]> {
    if index >= self.len {
      return Error::OutOfRange {
        index,
        len: self.len,
      }
      .raise();
    }

    Ok(self.as_slice()[index])
  }

  pub fn measure(
    &self,
    index: usize,
  ) -> Result<usize> {
    self.get(index).map(<[u8]>::len)
  }

  /// Copies span `index` into a fresh allocation from `pool`.
  pub fn duplicate<'p>(
    &self,
    index: usize,
    pool: &'p dyn MemPool,
  ) -> Result<PoolBytes<'p>> {
    mempool::duplicate(pool, self.get(index)?)
  }

  /// Copies span `index` to the front of `buf` and returns its length.
  pub fn copy(
    &self,
    index: usize,
    buf: &mut [u8],
  ) -> Result<usize> {
    let span = self.get(index)?;

    if buf.len() < span.len() {
      return Error::OutOfCapacity {
        capacity: buf.len(),
      }
      .raise();
    }

    buf[..span.len()].copy_from_slice(span);
    Ok(span.len())
  }

  pub fn as_slice(&self) -> &[&'s [u8]] {
    match &self.spans {
      Spans::Inline(slots) => &slots[..self.len],
      Spans::Heap(list) => list,
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &'s [u8]> + '_ {
    self.as_slice().iter().copied()
  }

  pub fn clear(&mut self) {
    self.truncate(0);
  }

  fn truncate(
    &mut self,
    len: usize,
  ) {
    let dropped: usize = self.as_slice()[len..].iter().map(|span| span.len()).sum();

    if let Spans::Heap(list) = &mut self.spans {
      list.truncate(len);
    }
    self.len = len;
    self.total -= dropped;
  }
}

/// Splits `source` on every occurrence of `delimiter`, pushing the pieces
/// into `snippet`.
///
/// Returns the number of pieces pushed. If the snippet fills up before the
/// whole source is split, nothing is pushed and `OutOfCapacity` is returned.
pub fn split<'s>(
  source: &'s [u8],
  delimiter: &[u8],
  snippet: &mut Snippet<'s>,
) -> Result<usize> {
  if delimiter.is_empty() {
    return Error::InvalidArgument("empty delimiter").raise();
  }

  let start = snippet.len();
  let mut rest = source;

  loop {
    let (piece, next) = match search(rest, delimiter) {
      Some(at) => (&rest[..at], Some(&rest[at + delimiter.len()..])),
      None => (rest, None),
    };

    if let Err(err) = snippet.push(piece) {
      snippet.truncate(start);
      return Err(err);
    }

    match next {
      Some(next) => rest = next,
      None => return Ok(snippet.len() - start),
    }
  }
}
