use memchr::{memchr, memmem};

use crate::{
  bunch::StrBunch,
  error::{Error, Result},
};

/// Offset of the first occurrence of `needle` in `haystack`.
pub(crate) fn search(
  haystack: &[u8],
  needle: &[u8],
) -> Option<usize> {
  match needle {
    [byte] => memchr(*byte, haystack),
    _ => memmem::find(haystack, needle),
  }
}

/// One successful search step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'s> {
  /// Bytes between the cursor and the match.
  pub before: &'s [u8],
  pub matched: &'s [u8],
}

/// Forward-only substring scanner over one borrowed buffer.
///
/// A failed search never moves the cursor, so the same position can be
/// retried with a different needle.
#[derive(Debug, Clone)]
pub struct StrFinder<'s> {
  source: &'s [u8],
  pos: usize,
}

fn push<'s>(
  bunch: &mut StrBunch<'s, '_>,
  bytes: &'s [u8],
  copy: bool,
) -> Result<()> {
  if copy {
    bunch.push_copy_of(bytes)
  } else {
    bunch.push_refer_to(bytes)
  }
}

impl<'s> StrFinder<'s> {
  /// Match limit used by [`StrFinder::find_n`] when `n <= 0`.
  pub const DEFAULT_LIMIT: usize = 32;

  pub fn new(source: &'s [u8]) -> Self {
    Self { source, pos: 0 }
  }

  /// Points the finder at a new source, cursor at its start.
  pub fn reset(
    &mut self,
    source: &'s [u8],
  ) {
    self.source = source;
    self.pos = 0;
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  /// Bytes not yet consumed.
  pub fn remaining(&self) -> &'s [u8] {
    &self.source[self.pos..]
  }

  pub fn is_exhausted(&self) -> bool {
    self.pos == self.source.len()
  }

  fn locate(
    &self,
    needle: &[u8],
  ) -> Option<(Match<'s>, usize)> {
    let rest = self.remaining();
    let at = search(rest, needle)?;
    let end = at + needle.len();

    let found = Match {
      before: &rest[..at],
      matched: &rest[at..end],
    };

    Some((found, self.pos + end))
  }

  /// Finds the next `needle` and moves the cursor past it.
  ///
  /// Fails with `NoSuchEntry`, cursor untouched, when there is none.
  pub fn find_next(
    &mut self,
    needle: &[u8],
  ) -> Result<Match<'s>> {
    if needle.is_empty() {
      return Error::InvalidArgument("empty needle").raise();
    }

    match self.locate(needle) {
      Some((found, next)) => {
        self.pos = next;
        Ok(found)
      }
      None => Error::NoSuchEntry.raise(),
    }
  }

  /// Repeats the search for `needle` up to `n` times (`n <= 0` means
  /// [`DEFAULT_LIMIT`](Self::DEFAULT_LIMIT)).
  ///
  /// For every match, the text before it goes to `before` and the match
  /// itself to `matched`, copied if `copy` is set and referenced otherwise.
  /// Returns the number of matches; running out of matches is not an error.
  ///
  /// If a push fails, the cursor goes back to where the failed step started,
  /// whatever that step already pushed is popped, and
  /// [`Error::Interrupted`] reports how many matches were fully committed.
  pub fn find_n(
    &mut self,
    needle: &[u8],
    n: isize,
    copy: bool,
    mut before: Option<&mut StrBunch<'s, '_>>,
    mut matched: Option<&mut StrBunch<'s, '_>>,
  ) -> Result<usize> {
    if needle.is_empty() {
      return Error::InvalidArgument("empty needle").raise();
    }

    let limit = if n <= 0 { Self::DEFAULT_LIMIT } else { n as usize };
    let mut committed = 0;

    while committed < limit {
      let Some((found, next)) = self.locate(needle) else {
        break;
      };

      if let Some(bunch) = before.as_deref_mut() {
        if let Err(err) = push(bunch, found.before, copy) {
          return interrupted(committed, err);
        }
      }

      if let Some(bunch) = matched.as_deref_mut() {
        if let Err(err) = push(bunch, found.matched, copy) {
          if let Some(bunch) = before.as_deref_mut() {
            bunch.pop_last();
          }
          return interrupted(committed, err);
        }
      }

      self.pos = next;
      committed += 1;
    }

    Ok(committed)
  }

  /// Pushes everything after the cursor as one last segment and moves the
  /// cursor to the end. Returns the segment length.
  pub fn find_last_component(
    &mut self,
    copy: bool,
    bunch: &mut StrBunch<'s, '_>,
  ) -> Result<usize> {
    let rest = self.remaining();

    push(bunch, rest, copy)?;
    self.pos = self.source.len();

    Ok(rest.len())
  }
}

fn interrupted<T>(
  committed: usize,
  source: Error,
) -> Result<T> {
  Error::Interrupted {
    committed,
    source: Box::new(source),
  }
  .raise()
}
