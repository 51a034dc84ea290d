/// Size of a machine word; every arena address is a multiple of it.
pub const WORD: usize = ::std::mem::size_of::<usize>();

/// Rounds `value` up to the machine word alignment.
///
/// # Examples
///
/// ```rust
/// use memhose::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::WORD - 1) & !($crate::align::WORD - 1)
  };
}

/// Like [`align!`] but returns `None` instead of overflowing.
pub fn checked_align(value: usize) -> Option<usize> {
  value.checked_add(WORD - 1).map(|v| v & !(WORD - 1))
}
