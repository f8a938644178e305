/// Rounds `$value` up to the next multiple of `$align`, which must be a power
/// of two.
///
/// # Examples
///
/// ```rust
/// use shaggymem::align;
///
/// assert_eq!(align!(13u64, 8u64), 16);
/// assert_eq!(align!(4096u64, 4096u64), 4096);
/// assert_eq!(align!(4097u64, 4096u64), 8192);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `size` up to a whole number of pages.
///
/// Returns `None` when the rounded value does not fit in a `u64`.
pub fn page_align(
  size: u64,
  page_size: u64,
) -> Option<u64> {
  debug_assert!(page_size.is_power_of_two());

  size.checked_add(page_size - 1).map(|v| v & !(page_size - 1))
}
