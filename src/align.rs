/// Rounds a size up to the allocator's alignment granularity (8 bytes).
///
/// Every block size and every payload offset handed out by the allocator is a
/// multiple of this value.
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(8), 8);
/// assert_eq!(align!(13), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::block::ALIGNMENT - 1) & !($crate::block::ALIGNMENT - 1)
  };
}
