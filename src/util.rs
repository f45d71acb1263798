/// Elements with a logical "width", measured in frame slots or stack entries
///
/// Long and double values occupy two slots everywhere the JVM counts storage,
/// so most layout arithmetic in this crate goes through this trait instead of
/// counting elements.
pub trait Width {
    fn width(&self) -> usize;
}

impl<T: Width> Width for &T {
    fn width(&self) -> usize {
        (*self).width()
    }
}

/// Total width of a sequence of elements
pub fn total_width<T: Width>(items: impl IntoIterator<Item = T>) -> usize {
    items.into_iter().map(|item| item.width()).sum()
}

/// Slot index of the `n`-th element in a packed sequence, given the widths of
/// the preceding elements
pub fn packed_slot<T: Width>(items: impl IntoIterator<Item = T>, n: usize) -> Option<usize> {
    let mut offset = 0;
    for (idx, item) in items.into_iter().enumerate() {
        if idx == n {
            return Some(offset);
        }
        offset += item.width();
    }
    None
}
