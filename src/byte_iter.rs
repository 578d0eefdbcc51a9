use paste::paste;

/// Forward-only cursor over a tape. Reads never go past `bytes.len()`; a short read returns
/// `None` and leaves the cursor where it was.
#[derive(Clone, Copy)]
pub struct ByteIter<'a> {
    pub bytes: &'a [u8],
    pub idx: usize,
}

macro_rules! impl_read_le {
    ($($type:ident),*) => {
        paste! {
            $(
                #[inline]
                pub fn [<read_ $type>](&mut self) -> Option<$type> {
                    let raw = self.take(std::mem::size_of::<$type>())?;
                    Some($type::from_le_bytes(raw.try_into().ok()?))
                }
            )*
        }
    };
}

impl<'a> ByteIter<'a> {
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self { Self { bytes, idx: 0 } }
    #[inline]
    pub fn empty(&self) -> bool { self.idx >= self.bytes.len() }
    #[inline]
    pub fn has_n_left(&self, n: usize) -> bool {
        self.idx.checked_add(n).is_some_and(|end| end <= self.bytes.len())
    }
    #[inline]
    pub fn cur(&self) -> usize { self.idx }
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.idx)?;
        self.idx += 1;
        Some(b)
    }
    /// Borrows the next `n` bytes and advances past them.
    #[inline]
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if !self.has_n_left(n) { return None; }
        let out = &self.bytes[self.idx..self.idx + n];
        self.idx += n;
        Some(out)
    }

    impl_read_le!(u32, u64, i64, f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_reads_are_little_endian() {
        let bytes = [0x2A, 0, 0, 0, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut it = ByteIter::new(&bytes);
        assert_eq!(it.read_u32(), Some(42));
        assert_eq!(it.read_u64(), Some(0x0807_0605_0403_0201));
        assert!(it.empty());
    }

    #[test]
    fn short_read_does_not_move_the_cursor() {
        let bytes = [1, 2, 3];
        let mut it = ByteIter::new(&bytes);
        assert_eq!(it.read_u8(), Some(1));
        assert_eq!(it.read_u32(), None);
        assert_eq!(it.cur(), 1);
        assert_eq!(it.take(usize::MAX), None);
        assert_eq!(it.take(2), Some(&bytes[1..]));
    }
}
