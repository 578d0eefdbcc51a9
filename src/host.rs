#![allow(unsafe_code)]

use std::marker::PhantomData;

use crate::tape::len_u32;

// A zero-length view is always valid and never dereferenced, whatever its address.
pub trait HostMemory {
    fn view(&self, addr: u64, len: u32) -> Option<&[u8]>;
}

/// Borrowed view of host bytes, valid for `'a`.
#[derive(Clone, Copy)]
pub struct HostBytes<'a> {
    ptr: *const u8,
    len: u32,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> HostBytes<'a> {
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        let len = len_u32(bytes.len());
        let ptr = if len == 0 { std::ptr::null() } else { bytes.as_ptr() };
        Self { ptr, len, _marker: PhantomData }
    }

    /// # Safety
    /// When `len > 0`, `addr` must point to `len` initialized bytes that stay valid and unmodified
    /// for `'a`.
    pub unsafe fn from_raw_parts(addr: u64, len: u32) -> Self {
        Self { ptr: addr as usize as *const u8, len, _marker: PhantomData }
    }

    #[inline]
    pub fn addr(&self) -> u64 { self.ptr as usize as u64 }
    #[inline]
    pub fn len(&self) -> u32 { self.len }
    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn as_slice(&self) -> &'a [u8] {
        if self.len == 0 || self.ptr.is_null() { return &[]; }
        // SAFETY: both constructors guarantee `len` valid bytes at `ptr` for `'a`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len as usize) }
    }
}

impl std::fmt::Debug for HostBytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HostBytes(0x{:016x}, {})", self.addr(), self.len)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrustedHost<'a> {
    _marker: PhantomData<&'a [u8]>,
}

impl TrustedHost<'_> {
    /// # Safety
    /// Every non-empty pointer operand of every tape executed with this policy must satisfy the
    /// contract of [`HostBytes::from_raw_parts`] for the duration of the call.
    pub unsafe fn new() -> Self { Self { _marker: PhantomData } }
}

impl HostMemory for TrustedHost<'_> {
    #[inline]
    fn view(&self, addr: u64, len: u32) -> Option<&[u8]> {
        if len == 0 { return Some(&[]); }
        if addr == 0 || usize::try_from(addr).is_err() { return None; }
        // SAFETY: upheld by the caller of `TrustedHost::new`.
        Some(unsafe { HostBytes::from_raw_parts(addr, len) }.as_slice())
    }
}

/// One contiguous host region mapped at `base`.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    base: u64,
    bytes: &'a [u8],
}

impl<'a> Segment<'a> {
    pub fn new(base: u64, bytes: &'a [u8]) -> Self { Self { base, bytes } }

    pub fn base(&self) -> u64 { self.base }
    pub fn size(&self) -> usize { self.bytes.len() }
}

impl HostMemory for Segment<'_> {
    #[inline]
    fn view(&self, addr: u64, len: u32) -> Option<&[u8]> {
        if len == 0 { return Some(&[]); }
        let start = usize::try_from(addr.checked_sub(self.base)?).ok()?;
        let end = start.checked_add(len as usize)?;
        self.bytes.get(start..end)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPointers;

impl HostMemory for NoPointers {
    #[inline]
    fn view(&self, _addr: u64, len: u32) -> Option<&[u8]> {
        if len == 0 { Some(&[]) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_bytes_round_trip_through_address() {
        let text = b"hello";
        let view = HostBytes::from_slice(text);
        let host = unsafe { TrustedHost::new() };
        assert_eq!(host.view(view.addr(), view.len()), Some(&text[..]));
    }

    #[test]
    fn empty_view_never_dereferences() {
        let empty = HostBytes::from_slice(b"");
        assert_eq!(empty.addr(), 0);
        assert_eq!(empty.as_slice(), b"");
        let host = unsafe { TrustedHost::new() };
        assert_eq!(host.view(0xdead_beef, 0), Some(&[][..]));
        assert_eq!(NoPointers.view(0xdead_beef, 0), Some(&[][..]));
    }

    #[test]
    fn trusted_host_rejects_null_with_length() {
        let host = unsafe { TrustedHost::new() };
        assert_eq!(host.view(0, 4), None);
    }

    #[test]
    fn segment_bounds_are_checked() {
        let data = b"abcdef";
        let seg = Segment::new(0x100, data);
        assert_eq!(seg.view(0x100, 3), Some(&b"abc"[..]));
        assert_eq!(seg.view(0x103, 3), Some(&b"def"[..]));
        assert_eq!(seg.view(0x104, 3), None);
        assert_eq!(seg.view(0xFF, 1), None);
        assert_eq!(seg.view(u64::MAX, 1), None);
    }

    #[test]
    fn no_pointers_rejects_content() {
        assert_eq!(NoPointers.view(0x1000, 1), None);
    }
}
