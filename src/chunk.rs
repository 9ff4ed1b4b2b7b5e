//! Shareable, sliceable byte buffer.
//!
//! A [`Chunk`] is a view `[offset, offset + len)` into a reference-counted
//! backing allocation. Sharing a chunk never copies: every share holds a
//! handle to the same storage, and the storage is released when the last
//! handle is dropped. Cloning, on the other hand, always copies into a fresh
//! allocation.

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::rc::Rc;

struct Storage {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Storage {
    fn allocate(layout: Layout) -> Option<Self> {
        debug_assert!(layout.size() > 0);
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).map(|ptr| Storage { ptr, layout })
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Byte buffer with reference-counted sharing.
///
/// `Chunk` is single-threaded: it is neither `Send` nor `Sync`.
#[derive(Default)]
pub struct Chunk {
    storage: Option<Rc<Storage>>,
    offset: usize,
    len: usize,
}

impl Chunk {
    /// An empty chunk. Does not allocate.
    pub const fn empty() -> Self {
        Chunk {
            storage: None,
            offset: 0,
            len: 0,
        }
    }

    /// Allocate a zero-filled chunk of `size` bytes.
    ///
    /// Panics if the allocation fails, like `Vec::with_capacity`. Use
    /// [`Chunk::aligned`] to get the failure as an error instead.
    pub fn new(size: usize) -> Self {
        Self::aligned(1, size).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Allocate a zero-filled chunk of `size` bytes whose first byte is
    /// aligned to `alignment`.
    ///
    /// Fails with [`Error::Alloc`] if `alignment` is not a power of two or the
    /// allocator cannot satisfy the request.
    pub fn aligned(alignment: usize, size: usize) -> Result<Self> {
        let alloc_err = Error::Alloc {
            size,
            align: alignment,
        };
        let layout = Layout::from_size_align(size, alignment).map_err(|_| alloc_err)?;
        if size == 0 {
            return Ok(Chunk::empty());
        }
        let storage = Storage::allocate(layout).ok_or(Error::Alloc {
            size,
            align: alignment,
        })?;
        Ok(Chunk {
            storage: Some(Rc::new(storage)),
            offset: 0,
            len: size,
        })
    }

    /// Copy `data` into a freshly allocated chunk.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut chunk = Chunk::new(data.len());
        if let Some(dst) = chunk.get_mut() {
            dst.copy_from_slice(data);
        }
        chunk
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            // SAFETY: offset + len never exceeds the allocation size.
            Some(storage) => unsafe {
                std::slice::from_raw_parts(storage.ptr.as_ptr().add(self.offset), self.len)
            },
            None => &[],
        }
    }

    /// Create a chunk aliasing `len` bytes starting at `offset`.
    pub fn share(&self, offset: usize, len: usize) -> Result<Chunk> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(Chunk {
                storage: self.storage.clone(),
                offset: self.offset + offset,
                len,
            }),
            _ => Err(Error::OutOfRange {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    /// Create a chunk aliasing the whole visible range.
    pub fn share_all(&self) -> Chunk {
        Chunk {
            storage: self.storage.clone(),
            offset: self.offset,
            len: self.len,
        }
    }

    /// Drop the first `n` bytes from the view.
    pub fn trim_front(&mut self, n: usize) {
        assert!(n <= self.len, "trim_front({n}) past chunk end {}", self.len);
        self.offset += n;
        self.len -= n;
    }

    /// Shrink the view to its first `n` bytes.
    pub fn trim(&mut self, n: usize) {
        assert!(n <= self.len, "trim({n}) past chunk end {}", self.len);
        self.len = n;
    }

    /// Number of chunks (including this one) holding the backing storage.
    pub fn share_count(&self) -> usize {
        self.storage.as_ref().map_or(0, Rc::strong_count)
    }

    pub fn is_shared(&self) -> bool {
        self.share_count() > 1
    }

    /// Mutable access to the visible bytes, if no other chunk shares the
    /// storage.
    pub fn get_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.storage {
            Some(storage) => {
                let storage = Rc::get_mut(storage)?;
                // SAFETY: the storage is uniquely owned and offset + len is in bounds.
                Some(unsafe {
                    std::slice::from_raw_parts_mut(
                        storage.ptr.as_ptr().add(self.offset),
                        self.len,
                    )
                })
            }
            None => Some(&mut []),
        }
    }

    /// Mutable access to the visible bytes regardless of sharing.
    ///
    /// Writes are visible through every chunk sharing the same storage.
    ///
    /// # Safety
    ///
    /// No other reference into an overlapping byte range, obtained from any
    /// chunk sharing this storage, may be alive while the returned slice is.
    pub unsafe fn get_write(&mut self) -> &mut [u8] {
        match &self.storage {
            // SAFETY: bounds hold by construction; exclusivity is the caller's contract.
            Some(storage) => unsafe {
                std::slice::from_raw_parts_mut(storage.ptr.as_ptr().add(self.offset), self.len)
            },
            None => &mut [],
        }
    }
}

/// Deep copy into a fresh allocation. Use [`Chunk::share_all`] to alias.
impl Clone for Chunk {
    fn clone(&self) -> Self {
        Chunk::from_slice(self.as_slice())
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("len", &self.len)
            .field("shares", &self.share_count())
            .finish()
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Chunk) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Chunk {}

impl PartialEq<[u8]> for Chunk {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl PartialEq<&[u8]> for Chunk {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl From<&[u8]> for Chunk {
    fn from(data: &[u8]) -> Self {
        Chunk::from_slice(data)
    }
}

impl From<&str> for Chunk {
    fn from(data: &str) -> Self {
        Chunk::from_slice(data.as_bytes())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(data: Vec<u8>) -> Self {
        Chunk::from_slice(&data)
    }
}

impl From<bytes::Bytes> for Chunk {
    fn from(data: bytes::Bytes) -> Self {
        Chunk::from_slice(&data)
    }
}

impl bytes::Buf for Chunk {
    fn remaining(&self) -> usize {
        self.len
    }

    fn chunk(&self) -> &[u8] {
        self.as_slice()
    }

    fn advance(&mut self, cnt: usize) {
        self.trim_front(cnt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn test_share_aliases_storage() {
        let mut buf = Chunk::from("Hello, Chunk!");
        let shared = buf.share(1, 4).unwrap();
        assert_eq!(&shared[..], b"ello");
        assert_eq!(buf.share_count(), 2);

        // SAFETY: no borrows of `shared` are alive during the write.
        unsafe { buf.get_write()[1] = b'E' };
        assert_eq!(&shared[..], b"Ello");
        assert_eq!(shared.as_ptr(), buf[1..].as_ptr());
    }

    #[test]
    fn test_share_out_of_range() {
        let buf = Chunk::from("abcdef");
        assert!(buf.share(0, 6).is_ok());
        assert!(buf.share(6, 0).is_ok());
        match buf.share(4, 3) {
            Err(Error::OutOfRange { offset, len, size }) => {
                assert_eq!((offset, len, size), (4, 3, 6));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(buf.share(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_clone_copies() {
        let buf = Chunk::from("Hello, chunks!");
        let copy = buf.clone();
        assert_eq!(copy, buf);
        assert_ne!(copy.as_ptr(), buf.as_ptr());
        assert_eq!(buf.share_count(), 1);

        let part = buf.share(1, 4).unwrap().clone();
        assert_eq!(&part[..], b"ello");
        let range = buf.as_ptr_range();
        assert!(!range.contains(&part.as_ptr()));
    }

    #[test]
    fn test_storage_outlives_original() {
        let buf = Chunk::from("longest holder");
        let tail = buf.share(8, 6).unwrap();
        drop(buf);
        assert_eq!(tail.share_count(), 1);
        assert_eq!(&tail[..], b"holder");
    }

    #[test]
    fn test_get_mut_requires_unique() {
        let mut buf = Chunk::new(8);
        let shared = buf.share_all();
        assert!(buf.get_mut().is_none());
        drop(shared);
        buf.get_mut().unwrap()[0] = 7;
        assert_eq!(buf[0], 7);
    }

    #[test]
    fn test_trim() {
        let mut buf = Chunk::from("0123456789");
        buf.trim_front(2);
        assert_eq!(&buf[..], b"23456789");
        buf.trim(3);
        assert_eq!(&buf[..], b"234");
        buf.trim_front(3);
        assert!(buf.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_trim_front_past_end() {
        let mut buf = Chunk::from("abc");
        buf.trim_front(4);
    }

    #[test]
    fn test_aligned() {
        let buf = Chunk::aligned(16, 64).unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(buf.as_ptr() as usize % 16, 0);

        let big = Chunk::aligned(4096, 10).unwrap();
        assert_eq!(big.as_ptr() as usize % 4096, 0);

        assert!(matches!(Chunk::aligned(3, 8), Err(Error::Alloc { align: 3, .. })));
        assert!(Chunk::aligned(8, 0).unwrap().is_empty());
    }

    #[test]
    fn test_empty() {
        let buf = Chunk::empty();
        assert!(buf.is_empty());
        assert_eq!(buf.share_count(), 0);
        assert_eq!(&buf[..], b"");
        assert!(buf.share(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_buf_advance() {
        let mut buf = Chunk::from("abcdef");
        assert_eq!(buf.remaining(), 6);
        buf.advance(2);
        assert_eq!(buf.chunk(), b"cdef");
        assert_eq!(buf.get_u8(), b'c');
        assert_eq!(buf.remaining(), 3);
    }
}
