//! Zero-copy chain of chunks.

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// An ordered chain of [`Chunk`] fragments treated as one byte sequence.
///
/// Appending and slicing never copy payload bytes. Empty fragments are
/// never stored.
#[derive(Debug, Default)]
pub struct Packet {
    frags: VecDeque<Chunk>,
    len: usize,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn nr_frags(&self) -> usize {
        self.frags.len()
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Chunk> {
        self.frags.iter()
    }

    pub fn append(&mut self, chunk: Chunk) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.frags.push_back(chunk);
    }

    pub fn append_packet(&mut self, other: Packet) {
        self.len += other.len;
        self.frags.extend(other.frags);
    }

    /// Packet aliasing `len` bytes starting at `offset`.
    pub fn share(&self, offset: usize, len: usize) -> Result<Packet> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => {}
            _ => {
                return Err(Error::OutOfRange {
                    offset,
                    len,
                    size: self.len,
                });
            }
        }
        let mut out = Packet::new();
        let mut skip = offset;
        let mut want = len;
        for frag in &self.frags {
            if want == 0 {
                break;
            }
            if skip >= frag.len() {
                skip -= frag.len();
                continue;
            }
            let now = (frag.len() - skip).min(want);
            out.append(frag.share(skip, now)?);
            skip = 0;
            want -= now;
        }
        Ok(out)
    }

    /// Drop the first `n` bytes.
    pub fn trim_front(&mut self, mut n: usize) {
        assert!(n <= self.len, "trim_front({n}) past packet end {}", self.len);
        self.len -= n;
        while n > 0 {
            let Some(front) = self.frags.front_mut() else {
                break;
            };
            if front.len() > n {
                front.trim_front(n);
                break;
            }
            n -= front.len();
            self.frags.pop_front();
        }
    }

    pub fn into_chunks(self) -> VecDeque<Chunk> {
        self.frags
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for frag in &self.frags {
            out.extend_from_slice(frag);
        }
        out
    }
}

impl From<Chunk> for Packet {
    fn from(chunk: Chunk) -> Self {
        let mut p = Packet::new();
        p.append(chunk);
        p
    }
}

impl FromIterator<Chunk> for Packet {
    fn from_iter<I: IntoIterator<Item = Chunk>>(iter: I) -> Self {
        let mut p = Packet::new();
        for chunk in iter {
            p.append(chunk);
        }
        p
    }
}

impl bytes::Buf for Packet {
    fn remaining(&self) -> usize {
        self.len
    }

    fn chunk(&self) -> &[u8] {
        self.frags.front().map(Chunk::as_slice).unwrap_or(&[])
    }

    fn advance(&mut self, cnt: usize) {
        self.trim_front(cnt);
    }
}
