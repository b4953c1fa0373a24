//! This is a growable byte queue used for a socket's inbound data and its pending writes.
//!
//! Its salient points are:
//!
//! * backed by a deque of reference-counted [Bytes] chunks, so handing a chunk over (or taking
//!    one out) does not copy
//! * insert at both ends - inserting at the front is for 'un-consuming' data that was read
//!    prematurely
//! * consuming reads from the front only
//! * delimiter search across chunk boundaries
//! * implements [Buf] to fit into the `bytes` ecosystem
//!
//! There is no internal synchronization: the owner is responsible for serializing access.

use std::cmp::min;
use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use bytes::{Buf, Bytes, BytesMut};

/// chunks below this size are merged by [ByteBuffer::append_back_compacting]
pub const COMPACTION_LIMIT: usize = 256;

#[derive(Default, Clone)]
pub struct ByteBuffer {
    /// NB: there are never empty chunks in here
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl ByteBuffer {
    pub fn new() -> ByteBuffer {
        Default::default()
    }

    /// Insert at the start of the buffer, taking ownership of exactly this memory
    pub fn push_front(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.len += bytes.len();
        self.chunks.push_front(bytes);
    }

    /// Insert a copy of the data at the start of the buffer
    pub fn push_front_copied(&mut self, bytes: &[u8]) {
        self.push_front(Bytes::copy_from_slice(bytes));
    }

    /// Insert at the end of the buffer, taking ownership of exactly this memory
    pub fn append_back(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.len += bytes.len();
        self.chunks.push_back(bytes);
    }

    /// Insert at the end of the buffer, keeping small chunks small: A chunk shorter than
    ///  [COMPACTION_LIMIT] is copied, and merged into the last chunk if that is small as well. So
    ///  data that trickles in does not pin larger allocations, and the number of chunks stays
    ///  proportional to the number of bytes.
    pub fn append_back_compacting(&mut self, bytes: Bytes) {
        if bytes.len() >= COMPACTION_LIMIT {
            self.append_back(bytes);
            return;
        }
        if bytes.is_empty() {
            return;
        }

        if let Some(last) = self.chunks.back_mut() {
            if last.len() + bytes.len() <= COMPACTION_LIMIT {
                let mut merged = BytesMut::with_capacity(last.len() + bytes.len());
                merged.extend_from_slice(last);
                merged.extend_from_slice(&bytes);
                *last = merged.freeze();
                self.len += bytes.len();
                return;
            }
        }
        self.append_back(Bytes::copy_from_slice(&bytes));
    }

    /// Insert a copy of the data at the end of the buffer
    pub fn append_back_copied(&mut self, bytes: &[u8]) {
        self.append_back(Bytes::copy_from_slice(bytes));
    }

    /// Move all of another buffer's content to the end of this buffer without copying
    pub fn append_buffer(&mut self, other: ByteBuffer) {
        self.len += other.len;
        self.chunks.extend(other.chunks);
    }

    /// Copy up to `dest.len()` bytes from the start of the buffer, removing them. Returns the
    ///  number of bytes that were actually read, which is 0 if the buffer is empty.
    pub fn read_front(&mut self, dest: &mut [u8]) -> usize {
        let num_read = min(dest.len(), self.len);
        self.copy_to_slice(&mut dest[..num_read]);
        num_read
    }

    /// Remove exactly `n` bytes from the start of the buffer and return them. This does not copy
    ///  if the bytes are contained in a single chunk.
    ///
    /// Panics if the buffer contains less than `n` bytes.
    pub fn split_front(&mut self, n: usize) -> Bytes {
        assert!(n <= self.len, "splitting {} bytes from a buffer of length {}", n, self.len);

        if let Some(first) = self.chunks.front_mut() {
            if first.len() >= n {
                let result = first.split_to(n);
                if first.is_empty() {
                    self.chunks.pop_front();
                }
                self.len -= n;
                return result;
            }
        }

        let mut result = BytesMut::with_capacity(n);
        while result.len() < n {
            let chunk = self.chunk();
            let num_taken = min(chunk.len(), n - result.len());
            result.extend_from_slice(&chunk[..num_taken]);
            self.advance(num_taken);
        }
        result.freeze()
    }

    /// Returns the offset of the first occurrence of `delimiter`, or `None` if there is none. An
    ///  empty delimiter never matches.
    pub fn position_of(&self, delimiter: &[u8]) -> Option<usize> {
        if delimiter.is_empty() {
            return None;
        }

        let mut chunk_start = 0;
        for (chunk_idx, chunk) in self.chunks.iter().enumerate() {
            for (offs, &b) in chunk.iter().enumerate() {
                if chunk_start + offs + delimiter.len() > self.len {
                    // not enough data left for a match
                    return None;
                }
                if b == delimiter[0] && self.matches_at(chunk_idx, offs, delimiter) {
                    return Some(chunk_start + offs);
                }
            }
            chunk_start += chunk.len();
        }
        None
    }

    fn matches_at(&self, chunk_idx: usize, offs: usize, delimiter: &[u8]) -> bool {
        let mut remaining = delimiter;
        let mut offs = offs;

        for chunk in self.chunks.range(chunk_idx..) {
            let available = &chunk[offs..];
            let n = min(available.len(), remaining.len());
            if available[..n] != remaining[..n] {
                return false;
            }
            remaining = &remaining[n..];
            if remaining.is_empty() {
                return true;
            }
            offs = 0;
        }
        false
    }

    /// Remove and return all data up to the first occurrence of `delimiter`. The delimiter is
    ///  consumed in either case, and it is part of the returned data iff `include_delimiter` is
    ///  set.
    ///
    /// If the delimiter is not found, the buffer is left untouched and `None` is returned.
    pub fn find_and_slice_up_to(&mut self, delimiter: &[u8], include_delimiter: bool) -> Option<Bytes> {
        let pos = self.position_of(delimiter)?;

        if include_delimiter {
            Some(self.split_front(pos + delimiter.len()))
        }
        else {
            let result = self.split_front(pos);
            self.advance(delimiter.len());
            Some(result)
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Buf for ByteBuffer {
    fn remaining(&self) -> usize {
        self.len
    }

    fn chunk(&self) -> &[u8] {
        match self.chunks.front() {
            Some(first) => first.as_ref(),
            None => &[],
        }
    }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= self.len, "advancing {} bytes in a buffer of length {}", cnt, self.len);

        self.len -= cnt;
        let mut cnt = cnt;
        while cnt > 0 {
            let Some(first) = self.chunks.front_mut() else {
                break;
            };
            if first.len() > cnt {
                first.advance(cnt);
                return;
            }
            cnt -= first.len();
            self.chunks.pop_front();
        }
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        self.split_front(len)
    }
}

impl Debug for ByteBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len)
            .field("chunks", &self.chunks)
            .finish()
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(value: Bytes) -> Self {
        let mut result = ByteBuffer::new();
        result.append_back(value);
        result
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(value: Vec<u8>) -> Self {
        Bytes::from(value).into()
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(value: &[u8]) -> Self {
        let mut result = ByteBuffer::new();
        result.append_back_copied(value);
        result
    }
}
