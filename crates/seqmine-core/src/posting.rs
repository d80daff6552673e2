//! Byte-encoded posting lists.
//!
//! A posting list is an append-only byte buffer holding a sequence of
//! postings; each posting is a sequence of non-negative integers. Values are
//! stored as `v + 1` in little-endian base-128 varints (7 payload bits per
//! byte, continuation bit set on all but the last byte), so the literal byte
//! `0` never appears inside a value and serves unambiguously as the
//! inter-posting separator.

/// Append-only posting buffer (the write side).
#[derive(Debug, Default, Clone)]
pub struct PostingList {
    data: Vec<u8>,
    num_postings: usize,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList::default()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.num_postings = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn num_postings(&self) -> usize {
        self.num_postings
    }

    pub fn num_bytes(&self) -> usize {
        self.data.len()
    }

    /// Start a new posting. Writes a single separator byte between postings,
    /// none before the first.
    pub fn new_posting(&mut self) {
        if !self.data.is_empty() {
            self.data.push(0);
        }
        self.num_postings += 1;
    }

    /// Append one non-negative integer to the current posting.
    pub fn add_non_negative(&mut self, value: u32) {
        debug_assert!(self.num_postings > 0, "add before new_posting");
        debug_assert!(value < u32::MAX, "value out of encodable range");
        let mut v = value + 1;
        loop {
            let b = (v & 0x7F) as u8;
            if v == b as u32 {
                self.data.push(b);
                return;
            }
            self.data.push(b | 0x80);
            v >>= 7;
        }
    }

    pub fn iter(&self) -> PostingListIter<'_> {
        PostingListIter {
            data: &self.data,
            offset: 0,
        }
    }
}

/// Read cursor over a posting list. Never aliased with the write side.
#[derive(Debug, Clone)]
pub struct PostingListIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PostingListIter<'a> {
    /// True while the current posting has more integers.
    pub fn has_next(&self) -> bool {
        self.offset < self.data.len() && self.data[self.offset] != 0
    }

    /// Decode the next integer of the current posting.
    pub fn next_non_negative(&mut self) -> u32 {
        let mut result: u32 = 0;
        let mut shift = 0;
        loop {
            debug_assert!(self.offset < self.data.len(), "posting read past boundary");
            let b = self.data[self.offset];
            self.offset += 1;
            result += ((b & 0x7F) as u32) << shift;
            if b & 0x80 == 0 {
                break;
            }
            shift += 7;
            debug_assert!(shift < 32);
        }
        debug_assert!(result > 0, "read a separator as a value");
        result - 1
    }

    /// Skip the rest of the current posting and consume the separator.
    /// Returns true if another posting follows. Do not use for the first
    /// posting.
    pub fn next_posting(&mut self) -> bool {
        while self.offset < self.data.len() && self.data[self.offset] != 0 {
            self.offset += 1;
        }
        if self.offset >= self.data.len() {
            return false;
        }
        self.offset += 1; // separator
        self.offset < self.data.len()
    }
}
