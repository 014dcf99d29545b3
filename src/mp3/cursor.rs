//! Byte and bit cursors over borrowed slices
//!
//! Both cursors only ever move forward (or to an explicit position) and never
//! panic on short input:
//! - `ByteCursor` returns `None` when a read would run past the end and
//!   leaves the position untouched.
//! - `BitCursor` returns 0 for reads past its bit limit and parks the position
//!   at the limit. Headers are decoded from buffers that were already
//!   length-checked, so "out of range reads as zero" is the simplest contract.

/// Forward-only big-endian reader over a byte slice
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the slice
    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn bytes_left(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Skip `n` bytes, clamped to the end of the slice
    pub fn skip(&mut self, n: usize) {
        self.pos += n.min(self.bytes_left());
    }

    /// Jump to an absolute offset, clamped to the end of the slice
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// Borrow the next `n` bytes and advance past them
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if n > self.bytes_left() {
            return None;
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    /// Look at the next `n` bytes without moving
    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        if n > self.bytes_left() {
            return None;
        }
        Some(&self.data[self.pos..self.pos + n])
    }

    /// Read a fixed 4-byte ASCII identifier such as `Xing` or `VBRI`
    pub fn tag(&mut self) -> Option<[u8; 4]> {
        self.take(4).map(|b| [b[0], b[1], b[2], b[3]])
    }

    pub fn byte(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn be16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn be24(&mut self) -> Option<u32> {
        self.take(3)
            .map(|b| (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]))
    }

    pub fn be32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// APE tags store their fields little-endian
    pub fn le32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// MSB-first bit reader with a permissive end-of-data contract
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    /// Position in bits from the start of `data`
    pos: usize,
    /// Number of readable bits
    limit: usize,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            limit: data.len() * 8,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bits_left(&self) -> usize {
        self.limit - self.pos
    }

    pub fn skip_bits(&mut self, n: usize) {
        self.pos += n.min(self.bits_left());
    }

    /// Read `n` bits (1..=64), most significant bit first.
    ///
    /// Returns 0 when fewer than `n` bits remain; the cursor is then moved to
    /// the limit so every later read also yields 0.
    pub fn read(&mut self, n: u32) -> u64 {
        if n == 0 || n > 64 {
            return 0;
        }
        if n as usize > self.bits_left() {
            self.pos = self.limit;
            return 0;
        }

        let mut value = 0u64;
        let mut remaining = n as usize;
        while remaining > 0 {
            let byte = self.data[self.pos / 8];
            let bit_offset = self.pos % 8;
            let available = 8 - bit_offset;
            let take = remaining.min(available);
            let shift = available - take;
            let mask = ((1u16 << take) - 1) as u8;
            value = (value << take) | u64::from((byte >> shift) & mask);
            self.pos += take;
            remaining -= take;
        }
        value
    }

    /// Convenience for fields of at most 8 bits
    pub fn read_u8(&mut self, n: u32) -> u8 {
        self.read(n.min(8)) as u8
    }

    pub fn read_flag(&mut self) -> bool {
        self.read(1) != 0
    }
}
