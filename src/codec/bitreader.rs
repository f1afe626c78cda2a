use crate::error::{Error, Result};

/// Least-significant-bit-first reader over a bounded bit range of a byte slice.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            end: data.len() * 8,
        }
    }

    /// Read the bits `start_bit..len*8 - ignore_end_bits`.
    pub fn with_range(data: &'a [u8], start_bit: usize, ignore_end_bits: usize) -> Result<Self> {
        let end = (data.len() * 8)
            .checked_sub(ignore_end_bits)
            .filter(|&end| end >= start_bit)
            .ok_or(Error::InvalidSize("bit range exceeds the input"))?;
        Ok(Self {
            data,
            position: start_bit,
            end,
        })
    }

    pub fn available(&self) -> usize {
        self.end - self.position
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Return the next `nbits` bits without consuming them. Bits past the end read as zero.
    pub fn peek(&self, nbits: u8) -> u64 {
        debug_assert!(nbits <= 56);
        let byte = self.position / 8;
        let mut chunk = [0u8; 8];
        if byte < self.data.len() {
            let n = (self.data.len() - byte).min(8);
            chunk[..n].copy_from_slice(&self.data[byte..byte + n]);
        }
        let value = u64::from_le_bytes(chunk) >> (self.position % 8);
        let mut mask = (1u64 << nbits) - 1;
        let available = self.available();
        if available < nbits as usize {
            mask &= (1u64 << available) - 1;
        }
        value & mask
    }

    pub fn consume(&mut self, nbits: u8) {
        debug_assert!(nbits as usize <= self.available());
        self.position += nbits as usize;
    }

    pub fn read_bits(&mut self, nbits: u8) -> Result<u32> {
        if self.available() < nbits as usize {
            return Err(Error::CorruptData("unexpected end of input"));
        }
        let value = self.peek(nbits) as u32;
        self.consume(nbits);
        Ok(value)
    }

    pub fn align_to_byte(&mut self) {
        self.position = (self.position + 7) / 8 * 8;
        self.position = self.position.min(self.end);
    }

    /// Read whole bytes. The reader must be byte aligned.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.position % 8, 0);
        if self.available() / 8 < len {
            return Err(Error::CorruptData("unexpected end of input"));
        }
        let start = self.position / 8;
        self.position += len * 8;
        Ok(&self.data[start..start + len])
    }

    /// Bytes touched so far, counting a partially read byte.
    pub fn bytes_consumed(&self) -> usize {
        (self.position + 7) / 8
    }

    /// Unread bits left in the current byte.
    pub fn unread_bits_in_byte(&self) -> u8 {
        ((8 - self.position % 8) % 8) as u8
    }
}
