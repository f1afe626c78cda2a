use std::io::{self, Write};

/// Least-significant-bit-first bit packer.
pub(crate) struct BitWriter<W: Write> {
    buffer: u64,
    nbits: u8,
    bits_written: u64,
    writer: W,
}
impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            buffer: 0,
            nbits: 0,
            bits_written: 0,
            writer,
        }
    }

    pub fn write_bits(&mut self, bits: u64, nbits: u8) -> io::Result<()> {
        debug_assert!(nbits <= 64);
        debug_assert!(nbits == 64 || bits >> nbits == 0);

        self.buffer |= bits << self.nbits;
        self.nbits += nbits;
        self.bits_written += u64::from(nbits);

        if self.nbits >= 64 {
            self.writer.write_all(&self.buffer.to_le_bytes())?;
            self.nbits -= 64;
            self.buffer = bits.checked_shr((nbits - self.nbits) as u32).unwrap_or(0);
        }
        debug_assert!(self.nbits < 64);
        Ok(())
    }

    /// Write the first `nbits` bits of a byte string that was itself packed LSB-first.
    pub fn write_packed(&mut self, bytes: &[u8], nbits: usize) -> io::Result<()> {
        debug_assert!(nbits <= bytes.len() * 8);
        let whole = nbits / 8;
        for &byte in &bytes[..whole] {
            self.write_bits(u64::from(byte), 8)?;
        }
        let rest = (nbits % 8) as u8;
        if rest > 0 {
            self.write_bits(u64::from(bytes[whole] & ((1 << rest) - 1)), rest)?;
        }
        Ok(())
    }

    /// Zero bits that [`flush`](Self::flush) would add to reach a byte boundary.
    pub fn padding_bits(&self) -> u8 {
        (8 - self.nbits % 8) % 8
    }

    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    pub fn flush(&mut self) -> io::Result<&mut W> {
        if self.nbits % 8 != 0 {
            self.write_bits(0, 8 - self.nbits % 8)?;
        }
        if self.nbits > 0 {
            self.writer
                .write_all(&self.buffer.to_le_bytes()[..self.nbits as usize / 8])?;
            self.buffer = 0;
            self.nbits = 0;
        }
        Ok(&mut self.writer)
    }

    pub fn take(self) -> W {
        debug_assert_eq!(self.nbits, 0);
        self.writer
    }
}
