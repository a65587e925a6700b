use super::{branch_opt_util, error::PSIError};

/// Forward-only little-endian reader over a message buffer.
///
/// Every read checks the remaining length, so a truncated buffer surfaces as `MalformedMessage` instead of a panic.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ByteReader<'a> {
        ByteReader { bytes, offset: 0 }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PSIError> {
        let end = self.offset.checked_add(len).ok_or(PSIError::MalformedMessage("length field overflows"))?;
        if branch_opt_util::unlikely(end > self.bytes.len()) {
            return Err(PSIError::MalformedMessage("buffer is truncated"));
        }

        let read = &self.bytes[self.offset..end];
        self.offset = end;

        Ok(read)
    }

    pub fn read_u8(&mut self) -> Result<u8, PSIError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, PSIError> {
        let bytes = self.read_bytes(std::mem::size_of::<u32>())?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, PSIError> {
        let bytes = self.read_bytes(std::mem::size_of::<u64>())?;
        Ok(u64_from_le_bytes(bytes))
    }

    pub fn read_f64(&mut self) -> Result<f64, PSIError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Reads a `u64` length prefix which must fit in `usize` on this platform.
    pub fn read_len(&mut self) -> Result<usize, PSIError> {
        usize::try_from(self.read_u64()?).map_err(|_| PSIError::MalformedMessage("length does not fit in memory"))
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Fails unless every byte of the buffer has been consumed.
    pub fn finish(self) -> Result<(), PSIError> {
        if branch_opt_util::unlikely(self.remaining() != 0) {
            return Err(PSIError::MalformedMessage("trailing bytes after message"));
        }
        Ok(())
    }
}

/// Converts a slice of bytes into a u64 in little-endian byte order.
///
/// Reads at most 8 bytes from the input slice. If the slice is shorter than 8 bytes, it reads only the available bytes,
/// while setting other bytes to 0.
#[inline(always)]
pub fn u64_from_le_bytes(bytes: &[u8]) -> u64 {
    let mut word = 0;
    let readable_num_bytes = bytes.len().min(std::mem::size_of::<u64>());

    for (idx, &byte) in bytes.iter().enumerate().take(readable_num_bytes) {
        word |= (byte as u64) << (idx * 8);
    }

    word
}

/// Maps a uniformly random 64 -bit word onto `[0, range)` using the high half of the 128 -bit product.
#[inline(always)]
pub const fn multiply_high(word: u64, range: u64) -> u64 {
    ((word as u128 * range as u128) >> 64) as u64
}

/// Appends bits, least significant first, into a growing byte buffer.
#[derive(Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    buffer: u64,
    buf_num_bits: usize,
    bit_len: u64,
}

impl BitWriter {
    pub fn new() -> BitWriter {
        BitWriter::default()
    }

    /// Writes the low `num_bits` (<= 64) of `value`.
    pub fn write_bits(&mut self, value: u64, num_bits: usize) {
        debug_assert!(num_bits <= 64);

        let mut value = if num_bits == 64 { value } else { value & ((1u64 << num_bits) - 1) };
        let mut pending = num_bits;

        while pending > 0 {
            let fillable = (64 - self.buf_num_bits).min(pending);
            let chunk = if fillable == 64 { value } else { value & ((1u64 << fillable) - 1) };

            self.buffer |= chunk << self.buf_num_bits;
            self.buf_num_bits += fillable;
            pending -= fillable;
            value = if fillable == 64 { 0 } else { value >> fillable };

            while self.buf_num_bits >= 8 {
                self.bytes.push(self.buffer as u8);
                self.buffer >>= 8;
                self.buf_num_bits -= 8;
            }
        }

        self.bit_len += num_bits as u64;
    }

    /// Writes `count` one-bits followed by a terminating zero-bit.
    pub fn write_unary(&mut self, mut count: u64) {
        while count >= 64 {
            self.write_bits(u64::MAX, 64);
            count -= 64;
        }

        self.write_bits((1u64 << count) - 1, count as usize);
        self.write_bits(0, 1);
    }

    /// Flushes pending bits, zero padded to a full byte, and returns (bytes, number of meaningful bits).
    pub fn finish(mut self) -> (Vec<u8>, u64) {
        if self.buf_num_bits > 0 {
            self.bytes.push(self.buffer as u8);
        }
        (self.bytes, self.bit_len)
    }
}

/// Reads back a bit stream produced by `BitWriter`, never past `bit_len`.
pub struct BitReader<'a> {
    bytes: &'a [u8],
    bit_len: u64,
    position: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8], bit_len: u64) -> BitReader<'a> {
        BitReader { bytes, bit_len, position: 0 }
    }

    #[inline(always)]
    fn read_bit(&mut self) -> Option<bool> {
        if self.position >= self.bit_len {
            return None;
        }

        let byte = *self.bytes.get((self.position / 8) as usize)?;
        let bit = (byte >> (self.position % 8)) & 1;
        self.position += 1;

        Some(bit == 1)
    }

    pub fn read_bits(&mut self, num_bits: usize) -> Option<u64> {
        debug_assert!(num_bits <= 64);

        let mut value = 0u64;
        for idx in 0..num_bits {
            if self.read_bit()? {
                value |= 1u64 << idx;
            }
        }

        Some(value)
    }

    /// Counts one-bits up to the terminating zero-bit.
    pub fn read_unary(&mut self) -> Option<u64> {
        let mut count = 0u64;
        while self.read_bit()? {
            count += 1;
        }
        Some(count)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == self.bit_len
    }
}

#[cfg(test)]
mod test {
    use crate::psi_internals::{
        error::PSIError,
        serialization::{BitReader, BitWriter, ByteReader, multiply_high},
    };
    use test_case::test_case;

    #[test]
    fn bit_stream_recovers_mixed_width_fields() {
        let fields: [(u64, usize); 7] = [(0b1, 1), (0, 3), (0x1f, 5), (u64::MAX, 64), (0xdead_beef, 32), (0, 0), (0x3, 2)];

        let mut writer = BitWriter::new();
        for &(value, width) in &fields {
            writer.write_bits(value, width);
        }
        writer.write_unary(0);
        writer.write_unary(70);

        let (bytes, bit_len) = writer.finish();
        assert_eq!(bit_len, 1 + 3 + 5 + 64 + 32 + 2 + 1 + 71);
        assert_eq!(bytes.len() as u64, bit_len.div_ceil(8));

        let mut reader = BitReader::new(&bytes, bit_len);
        for &(value, width) in &fields {
            assert_eq!(reader.read_bits(width), Some(value));
        }
        assert_eq!(reader.read_unary(), Some(0));
        assert_eq!(reader.read_unary(), Some(70));
        assert!(reader.is_exhausted());
        assert_eq!(reader.read_bits(1), None);
    }

    #[test]
    fn unary_run_without_terminator_is_detected() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b111, 3);
        let (bytes, bit_len) = writer.finish();

        assert_eq!(BitReader::new(&bytes, bit_len).read_unary(), None);
    }

    #[test_case(&[1, 0, 0, 0] => matches Ok(1); "Exact width read succeeds")]
    #[test_case(&[1, 0, 0] => matches Err(PSIError::MalformedMessage(_)); "Truncated buffer is rejected")]
    fn byte_reader_checks_bounds(bytes: &[u8]) -> Result<u32, PSIError> {
        ByteReader::new(bytes).read_u32()
    }

    #[test]
    fn byte_reader_rejects_trailing_bytes() {
        let mut reader = ByteReader::new(&[1, 2]);
        assert_eq!(reader.read_u8(), Ok(1));
        assert!(matches!(reader.finish(), Err(PSIError::MalformedMessage(_))));
    }

    #[test_case(0, 100 => 0; "Zero word maps to start of range")]
    #[test_case(u64::MAX, 100 => 99; "Largest word maps to end of range")]
    #[test_case(1u64 << 63, 100 => 50; "Middle word maps to middle of range")]
    #[test_case(12345, 1 => 0; "Unit range always maps to zero")]
    fn multiply_high_reduces_into_range(word: u64, range: u64) -> u64 {
        multiply_high(word, range)
    }
}
