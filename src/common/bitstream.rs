use std::fmt::{Display, Formatter};
use std::mem;
use std::ops::Range;

use num_traits::PrimInt;

use super::error::{GridError, GridResult};

// Bit stream
//------------------------------------------------------------------------------

/// MSB-first growable bit buffer. Bits past `len` are always zero.
#[derive(Debug, Clone, Default)]
pub struct BitStream {
    data: Vec<u8>,
    // Bit length
    len: usize,
    // Pointer to take bits
    cursor: usize,
}

impl BitStream {
    pub fn new(capacity: usize) -> Self {
        Self { data: Vec::with_capacity((capacity + 7) >> 3), len: 0, cursor: 0 }
    }

    pub fn from(inp: &[u8]) -> Self {
        Self { data: inp.to_vec(), len: inp.len() << 3, cursor: 0 }
    }

    /// Parses a string of '0' and '1' characters.
    pub fn from_bit_str(s: &str) -> GridResult<Self> {
        let mut bs = Self::new(s.len());
        for ch in s.chars() {
            match ch {
                '0' => bs.push(false),
                '1' => bs.push(true),
                _ => return Err(GridError::InvalidBitString),
            }
        }
        Ok(bs)
    }

    pub fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
        let mut bs = Self::default();
        bits.into_iter().for_each(|b| bs.push(b));
        bs
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backing bytes, trailing partial byte zero padded.
    pub fn data(&self) -> &[u8] {
        &self.data[..(self.len + 7) >> 3]
    }

    pub fn get(&self, pos: usize) -> bool {
        debug_assert!(pos < self.len, "Out of bitstream bounds: Len {}, Pos {}", self.len, pos);
        (self.data[pos >> 3] << (pos & 7)) & 0b10000000 != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.get(i))
    }

    /// Copies the bits in `range` into a new stream.
    pub fn slice(&self, range: Range<usize>) -> Self {
        debug_assert!(range.end <= self.len, "Slice out of bounds: Len {}, End {}", self.len, range.end);
        Self::from_bits(range.map(|i| self.get(i)))
    }
}

impl PartialEq for BitStream {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.data() == other.data()
    }
}

impl Eq for BitStream {}

impl Display for BitStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s: String = self.iter().map(|b| if b { '1' } else { '0' }).collect();
        f.write_str(&s)
    }
}

// Push bits for bit stream
//------------------------------------------------------------------------------

impl BitStream {
    /// Appends the lowest `size` bits of `bits`, most significant first.
    pub fn push_bits<T>(&mut self, bits: T, size: usize)
    where
        T: PrimInt + Display,
    {
        let max_bits = mem::size_of::<T>() * 8;
        debug_assert!(size <= max_bits, "Size exceeds type width: Size {size}, Width {max_bits}");
        debug_assert!(
            size >= max_bits - bits.leading_zeros() as usize,
            "Bit count shouldn't exceed bit length: Length {size}, Bits {bits}"
        );

        for i in (0..size).rev() {
            self.push((bits >> i) & T::one() == T::one());
        }
    }

    pub fn push(&mut self, bit: bool) {
        let offset = self.len & 7;
        if offset == 0 {
            self.data.truncate(self.len >> 3);
            self.data.push(0);
        }
        if bit {
            let pos = self.len >> 3;
            self.data[pos] |= 0b10000000 >> offset;
        }
        self.len += 1;
    }

    pub fn extend(&mut self, arr: &[u8]) {
        if self.len & 7 == 0 {
            self.data.truncate(self.len >> 3);
            self.data.extend_from_slice(arr);
            self.len += arr.len() << 3;
        } else {
            arr.iter().for_each(|&b| self.push_bits(b, 8));
        }
    }

    pub fn append(&mut self, other: &BitStream) {
        other.iter().for_each(|b| self.push(b));
    }

    /// Appends zero bits until the stream is `len` bits long.
    pub fn pad_to(&mut self, len: usize) {
        while self.len < len {
            self.push(false);
        }
    }
}


// Take bits for bit stream
//------------------------------------------------------------------------------

impl BitStream {
    pub fn take_bits(&mut self, n: usize) -> Option<u64> {
        debug_assert!(n <= 64, "Cannot take more than 64 bits: N {n}");

        if self.cursor + n > self.len {
            return None;
        }

        let mut res = 0u64;
        for i in self.cursor..self.cursor + n {
            res = (res << 1) | self.get(i) as u64;
        }

        self.cursor += n;
        Some(res)
    }

    pub fn take(&mut self) -> Option<bool> {
        if self.cursor == self.len {
            return None;
        }

        let bit = self.get(self.cursor);
        self.cursor += 1;
        Some(bit)
    }

    /// Takes the next `n` bits as a new stream.
    pub fn take_stream(&mut self, n: usize) -> Option<BitStream> {
        if self.cursor + n > self.len {
            return None;
        }
        let res = self.slice(self.cursor..self.cursor + n);
        self.cursor += n;
        Some(res)
    }
}

#[cfg(test)]
mod bit_stream_take_tests {

    use super::BitStream;

    #[test]
    fn test_take_bits() {
        let data = [
            0b11010010, 0b00110100, 0b10001101, 0b00100011, 0b01001000, 0b11010010, 0b00110100,
            0b10001101, 0b00100011, 0b01001000, 0b11010010, 0b00110100, 0b10001100,
        ];
        let mut bs = BitStream::from(&data);
        assert_eq!(bs.take_bits(0), Some(0));
        assert_eq!(bs.take_bits(4), Some(0b1101));
        assert_eq!(bs.take_bits(4), Some(0b0010));
        assert_eq!(bs.take_bits(8), Some(0b00110100));
        assert_eq!(bs.take_bits(9), Some(0b100011010));
        assert_eq!(bs.take_bits(7), Some(0b0100011));
        assert_eq!(bs.take_bits(16), Some(0b01001000_11010010));
        assert_eq!(bs.take_bits(1), Some(0b0));
        assert_eq!(bs.take_bits(11), Some(0b01101001000));
        assert_eq!(bs.take_bits(14), Some(0b11010010001101));
        assert_eq!(bs.take_bits(16), Some(0b0010001101001000));
        assert_eq!(bs.take_bits(4), Some(0b1101));
        assert_eq!(bs.take_bits(4), Some(0b0010));
        assert_eq!(bs.take_bits(6), Some(0b001100));
        assert_eq!(bs.take(), None);
    }

    #[test]
    fn test_take_bits_over_len() {
        let mut bs = BitStream::from(&[0xAB]);
        assert_eq!(bs.take_bits(9), None);
        assert_eq!(bs.take_bits(8), Some(0xAB));
    }

    #[test]
    fn test_take_stream() {
        let mut bs = BitStream::from_bit_str("110010").unwrap();
        assert_eq!(bs.take_stream(2).unwrap().to_string(), "11");
        assert_eq!(bs.take_stream(4).unwrap().to_string(), "0010");
        assert!(bs.take_stream(1).is_none());
    }
}
