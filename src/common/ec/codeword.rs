use super::{encoder::ecc, MAX_RS_SYMBOLS};

/// One Reed-Solomon codeword: data symbols followed by parity symbols.
#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct Codeword {
    pub(super) bytes: Vec<u8>,
    data_len: usize,
}

impl Codeword {
    pub fn encode(data: &[u8], parity_len: usize) -> Self {
        Self::from_parts(data, &ecc(data, parity_len))
    }

    pub fn from_parts(data: &[u8], parity: &[u8]) -> Self {
        debug_assert!(
            data.len() + parity.len() <= MAX_RS_SYMBOLS,
            "Codeword too long: Data {}, Parity {}",
            data.len(),
            parity.len()
        );
        let bytes = [data, parity].concat();
        Self { bytes, data_len: data.len() }
    }

    pub fn parity_len(&self) -> usize {
        self.bytes.len() - self.data_len
    }

    pub fn symbols(&self) -> &[u8] {
        &self.bytes
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.data_len]
    }

    pub fn parity(&self) -> &[u8] {
        &self.bytes[self.data_len..]
    }
}
