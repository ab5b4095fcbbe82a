mod codeword;
mod checksum;
mod decoder;
mod encoder;
mod galois;

pub(crate) use codeword::*;
pub use checksum::*;

use super::{
    bitstream::BitStream,
    error::{GridError, GridResult},
};

pub const MAX_RS_SYMBOLS: usize = 255;

// Split size for payloads spanning several blocks; keeps every evenly split
// block, data plus ecc, within MAX_RS_SYMBOLS
const RS_SPLIT_SIZE: usize = 253;

// Ecc mode
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum EccMode {
    #[default]
    Checksum,
    ReedSolomon,
}

// Single block Reed-Solomon over bit streams
//------------------------------------------------------------------------------

/// Parity bytes of one RS codeword over the bytes of `data_bits`.
pub fn reed_solomon_ecc(data_bits: &BitStream, k_symbols: usize) -> GridResult<BitStream> {
    let data = data_bits.data();
    let total = data.len() + k_symbols;
    if total > MAX_RS_SYMBOLS {
        return Err(GridError::RsBlockTooLong(total));
    }
    Ok(BitStream::from(&encoder::ecc(data, k_symbols)))
}

/// Verifies one RS codeword and returns the corrected data bits. Up to half
/// as many byte errors as there are parity bytes are corrected.
pub fn reed_solomon_correct(data_bits: &BitStream, ecc_bits: &BitStream) -> GridResult<BitStream> {
    let (data, parity) = (data_bits.data(), ecc_bits.data());
    let total = data.len() + parity.len();
    if total > MAX_RS_SYMBOLS {
        return Err(GridError::RsBlockTooLong(total));
    }
    let mut cw = Codeword::from_parts(data, parity);
    let mut res = BitStream::from(cw.correct()?);
    if data_bits.len() < res.len() {
        res = res.slice(0..data_bits.len());
    }
    Ok(res)
}

// Multi block layout
//------------------------------------------------------------------------------

/// Per block (data, ecc) sizes. A single block is used whenever it fits,
/// otherwise bytes are spread evenly with earlier blocks taking the remainder.
pub fn block_layout(data_len: usize, ecc_len: usize) -> Vec<(usize, usize)> {
    let total = data_len + ecc_len;
    if total <= MAX_RS_SYMBOLS {
        return vec![(data_len, ecc_len)];
    }

    let count = total.div_ceil(RS_SPLIT_SIZE);
    (0..count)
        .map(|i| {
            let d = data_len / count + usize::from(i < data_len % count);
            let e = ecc_len / count + usize::from(i < ecc_len % count);
            (d, e)
        })
        .collect()
}

/// Ecc bytes for `message`, block by block, concatenated in block order.
pub fn rs_encode(message: &[u8], ecc_len: usize) -> Vec<u8> {
    let mut res = Vec::with_capacity(ecc_len);
    let mut offset = 0;
    for (d, e) in block_layout(message.len(), ecc_len) {
        let cw = Codeword::encode(&message[offset..offset + d], e);
        res.extend_from_slice(cw.parity());
        offset += d;
    }
    res
}

/// Corrects `message` against `ecc` laid out by [`rs_encode`]. Capacity is per
/// block: each block fixes up to half its own parity bytes, so errors bunched
/// into one block fail with `TooManyErrors` below the whole-message bound.
pub fn rs_correct(message: &[u8], ecc: &[u8]) -> GridResult<Vec<u8>> {
    let mut res = Vec::with_capacity(message.len());
    let (mut doff, mut eoff) = (0, 0);
    for (d, e) in block_layout(message.len(), ecc.len()) {
        let mut cw = Codeword::from_parts(&message[doff..doff + d], &ecc[eoff..eoff + e]);
        res.extend_from_slice(cw.correct()?);
        doff += d;
        eoff += e;
    }
    Ok(res)
}
