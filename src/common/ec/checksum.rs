use crate::common::{
    bitstream::BitStream,
    error::{GridError, GridResult},
};

/// Sum of the 8-bit blocks of `data` modulo 2^n, as an n-bit big-endian value.
/// A trailing short block is zero padded on the right.
pub fn checksum_ecc(data: &BitStream, n: usize) -> GridResult<BitStream> {
    if n == 0 || n % 8 != 0 {
        return Err(GridError::InvalidChecksumSize(n));
    }

    let sum = data.data().iter().fold(0u64, |acc, &b| acc + b as u64);
    let sum = if n < 64 { sum & ((1u64 << n) - 1) } else { sum };

    let mut bs = BitStream::new(n);
    bs.pad_to(n.saturating_sub(64));
    bs.push_bits(sum, n.min(64));
    Ok(bs)
}

pub fn verify_checksum(data: &BitStream, ecc: &BitStream) -> GridResult<()> {
    if ecc.is_empty() {
        return Ok(());
    }
    if ecc.len() % 8 != 0 {
        return Err(GridError::ChecksumMismatch);
    }
    if checksum_ecc(data, ecc.len())? != *ecc {
        return Err(GridError::ChecksumMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod checksum_tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::{checksum_ecc, verify_checksum};
    use crate::common::{bitstream::BitStream, error::GridError};

    #[test_case("0000000100000010", 8, "00000011")]
    #[test_case("1111111100000001", 8, "00000000")]
    #[test_case("1111111100000001", 16, "0000000100000000")]
    #[test_case("101", 8, "10100000")]
    #[test_case("", 8, "00000000")]
    fn test_checksum(data: &str, n: usize, exp: &str) {
        let data = BitStream::from_bit_str(data).unwrap();
        assert_eq!(checksum_ecc(&data, n).unwrap().to_string(), exp);
    }

    #[test_case(0)]
    #[test_case(12)]
    fn test_invalid_size(n: usize) {
        let data = BitStream::from_bit_str("01").unwrap();
        assert_eq!(checksum_ecc(&data, n), Err(GridError::InvalidChecksumSize(n)));
    }

    #[test]
    fn test_wide_checksum() {
        let data = BitStream::from(&[0xFF; 10]);
        let ecc = checksum_ecc(&data, 96).unwrap();
        assert_eq!(ecc.len(), 96);
        let exp = format!("{}{:016b}", "0".repeat(80), 2550);
        assert_eq!(ecc.to_string(), exp);
    }

    #[test]
    fn test_verify() {
        let data = BitStream::from(b"checksum");
        let ecc = checksum_ecc(&data, 16).unwrap();
        assert_eq!(verify_checksum(&data, &ecc), Ok(()));
        assert_eq!(verify_checksum(&data, &BitStream::default()), Ok(()));

        let bad = BitStream::from(b"chfcksum");
        assert_eq!(verify_checksum(&bad, &ecc), Err(GridError::ChecksumMismatch));
        let short = BitStream::from_bit_str("0101").unwrap();
        assert_eq!(verify_checksum(&data, &short), Err(GridError::ChecksumMismatch));
    }

    proptest! {
        #[test]
        fn proptest_single_bit_flip_detected(
            data in prop::collection::vec(any::<u8>(), 1..64),
            flip in any::<usize>(),
        ) {
            let orig = BitStream::from(&data);
            let ecc = checksum_ecc(&orig, 8).unwrap();
            let pos = flip % orig.len();
            let flipped = BitStream::from_bits(orig.iter().enumerate().map(|(i, b)| b ^ (i == pos)));
            prop_assert_eq!(verify_checksum(&flipped, &ecc), Err(GridError::ChecksumMismatch));
            prop_assert_eq!(checksum_ecc(&orig, 8).unwrap(), ecc);
        }
    }
}
