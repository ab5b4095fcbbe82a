use encoding_rs::UTF_8;
use rand::Rng;

use super::{
    bitstream::BitStream,
    error::{GridError, GridResult},
    metadata::MetadataConfig,
};

// Text framing
//------------------------------------------------------------------------------

/// UTF-8 encodes `text` and right pads it with zero bits to `target_len`.
pub fn text_to_padded_bits(text: &str, target_len: usize) -> GridResult<BitStream> {
    let bytes = text.as_bytes();
    let required = bytes.len() << 3;
    if required > target_len {
        return Err(GridError::DataTooLong { required, available: target_len });
    }

    let mut bs = BitStream::new(target_len);
    bs.extend(bytes);
    bs.pad_to(target_len);
    Ok(bs)
}

/// Strict inverse of [`text_to_padded_bits`]: the first `exact_bit_length`
/// bits are decoded, padding included, and any invalid sequence fails.
pub fn bits_to_text(bits: &BitStream, exact_bit_length: usize) -> GridResult<String> {
    if exact_bit_length & 7 != 0 || exact_bit_length > bits.len() {
        return Err(GridError::UnalignedBitLength(exact_bit_length));
    }

    let bytes = &bits.data()[..exact_bit_length >> 3];
    UTF_8
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|s| s.into_owned())
        .ok_or(GridError::InvalidUtf8Sequence)
}

#[cfg(test)]
mod text_tests {
    use test_case::test_case;

    use super::{bits_to_text, text_to_padded_bits};
    use crate::common::{bitstream::BitStream, error::GridError};

    #[test_case("Hi", 16, "0100100001101001")]
    #[test_case("Hi", 20, "01001000011010010000")]
    #[test_case("", 4, "0000")]
    fn test_text_to_padded_bits(text: &str, target: usize, exp: &str) {
        assert_eq!(text_to_padded_bits(text, target).unwrap().to_string(), exp);
    }

    #[test]
    fn test_text_too_long() {
        let res = text_to_padded_bits("Hi", 15);
        assert_eq!(res, Err(GridError::DataTooLong { required: 16, available: 15 }));
    }

    #[test_case("Hello, world!🌎", 256)]
    #[test_case("é", 16)]
    fn test_bits_to_text(text: &str, target: usize) {
        let bits = text_to_padded_bits(text, target).unwrap();
        let exact = text.len() * 8;
        assert_eq!(bits_to_text(&bits, exact).unwrap(), text);
    }

    #[test]
    fn test_bits_to_text_keeps_padding() {
        let bits = text_to_padded_bits("A", 24).unwrap();
        assert_eq!(bits_to_text(&bits, 24).unwrap(), "A\0\0");
    }

    #[test]
    fn test_bits_to_text_unaligned() {
        let bits = BitStream::from_bit_str("0100100001101001").unwrap();
        assert_eq!(bits_to_text(&bits, 12), Err(GridError::UnalignedBitLength(12)));
        assert_eq!(bits_to_text(&bits, 24), Err(GridError::UnalignedBitLength(24)));
    }

    #[test]
    fn test_bits_to_text_invalid_utf8() {
        let bits = BitStream::from(&[0x48, 0xFF, 0x69]);
        assert_eq!(bits_to_text(&bits, 24), Err(GridError::InvalidUtf8Sequence));
        // Truncated multi-byte sequence
        let bits = BitStream::from(&[0xC3, 0xA9]);
        assert_eq!(bits_to_text(&bits, 8), Err(GridError::InvalidUtf8Sequence));
    }
}

// XOR keying
//------------------------------------------------------------------------------

/// XORs `data` with `key` repeated cyclically. Applying it twice is identity.
pub fn xor_cipher(data: &BitStream, key: &BitStream) -> GridResult<BitStream> {
    if key.is_empty() {
        return Err(GridError::EmptyKey);
    }
    let klen = key.len();
    Ok(BitStream::from_bits(data.iter().enumerate().map(|(i, b)| b ^ key.get(i % klen))))
}

pub fn generate_xor_key(len: usize) -> BitStream {
    let mut rng = rand::rng();
    BitStream::from_bits((0..len).map(|_| rng.random::<bool>()))
}


// Metadata record
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MetadataRecord {
    pub protocol_version: u32,
    pub ecc_level_code: u32,
    pub message_encrypted_len: usize,
    pub xor_key: BitStream,
}

/// Serializes the record into the info block, duplicated when protection is on.
pub fn format_metadata(md: &MetadataConfig, record: &MetadataRecord) -> GridResult<BitStream> {
    md.validate()?;

    let fits = |v: u64, width: usize| width >= 64 || v >> width == 0;
    if !fits(record.protocol_version as u64, md.version_bits)
        || !fits(record.ecc_level_code as u64, md.ecc_level_bits)
        || !fits(record.message_encrypted_len as u64, md.msg_len_bits)
    {
        return Err(GridError::FieldOverflow);
    }
    if record.xor_key.len() != md.key_bits {
        return Err(GridError::InvalidKeyLength {
            expected: md.key_bits,
            actual: record.xor_key.len(),
        });
    }

    let mut info = BitStream::new(md.info_bits());
    info.push_bits(record.protocol_version as u64, md.version_bits);
    info.push_bits(record.ecc_level_code as u64, md.ecc_level_bits);
    info.push_bits(record.message_encrypted_len as u64, md.msg_len_bits);
    info.append(&record.xor_key);

    if md.protection_bits == 0 {
        return Ok(info);
    }
    let mut res = info.clone();
    res.append(&info);
    Ok(res)
}

pub fn parse_metadata(md: &MetadataConfig, stream: &BitStream) -> GridResult<MetadataRecord> {
    md.validate()?;

    if stream.len() != md.total_bits {
        return Err(GridError::MetadataLength { expected: md.total_bits, actual: stream.len() });
    }

    let info_len = md.info_bits();
    let mut info = stream.slice(0..info_len);
    if md.protection_bits != 0 && info != stream.slice(info_len..md.total_bits) {
        return Err(GridError::ProtectionMismatch);
    }

    let mut field = |width: usize| info.take_bits(width).ok_or(GridError::InconsistentFieldWidths);
    let protocol_version = field(md.version_bits)? as u32;
    let ecc_level_code = field(md.ecc_level_bits)? as u32;
    let message_encrypted_len = field(md.msg_len_bits)? as usize;
    let xor_key = info.take_stream(md.key_bits).ok_or(GridError::InconsistentFieldWidths)?;

    Ok(MetadataRecord { protocol_version, ecc_level_code, message_encrypted_len, xor_key })
}

#[cfg(test)]
mod metadata_record_tests {
    use proptest::prelude::*;

    use super::{format_metadata, parse_metadata, MetadataRecord};
    use crate::common::{
        bitstream::BitStream,
        error::GridError,
        metadata::{MetadataConfig, V1, V2_M},
    };

    fn record(key: &str) -> MetadataRecord {
        MetadataRecord {
            protocol_version: 1,
            ecc_level_code: 15,
            message_encrypted_len: 1576,
            xor_key: BitStream::from_bit_str(key).unwrap(),
        }
    }

    #[test]
    fn test_format_layout() {
        let md = V1.metadata;
        let bits = format_metadata(&md, &record("1010101010101010")).unwrap();
        assert_eq!(bits.len(), 72);
        let info = "0001".to_owned() + "1111" + "011000101000" + "1010101010101010";
        assert_eq!(bits.to_string(), info.clone() + &info);
    }

    #[test]
    fn test_unprotected_format() {
        let md = MetadataConfig { protection_bits: 0, total_bits: 36, ..V1.metadata };
        let rec = record("0000000011111111");
        let bits = format_metadata(&md, &rec).unwrap();
        assert_eq!(bits.len(), 36);
        assert_eq!(parse_metadata(&md, &bits).unwrap(), rec);
    }

    #[test]
    fn test_unsupported_protection_is_config_error() {
        let md = MetadataConfig { protection_bits: 20, total_bits: 56, ..V1.metadata };
        let res = format_metadata(&md, &record("0000000011111111"));
        assert_eq!(res, Err(GridError::UnsupportedProtection));
    }

    #[test]
    fn test_invalid_key_length() {
        let res = format_metadata(&V1.metadata, &record("0101"));
        assert_eq!(res, Err(GridError::InvalidKeyLength { expected: 16, actual: 4 }));
    }

    #[test]
    fn test_field_overflow() {
        let mut rec = record("0000000011111111");
        rec.message_encrypted_len = 4096;
        assert_eq!(format_metadata(&V1.metadata, &rec), Err(GridError::FieldOverflow));
    }

    #[test]
    fn test_protection_mismatch() {
        let md = V1.metadata;
        let bits = format_metadata(&md, &record("1010101010101010")).unwrap();
        let mut flipped = BitStream::default();
        for (i, b) in bits.iter().enumerate() {
            flipped.push(if i == 40 { !b } else { b });
        }
        assert_eq!(parse_metadata(&md, &flipped), Err(GridError::ProtectionMismatch));
    }

    #[test]
    fn test_metadata_length() {
        let bits = BitStream::from_bit_str(&"0".repeat(70)).unwrap();
        assert_eq!(
            parse_metadata(&V1.metadata, &bits),
            Err(GridError::MetadataLength { expected: 72, actual: 70 })
        );
    }

    proptest! {
        #[test]
        fn proptest_metadata_roundtrip(
            version in 0u32..16,
            ecc in 0u32..128,
            len in 0usize..8192,
            key in prop::collection::vec(any::<bool>(), 36),
        ) {
            let md = V2_M.metadata;
            let rec = MetadataRecord {
                protocol_version: version,
                ecc_level_code: ecc,
                message_encrypted_len: len,
                xor_key: BitStream::from_bits(key),
            };
            let bits = format_metadata(&md, &rec).unwrap();
            prop_assert_eq!(bits.len(), md.total_bits);
            prop_assert_eq!(parse_metadata(&md, &bits).unwrap(), rec);
        }
    }
}
