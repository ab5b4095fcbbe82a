mod matrix;

pub use matrix::{BitMatrix, Cell, RenderOptions};

use image::RgbImage;
use tracing::{debug, info};

use crate::common::{
    bitstream::BitStream,
    codec::{format_metadata, generate_xor_key, text_to_padded_bits, xor_cipher, MetadataRecord},
    ec::{checksum_ecc, rs_encode, EccMode},
    error::{GridError, GridResult},
    metadata::{ProtocolConfig, DEFAULT_ECC_PERCENT, V1},
};

// Payload budget
//------------------------------------------------------------------------------

/// Split of the Data/ECC capacity between message, ecc and trailing pad bits.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Budget {
    pub available_bits: usize,
    pub message_bits: usize,
    pub ecc_bits: usize,
    pub pad_bits: usize,
}

impl Budget {
    pub fn allocate(available_bits: usize, ecc_percent: u8, mode: EccMode) -> GridResult<Self> {
        if ecc_percent > 100 {
            return Err(GridError::InvalidEccPercent(ecc_percent));
        }
        let pct = ecc_percent as usize;

        match mode {
            EccMode::Checksum => {
                let ecc_bits = ((available_bits * pct / 100) >> 3) << 3;
                let max_ecc = (available_bits.saturating_sub(8) >> 3) << 3;
                let ecc_bits = ecc_bits.min(max_ecc);
                Ok(Self {
                    available_bits,
                    message_bits: available_bits - ecc_bits,
                    ecc_bits,
                    pad_bits: 0,
                })
            }
            EccMode::ReedSolomon => {
                let total_bytes = available_bits >> 3;
                if total_bytes < 2 {
                    return Err(GridError::DataTooLong { required: 16, available: available_bits });
                }
                let ecc_bytes = (total_bytes * pct / 100).clamp(1, total_bytes - 1);
                Ok(Self {
                    available_bits,
                    message_bits: (total_bytes - ecc_bytes) << 3,
                    ecc_bits: ecc_bytes << 3,
                    pad_bits: available_bits - (total_bytes << 3),
                })
            }
        }
    }

    /// Splits a decoded payload back into the budget for a known message length.
    pub fn recover(available_bits: usize, message_bits: usize, mode: EccMode) -> Self {
        let pad_bits = match mode {
            EccMode::Checksum => 0,
            EccMode::ReedSolomon => available_bits & 7,
        };
        let ecc_bits = available_bits.saturating_sub(message_bits + pad_bits);
        Self { available_bits, message_bits, ecc_bits, pad_bits }
    }
}


// Builder
//------------------------------------------------------------------------------

pub struct ColorCodeBuilder<'a> {
    text: &'a str,
    config: ProtocolConfig,
    ecc_percent: u8,
    ecc_mode: EccMode,
    key: Option<BitStream>,
}

impl<'a> ColorCodeBuilder<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            config: V1,
            ecc_percent: DEFAULT_ECC_PERCENT,
            ecc_mode: EccMode::Checksum,
            key: None,
        }
    }

    pub fn text(&mut self, text: &'a str) -> &mut Self {
        self.text = text;
        self
    }

    pub fn protocol(&mut self, config: ProtocolConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn ecc_percent(&mut self, pct: u8) -> &mut Self {
        self.ecc_percent = pct;
        self
    }

    pub fn ecc_mode(&mut self, mode: EccMode) -> &mut Self {
        self.ecc_mode = mode;
        self
    }

    /// Fixes the XOR key. Without one a random key is drawn on every build.
    pub fn key(&mut self, key: BitStream) -> &mut Self {
        self.key = Some(key);
        self
    }

    pub fn unset_key(&mut self) -> &mut Self {
        self.key = None;
        self
    }

    pub fn metadata(&self) -> String {
        format!(
            "{{ Protocol: {}, Ecc: {}%, Mode: {:?}, Key: {} }}",
            self.config.name,
            self.ecc_percent,
            self.ecc_mode,
            if self.key.is_some() { "Fixed" } else { "Random" }
        )
    }
}

impl ColorCodeBuilder<'_> {
    pub fn build(&self) -> GridResult<ColorCode> {
        info!("Generating code {}", self.metadata());

        let layout = self.config.layout()?;
        let md = &self.config.metadata;

        let budget = Budget::allocate(layout.available_bits(), self.ecc_percent, self.ecc_mode)?;
        debug!(
            available = budget.available_bits,
            message = budget.message_bits,
            ecc = budget.ecc_bits,
            pad = budget.pad_bits,
            "Allocated payload budget"
        );

        let padded = text_to_padded_bits(self.text, budget.message_bits)?;

        let key = match &self.key {
            Some(k) if k.len() != md.key_bits => {
                return Err(GridError::InvalidKeyLength { expected: md.key_bits, actual: k.len() })
            }
            Some(k) => k.clone(),
            None => generate_xor_key(md.key_bits),
        };

        debug!("Encrypting message...");
        let encrypted = xor_cipher(&padded, &key)?;

        debug!("Computing ecc...");
        let ecc = match self.ecc_mode {
            EccMode::Checksum if budget.ecc_bits == 0 => BitStream::default(),
            EccMode::Checksum => checksum_ecc(&encrypted, budget.ecc_bits)?,
            EccMode::ReedSolomon => BitStream::from(&rs_encode(encrypted.data(), budget.ecc_bits >> 3)),
        };

        let mut payload = BitStream::new(budget.available_bits);
        payload.append(&encrypted);
        payload.append(&ecc);
        payload.pad_to(payload.len() + budget.pad_bits);
        assert_eq!(
            payload.len(),
            budget.available_bits,
            "Payload length doesn't match data/ecc capacity"
        );

        let ecc_cap = (1u64 << md.ecc_level_bits) - 1;
        let record = MetadataRecord {
            protocol_version: self.config.protocol_version as u32,
            ecc_level_code: (self.ecc_percent as u64).min(ecc_cap) as u32,
            message_encrypted_len: encrypted.len(),
            xor_key: key,
        };
        let md_bits = format_metadata(md, &record)?;

        debug!("Drawing matrix...");
        let mut matrix = BitMatrix::new(layout);
        matrix.draw_fixed_patterns()?;
        let md_order = matrix.layout().metadata_order().to_vec();
        matrix.draw_bits(&md_order, &md_bits);
        let data_order = matrix.layout().data_ecc_fill_order().to_vec();
        matrix.draw_bits(&data_order, &payload);
        debug_assert!(matrix.is_complete(), "Unfilled cells after drawing payload");

        info!(text_bytes = self.text.len(), "Code generated successfully");

        Ok(ColorCode { matrix, metadata: record, ecc_mode: self.ecc_mode, budget })
    }
}

// Built code
//------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ColorCode {
    matrix: BitMatrix,
    metadata: MetadataRecord,
    ecc_mode: EccMode,
    budget: Budget,
}

impl ColorCode {
    pub fn matrix(&self) -> &BitMatrix {
        &self.matrix
    }

    pub fn metadata(&self) -> &MetadataRecord {
        &self.metadata
    }

    pub fn ecc_mode(&self) -> EccMode {
        self.ecc_mode
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    pub fn to_image(&self, opts: &RenderOptions) -> GridResult<RgbImage> {
        self.matrix.to_image(opts)
    }

    pub fn to_debug_str(&self) -> String {
        self.matrix.to_debug_str()
    }
}

#[cfg(test)]
mod builder_tests {
    use test_case::test_case;

    use super::ColorCodeBuilder;
    use crate::common::{
        bitstream::BitStream,
        codec::{bits_to_text, parse_metadata, xor_cipher},
        ec::{rs_correct, verify_checksum, EccMode},
        error::GridError,
        metadata::{ProtocolConfig, V1, V2_M, V2_S},
    };

    #[test]
    fn test_builder_metadata() {
        let mut builder = ColorCodeBuilder::new("Hi");
        builder.ecc_percent(50).ecc_mode(EccMode::ReedSolomon);
        assert_eq!(builder.metadata(), "{ Protocol: V1, Ecc: 50%, Mode: ReedSolomon, Key: Random }");
        builder.key(BitStream::from(&[0xAB, 0xCD])).protocol(V2_S);
        assert_eq!(builder.metadata(), "{ Protocol: V2_S, Ecc: 50%, Mode: ReedSolomon, Key: Fixed }");
    }

    #[test_case(V1, EccMode::Checksum)]
    #[test_case(V1, EccMode::ReedSolomon)]
    #[test_case(V2_S, EccMode::Checksum)]
    #[test_case(V2_M, EccMode::ReedSolomon)]
    fn test_build_layout(cfg: ProtocolConfig, mode: EccMode) {
        let text = "Hello, world!🌎";
        let code = ColorCodeBuilder::new(text).protocol(cfg).ecc_mode(mode).build().unwrap();
        let mat = code.matrix();
        assert!(mat.is_complete());

        let layout = mat.layout();
        let md_bits = mat.read_bits(layout.metadata_order()).unwrap();
        let record = parse_metadata(&cfg.metadata, &md_bits).unwrap();
        assert_eq!(&record, code.metadata());
        assert_eq!(record.protocol_version, cfg.protocol_version as u32);
        assert_eq!(record.xor_key.len(), cfg.metadata.key_bits);

        let payload = mat.read_bits(layout.data_ecc_fill_order()).unwrap();
        assert_eq!(payload.len(), layout.available_bits());
        let budget = code.budget();
        let msg = payload.slice(0..record.message_encrypted_len);
        let ecc = payload.slice(msg.len()..msg.len() + budget.ecc_bits);
        match mode {
            EccMode::Checksum => assert_eq!(verify_checksum(&msg, &ecc), Ok(())),
            EccMode::ReedSolomon => {
                assert_eq!(rs_correct(msg.data(), ecc.data()).unwrap(), msg.data())
            }
        }
        let plain = xor_cipher(&msg, &record.xor_key).unwrap();
        let decoded = bits_to_text(&plain, plain.len()).unwrap();
        assert_eq!(decoded.trim_end_matches('\0'), text);
    }

    #[test]
    fn test_ecc_level_code_is_clamped() {
        let code = ColorCodeBuilder::new("Hi").ecc_percent(50).build().unwrap();
        assert_eq!(code.metadata().ecc_level_code, 15);
        let code = ColorCodeBuilder::new("Hi").protocol(V2_S).ecc_percent(50).build().unwrap();
        assert_eq!(code.metadata().ecc_level_code, 50);
    }

    #[test]
    fn test_fixed_key_is_used() {
        let key = BitStream::from_bit_str("1010101010101010").unwrap();
        let code = ColorCodeBuilder::new("Hi").key(key.clone()).build().unwrap();
        assert_eq!(code.metadata().xor_key, key);
    }

    #[test]
    fn test_invalid_key_length() {
        let res = ColorCodeBuilder::new("Hi").key(BitStream::from(&[0xFF])).build();
        assert!(matches!(res, Err(GridError::InvalidKeyLength { expected: 16, actual: 8 })));
    }

    #[test]
    fn test_data_too_long() {
        let text = "A".repeat(200);
        let res = ColorCodeBuilder::new(&text).build();
        assert!(matches!(res, Err(GridError::DataTooLong { required: 1600, available: 1576 })));
    }

    #[test]
    fn test_invalid_ecc_percent() {
        let res = ColorCodeBuilder::new("Hi").ecc_percent(120).build();
        assert!(matches!(res, Err(GridError::InvalidEccPercent(120))));
    }
}
