mod binarize;
mod calibrate;
mod finder;
mod rectify;
mod sampler;
mod utils;

use std::fmt::{Display, Error, Formatter};

use image::RgbImage;
use tracing::{debug, info, warn};

pub use calibrate::CalibrationMap;
pub use rectify::RectifyOptions;
pub use sampler::DEFAULT_TIMING_THRESHOLD;

use crate::{
    builder::{BitMatrix, Budget, Cell},
    common::{
        bitstream::BitStream,
        codec::{bits_to_text, parse_metadata, xor_cipher, MetadataRecord},
        ec::{rs_correct, verify_checksum, EccMode},
        error::{DecodeStage, GridError, GridResult},
        layout::{Axis, Corner},
        metadata::{ProtocolConfig, V1},
    },
};
use calibrate::calibrate;
use rectify::rectify;
use sampler::Sampler;

// Diagnostics
//------------------------------------------------------------------------------

/// Non-fatal observation made while reading a capture.
#[derive(Debug, PartialEq, Clone)]
pub enum Diagnostic {
    // Finders weren't usable, cells were sampled on a naive axis aligned grid
    FallbackSampling { reason: GridError },
    CoarseRotation { degrees: i32 },
    // Timing line transitions didn't match, the axis kept linear positions
    TimingFallback { axis: Axis, found: usize, expected: usize },
    FinderCenterMismatch { corner: Corner, expected: u8, observed: u8 },
    // No calibration patch for the symbol, its nominal color was used
    NominalCalibration { symbol: u8 },
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            Self::FallbackSampling { reason } => write!(f, "Axis aligned sampling: {reason}"),
            Self::CoarseRotation { degrees } => write!(f, "Rotated by {degrees} degrees"),
            Self::TimingFallback { axis, found, expected } => write!(
                f,
                "{axis:?} timing line: Found {found} transitions, Expected {expected}"
            ),
            Self::FinderCenterMismatch { corner, expected, observed } => write!(
                f,
                "{corner:?} finder center: Expected symbol {expected}, Observed {observed}"
            ),
            Self::NominalCalibration { symbol } => {
                write!(f, "Symbol {symbol} calibrated to its nominal color")
            }
        }
    }
}

// Decoded output
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Clone)]
pub struct Decoded {
    pub text: String,
    pub metadata: MetadataRecord,
    pub diagnostics: Vec<Diagnostic>,
}

// Reader
//------------------------------------------------------------------------------

/// Decoder for captures of a single protocol. The ecc mode isn't recorded in
/// the metadata, so it has to match the one the code was built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodeReader {
    config: ProtocolConfig,
    ecc_mode: EccMode,
    opts: RectifyOptions,
}

impl Default for CodeReader {
    fn default() -> Self {
        Self::new(V1)
    }
}

impl CodeReader {
    pub fn new(config: ProtocolConfig) -> Self {
        Self { config, ecc_mode: EccMode::Checksum, opts: RectifyOptions::default() }
    }

    pub fn protocol(&mut self, config: ProtocolConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn ecc_mode(&mut self, mode: EccMode) -> &mut Self {
        self.ecc_mode = mode;
        self
    }

    /// Half side of the square sampling window. None picks a quarter cell.
    pub fn sample_radius(&mut self, radius: Option<u32>) -> &mut Self {
        self.opts.sample_radius = radius;
        self
    }

    pub fn timing_refinement(&mut self, enabled: bool) -> &mut Self {
        self.opts.timing_refinement = enabled;
        self
    }

    pub fn timing_threshold(&mut self, threshold: f64) -> &mut Self {
        self.opts.timing_threshold = threshold;
        self
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

impl CodeReader {
    // ENTRY POINT FOR READING A CAPTURE
    pub fn read(&self, img: &RgbImage) -> GridResult<Decoded> {
        info!("Reading {} capture of {}x{}", self.config.name, img.width(), img.height());
        let layout = self.config.layout()?;
        let mut diagnostics = Vec::new();

        debug!("Rectifying capture...");
        let rect = rectify(img, &layout, &self.opts, &mut diagnostics)
            .map_err(|e| e.at(DecodeStage::Rectify))?;
        let sampler = Sampler::new(&rect.image, &rect.mapping, rect.radius);

        debug!("Calibrating colors...");
        let (cal, missing) =
            calibrate(&sampler, &layout).map_err(|e| e.at(DecodeStage::Calibrate))?;
        for symbol in missing {
            warn!("No calibration patch for symbol {symbol}");
            diagnostics.push(Diagnostic::NominalCalibration { symbol });
        }

        debug!("Sampling cells...");
        let dim = layout.dim();
        let mut matrix = BitMatrix::new(layout);
        for r in 0..dim {
            for c in 0..dim {
                let rgb = sampler.sample_cell(r, c).map_err(|e| e.at(DecodeStage::Extract))?;
                matrix.set(r, c, Cell::Symbol(cal.classify(&rgb)));
            }
        }

        check_finder_centers(&matrix, &mut diagnostics)?;

        let (text, metadata) = self.decode_matrix(&matrix)?;
        info!(diagnostics = diagnostics.len(), "Capture decoded successfully");
        Ok(Decoded { text, metadata, diagnostics })
    }

    /// Decodes an already sampled matrix. Trailing NUL padding is stripped.
    pub fn decode_matrix(&self, matrix: &BitMatrix) -> GridResult<(String, MetadataRecord)> {
        let layout = matrix.layout();
        let config = layout.config();
        let md = &config.metadata;

        let md_bits =
            matrix.read_bits(layout.metadata_order()).map_err(|e| e.at(DecodeStage::Extract))?;
        let payload = matrix
            .read_bits(layout.data_ecc_fill_order())
            .map_err(|e| e.at(DecodeStage::Extract))?;

        let record = parse_metadata(md, &md_bits).map_err(|e| e.at(DecodeStage::Metadata))?;
        debug!(
            version = record.protocol_version,
            ecc_level = record.ecc_level_code,
            message_len = record.message_encrypted_len,
            "Parsed metadata"
        );

        self.validate(config, &record, payload.len()).map_err(|e| e.at(DecodeStage::Validate))?;
        let budget = Budget::recover(payload.len(), record.message_encrypted_len, self.ecc_mode);
        let encrypted = payload.slice(0..budget.message_bits);
        let ecc = payload.slice(budget.message_bits..budget.message_bits + budget.ecc_bits);

        debug!("Verifying ecc...");
        let encrypted = match self.ecc_mode {
            EccMode::Checksum => verify_checksum(&encrypted, &ecc).map(|_| encrypted),
            EccMode::ReedSolomon => rs_correct(encrypted.data(), ecc.data()).map(|b| BitStream::from(&b)),
        }
        .map_err(|e| e.at(DecodeStage::EccVerify))?;

        let padded =
            xor_cipher(&encrypted, &record.xor_key).map_err(|e| e.at(DecodeStage::Decrypt))?;
        let text = bits_to_text(&padded, budget.message_bits)
            .map_err(|e| e.at(DecodeStage::TextDecode))?;

        Ok((text.trim_end_matches('\0').to_owned(), record))
    }

    fn validate(
        &self,
        config: &ProtocolConfig,
        record: &MetadataRecord,
        payload_bits: usize,
    ) -> GridResult<()> {
        if record.protocol_version != config.protocol_version as u32 {
            return Err(GridError::UnsupportedVersion(record.protocol_version));
        }

        let declared = record.message_encrypted_len;
        let pad = match self.ecc_mode {
            EccMode::Checksum => 0,
            EccMode::ReedSolomon => payload_bits & 7,
        };
        if declared + pad > payload_bits {
            return Err(GridError::MessageLengthOverflow { declared, payload: payload_bits });
        }
        if self.ecc_mode == EccMode::ReedSolomon && declared & 7 != 0 {
            return Err(GridError::UnalignedBitLength(declared));
        }
        Ok(())
    }
}

// Compares each sampled finder center with the color configured for its corner
fn check_finder_centers(matrix: &BitMatrix, diagnostics: &mut Vec<Diagnostic>) -> GridResult<()> {
    let config = matrix.config();
    let half = config.finder.size / 2;
    for corner in Corner::ALL {
        let b = matrix.layout().finder_bounds(corner);
        let color = config.finder.center_colors[corner.index()];
        let expected = config.symbol_of(color).map_err(|e| e.at(DecodeStage::Calibrate))?;
        let observed = matrix
            .symbol(b.row_start + half, b.col_start + half)
            .map_err(|e| e.at(DecodeStage::Extract))?;
        if observed != expected {
            warn!("{corner:?} finder center reads {observed}, expected {expected}");
            diagnostics.push(Diagnostic::FinderCenterMismatch { corner, expected, observed });
        }
    }
    Ok(())
}
