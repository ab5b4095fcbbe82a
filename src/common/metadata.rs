use image::Rgb;

use super::error::{GridError, GridResult};

// Color
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Color {
    White,
    Black,
    Red,
    Blue,
}

impl Color {
    pub const fn rgb(self) -> Rgb<u8> {
        match self {
            Self::White => Rgb([255, 255, 255]),
            Self::Black => Rgb([0, 0, 0]),
            Self::Red => Rgb([255, 0, 0]),
            Self::Blue => Rgb([0, 0, 255]),
        }
    }
}

impl From<Color> for Rgb<u8> {
    fn from(c: Color) -> Self {
        c.rgb()
    }
}

// Geometry and field width settings
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct FinderConfig {
    pub size: usize,
    pub margin: usize,
    // Ring colors by Chebyshev distance from the center, starting at distance 1
    pub rings: &'static [Color],
    pub margin_color: Color,
    // Center colors for TL, TR and BL
    pub center_colors: [Color; 3],
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct TimingConfig {
    // Even relative index, odd relative index
    pub colors: [Color; 2],
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct CalibrationConfig {
    pub patch_size: usize,
    pub colors: &'static [Color],
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct MetadataConfig {
    pub rows: usize,
    pub cols: usize,
    pub version_bits: usize,
    pub ecc_level_bits: usize,
    pub msg_len_bits: usize,
    pub key_bits: usize,
    pub protection_bits: usize,
    pub total_bits: usize,
}

impl MetadataConfig {
    pub const fn info_bits(&self) -> usize {
        self.total_bits - self.protection_bits
    }

    pub fn validate(&self) -> GridResult<()> {
        if self.protection_bits > self.total_bits {
            return Err(GridError::InconsistentFieldWidths);
        }
        let info = self.info_bits();
        let fields = self.version_bits + self.ecc_level_bits + self.msg_len_bits + self.key_bits;
        if fields != info {
            return Err(GridError::InconsistentFieldWidths);
        }
        if self.protection_bits != 0 && self.protection_bits != info {
            return Err(GridError::UnsupportedProtection);
        }
        if [self.version_bits, self.ecc_level_bits, self.msg_len_bits].iter().any(|&w| w > 32) {
            return Err(GridError::InconsistentFieldWidths);
        }
        Ok(())
    }
}

// Protocol configuration
//------------------------------------------------------------------------------

/// Immutable constants of one protocol version.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ProtocolConfig {
    pub name: &'static str,
    pub protocol_version: u8,
    pub matrix_dim: usize,
    pub bits_per_cell: usize,
    // Symbol value is the index into this table
    pub palette: &'static [Color],
    pub finder: FinderConfig,
    pub timing: TimingConfig,
    pub calibration: CalibrationConfig,
    pub metadata: MetadataConfig,
}

impl ProtocolConfig {
    pub fn by_name(name: &str) -> GridResult<&'static ProtocolConfig> {
        PROTOCOLS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or(GridError::UnknownProtocol)
    }

    pub fn symbol_of(&self, color: Color) -> GridResult<u8> {
        self.palette
            .iter()
            .position(|&c| c == color)
            .map(|i| i as u8)
            .ok_or(GridError::UnregisteredColor)
    }

    pub fn color_of(&self, symbol: u8) -> Color {
        debug_assert!(
            (symbol as usize) < self.palette.len(),
            "Symbol outside palette: Symbol {symbol}, Palette size {}",
            self.palette.len()
        );
        self.palette[symbol as usize]
    }

    /// Checks every structural rule the layout and framer rely on.
    pub fn validate(&self) -> GridResult<()> {
        self.metadata.validate()?;

        if self.bits_per_cell == 0
            || self.bits_per_cell > 8
            || self.palette.len() != 1 << self.bits_per_cell
        {
            return Err(GridError::InvalidPalette);
        }
        for (i, c) in self.palette.iter().enumerate() {
            if self.palette[..i].contains(c) {
                return Err(GridError::InvalidPalette);
            }
        }

        let dim = self.matrix_dim;
        let fp = &self.finder;
        if dim % 2 == 0 || dim < 2 * fp.size + 1 {
            return Err(GridError::InvalidLayout("matrix dimension"));
        }
        if fp.size <= 2 * fp.margin {
            return Err(GridError::InvalidLayout("finder margin"));
        }
        let core = fp.size - 2 * fp.margin;
        if fp.rings.len() < core / 2 {
            return Err(GridError::InvalidLayout("finder rings"));
        }

        let md = &self.metadata;
        if md.rows == 0 || md.rows + 1 > fp.size || md.cols + 2 * fp.size > dim {
            return Err(GridError::InvalidLayout("metadata area"));
        }
        if md.rows * md.cols * self.bits_per_cell != md.total_bits {
            return Err(GridError::InconsistentFieldWidths);
        }

        let cal = &self.calibration;
        if cal.patch_size == 0
            || cal.patch_size > fp.size
            || fp.size + cal.colors.len() * cal.patch_size > dim
        {
            return Err(GridError::InvalidLayout("calibration patches"));
        }

        let fixed = fp
            .rings
            .iter()
            .chain(fp.center_colors.iter())
            .chain(std::iter::once(&fp.margin_color))
            .chain(self.timing.colors.iter())
            .chain(cal.colors.iter());
        for &c in fixed {
            self.symbol_of(c)?;
        }

        Ok(())
    }
}

// Registry
//------------------------------------------------------------------------------

pub const PALETTE: [Color; 4] = [Color::White, Color::Black, Color::Red, Color::Blue];

const FINDER: FinderConfig = FinderConfig {
    size: 7,
    margin: 1,
    rings: &[Color::Blue, Color::Black],
    margin_color: Color::White,
    center_colors: [Color::Red, Color::Black, Color::Blue],
};

const TIMING: TimingConfig = TimingConfig { colors: [Color::Black, Color::White] };

const CALIBRATION: CalibrationConfig = CalibrationConfig {
    patch_size: 2,
    colors: &[Color::White, Color::Black, Color::Blue, Color::Red],
};

pub const V1: ProtocolConfig = ProtocolConfig {
    name: "V1",
    protocol_version: 1,
    matrix_dim: 35,
    bits_per_cell: 2,
    palette: &PALETTE,
    finder: FINDER,
    timing: TIMING,
    calibration: CALIBRATION,
    metadata: MetadataConfig {
        rows: 6,
        cols: 6,
        version_bits: 4,
        ecc_level_bits: 4,
        msg_len_bits: 12,
        key_bits: 16,
        protection_bits: 36,
        total_bits: 72,
    },
};

pub const V2_S: ProtocolConfig = ProtocolConfig {
    name: "V2_S",
    protocol_version: 2,
    matrix_dim: 51,
    bits_per_cell: 2,
    palette: &PALETTE,
    finder: FINDER,
    timing: TIMING,
    calibration: CALIBRATION,
    metadata: MetadataConfig {
        rows: 6,
        cols: 8,
        version_bits: 4,
        ecc_level_bits: 7,
        msg_len_bits: 13,
        key_bits: 24,
        protection_bits: 48,
        total_bits: 96,
    },
};

pub const V2_M: ProtocolConfig = ProtocolConfig {
    name: "V2_M",
    protocol_version: 2,
    matrix_dim: 51,
    bits_per_cell: 2,
    palette: &PALETTE,
    finder: FINDER,
    timing: TIMING,
    calibration: CALIBRATION,
    metadata: MetadataConfig {
        rows: 6,
        cols: 10,
        version_bits: 4,
        ecc_level_bits: 7,
        msg_len_bits: 13,
        key_bits: 36,
        protection_bits: 60,
        total_bits: 120,
    },
};

pub static PROTOCOLS: [ProtocolConfig; 3] = [V1, V2_S, V2_M];

pub const DEFAULT_ECC_PERCENT: u8 = 20;

#[cfg(test)]
mod protocol_config_tests {
    use test_case::test_case;

    use super::{Color, ProtocolConfig, PROTOCOLS, V1};
    use crate::common::error::GridError;

    #[test]
    fn test_registry_is_valid() {
        for p in PROTOCOLS.iter() {
            assert_eq!(p.validate(), Ok(()), "Protocol {} failed validation", p.name);
        }
    }

    #[test_case("V1", 35)]
    #[test_case("v2_s", 51)]
    #[test_case("V2_M", 51)]
    fn test_by_name(name: &str, dim: usize) {
        assert_eq!(ProtocolConfig::by_name(name).unwrap().matrix_dim, dim);
    }

    #[test]
    fn test_unknown_protocol() {
        assert_eq!(ProtocolConfig::by_name("V9"), Err(GridError::UnknownProtocol));
    }

    #[test]
    fn test_symbol_table() {
        assert_eq!(V1.symbol_of(Color::White), Ok(0b00));
        assert_eq!(V1.symbol_of(Color::Black), Ok(0b01));
        assert_eq!(V1.symbol_of(Color::Red), Ok(0b10));
        assert_eq!(V1.symbol_of(Color::Blue), Ok(0b11));
        assert_eq!(V1.color_of(0b10), Color::Red);
    }

    #[test]
    fn test_inconsistent_field_widths() {
        let mut cfg = V1;
        cfg.metadata.key_bits = 15;
        assert_eq!(cfg.validate(), Err(GridError::InconsistentFieldWidths));
    }

    #[test]
    fn test_unsupported_protection() {
        let mut cfg = V1;
        cfg.metadata.protection_bits = 24;
        cfg.metadata.key_bits = 28;
        assert_eq!(cfg.validate(), Err(GridError::UnsupportedProtection));
    }

    #[test]
    fn test_metadata_crossing_timing_row() {
        let mut cfg = V1;
        cfg.metadata.rows = 7;
        assert!(matches!(cfg.validate(), Err(GridError::InvalidLayout(_))));
    }

    #[test]
    fn test_unprotected_metadata_is_valid() {
        let mut cfg = V1;
        cfg.metadata.rows = 3;
        cfg.metadata.protection_bits = 0;
        cfg.metadata.total_bits = 36;
        assert_eq!(cfg.validate(), Ok(()));
    }
}
