use std::fmt::{Debug, Display, Error, Formatter};

// Error kind
//------------------------------------------------------------------------------

/// Coarse classification of every failure the crate can report.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ErrorKind {
    Configuration,
    Capacity,
    Geometry,
    ProtectionMismatch,
    EccVerification,
    TextDecode,
}

// Decode stage
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum DecodeStage {
    Rectify,
    Calibrate,
    Extract,
    Metadata,
    Validate,
    EccVerify,
    Decrypt,
    TextDecode,
}

impl Display for DecodeStage {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        let name = match *self {
            Self::Rectify => "rectify",
            Self::Calibrate => "calibrate",
            Self::Extract => "extract",
            Self::Metadata => "metadata",
            Self::Validate => "validate",
            Self::EccVerify => "ecc verify",
            Self::Decrypt => "decrypt",
            Self::TextDecode => "text decode",
        };
        f.write_str(name)
    }
}

// Error
//------------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum GridError {
    // Configuration
    InconsistentFieldWidths,
    UnsupportedProtection,
    InvalidPalette,
    InvalidLayout(&'static str),
    UnregisteredColor,
    UnknownProtocol,
    InvalidKeyLength { expected: usize, actual: usize },
    InvalidEccPercent(u8),
    InvalidChecksumSize(usize),
    EmptyKey,
    FieldOverflow,
    InvalidBitString,

    // Capacity
    DataTooLong { required: usize, available: usize },
    RsBlockTooLong(usize),

    // Geometry
    FinderNotFound(usize),
    SingularMatrix,
    ImageTooSmall,
    CellOutOfBounds { row: usize, col: usize },
    EmptyCalibrationPatch(usize),
    UnfilledCell { row: usize, col: usize },

    // Protection
    ProtectionMismatch,
    MetadataLength { expected: usize, actual: usize },
    UnsupportedVersion(u32),
    MessageLengthOverflow { declared: usize, payload: usize },

    // ECC
    ChecksumMismatch,
    TooManyErrors,

    // Text
    UnalignedBitLength(usize),
    InvalidUtf8Sequence,

    // Stage wrapper used by the reader
    Decode { stage: DecodeStage, source: Box<GridError> },
}

impl GridError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InconsistentFieldWidths
            | Self::UnsupportedProtection
            | Self::InvalidPalette
            | Self::InvalidLayout(_)
            | Self::UnregisteredColor
            | Self::UnknownProtocol
            | Self::InvalidKeyLength { .. }
            | Self::InvalidEccPercent(_)
            | Self::InvalidChecksumSize(_)
            | Self::EmptyKey
            | Self::FieldOverflow
            | Self::InvalidBitString => ErrorKind::Configuration,

            Self::DataTooLong { .. } | Self::RsBlockTooLong(_) => ErrorKind::Capacity,

            Self::FinderNotFound(_)
            | Self::SingularMatrix
            | Self::ImageTooSmall
            | Self::CellOutOfBounds { .. }
            | Self::EmptyCalibrationPatch(_)
            | Self::UnfilledCell { .. } => ErrorKind::Geometry,

            Self::ProtectionMismatch
            | Self::MetadataLength { .. }
            | Self::UnsupportedVersion(_)
            | Self::MessageLengthOverflow { .. } => ErrorKind::ProtectionMismatch,

            Self::ChecksumMismatch | Self::TooManyErrors => ErrorKind::EccVerification,

            Self::UnalignedBitLength(_) | Self::InvalidUtf8Sequence => ErrorKind::TextDecode,

            Self::Decode { source, .. } => source.kind(),
        }
    }

    /// Stage the error surfaced in, if it came out of the reader.
    pub fn stage(&self) -> Option<DecodeStage> {
        match self {
            Self::Decode { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, with any stage wrapper removed.
    pub fn root(&self) -> &GridError {
        match self {
            Self::Decode { source, .. } => source.root(),
            e => e,
        }
    }

    pub(crate) fn at(self, stage: DecodeStage) -> Self {
        match self {
            e @ Self::Decode { .. } => e,
            e => Self::Decode { stage, source: Box::new(e) },
        }
    }
}

impl Display for GridError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        match self {
            // Configuration
            Self::InconsistentFieldWidths => f.write_str("Metadata field widths don't add up"),
            Self::UnsupportedProtection => f.write_str("Unsupported metadata protection scheme"),
            Self::InvalidPalette => f.write_str("Palette size doesn't match bits per cell"),
            Self::InvalidLayout(msg) => write!(f, "Invalid layout: {msg}"),
            Self::UnregisteredColor => f.write_str("Color not registered in palette"),
            Self::UnknownProtocol => f.write_str("Unknown protocol name"),
            Self::InvalidKeyLength { expected, actual } => {
                write!(f, "Invalid key length: Expected {expected}, Actual {actual}")
            }
            Self::InvalidEccPercent(p) => write!(f, "Invalid ecc percent: {p}"),
            Self::InvalidChecksumSize(n) => write!(f, "Invalid checksum size: {n}"),
            Self::EmptyKey => f.write_str("Empty key"),
            Self::FieldOverflow => f.write_str("Value doesn't fit metadata field"),
            Self::InvalidBitString => f.write_str("Invalid bit string"),

            // Capacity
            Self::DataTooLong { required, available } => {
                write!(f, "Data too long: Required {required} bits, Available {available} bits")
            }
            Self::RsBlockTooLong(n) => write!(f, "Reed-Solomon block too long: {n} symbols"),

            // Geometry
            Self::FinderNotFound(n) => write!(f, "Finder patterns not found: {n} candidates"),
            Self::SingularMatrix => f.write_str("Cannot compute affine transform"),
            Self::ImageTooSmall => f.write_str("Image too small"),
            Self::CellOutOfBounds { row, col } => {
                write!(f, "Cell outside image: Row {row}, Col {col}")
            }
            Self::EmptyCalibrationPatch(i) => write!(f, "Calibration patch {i} has no pixels"),
            Self::UnfilledCell { row, col } => write!(f, "Unfilled cell: Row {row}, Col {col}"),

            // Protection
            Self::ProtectionMismatch => f.write_str("Metadata protection halves disagree"),
            Self::MetadataLength { expected, actual } => {
                write!(f, "Metadata length mismatch: Expected {expected}, Actual {actual}")
            }
            Self::UnsupportedVersion(v) => write!(f, "Unsupported protocol version: {v}"),
            Self::MessageLengthOverflow { declared, payload } => {
                write!(f, "Message length {declared} exceeds payload {payload}")
            }

            // ECC
            Self::ChecksumMismatch => f.write_str("Checksum mismatch"),
            Self::TooManyErrors => f.write_str("Too many errors to correct successfully"),

            // Text
            Self::UnalignedBitLength(n) => write!(f, "Invalid text bit length: {n}"),
            Self::InvalidUtf8Sequence => f.write_str("Invalid UTF8 sequence"),

            Self::Decode { stage, source } => write!(f, "Decode failed at {stage}: {source}"),
        }
    }
}

impl std::error::Error for GridError {}

pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod error_tests {
    use super::{DecodeStage, ErrorKind, GridError};

    #[test]
    fn test_stage_wrapping_keeps_kind() {
        let err = GridError::ChecksumMismatch.at(DecodeStage::EccVerify);
        assert_eq!(err.kind(), ErrorKind::EccVerification);
        assert_eq!(err.stage(), Some(DecodeStage::EccVerify));
        assert_eq!(err.root(), &GridError::ChecksumMismatch);
    }

    #[test]
    fn test_stage_wrapping_is_not_nested() {
        let err = GridError::ProtectionMismatch
            .at(DecodeStage::Metadata)
            .at(DecodeStage::Validate);
        assert_eq!(err.stage(), Some(DecodeStage::Metadata));
    }

    #[test]
    fn test_display() {
        let err = GridError::DataTooLong { required: 24, available: 16 };
        assert_eq!(err.to_string(), "Data too long: Required 24 bits, Available 16 bits");
        let err = GridError::TooManyErrors.at(DecodeStage::EccVerify);
        assert_eq!(err.to_string(), "Decode failed at ecc verify: Too many errors to correct successfully");
    }
}
