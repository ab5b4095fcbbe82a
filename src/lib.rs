//! # chromatrix
//!
//! A four-color visual data encoding protocol. Text is framed into a square grid of
//! colored cells (two bits per cell), XOR keyed, protected with a checksum or
//! Reed-Solomon code, and rendered to an RGB image. The reader recovers the text from
//! a capture that may be rotated, scaled or slightly skewed.
//!
//! ## Features
//!
//! - **Symbol generation**: Build a code from text with a chosen protocol version, ecc
//!   budget, ecc mode and optional fixed key
//! - **Symbol reading**: Locate finder patterns, undo coarse rotation, fit an affine grid,
//!   refine it along the timing lines and classify cells against calibration patches
//! - **Error correction**: Additive checksum for detection, Reed-Solomon for correction
//! - **Diagnostics**: Recoverable geometric anomalies are reported alongside the text
//!
//! ## Quick Start
//!
//! ### Generating a code
//!
//! ```rust
//! use chromatrix::{ColorCodeBuilder, EccMode, RenderOptions, V2_S};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let code = ColorCodeBuilder::new("Hello, World!")
//!     .protocol(V2_S)                  // Protocol version, defaults to V1
//!     .ecc_percent(30)                 // Share of capacity spent on ecc, defaults to 20
//!     .ecc_mode(EccMode::ReedSolomon)  // Defaults to EccMode::Checksum
//!     .build()?;
//!
//! let img = code.to_image(&RenderOptions { cell_px: 8, margin_px: 16 })?;
//! # let _ = img;
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading a capture
//!
//! ```rust,no_run
//! use chromatrix::{CodeReader, EccMode, V2_S};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = image::open("capture.png")?.to_rgb8();
//! let decoded = CodeReader::new(V2_S).ecc_mode(EccMode::ReedSolomon).read(&img)?;
//! println!("Decoded: {}", decoded.text);
//! for d in decoded.diagnostics {
//!     println!("  {d}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol versions
//!
//! | Name   | Grid  | Metadata cells | Key bits |
//! |--------|-------|----------------|----------|
//! | `V1`   | 35x35 | 6x6            | 16       |
//! | `V2_S` | 51x51 | 6x8            | 24       |
//! | `V2_M` | 51x51 | 6x10           | 36       |
//!
//! The protocol and ecc mode aren't inferred from a capture, the reader has to be told
//! both. The version number recorded in the metadata is checked against the reader's.

#![allow(clippy::items_after_test_module, clippy::needless_range_loop)]

pub mod builder;
pub(crate) mod common;
pub mod reader;

pub use builder::{BitMatrix, Budget, Cell, ColorCode, ColorCodeBuilder, RenderOptions};
pub use common::bitstream::BitStream;
pub use common::codec::{
    bits_to_text, format_metadata, generate_xor_key, parse_metadata, text_to_padded_bits,
    xor_cipher, MetadataRecord,
};
pub use common::ec::{
    block_layout, checksum_ecc, reed_solomon_correct, reed_solomon_ecc, rs_correct, rs_encode,
    verify_checksum, EccMode, MAX_RS_SYMBOLS,
};
pub use common::error::{DecodeStage, ErrorKind, GridError, GridResult};
pub use common::layout::{Axis, Bounds, Corner, Zone, ZoneLayout};
pub use common::metadata::{
    CalibrationConfig, Color, FinderConfig, MetadataConfig, ProtocolConfig, TimingConfig,
    DEFAULT_ECC_PERCENT, PALETTE, PROTOCOLS, V1, V2_M, V2_S,
};
pub use reader::{CalibrationMap, CodeReader, Decoded, Diagnostic, RectifyOptions};
