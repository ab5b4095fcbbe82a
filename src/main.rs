use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use chromatrix::{BitStream, CodeReader, ColorCodeBuilder, EccMode, ProtocolConfig, RenderOptions};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "chromatrix")]
#[command(about = "Encode text into four-color grid symbols and read them back from images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text and render the symbol to a PNG.
    Encode(EncodeArgs),

    /// Decode a symbol from an image.
    Decode(DecodeArgs),

    /// Encode, render to a temporary file, decode and compare.
    Demo {
        /// Text to round trip.
        #[arg(long, default_value = "Hello, chromatrix!")]
        text: String,

        #[command(flatten)]
        symbol: SymbolArgs,
    },

    /// Print the zone map of a protocol version.
    Layout {
        /// Protocol version name.
        #[arg(long, default_value = "V1")]
        protocol: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Checksum,
    ReedSolomon,
}

impl From<ModeArg> for EccMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Checksum => EccMode::Checksum,
            ModeArg::ReedSolomon => EccMode::ReedSolomon,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct SymbolArgs {
    /// Protocol version name (V1, V2_S, V2_M).
    #[arg(long, default_value = "V1")]
    protocol: String,

    /// Error correction mode. Must match between encoding and decoding.
    #[arg(long, value_enum, default_value_t = ModeArg::Checksum)]
    mode: ModeArg,
}

#[derive(Debug, Clone, Args)]
struct EncodeArgs {
    /// Text to encode.
    #[arg(long)]
    text: String,

    /// Path of the PNG to write.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    symbol: SymbolArgs,

    /// Share of the data capacity spent on error correction, in percent.
    #[arg(long, default_value = "20")]
    ecc: u8,

    /// Fixed XOR key as a bit string. A random key is drawn when omitted.
    #[arg(long)]
    key: Option<String>,

    /// Side of a cell in pixels.
    #[arg(long, default_value = "10")]
    cell_px: u32,

    /// Quiet zone around the symbol in pixels.
    #[arg(long, default_value = "0")]
    margin_px: u32,
}

#[derive(Debug, Clone, Args)]
struct DecodeArgs {
    /// Path of the image to read.
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    symbol: SymbolArgs,

    /// Half side of the sampling window in pixels (default: a quarter cell).
    #[arg(long)]
    sample_radius: Option<u32>,

    /// Disable grid refinement along the timing lines.
    #[arg(long)]
    no_timing: bool,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode(args) => run_encode(&args),
        Commands::Decode(args) => run_decode(&args),
        Commands::Demo { text, symbol } => run_demo(&text, &symbol),
        Commands::Layout { protocol } => run_layout(&protocol),
    }
}

fn encode_to(
    text: &str,
    symbol: &SymbolArgs,
    ecc: u8,
    key: Option<&str>,
    opts: &RenderOptions,
    out: &Path,
) -> CliResult<()> {
    let config = ProtocolConfig::by_name(&symbol.protocol)?;
    let mut builder = ColorCodeBuilder::new(text);
    builder.protocol(*config).ecc_percent(ecc).ecc_mode(symbol.mode.into());
    if let Some(k) = key {
        builder.key(BitStream::from_bit_str(k)?);
    }

    let code = builder.build()?;
    let img = code.to_image(opts)?;
    img.save(out)?;
    info!("Symbol written to {} ({}x{})", out.display(), img.width(), img.height());
    Ok(())
}

fn decode_from(path: &Path, symbol: &SymbolArgs, radius: Option<u32>, timing: bool) -> CliResult<String> {
    info!("Loading image: {}", path.display());
    let img = image::open(path)?.to_rgb8();

    let config = ProtocolConfig::by_name(&symbol.protocol)?;
    let mut reader = CodeReader::new(*config);
    reader.ecc_mode(symbol.mode.into()).sample_radius(radius).timing_refinement(timing);

    let decoded = reader.read(&img)?;
    for d in decoded.diagnostics.iter() {
        warn!("{d}");
    }
    Ok(decoded.text)
}

fn run_encode(args: &EncodeArgs) -> CliResult<()> {
    let opts = RenderOptions { cell_px: args.cell_px, margin_px: args.margin_px };
    encode_to(&args.text, &args.symbol, args.ecc, args.key.as_deref(), &opts, &args.out)
}

fn run_decode(args: &DecodeArgs) -> CliResult<()> {
    let text = decode_from(&args.image, &args.symbol, args.sample_radius, !args.no_timing)?;
    println!("{text}");
    Ok(())
}

fn run_demo(text: &str, symbol: &SymbolArgs) -> CliResult<()> {
    let path = std::env::temp_dir().join(format!("chromatrix-demo-{}.png", std::process::id()));
    let opts = RenderOptions { cell_px: 10, margin_px: 20 };
    encode_to(text, symbol, chromatrix::DEFAULT_ECC_PERCENT, None, &opts, &path)?;

    let decoded = decode_from(&path, symbol, None, true);
    std::fs::remove_file(&path)?;
    let decoded = decoded?;

    if decoded != text {
        return Err(format!("Round trip mismatch: Sent {text:?}, Received {decoded:?}").into());
    }
    println!("Round trip OK: {decoded}");
    Ok(())
}

fn run_layout(protocol: &str) -> CliResult<()> {
    let config = ProtocolConfig::by_name(protocol)?;
    let layout = config.layout()?;
    println!(
        "{} ({}x{}, {} data/ecc bits){}",
        config.name,
        layout.dim(),
        layout.dim(),
        layout.available_bits(),
        layout.to_debug_str()
    );
    Ok(())
}
