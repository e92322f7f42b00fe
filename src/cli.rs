use crate::{util::time::TimeField, web_api::Resize};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Batch-compress JPEG, PNG, WebP and AVIF images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Config file to use instead of searching the working directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-encode JPEG and PNG files locally, keeping whichever is smaller.
    Local(LocalArgs),

    /// Compress images with the Tinify API, optionally resizing or converting them.
    Tinify(TinifyArgs),

    /// Validate the configuration file.
    Check,

    /// Generate a JSON schema for the configuration file.
    GenerateSchema(GenerateSchemaArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Input directory or single file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory (or file, for a single input file). Defaults to overwriting in place.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only process the input directory itself, not its subdirectories.
    #[arg(long)]
    pub no_recursive: bool,

    /// Only process files at or after this time: a Unix timestamp,
    /// 'YYYY-MM-DD', 'YYYY-MM-DD HH:MM:SS' or an ISO 8601 timestamp.
    #[arg(short, long)]
    pub after: Option<String>,

    /// Timestamp compared against --after.
    #[arg(long, value_enum)]
    pub time_field: Option<TimeField>,
}

#[derive(Args, Clone)]
pub struct LocalArgs {
    #[command(flatten)]
    pub scan: ScanArgs,

    /// JPEG quality (1-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// PNG optimization preset (0-6).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=6))]
    pub png_level: Option<u8>,
}

#[derive(Args, Clone)]
pub struct TinifyArgs {
    #[command(flatten)]
    pub scan: ScanArgs,

    /// Resize as METHOD:WIDTH:HEIGHT, e.g. fit:300:200 or cover:800:600.
    #[arg(short, long)]
    pub resize: Option<Resize>,

    /// Convert to this MIME type, e.g. image/webp.
    #[arg(short, long)]
    pub convert: Option<String>,

    /// Tinify API key. Falls back to TINIFY_API_KEY, then the config file.
    #[arg(short, long)]
    pub key: Option<String>,
}

#[derive(Args)]
pub struct GenerateSchemaArgs {
    /// Output path for the generated schema.
    #[arg(short, long, default_value = "imgpress.schema.json")]
    pub output: String,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// The shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}
