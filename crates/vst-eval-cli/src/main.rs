//! vst-eval CLI - Linear vs. VST codec comparison for speckle imagery

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vst_eval::metrics::TargetMetric;
use vst_eval::{AnalysisConfig, DetailBand, VstParams};

mod commands;

/// Variance-stabilizing transform analysis and codec evaluation tool.
#[derive(Parser)]
#[command(name = "vst-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON analysis configuration; flags override its fields
    #[arg(short, long, global = true, env = "VST_EVAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Transform parameters shared by every command.
#[derive(Args, Clone, Copy)]
struct VstArgs {
    /// Transform scale `a`
    #[arg(long)]
    a: Option<f64>,

    /// Logarithm base `b`
    #[arg(long)]
    b: Option<f64>,
}

impl VstArgs {
    fn apply(self, config: &mut AnalysisConfig) -> Result<VstParams> {
        let params = VstParams {
            a: self.a.unwrap_or(config.vst.a),
            b: self.b.unwrap_or(config.vst.b),
        };
        params.validate().context("invalid transform parameters")?;
        config.vst = params;
        Ok(params)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BandArg {
    /// Diagonal Haar sub-band
    Haar,
    /// Normalized 5-point Laplacian
    Laplacian,
}

impl From<BandArg> for DetailBand {
    fn from(band: BandArg) -> Self {
        match band {
            BandArg::Haar => Self::Haar,
            BandArg::Laplacian => Self::Laplacian,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check that forward followed by inverse transform restores an image
    Roundtrip {
        /// Grayscale image (synthetic scene when omitted)
        input: Option<PathBuf>,

        /// Side length of the synthetic scene
        #[arg(long, default_value_t = 256)]
        size: usize,

        #[command(flatten)]
        vst: VstArgs,
    },

    /// Convert a noise level between the multiplicative and VST domains
    Sigma {
        /// Noise standard deviation to convert
        value: f64,

        /// Treat VALUE as additive (VST domain) and convert back
        #[arg(long)]
        inverse: bool,

        #[command(flatten)]
        vst: VstArgs,
    },

    /// Estimate the additive noise level of an image in the VST domain
    Estimate {
        /// Noisy grayscale image
        input: PathBuf,

        /// Clean image; measures the exact spread instead of a blind estimate
        #[arg(long)]
        clean: Option<PathBuf>,

        /// Detail band for the blind estimate
        #[arg(long, value_enum, default_value = "haar")]
        band: BandArg,

        /// Calibration gain applied to the blind estimate
        #[arg(long, default_value_t = 1.0)]
        gain: f64,

        #[command(flatten)]
        vst: VstArgs,
    },

    /// Sweep a codec over Q in both domains and compare optimal operating points
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Noisy grayscale image (synthetic speckle scene when omitted)
    input: Option<PathBuf>,

    /// Clean image to score against
    #[arg(long)]
    clean: Option<PathBuf>,

    /// Score against the noisy input when no clean image exists
    #[arg(long, conflicts_with = "clean")]
    noisy_reference: bool,

    /// Side length of the synthetic scene
    #[arg(long, default_value_t = 256)]
    size: usize,

    /// Multiplicative noise level for the synthetic scene
    #[arg(long)]
    noise: Option<f64>,

    /// Seed for synthetic noise
    #[arg(long)]
    seed: Option<u64>,

    /// Directory holding bpgenc and bpgdec
    #[arg(long, conflicts_with_all = ["encoder", "decoder"])]
    bpg_dir: Option<PathBuf>,

    /// Encoder command line with {q}, {input}, {output} placeholders
    #[arg(long, requires = "decoder")]
    encoder: Option<String>,

    /// Decoder command line with {input}, {output} placeholders
    #[arg(long, requires = "encoder")]
    decoder: Option<String>,

    /// Codec identifier used in reports
    #[arg(long, default_value = "external")]
    codec_id: String,

    /// File extension of the encoded artifact
    #[arg(long)]
    extension: Option<String>,

    /// Metric the optimal operating point is selected by
    #[arg(short, long)]
    target: Option<TargetMetric>,

    /// First quantization level
    #[arg(long)]
    q_start: Option<u32>,

    /// Last quantization level
    #[arg(long)]
    q_end: Option<u32>,

    /// Distance between quantization levels
    #[arg(long)]
    q_step: Option<u32>,

    /// Per-invocation codec timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Run Q steps one after another
    #[arg(long)]
    sequential: bool,

    /// Also compute DSSIM for every sample
    #[arg(long)]
    dssim: bool,

    /// Write the full report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the summary table as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write every sweep sample as CSV
    #[arg(long)]
    curves: Option<PathBuf>,

    /// Save OOP reconstructions and error maps as PNG into this directory
    #[arg(long)]
    save_oop: Option<PathBuf>,

    #[command(flatten)]
    vst: VstArgs,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Roundtrip { input, size, vst } => {
            let params = vst.apply(&mut config)?;
            commands::roundtrip::run(input, size, params, config.floor)
        }
        Commands::Sigma { value, inverse, vst } => {
            let params = vst.apply(&mut config)?;
            commands::sigma::run(value, inverse, params)
        }
        Commands::Estimate { input, clean, band, gain, vst } => {
            vst.apply(&mut config)?;
            commands::estimate::run(input, clean, band.into(), gain, &config)
        }
        Commands::Analyze(args) => {
            args.vst.apply(&mut config)?;
            commands::analyze::run(args, config)
        }
    }
}
