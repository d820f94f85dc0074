//! Linear vs. VST domain comparison command.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use vst_eval::codec::ExternalCommandCodec;
use vst_eval::eval::{self, CancelToken, Domain, SweepInput};
use vst_eval::noise::apply_speckle;
use vst_eval::plane::synthetic_scene;
use vst_eval::{AnalysisConfig, AnalysisReport, Comparison, SummaryRow, SweepConfig};

use super::load::{load_plane, save_preview};
use crate::AnalyzeArgs;

pub fn run(args: AnalyzeArgs, mut config: AnalysisConfig) -> Result<()> {
    apply_overrides(&args, &mut config);

    let (name, input, bytes_per_sample) = build_input(&args, &mut config)?;
    config.validate().context("Invalid analysis configuration")?;

    let mut sweep_config = config.sweep_config()?;
    sweep_config.bytes_per_sample = bytes_per_sample;

    let codec = build_codec(&args, &config)?;
    info!(
        %name,
        codec = %args.codec_id,
        q_values = sweep_config.q_values.len(),
        target = %config.target,
        "starting analysis"
    );

    let comparison = eval::compare_domains(&codec, &input, &sweep_config, config.target, &CancelToken::new())
        .context("Domain comparison failed")?;

    print_summary(&name, &comparison);

    let report = AnalysisReport::from_comparison(&name, &comparison);
    if let Some(path) = &args.json {
        report.write_json(path).with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Report written to: {}", path.display());
    }
    if let Some(path) = &args.csv {
        report
            .write_summary_csv(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Summary written to: {}", path.display());
    }
    if let Some(path) = &args.curves {
        report
            .write_curves_csv(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Curves written to: {}", path.display());
    }
    if let Some(dir) = &args.save_oop {
        save_reconstructions(&codec, &input, &sweep_config, &comparison, config.peak, dir)?;
    }

    Ok(())
}

fn apply_overrides(args: &AnalyzeArgs, config: &mut AnalysisConfig) {
    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(q) = args.q_start {
        config.q_start = q;
    }
    if let Some(q) = args.q_end {
        config.q_end = q;
    }
    if let Some(step) = args.q_step {
        config.q_step = step;
    }
    if let Some(ms) = args.timeout_ms {
        config.codec_timeout_ms = Some(ms);
    }
    if let Some(sigma) = args.noise {
        config.noise_sigma = sigma;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.sequential {
        config.parallel = false;
    }
    if args.dssim {
        config.metrics.dssim = true;
    }
}

/// Returns the report name, the sweep input, and the stored bytes per sample.
fn build_input(args: &AnalyzeArgs, config: &mut AnalysisConfig) -> Result<(String, SweepInput, usize)> {
    let Some(path) = &args.input else {
        let clean = synthetic_scene(args.size, args.size)?;
        let noisy = apply_speckle(clean.as_ref(), config.noise_sigma, config.noise_seed())?;
        config.peak = 255.0;
        let name = format!("synthetic-{}x{}-sigma{}", args.size, args.size, config.noise_sigma);
        return Ok((name, SweepInput::new(clean, noisy)?, 1));
    };

    let noisy = load_plane(path)?;
    config.peak = noisy.peak;
    let name = path
        .file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());

    let input = match &args.clean {
        Some(clean_path) => {
            let clean = load_plane(clean_path)?;
            SweepInput::new(clean.plane, noisy.plane)
                .with_context(|| format!("{} does not match {}", clean_path.display(), path.display()))?
        }
        None if args.noisy_reference => {
            warn!("no clean image; scoring against the noisy input");
            SweepInput::without_ground_truth(noisy.plane)?
        }
        None => bail!("No clean image: pass --clean, or --noisy-reference to score against the input"),
    };

    Ok((name, input, noisy.bytes_per_sample))
}

fn build_codec(args: &AnalyzeArgs, config: &AnalysisConfig) -> Result<ExternalCommandCodec> {
    let mut codec = match (&args.bpg_dir, &args.encoder, &args.decoder) {
        (Some(dir), _, _) => ExternalCommandCodec::bpg(dir),
        (None, Some(encoder), Some(decoder)) => ExternalCommandCodec::new(&args.codec_id, encoder, decoder)
            .context("Invalid codec command line")?,
        _ => bail!("No codec: pass --bpg-dir, or --encoder together with --decoder"),
    };
    if let Some(extension) = &args.extension {
        codec = codec.with_extension(extension);
    }
    if let Some(timeout) = config.codec_timeout() {
        codec = codec.with_timeout(timeout);
    }
    Ok(codec)
}

fn print_summary(name: &str, comparison: &Comparison) {
    println!("Analysis: {name}");
    println!(
        "Estimated noise: sigma_add = {:.4} (sigma_mult = {:.4})",
        comparison.estimated_sigma_add, comparison.estimated_sigma_mult
    );
    println!();
    println!(
        "{:<8} {:>5} {:>14} {:>10} {:>12} {:>12} {:>10}",
        "Method",
        "Q",
        comparison.target.label(),
        "PSNR",
        "PSNR-HVS-M",
        "Size (B)",
        "Ratio"
    );
    println!("{:-<77}", "");
    for row in comparison.summary_rows() {
        print_row(&row);
    }

    for domain in Domain::ALL {
        let sweep = comparison.sweep(domain);
        if !sweep.failures.is_empty() {
            println!(
                "{domain}: {} of {} steps failed",
                sweep.failures.len(),
                sweep.failures.len() + sweep.samples.len()
            );
        }
    }
    if let Some(bd) = comparison.bd_rate() {
        println!();
        println!("BD-rate (VST vs. Linear, PSNR): {bd:+.2}%");
    }
}

fn print_row(row: &SummaryRow) {
    println!(
        "{:<8} {:>5} {:>14} {:>10} {:>12} {:>12} {:>10.2}",
        row.method,
        row.q_oop,
        cell(row.target_value, 4),
        cell(row.psnr, 2),
        cell(row.psnr_hvs_m, 2),
        row.filesize_bytes,
        row.compression_ratio
    );
}

fn cell(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if v.is_infinite() => "inf".to_string(),
        Some(v) => format!("{v:.precision$}"),
        None => "-".to_string(),
    }
}

fn save_reconstructions(
    codec: &ExternalCommandCodec,
    input: &SweepInput,
    config: &SweepConfig,
    comparison: &Comparison,
    peak: f64,
    dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    for domain in Domain::ALL {
        let q = comparison.oop(domain).q;
        let rec = eval::reconstruct(codec, input, domain, config, q)
            .with_context(|| format!("Failed to reconstruct {domain} at Q={q}"))?;
        let stem = domain.to_string().to_lowercase();
        save_preview(rec.image.as_ref(), peak, &dir.join(format!("{stem}_q{q}.png")))?;
        save_preview(rec.error_map.as_ref(), 255.0, &dir.join(format!("{stem}_q{q}_error.png")))?;
    }

    eprintln!("Reconstructions written to: {}", dir.display());
    Ok(())
}
