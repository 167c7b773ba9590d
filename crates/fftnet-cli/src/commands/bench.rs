//! Benchmark command implementation.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, ensure};
use candle_nn::VarMap;
use tracing::info;

use fftnet_core::{
    FeatureMatrix, GenerationInput, GenerationOptions, Vocoder, VocoderConfig,
};
use fftnet_model::FftNet;
use runtime::{DevicePreference, device_name, select_device};

/// Run the benchmark command.
pub fn run(
    config: Option<&Path>,
    samples: usize,
    iterations: usize,
    device: DevicePreference,
) -> Result<()> {
    ensure!(iterations > 0, "need at least one iteration");
    let config = match config {
        Some(path) => VocoderConfig::from_json_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => VocoderConfig::default(),
    };
    let device = select_device(device)?;
    let model = FftNet::init(config.model.clone(), &VarMap::new(), &device)?;

    let features = config
        .model
        .aux_channels
        .map(|channels| FeatureMatrix::zeros(channels, samples));
    let input = match &features {
        Some(h) => GenerationInput::Features(h),
        None => GenerationInput::Samples(samples),
    };
    let options = GenerationOptions::from(&config.generation);

    println!(
        "Running benchmark: {} samples x {} iterations on {}",
        samples,
        iterations,
        device_name(&device)
    );
    println!(
        "Model: {} layers, receptive field {}, {} parameters",
        model.pyramid().depth(),
        model.receptive_field(),
        model.parameter_count()
    );
    println!();

    let times = (0..iterations)
        .map(|_| -> Result<f64> {
            let start = Instant::now();
            model.generate(input, &options)?;
            Ok(start.elapsed().as_secs_f64() * 1000.0)
        })
        .collect::<Result<Vec<_>>>()?;

    let avg = times.iter().sum::<f64>() / iterations as f64;
    let p95 = percentile(&times, 95);
    let per_sample_us = if samples > 0 {
        avg * 1000.0 / samples as f64
    } else {
        0.0
    };
    let audio_ms = samples as f64 * 1000.0 / f64::from(config.generation.sample_rate);
    let rtf = if audio_ms > 0.0 { avg / audio_ms } else { 0.0 };

    println!("Generation:");
    println!("  Avg:        {avg:.3} ms");
    println!("  P95:        {p95:.3} ms");
    println!("  Per sample: {per_sample_us:.1} us");
    println!("  RTF:        {rtf:.3}x");

    info!(avg_ms = avg, p95_ms = p95, rtf, "Benchmark complete");
    Ok(())
}

/// The p-th percentile of `values`.
fn percentile(values: &[f64], p: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
