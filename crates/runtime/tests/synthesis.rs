//! End-to-end synthesis through a saved checkpoint.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use candle_core::Device;
use candle_nn::VarMap;
use features::Scaler;
use fftnet_core::{
    FeatureMatrix, FftNetError, GenerationConfig, GenerationOptions, ModelConfig, SamplingPolicy,
};
use fftnet_model::{FftNet, checkpoint};
use runtime::VocoderRuntime;

fn saved_model(dir: &tempfile::TempDir, config: ModelConfig) -> std::path::PathBuf {
    let path = dir.path().join("fftnet.safetensors");
    let varmap = VarMap::new();
    FftNet::init(config.clone(), &varmap, &Device::Cpu).unwrap();
    checkpoint::save(&path, &varmap, &config, 42).unwrap();
    path
}

fn seeded() -> GenerationConfig {
    GenerationConfig {
        seed: Some(11),
        ..Default::default()
    }
}

fn features(channels: usize, frames: usize) -> FeatureMatrix {
    let data = (0..channels * frames)
        .map(|i| ((i * 37 % 17) as f32 - 8.0) * 0.3 + 2.0)
        .collect();
    FeatureMatrix::new(channels, frames, data).unwrap()
}

#[test]
fn test_conditioned_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_model(&dir, ModelConfig::tiny().with_aux_channels(3));
    let scaler = Scaler::new(vec![2.0, 1.0, 0.0], vec![2.0, 1.0, 0.5]).unwrap();
    let rt = VocoderRuntime::load(&path, &Device::Cpu, seeded())
        .unwrap()
        .with_scaler(scaler)
        .unwrap();
    assert_eq!(rt.checkpoint_step(), 42);

    let h = features(3, 40);
    let audio = rt.synthesize(&h).unwrap();
    assert_eq!(audio.len(), 40);
    assert!(audio.iter().all(|s| (-1.0..=1.0).contains(s)));

    // Seeded runs repeat exactly.
    assert_eq!(rt.synthesize(&h).unwrap(), audio);
}

#[test]
fn test_scaler_is_applied_before_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_model(&dir, ModelConfig::tiny().with_aux_channels(2));
    let scaler = Scaler::new(vec![1.5, -0.5], vec![3.0, 0.25]).unwrap();
    let h = features(2, 30);

    let scaled = VocoderRuntime::load(&path, &Device::Cpu, seeded())
        .unwrap()
        .with_scaler(scaler.clone())
        .unwrap();
    let plain = VocoderRuntime::load(&path, &Device::Cpu, seeded()).unwrap();

    let options = GenerationOptions::new().with_policy(SamplingPolicy::Argmax);
    let a = scaled.synthesize_with(&h, &options).unwrap();
    let b = plain
        .synthesize_with(&scaler.transformed(&h).unwrap(), &options)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_unconditioned_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_model(&dir, ModelConfig::tiny());
    let rt = VocoderRuntime::load(&path, &Device::Cpu, seeded()).unwrap();

    let audio = rt.generate_unconditioned(64).unwrap();
    assert_eq!(audio.len(), 64);
    assert!(rt.generate_unconditioned(0).unwrap().is_empty());
    assert!(matches!(
        rt.synthesize(&features(2, 8)),
        Err(FftNetError::UnexpectedConditioning)
    ));
}

#[test]
fn test_conditioned_model_needs_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_model(&dir, ModelConfig::tiny().with_aux_channels(2));
    let rt = VocoderRuntime::load(&path, &Device::Cpu, seeded()).unwrap();
    assert!(matches!(
        rt.generate_unconditioned(10),
        Err(FftNetError::MissingConditioning)
    ));
}

#[test]
fn test_cancelled_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_model(&dir, ModelConfig::tiny());
    let rt = VocoderRuntime::load(&path, &Device::Cpu, seeded()).unwrap();

    let options = rt.options().with_cancel(Arc::new(AtomicBool::new(true)));
    assert!(matches!(
        rt.generate_unconditioned_with(10, &options),
        Err(FftNetError::Cancelled { step: 0 })
    ));
}

#[test]
fn test_missing_checkpoint() {
    let result = VocoderRuntime::load("/no/such/model.safetensors", &Device::Cpu, seeded());
    assert!(matches!(result, Err(FftNetError::ModelLoad { .. })));
}
