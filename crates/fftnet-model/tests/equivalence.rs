//! Batch forward pass versus incremental generation.
//!
//! Feeding the incremental engine the samples it picked itself must
//! reproduce the batch logits column by column.

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarMap;
use fftnet_core::{
    FeatureMatrix, GenerationInput, GenerationOptions, ModelConfig, Orientation, SamplingPolicy,
};
use fftnet_model::FftNet;
use fftnet_model::sampling::argmax;

const STEPS: usize = 10;
const TOLERANCE: f32 = 1e-5;

fn argmax_options() -> GenerationOptions {
    GenerationOptions::new()
        .with_policy(SamplingPolicy::Argmax)
        .with_seed(0)
}

/// Run the session for `STEPS`, returning per-step logits and chosen classes.
fn rollout(
    model: &FftNet,
    input: GenerationInput<'_>,
    seed_class: Option<u32>,
) -> (Vec<Vec<f32>>, Vec<u32>) {
    let mut session = model.session(input, &argmax_options()).unwrap();
    if let Some(class) = seed_class {
        session = session.with_seed_class(class).unwrap();
    }
    let mut logits = Vec::new();
    let mut samples = Vec::new();
    while let Some(step_logits) = session.advance().unwrap() {
        let class = argmax(&step_logits);
        session.accept(class).unwrap();
        logits.push(step_logits);
        samples.push(class);
    }
    (logits, samples)
}

fn column(logits: &Tensor, t: usize) -> Vec<f32> {
    logits.i((0, .., t)).unwrap().to_vec1::<f32>().unwrap()
}

fn assert_close(batch: &[f32], incremental: &[f32], t: usize) {
    for (q, (a, b)) in batch.iter().zip(incremental).enumerate() {
        assert!(
            (a - b).abs() < TOLERANCE,
            "step {t}, class {q}: batch {a} vs incremental {b}"
        );
    }
}

fn check_unconditioned(config: ModelConfig) {
    let varmap = VarMap::new();
    let model = FftNet::init(config, &varmap, &Device::Cpu).unwrap();

    let seed = 2;
    let (incremental, samples) = rollout(&model, GenerationInput::Samples(STEPS), Some(seed));
    assert_eq!(samples.len(), STEPS);

    let mut inputs = vec![seed];
    inputs.extend_from_slice(&samples[..STEPS - 1]);
    let x = Tensor::from_vec(inputs, (1, STEPS), &Device::Cpu).unwrap();
    let batch = model.forward(&x, None).unwrap();

    for (t, step_logits) in incremental.iter().enumerate() {
        assert_close(&column(&batch, t), step_logits, t);
    }
}

#[test]
fn test_unconditioned_equivalence_suffix() {
    check_unconditioned(ModelConfig::tiny());
}

#[test]
fn test_unconditioned_equivalence_prefix() {
    check_unconditioned(ModelConfig::tiny().with_orientation(Orientation::Prefix));
}

#[test]
fn test_unconditioned_equivalence_mixed_radixes() {
    check_unconditioned(ModelConfig {
        radixes: vec![3, 2, 2],
        fft_channels: 6,
        classes: 8,
        ..ModelConfig::tiny()
    });
}

fn random_features(channels: usize, frames: usize) -> FeatureMatrix {
    let values = Tensor::randn(0f32, 1.0, (channels * frames,), &Device::Cpu)
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    FeatureMatrix::new(channels, frames, values).unwrap()
}

#[test]
fn test_conditioned_equivalence() {
    let varmap = VarMap::new();
    let model = FftNet::init(
        ModelConfig::tiny().with_aux_channels(2),
        &varmap,
        &Device::Cpu,
    )
    .unwrap();
    let features = random_features(2, STEPS);

    let seed = 1;
    let (incremental, samples) =
        rollout(&model, GenerationInput::Features(&features), Some(seed));
    assert_eq!(samples.len(), STEPS);

    let mut inputs = vec![seed];
    inputs.extend_from_slice(&samples[..STEPS - 1]);
    let x = Tensor::from_vec(inputs, (1, STEPS), &Device::Cpu).unwrap();
    let h = model.conditioning_tensor(&features).unwrap();
    let batch = model.forward(&x, Some(&h)).unwrap();

    for (t, step_logits) in incremental.iter().enumerate() {
        assert_close(&column(&batch, t), step_logits, t);
    }
}

#[test]
fn test_conditioned_silence_seed_equivalence() {
    let varmap = VarMap::new();
    let model = FftNet::init(
        ModelConfig::tiny()
            .with_aux_channels(3)
            .with_orientation(Orientation::Prefix),
        &varmap,
        &Device::Cpu,
    )
    .unwrap();
    let features = random_features(3, STEPS);

    // Default conditioned start: an all-zero input column instead of a class.
    let (incremental, samples) = rollout(&model, GenerationInput::Features(&features), None);

    let tail = Tensor::from_vec(samples[..STEPS - 1].to_vec(), (1, STEPS - 1), &Device::Cpu)
        .unwrap();
    let encoded_tail = model
        .one_hot()
        .encode(&tail)
        .unwrap()
        .transpose(1, 2)
        .unwrap();
    let silence = Tensor::zeros((1, 4, 1), candle_core::DType::F32, &Device::Cpu).unwrap();
    let x = Tensor::cat(&[&silence, &encoded_tail], 2)
        .unwrap()
        .contiguous()
        .unwrap();
    let h = model.conditioning_tensor(&features).unwrap();
    let batch = model.forward_encoded(&x, Some(&h)).unwrap();

    for (t, step_logits) in incremental.iter().enumerate() {
        assert_close(&column(&batch, t), step_logits, t);
    }
}

#[test]
fn test_ring_buffers_keep_their_length() {
    let varmap = VarMap::new();
    let model = FftNet::init(ModelConfig::tiny(), &varmap, &Device::Cpu).unwrap();
    let mut session = model
        .session(GenerationInput::Samples(40), &argmax_options())
        .unwrap();
    let initial = session.buffer_lens();
    assert_eq!(initial, model.pyramid().context_lengths());

    while session.step().unwrap().is_some() {
        assert_eq!(session.buffer_lens(), initial);
    }
    assert_eq!(session.steps_taken(), 40);
}
