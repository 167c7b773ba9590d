//! Checkpoint save/load and training resume.

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use fftnet_core::{FftNetError, ModelConfig, Orientation, TrainingConfig, Vocoder};
use fftnet_model::{FftNet, Trainer, TrainingSegment, checkpoint};

#[test]
fn test_reloaded_model_matches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fftnet.safetensors");

    let config = ModelConfig {
        radixes: vec![2, 2, 2, 2],
        ..ModelConfig::tiny()
    }
    .with_orientation(Orientation::Prefix);
    let varmap = VarMap::new();
    let model = FftNet::init(config.clone(), &varmap, &Device::Cpu).unwrap();
    checkpoint::save(&path, &varmap, &config, 3).unwrap();

    let (loaded, meta) = checkpoint::load(&path, &Device::Cpu).unwrap();
    assert_eq!(meta.step, 3);
    assert_eq!(loaded.config(), &config);
    assert_eq!(loaded.receptive_field(), 16);
    assert_eq!(loaded.pyramid().context_lengths(), vec![2, 3, 5, 9]);

    let x = Tensor::new(&[[0u32, 1, 2, 3, 3, 2, 1, 0, 1, 1]], &Device::Cpu).unwrap();
    let a = model
        .forward(&x, None)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    let b = loaded
        .forward(&x, None)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_trainer_resume_keeps_step_and_weights() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ckpt.safetensors");
    let segment = TrainingSegment {
        waveform: vec![0, 1, 2, 3, 2, 1, 0, 1, 2],
        features: None,
    };

    let mut trainer =
        Trainer::new(ModelConfig::tiny(), TrainingConfig::default(), &Device::Cpu).unwrap();
    trainer.step_segments(&[segment.clone()]).unwrap();
    trainer.step_segments(&[segment.clone()]).unwrap();
    trainer.save_checkpoint(&path).unwrap();

    let resumed = Trainer::resume(&path, TrainingConfig::default(), &Device::Cpu).unwrap();
    assert_eq!(resumed.steps_taken(), 2);

    let x = Tensor::new(&[[0u32, 1, 2, 3]], &Device::Cpu).unwrap();
    let a = trainer
        .model()
        .forward(&x, None)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    let b = resumed
        .model()
        .forward(&x, None)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_architecture_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.safetensors");
    let varmap = VarMap::new();
    let config = ModelConfig::tiny();
    FftNet::init(config.clone(), &varmap, &Device::Cpu).unwrap();
    checkpoint::save(&path, &varmap, &config, 0).unwrap();

    // A bigger model has variables the file does not carry.
    let bigger = VarMap::new();
    FftNet::init(
        ModelConfig::tiny().with_aux_channels(2),
        &bigger,
        &Device::Cpu,
    )
    .unwrap();
    assert!(matches!(
        checkpoint::load_into(&path, &bigger),
        Err(FftNetError::Checkpoint(_))
    ));
}
