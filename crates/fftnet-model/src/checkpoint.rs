//! Checkpoint persistence.
//!
//! A checkpoint is a single safetensors file: the model weights plus, in the
//! header metadata, the full [`ModelConfig`] as JSON and the training step.
//! The config is needed to rebuild the layer layout (radix schedule and
//! orientation) before any weight can be read back.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use safetensors::SafeTensors;
use tracing::{info, instrument};

use fftnet_core::{FftNetError, FftNetResult, ModelConfig};

use crate::model::FftNet;

/// Metadata key holding the JSON model config.
pub const CONFIG_KEY: &str = "fftnet.config";
/// Metadata key holding the training step.
pub const STEP_KEY: &str = "fftnet.step";

/// Header metadata of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub config: ModelConfig,
    pub step: usize,
}

/// Write all variables of `varmap` with their config and step.
#[instrument(skip(varmap, config), fields(path = %path.as_ref().display()))]
pub fn save(
    path: impl AsRef<Path>,
    varmap: &VarMap,
    config: &ModelConfig,
    step: usize,
) -> FftNetResult<()> {
    let path = path.as_ref();
    let tensors: HashMap<String, Tensor> = {
        let data = varmap
            .data()
            .lock()
            .map_err(|_| FftNetError::internal("variable map lock poisoned"))?;
        data.iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect()
    };

    let mut metadata = HashMap::new();
    metadata.insert(CONFIG_KEY.to_string(), serde_json::to_string(config)?);
    metadata.insert(STEP_KEY.to_string(), step.to_string());

    safetensors::serialize_to_file(&tensors, &Some(metadata), path)
        .map_err(|e| FftNetError::checkpoint(format!("failed to write {}: {e}", path.display())))?;

    info!("Saved checkpoint at step {} ({} tensors)", step, tensors.len());
    Ok(())
}

/// Parse the header metadata of a checkpoint buffer.
pub fn read_meta(buffer: &[u8]) -> FftNetResult<CheckpointMeta> {
    let (_, header) = SafeTensors::read_metadata(buffer)
        .map_err(|e| FftNetError::checkpoint(format!("invalid safetensors header: {e}")))?;
    let metadata = header
        .metadata()
        .as_ref()
        .ok_or_else(|| FftNetError::checkpoint("checkpoint carries no metadata"))?;

    let config_json = metadata
        .get(CONFIG_KEY)
        .ok_or_else(|| FftNetError::checkpoint(format!("missing `{CONFIG_KEY}` entry")))?;
    let config: ModelConfig = serde_json::from_str(config_json)
        .map_err(|e| FftNetError::checkpoint(format!("bad model config: {e}")))?;
    config.validate()?;

    let step = match metadata.get(STEP_KEY) {
        Some(raw) => raw
            .parse()
            .map_err(|e| FftNetError::checkpoint(format!("bad step `{raw}`: {e}")))?,
        None => 0,
    };

    Ok(CheckpointMeta { config, step })
}

fn read_file(path: &Path) -> FftNetResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| FftNetError::ModelLoad {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Rebuild an inference model from a checkpoint.
#[instrument(skip(device), fields(path = %path.as_ref().display()))]
pub fn load(path: impl AsRef<Path>, device: &Device) -> FftNetResult<(FftNet, CheckpointMeta)> {
    let path = path.as_ref();
    info!("Loading checkpoint from {}", path.display());

    let buffer = read_file(path)?;
    let meta = read_meta(&buffer)?;
    let tensors =
        candle_core::safetensors::load_buffer(&buffer, device).map_err(FftNetError::tensor)?;
    let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
    let model = FftNet::new(meta.config.clone(), vb)?;
    Ok((model, meta))
}

/// Copy checkpoint weights into the existing variables of `varmap`.
///
/// Every variable must have a same-named, same-shaped tensor in the file.
pub fn load_into(path: impl AsRef<Path>, varmap: &VarMap) -> FftNetResult<CheckpointMeta> {
    let path = path.as_ref();
    let buffer = read_file(path)?;
    let meta = read_meta(&buffer)?;

    let data = varmap
        .data()
        .lock()
        .map_err(|_| FftNetError::internal("variable map lock poisoned"))?;
    let device = data
        .values()
        .next()
        .map(|var| var.device().clone())
        .unwrap_or(Device::Cpu);
    let tensors =
        candle_core::safetensors::load_buffer(&buffer, &device).map_err(FftNetError::tensor)?;

    for (name, var) in data.iter() {
        let tensor = tensors
            .get(name)
            .ok_or_else(|| FftNetError::checkpoint(format!("missing tensor `{name}`")))?;
        var.set(tensor)
            .map_err(|e| FftNetError::checkpoint(format!("cannot restore `{name}`: {e}")))?;
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fftnet_core::Orientation;

    #[test]
    fn test_meta_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let config = ModelConfig::tiny()
            .with_orientation(Orientation::Prefix)
            .with_aux_channels(3);
        let varmap = VarMap::new();
        FftNet::init(config.clone(), &varmap, &Device::Cpu).unwrap();

        save(&path, &varmap, &config, 17).unwrap();
        let buffer = std::fs::read(&path).unwrap();
        let meta = read_meta(&buffer).unwrap();
        assert_eq!(meta.config, config);
        assert_eq!(meta.step, 17);
    }

    #[test]
    fn test_missing_config_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.safetensors");
        let t = Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap();
        let tensors = HashMap::from([("w".to_string(), t)]);
        safetensors::serialize_to_file(&tensors, &None, &path).unwrap();

        let buffer = std::fs::read(&path).unwrap();
        assert!(matches!(read_meta(&buffer), Err(FftNetError::Checkpoint(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load("/definitely/not/here.safetensors", &Device::Cpu);
        assert!(matches!(result, Err(FftNetError::ModelLoad { .. })));
    }
}
