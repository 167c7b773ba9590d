//! Info command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use candle_core::Device;
use candle_nn::VarMap;

use fftnet_core::{Vocoder, VocoderConfig};
use fftnet_model::FftNet;

/// Run the info command.
pub fn run(config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => VocoderConfig::from_json_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => VocoderConfig::default(),
    };
    let model = FftNet::init(config.model.clone(), &VarMap::new(), &Device::Cpu)?;
    print!("{}", describe(&model));
    Ok(())
}

/// Layer table and totals for a model.
pub fn describe(model: &FftNet) -> String {
    let config = model.config();
    let pyramid = model.pyramid();
    let mut out = String::new();

    out.push_str("FFTNet vocoder\n");
    out.push_str("==============\n\n");
    out.push_str(&format!("Version:      {}\n", env!("CARGO_PKG_VERSION")));
    out.push_str(&format!("Classes:      {}\n", config.classes));
    out.push_str(&format!("FFT channels: {}\n", config.fft_channels));
    out.push_str(&format!(
        "Conditioning: {}\n",
        config
            .aux_channels
            .map_or_else(|| "none".to_string(), |c| format!("{c} channels"))
    ));
    out.push_str(&format!("Orientation:  {:?}\n\n", pyramid.orientation()));

    out.push_str("layer  radix  field  dilation  padding  context\n");
    for (i, layer) in pyramid.layers().iter().enumerate() {
        out.push_str(&format!(
            "{:>5}  {:>5}  {:>5}  {:>8}  {:>7}  {:>7}\n",
            i,
            layer.radix,
            layer.receptive_field,
            layer.dilation,
            layer.padding(),
            layer.context()
        ));
    }
    out.push('\n');
    out.push_str(&format!("Receptive field: {}\n", model.receptive_field()));
    out.push_str(&format!("Buffered steps:  {}\n", pyramid.total_context()));
    out.push_str(&format!("Parameters:      {}\n", model.parameter_count()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fftnet_core::ModelConfig;

    #[test]
    fn test_describe_tiny() {
        let model = FftNet::init(ModelConfig::tiny(), &VarMap::new(), &Device::Cpu).unwrap();
        let text = describe(&model);
        assert!(text.contains("Receptive field: 8"));
        assert!(text.contains("Buffered steps:  10"));
        assert!(text.contains("Conditioning: none"));
    }

    #[test]
    fn test_run_with_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocoder.json");
        std::fs::write(
            &path,
            r#"{ "model": { "radixes": [2, 2], "fft_channels": 4, "classes": 8 } }"#,
        )
        .unwrap();
        assert!(run(Some(&path)).is_ok());
        assert!(run(Some(&dir.path().join("missing.json"))).is_err());
    }
}
