//! Stats command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use features::{FeatureArchive, corpus_stats};

/// Run the stats command.
pub fn run(archive: &Path, output: &Path) -> Result<()> {
    let archive = FeatureArchive::load(archive)
        .with_context(|| format!("failed to load archive {}", archive.display()))?;
    let stats = corpus_stats(&archive)?;
    let scaler = stats.to_scaler()?;
    scaler
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Utterances: {}", archive.len());
    println!("Frames:     {}", stats.count());
    println!("Channels:   {}", scaler.channels());
    println!();
    println!("channel      mean     scale");
    for (c, (mean, scale)) in scaler.mean().iter().zip(scaler.scale()).enumerate() {
        println!("{c:>7}  {mean:>8.4}  {scale:>8.4}");
    }

    info!(output = %output.display(), "Scaler saved");
    Ok(())
}
