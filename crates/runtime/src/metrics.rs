//! Generation metrics through the `metrics` facade.
//!
//! Nothing is exported from here; a binary that wants the numbers installs
//! a recorder. Without one every call is a no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Metrics recorder for vocoder runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct VocoderMetrics;

impl VocoderMetrics {
    /// Register metric descriptions with whatever recorder is installed.
    pub fn new() -> Self {
        Self::register_metrics();
        Self
    }

    fn register_metrics() {
        describe_counter!(
            "fftnet_generations_total",
            "Generation runs started"
        );
        describe_counter!(
            "fftnet_generations_failed",
            "Generation runs that ended in an error"
        );
        describe_counter!(
            "fftnet_generations_cancelled",
            "Generation runs stopped by the abort flag"
        );
        describe_counter!(
            "fftnet_samples_generated_total",
            "Audio samples produced"
        );
        describe_histogram!(
            "fftnet_generation_seconds",
            "Wall time of one generation run in seconds"
        );
        describe_histogram!(
            "fftnet_rtf",
            "Real-time factor (processing time / audio duration)"
        );
    }

    /// Record a run being started.
    pub fn generation_started(&self) {
        counter!("fftnet_generations_total").increment(1);
    }

    /// Record a failed run.
    pub fn generation_failed(&self) {
        counter!("fftnet_generations_failed").increment(1);
    }

    /// Record a cancelled run.
    pub fn generation_cancelled(&self) {
        counter!("fftnet_generations_cancelled").increment(1);
    }

    /// Record a finished run and return its real-time factor.
    ///
    /// The factor is `elapsed / audio duration`; it is zero for an empty run.
    pub fn generation_completed(&self, samples: usize, elapsed: Duration, sample_rate: u32) -> f64 {
        counter!("fftnet_samples_generated_total").increment(samples as u64);
        histogram!("fftnet_generation_seconds").record(elapsed.as_secs_f64());
        let rtf = real_time_factor(samples, elapsed, sample_rate);
        if samples > 0 {
            histogram!("fftnet_rtf").record(rtf);
        }
        rtf
    }
}

/// Processing time divided by the duration of `samples` at `sample_rate`.
pub fn real_time_factor(samples: usize, elapsed: Duration, sample_rate: u32) -> f64 {
    if samples == 0 || sample_rate == 0 {
        return 0.0;
    }
    let audio_secs = samples as f64 / f64::from(sample_rate);
    elapsed.as_secs_f64() / audio_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder() {
        let metrics = VocoderMetrics::new();
        metrics.generation_started();
        metrics.generation_failed();
        metrics.generation_cancelled();
        let rtf = metrics.generation_completed(16000, Duration::from_millis(500), 16000);
        assert!((rtf - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_real_time_factor() {
        assert!((real_time_factor(8000, Duration::from_secs(2), 16000) - 4.0).abs() < 1e-9);
        assert_eq!(real_time_factor(0, Duration::from_secs(1), 16000), 0.0);
        assert_eq!(real_time_factor(100, Duration::from_secs(1), 0), 0.0);
    }
}
