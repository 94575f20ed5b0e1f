//! Command-line flags.
//!
//! Flag spellings follow the agent's historical surface (`--apiKey`,
//! `--maxQueue`, ...). Durations accept humantime forms such as `250ms` or
//! `1s`.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "tendrl-agent",
    about = "Host-local message forwarding agent for the tendrl ingest API",
    version
)]
pub struct Args {
    /// API key for authentication (falls back to TENDRL_KEY).
    #[arg(long = "apiKey")]
    pub api_key: Option<String>,

    /// Flush interval for batching.
    #[arg(long = "flushInterval", value_parser = humantime::parse_duration, default_value = "250ms")]
    pub flush_interval: Duration,

    /// Batch size for processing. Accepted for compatibility; superseded by
    /// adaptive batch sizing.
    #[arg(long = "batchSize", default_value_t = 10)]
    pub batch_size: usize,

    /// Minimum batch size.
    #[arg(long = "minBatchSize", default_value_t = 10)]
    pub min_batch_size: usize,

    /// Maximum batch size.
    #[arg(long = "maxBatchSize", default_value_t = 200)]
    pub max_batch_size: usize,

    /// Queue scale factor for batch size.
    #[arg(long = "scaleFactor", default_value_t = 0.5)]
    pub scale_factor: f64,

    /// Maximum queue size before backpressure.
    #[arg(long = "maxQueue", default_value_t = 1000)]
    pub max_queue: usize,

    /// Target CPU usage percentage.
    #[arg(long = "targetCPU", default_value_t = 70.0)]
    pub target_cpu: f64,

    /// Target memory usage percentage.
    #[arg(long = "targetMem", default_value_t = 80.0)]
    pub target_mem: f64,

    /// Minimum batch interval.
    #[arg(long = "minInterval", value_parser = humantime::parse_duration, default_value = "100ms")]
    pub min_interval: Duration,

    /// Maximum batch interval.
    #[arg(long = "maxInterval", value_parser = humantime::parse_duration, default_value = "1s")]
    pub max_interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("tendrl-agent").chain(argv.iter().copied()))
            .expect("args parse")
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let args = parse(&[]);
        assert_eq!(args.api_key, None);
        assert_eq!(args.flush_interval, Duration::from_millis(250));
        assert_eq!(args.batch_size, 10);
        assert_eq!(args.min_batch_size, 10);
        assert_eq!(args.max_batch_size, 200);
        assert_eq!(args.scale_factor, 0.5);
        assert_eq!(args.max_queue, 1000);
        assert_eq!(args.target_cpu, 70.0);
        assert_eq!(args.target_mem, 80.0);
        assert_eq!(args.min_interval, Duration::from_millis(100));
        assert_eq!(args.max_interval, Duration::from_secs(1));
    }

    #[test]
    fn all_flags_are_recognized() {
        let args = parse(&[
            "--apiKey",
            "secret",
            "--flushInterval",
            "500ms",
            "--batchSize",
            "20",
            "--minBatchSize",
            "5",
            "--maxBatchSize",
            "100",
            "--scaleFactor",
            "0.7",
            "--maxQueue",
            "64",
            "--targetCPU",
            "50",
            "--targetMem",
            "60",
            "--minInterval",
            "50ms",
            "--maxInterval",
            "2s",
        ]);
        assert_eq!(args.api_key.as_deref(), Some("secret"));
        assert_eq!(args.flush_interval, Duration::from_millis(500));
        assert_eq!(args.batch_size, 20);
        assert_eq!(args.min_batch_size, 5);
        assert_eq!(args.max_batch_size, 100);
        assert_eq!(args.scale_factor, 0.7);
        assert_eq!(args.max_queue, 64);
        assert_eq!(args.target_cpu, 50.0);
        assert_eq!(args.target_mem, 60.0);
        assert_eq!(args.min_interval, Duration::from_millis(50));
        assert_eq!(args.max_interval, Duration::from_secs(2));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let result = Args::try_parse_from(["tendrl-agent", "--flushInterval", "soon"]);
        assert!(result.is_err());
    }
}
