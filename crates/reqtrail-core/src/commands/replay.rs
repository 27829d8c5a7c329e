//! Replay command implementation.
//!
//! The replay command:
//! 1. Loads the aggregator configuration
//! 2. Registers the requested sinks
//! 3. Feeds every notification in the input through the request subscriber
//! 4. Applies the sweep policy to contexts left open at end of input
//! 5. Flushes the sinks and reports delivery statistics

use super::models::{ReplayArgs, ReplayReport};
use crate::aggregator::EventAggregator;
use crate::sink::http::validate_endpoint;
use crate::sink::{validate_path, ConsoleFormat, ConsoleSink, FileSink, HttpSink};
use crate::subscriber::{Notification, RequestSubscriber};
use crate::utils::config::{load_config, AggregatorConfig};
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execute the replay command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Replay command arguments
///
/// # Returns
/// A report of how many notifications were applied and records emitted
///
/// # Errors
/// * Configuration file cannot be loaded
/// * Output file or endpoint cannot be set up
/// * Input file cannot be read
///
/// Malformed input lines are skipped with a warning, not treated as errors.
pub fn execute_replay(args: ReplayArgs) -> Result<ReplayReport> {
    let start_time = Instant::now();

    info!("Replaying notifications from: {}", args.input.display());

    let config = build_config(&args)?;
    let aggregator = Arc::new(EventAggregator::try_new(config)?);

    if let Some(output) = &args.output {
        let sink = FileSink::create(output).context("Failed to open output file")?;
        aggregator.register_sink(sink);
    }

    if let Some(endpoint) = &args.endpoint {
        let sink = HttpSink::new(endpoint.as_str()).context("Failed to set up HTTP sink")?;
        info!("Posting records to: {}", endpoint);
        aggregator.register_sink(sink);
    }

    if args.print_summary {
        aggregator.register_sink(ConsoleSink::stdout(ConsoleFormat::Summary));
    }

    let subscriber = RequestSubscriber::new(Arc::clone(&aggregator));
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file {}", args.input.display()))?;

    let mut report = ReplayReport::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        match Notification::from_json(&line) {
            Ok(notification) => {
                debug!("Line {}: {}", index + 1, notification);
                subscriber.handle(&notification);
                report.notifications += 1;
            }
            Err(e) => {
                warn!("Skipping line {}: {}", index + 1, e);
                report.skipped_lines += 1;
            }
        }
    }

    // Everything still open never saw request_finished
    report.abandoned = aggregator.sweep_idle(Duration::ZERO);
    if report.abandoned > 0 {
        info!(
            "{} contexts left open at end of input ({:?} policy)",
            report.abandoned,
            aggregator.config().sweep_policy
        );
    }

    aggregator.flush();
    report.records = aggregator.finalized_count();
    report.delivery = aggregator.stats();

    info!(
        "Replayed {} notifications into {} records | {}",
        report.notifications,
        report.records,
        report.delivery.summary()
    );
    info!(
        "Replay completed in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(report)
}

/// Check replay arguments before doing any work
///
/// **Public** - called from main.rs ahead of `execute_replay`
pub fn validate_args(args: &ReplayArgs) -> Result<()> {
    if !args.input.is_file() {
        bail!("Input file not found: {}", args.input.display());
    }

    if let Some(output) = &args.output {
        validate_path(output).context("Invalid output path")?;
    }

    if let Some(endpoint) = &args.endpoint {
        validate_endpoint(endpoint).context("Invalid endpoint")?;
    }

    if let Some(config) = &args.config {
        if !config.is_file() {
            bail!("Config file not found: {}", config.display());
        }
    }

    if args.output.is_none() && args.endpoint.is_none() && !args.print_summary {
        warn!("No sink selected; records will only be counted");
    }

    Ok(())
}

/// Configuration file (or defaults) plus command-line redactions
fn build_config(args: &ReplayArgs) -> Result<AggregatorConfig> {
    let config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AggregatorConfig::default(),
    };

    let config = config.with_sensitive_parameters(args.filter_parameters.iter().cloned());
    config.validate().context("Invalid configuration")?;

    debug!(
        "Redacting {} parameter names",
        config.sensitive_parameter_names.len()
    );
    Ok(config)
}
